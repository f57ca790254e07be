//! Error types for cncbridge
//!
//! Each subsystem gets its own `thiserror`-derived enum; [`Error`] unifies
//! them behind a single type so call sites crossing a component boundary can
//! use `?` freely. No subsystem error variant is reused for a different
//! subsystem's failures, even when the underlying cause overlaps (a closed
//! socket surfaces as `TransportError::Closed`, never as a `StateError`).

use thiserror::Error;

/// Errors from the byte-stream transport (component A).
#[derive(Error, Debug, Clone)]
pub enum TransportError {
    /// The underlying OS or network call failed.
    #[error("transport I/O error: {reason}")]
    Io {
        /// Description of the underlying failure.
        reason: String,
    },

    /// A read or write did not complete before its deadline.
    #[error("transport operation timed out after {timeout_ms}ms")]
    Timeout {
        /// The deadline that was exceeded, in milliseconds.
        timeout_ms: u64,
    },

    /// The transport was closed (locally or by the peer) mid-operation.
    #[error("transport closed")]
    Closed,

    /// The address could not be parsed into a serial device path or `host:port`.
    #[error("invalid address '{address}': {reason}")]
    InvalidAddress {
        /// The address string that failed to parse.
        address: String,
        /// Why it was rejected.
        reason: String,
    },
}

/// Errors from the UDP discovery query (component B).
#[derive(Error, Debug, Clone)]
pub enum DiscoveryError {
    /// The UDP socket could not be bound or configured for broadcast.
    #[error("discovery socket error: {reason}")]
    Socket {
        /// Description of the underlying failure.
        reason: String,
    },

    /// No local broadcast-capable IPv4 address could be determined.
    #[error("no broadcast-capable network interface found")]
    NoBroadcastAddress,
}

/// Errors from the file-transfer engine (component C).
///
/// All variants but [`FileTransferError::PeerCancelled`] and
/// [`FileTransferError::LocalCancelled`] are recoverable at the call site by
/// retrying the whole transfer.
#[derive(Error, Debug, Clone)]
pub enum FileTransferError {
    /// No ACK/NAK/CAN arrived within the per-block timeout after all retries.
    #[error("file transfer timed out waiting for block {seq} after {retries} retries")]
    Timeout {
        /// The block sequence number being sent or awaited.
        seq: u8,
        /// How many retries were attempted.
        retries: u32,
    },

    /// The checksum or CRC-16 computed over a received block did not match.
    #[error("checksum mismatch on block {seq}")]
    ChecksumMismatch {
        /// The block sequence number that failed verification.
        seq: u8,
    },

    /// The MD5 digest appended to the final block did not match the received bytes.
    #[error("MD5 footer mismatch: expected {expected}, computed {actual}")]
    MD5Mismatch {
        /// The digest carried in the footer.
        expected: String,
        /// The digest computed over the received bytes.
        actual: String,
    },

    /// The remote peer sent CAN, aborting the transfer.
    #[error("transfer cancelled by peer")]
    PeerCancelled,

    /// The local caller set the cancel flag.
    #[error("transfer cancelled locally")]
    LocalCancelled,

    /// The underlying transport failed.
    #[error(transparent)]
    TransportError(#[from] TransportError),
}

/// Errors raised while tokenising or interpreting a G-code line (component D).
#[derive(Error, Debug, Clone)]
pub enum GCodeParseError {
    /// A word letter was not followed by a valid signed decimal number.
    #[error("line {line_no}, column {column}: {reason}")]
    MalformedToken {
        /// 1-based source line number.
        line_no: u32,
        /// 1-based column where the malformed token starts.
        column: u32,
        /// Human-readable description of the problem.
        reason: String,
    },

    /// Two words from the same modal group appeared on one line.
    #[error("line {line_no}: modal group conflict between '{first}' and '{second}'")]
    ModalGroupConflict {
        /// 1-based source line number.
        line_no: u32,
        /// The first conflicting word.
        first: String,
        /// The second conflicting word.
        second: String,
    },

    /// A motion word required a parameter that was not present and has no default.
    #[error("line {line_no}: missing required parameter '{param}' for {command}")]
    MissingParameter {
        /// 1-based source line number.
        line_no: u32,
        /// The command that needed the parameter.
        command: String,
        /// The missing parameter letter.
        param: String,
    },

    /// An arc's declared end point does not lie on the computed circle within tolerance.
    #[error("line {line_no}: arc endpoint off circle by {error_um:.3}um (tolerance 1.0um)")]
    ArcEndpoint {
        /// 1-based source line number.
        line_no: u32,
        /// The measured deviation, in micrometres.
        error_um: f64,
    },

    /// A value was out of the range the G-code standard allows for its parameter.
    #[error("line {line_no}: invalid value for '{param}': {reason}")]
    InvalidParameter {
        /// 1-based source line number.
        line_no: u32,
        /// The parameter letter.
        param: String,
        /// Why the value is invalid.
        reason: String,
    },
}

/// Errors raised by the session controller's command submission and replies (component F).
#[derive(Error, Debug, Clone)]
pub enum CommandError {
    /// The machine replied `error:<n>`.
    #[error("error:{code} - {message}")]
    MachineError {
        /// The numeric error code reported by the firmware.
        code: u32,
        /// The decoded description.
        message: String,
    },

    /// The machine replied `ALARM:<n>`.
    #[error("ALARM:{code} - {message}")]
    Alarm {
        /// The numeric alarm code reported by the firmware.
        code: u32,
        /// The decoded description.
        message: String,
    },

    /// The underlying transport failed while sending or awaiting a reply.
    #[error(transparent)]
    TransportError(#[from] TransportError),
}

/// Errors raised when an operation is invalid for the session's current link state.
#[derive(Error, Debug, Clone)]
pub enum StateError {
    /// The requested operation requires a connection, but none exists.
    #[error("operation '{operation}' requires a connection; current state is {state}")]
    NotConnected {
        /// The operation that was attempted.
        operation: String,
        /// The current link status, for diagnostics.
        state: String,
    },

    /// The requested operation cannot run while a file transfer is in progress.
    #[error("operation '{operation}' is not permitted during file transfer")]
    TransferInProgress {
        /// The operation that was attempted.
        operation: String,
    },

    /// The requested state transition is not defined by the session state machine.
    #[error("invalid transition from {from} to {to}")]
    InvalidTransition {
        /// The state the session was in.
        from: String,
        /// The state that was requested.
        to: String,
    },
}

/// Unified error type for all public cncbridge operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Transport-layer failure.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Discovery failure.
    #[error(transparent)]
    Discovery(#[from] DiscoveryError),

    /// File-transfer failure.
    #[error(transparent)]
    FileTransfer(#[from] FileTransferError),

    /// G-code parse failure.
    #[error(transparent)]
    GCodeParse(#[from] GCodeParseError),

    /// Command submission or reply failure.
    #[error(transparent)]
    Command(#[from] CommandError),

    /// Session state-machine violation.
    #[error(transparent)]
    State(#[from] StateError),

    /// Generic error for cases not covered by a structured variant above.
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Construct a generic error from a message.
    pub fn other(msg: impl Into<String>) -> Self {
        Error::Other(msg.into())
    }

    /// True if this error represents a timeout, at any layer.
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            Error::Transport(TransportError::Timeout { .. })
                | Error::FileTransfer(FileTransferError::Timeout { .. })
        )
    }

    /// True if this error is fatal to the current command but not to the session
    /// (i.e. an `ALARM`, recoverable only via `soft_reset`).
    pub fn is_alarm(&self) -> bool {
        matches!(self, Error::Command(CommandError::Alarm { .. }))
    }

    /// True if retrying the same operation is pointless without caller
    /// intervention (a local or peer cancellation, or a state-machine
    /// violation) as opposed to a transient I/O fault.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::FileTransfer(FileTransferError::LocalCancelled)
                | Error::FileTransfer(FileTransferError::PeerCancelled)
                | Error::State(_)
        )
    }
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;
