//! Byte-stream transport (component A): a small blocking trait implemented
//! by serial, TCP, and (for tests) in-memory transports, plus the connection
//! parameters used to open one.

mod mock;
mod serial;
mod tcp;

use std::time::Duration;

use cncbridge_core::{Error, Result};

pub use mock::MockTransport;
pub use serial::{list_ports, SerialPortInfo, SerialTransport};
pub use tcp::TcpTransport;

/// Which kind of link a [`ConnectionParams`] describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionDriver {
    /// A local serial/USB device.
    Serial,
    /// A TCP socket (e.g. an ESP32/WiFi bridge).
    Tcp,
}

/// Serial parity setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SerialParity {
    /// No parity bit.
    None,
    /// Even parity.
    Even,
    /// Odd parity.
    Odd,
}

/// Everything needed to open a [`Transport`]. Construct with
/// [`ConnectionParams::serial`] or [`ConnectionParams::tcp`] and adjust
/// fields with the `with_*` builder methods; the rest default to the values
/// a GRBL-family controller expects.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionParams {
    /// Serial device path or TCP host.
    pub address: String,
    /// Which driver opens `address`.
    pub driver: ConnectionDriver,
    /// TCP port; ignored for serial.
    pub tcp_port: u16,
    /// Serial baud rate; ignored for TCP.
    pub baud_rate: u32,
    /// Serial data bits (5-8); ignored for TCP.
    pub data_bits: u8,
    /// Serial stop bits (1-2); ignored for TCP.
    pub stop_bits: u8,
    /// Serial parity; ignored for TCP.
    pub parity: SerialParity,
    /// Serial hardware flow control; ignored for TCP.
    pub flow_control: bool,
    /// Per-read/write timeout.
    pub timeout: Duration,
}

impl ConnectionParams {
    /// A serial connection at the given device path and baud rate, with
    /// GRBL-typical defaults (8N1, no flow control, 10ms read timeout).
    pub fn serial(port: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            address: port.into(),
            driver: ConnectionDriver::Serial,
            tcp_port: 0,
            baud_rate,
            data_bits: 8,
            stop_bits: 1,
            parity: SerialParity::None,
            flow_control: false,
            timeout: Duration::from_millis(10),
        }
    }

    /// A TCP connection to `host:port`.
    pub fn tcp(host: impl Into<String>, port: u16) -> Self {
        Self {
            address: host.into(),
            driver: ConnectionDriver::Tcp,
            tcp_port: port,
            baud_rate: 115_200,
            data_bits: 8,
            stop_bits: 1,
            parity: SerialParity::None,
            flow_control: false,
            timeout: Duration::from_millis(10),
        }
    }

    /// Override the per-operation timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Override serial flow control.
    pub fn with_flow_control(mut self, enabled: bool) -> Self {
        self.flow_control = enabled;
        self
    }
}

/// A blocking byte-stream connection to a machine controller. Implementors
/// use short read timeouts (`ConnectionParams::timeout`, 10ms by default) so
/// callers can poll without dedicating a thread per connection forever; the
/// session controller bridges this into async via `spawn_blocking`.
pub trait Transport: Send + std::any::Any {
    /// Open the underlying device or socket.
    fn open(&mut self) -> Result<()>;

    /// Close the connection. Idempotent.
    fn close(&mut self) -> Result<()>;

    /// Write the entire buffer, blocking until it is all accepted or an
    /// error/timeout occurs.
    fn write_all(&mut self, buf: &[u8]) -> Result<()>;

    /// Read whatever is available within the configured timeout, returning
    /// `0` on a timeout with no data rather than treating it as an error.
    fn read_available(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// Change the per-operation timeout after the connection is open.
    fn set_timeout(&mut self, timeout: Duration) -> Result<()>;

    /// Whether the transport believes it is currently open.
    fn is_open(&self) -> bool;
}

pub(crate) fn invalid_address(address: &str, reason: impl Into<String>) -> Error {
    cncbridge_core::TransportError::InvalidAddress {
        address: address.to_string(),
        reason: reason.into(),
    }
    .into()
}
