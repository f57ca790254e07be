//! File-transfer engine (component C): a custom XMODEM-1K variant used to
//! push/pull G-code files to the controller's local storage (SD card or
//! flash-backed filesystem).
//!
//! Wire format, block N (N >= 1):
//! ```text
//! [STX][seq][~seq][1024 bytes of payload][crc_hi][crc_lo]
//! ```
//! Block 0 is a header block carrying the filename and uncompressed size as
//! `"<name>\0<size>\0"`, zero-padded to 1024 bytes. The payload is optionally
//! LZ4-compressed (files named with a `.lz` suffix); after the last data
//! block and its `EOT`/`ACK`, one more block carries a 32-character lowercase
//! hex MD5 digest of the payload as sent (compressed or not), padded with
//! `SUB` (`0x1A`), followed by a second `EOT`/`ACK`.

mod xmodem;

pub use xmodem::{
    receive_file, resume_send, send_file, FileTransferConfig, ReceivedFile, TransferProgress,
};
