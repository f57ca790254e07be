//! # cncbridge-link
//!
//! Transport, UDP discovery, file transfer, and session control for a CNC
//! machine connection. Pairs with `cncbridge-core`, which owns G-code
//! parsing, kinematics, and machine state with no knowledge of how a
//! machine is actually connected.

pub mod discovery;
pub mod event;
pub mod filetransfer;
pub mod session;
pub mod transport;

pub use discovery::{discover, DiscoveryConfig, MachineInfo};
pub use event::{ControllerEvent, EventDispatcher};
pub use filetransfer::{
    receive_file, resume_send, send_file, FileTransferConfig, ReceivedFile, TransferProgress,
};
pub use session::{reply::ReplyLine, LinkState, SessionController};
pub use transport::{
    list_ports, ConnectionDriver, ConnectionParams, MockTransport, SerialParity, SerialPortInfo,
    SerialTransport, TcpTransport, Transport,
};
