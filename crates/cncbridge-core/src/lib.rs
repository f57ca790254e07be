//! # cncbridge-core
//!
//! G-code parsing, kinematic interpretation, and CNC machine state, with no
//! knowledge of how a machine is actually connected. Pair this crate with
//! `cncbridge-link` for the transport, discovery, file-transfer, and session
//! layers that turn a parsed program into commands on the wire.

pub mod data;
pub mod error;
pub mod gcode;
pub mod state;
pub mod util;

pub use data::{
    BoundingBox, CNCPoint, Position, ToolOffset, ToolTable, Units, WcsEntry, WcsSlot, WcsTable,
};
pub use error::{
    CommandError, DiscoveryError, Error, FileTransferError, GCodeParseError, Result, StateError,
    TransportError,
};
pub use gcode::{GcodeParser, ParsedLine, Word};
pub use state::{CncState, DistanceMode, ModalDelta, MotionMode, PathPoint, Plane};
