//! Session/connection control (component F): the state machine, reply
//! demultiplexing, and the high-level operations built on top of a
//! [`crate::transport::Transport`].

mod controller;
pub mod reply;

pub use controller::{LinkState, SessionController};
