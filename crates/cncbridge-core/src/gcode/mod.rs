//! G-code parsing and kinematic interpretation (component D): tokenising,
//! modal-group validation, coordinate resolution through the active work
//! offset and tool length compensation, arc and canned-cycle expansion, and
//! folding the result into [`crate::state::CncState`].

pub mod arc;
pub mod canned;
pub mod modal;
pub mod parser;
pub mod token;

pub use parser::{GcodeParser, ParsedLine};
pub use token::Word;
