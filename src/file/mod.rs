//! Byte-level access to CIL method bodies.
//!
//! # Key Components
//!
//! - [`crate::file::parser::Parser`] - Bounds-checked cursor used by the instruction decoder
//! - [`crate::file::io`] - Little-endian primitive reading and writing

pub mod io;
pub mod parser;
