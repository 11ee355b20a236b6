pub mod callgraph;
pub mod common;
pub mod disasm;
