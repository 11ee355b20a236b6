//! CIL instruction decoding and encoding.
//!
//! This module covers everything between raw method body bytes and typed instructions:
//!
//! - [`instructions`] - The static single-byte and `0xFE` opcode tables
//! - [`instruction`] - Descriptors, operand kinds, operands and decoded instructions
//! - [`operand`] - Reads the inline operand following an opcode
//! - [`decoder`] - Single-instruction decoding, lazy streams and whole-body decoding
//! - [`branch`] - Resolves branch and switch displacements to absolute offsets
//! - [`encoder`] - Writes instructions back to bytes
//!
//! # Examples
//!
//! ```rust
//! use cilgraph::assembly::{decode_stream, resolve_targets, DecodeMode, FlowType};
//!
//! // ldarg.0, brtrue.s +1, nop, ret
//! let code = [0x02, 0x2D, 0x01, 0x00, 0x2A];
//! let body = decode_stream(&code, DecodeMode::Strict)?;
//!
//! let branch = &body.instructions[1];
//! assert_eq!(branch.flow_type(), FlowType::ConditionalBranch);
//! assert_eq!(resolve_targets(branch, code.len())?, vec![4]);
//! # Ok::<(), cilgraph::Error>(())
//! ```

pub mod branch;
pub mod decoder;
pub mod encoder;
pub mod instruction;
pub mod instructions;
pub mod operand;

pub use branch::{resolve_target, resolve_targets};
pub use decoder::{decode_instruction, decode_stream, DecodeMode, DecodedBody, InstructionStream};
pub use encoder::{encode_instruction, encode_stream};
pub use instruction::{
    BranchOffset, BranchPredicate, FlowType, Immediate, Instruction, OpcodeDescriptor, Operand,
    OperandKind,
};
pub use instructions::{
    find_by_name, lookup, lookup_extended, FE_PREFIX, INSTRUCTIONS, INSTRUCTIONS_FE,
};
pub use operand::read_operand;
