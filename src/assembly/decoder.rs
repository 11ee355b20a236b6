//! CIL instruction decoding.
//!
//! This module turns raw method body bytes into [`crate::assembly::instruction::Instruction`]s.
//! Decoding is linear: one opcode byte is read, the `0xFE` escape selects the two-byte table,
//! and the operand is read according to the opcode's [`crate::assembly::OperandKind`].
//!
//! # Key Components
//!
//! - [`crate::assembly::decoder::decode_instruction`] - Core single instruction decoder
//! - [`crate::assembly::decoder::InstructionStream`] - Lazy, restartable instruction iterator
//! - [`crate::assembly::decoder::decode_stream`] - Collects a whole body plus diagnostics
//! - [`crate::assembly::decoder::DecodeMode`] - Strict or permissive handling of bad bytes
//!
//! # Usage Examples
//!
//! ```rust
//! use cilgraph::{Parser, assembly::{decode_instruction, decode_stream, DecodeMode}};
//!
//! // Decode a single instruction
//! let code = [0x2A]; // ret
//! let mut parser = Parser::new(&code);
//! let instr = decode_instruction(&mut parser)?;
//! assert_eq!(instr.mnemonic(), "ret");
//!
//! // Decode a linear instruction stream
//! let code = [0x00, 0x2A]; // nop, ret
//! let body = decode_stream(&code, DecodeMode::Strict)?;
//! assert_eq!(body.instructions.len(), 2);
//! # Ok::<(), cilgraph::Error>(())
//! ```

use std::iter::FusedIterator;

use crate::{
    assembly::{
        instruction::Instruction,
        instructions::{lookup, lookup_extended, FE_PREFIX},
        operand::read_operand,
    },
    file::parser::Parser,
    DecodeError, Result,
};

/// How the decoder reacts to bytes that do not name an opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DecodeMode {
    /// Report the unknown byte and resume decoding at the following byte
    #[default]
    Permissive,
    /// Stop decoding the body at the first error
    Strict,
}

/// Decodes a single CIL instruction from the current parser position.
///
/// On success the parser is positioned at the next instruction. On failure the parser is
/// left at the start of the offending instruction, so the caller decides whether to skip
/// a byte or give up.
///
/// # Errors
///
/// - [`DecodeError::UnknownOpcode`] if the byte (or the byte after `0xFE`) is unassigned
/// - [`DecodeError::TruncatedStream`] if `0xFE` is the last byte, or the operand runs past the end
///
/// # Examples
///
/// ```rust
/// use cilgraph::{assembly::{decode_instruction, Operand}, Parser};
///
/// // ldstr followed by a user string token
/// let bytecode = [0x72, 0x01, 0x00, 0x00, 0x70];
/// let mut parser = Parser::new(&bytecode);
///
/// let instruction = decode_instruction(&mut parser)?;
/// assert_eq!(instruction.mnemonic(), "ldstr");
/// assert_eq!(instruction.size, 5);
/// if let Operand::Token(token) = &instruction.operand {
///     assert_eq!(token.value(), 0x70000001);
/// }
/// # Ok::<(), cilgraph::DecodeError>(())
/// ```
pub fn decode_instruction(parser: &mut Parser) -> std::result::Result<Instruction, DecodeError> {
    let offset = parser.pos();
    let result = decode_at(parser, offset);
    if result.is_err() {
        // seeking back to a position we already held cannot fail
        let _ = parser.seek(offset);
    }
    result
}

fn decode_at(parser: &mut Parser, offset: usize) -> std::result::Result<Instruction, DecodeError> {
    let first_byte = parser
        .read_le::<u8>()
        .map_err(|_| DecodeError::TruncatedStream { offset })?;

    let descriptor = if first_byte == FE_PREFIX {
        let second_byte = parser
            .read_le::<u8>()
            .map_err(|_| DecodeError::TruncatedStream { offset })?;

        lookup_extended(second_byte).ok_or(DecodeError::UnknownOpcode {
            offset,
            byte: second_byte,
            extended: true,
        })?
    } else {
        lookup(first_byte).ok_or(DecodeError::UnknownOpcode {
            offset,
            byte: first_byte,
            extended: false,
        })?
    };

    let operand = read_operand(parser, descriptor.operand_kind, offset)?;

    Ok(Instruction {
        offset,
        size: parser.pos() - offset,
        opcode: descriptor,
        operand,
    })
}

/// A lazy, forward-only sequence of decoded instructions over one method body.
///
/// The stream is finite and yields instructions in ascending offset order. Cloning it, or
/// calling [`InstructionStream::restart`], starts over from the first byte without
/// re-reading anything eagerly.
///
/// Errors are yielded in-line. In [`DecodeMode::Permissive`] an unknown opcode is yielded as
/// an error and decoding resumes at the next byte. In [`DecodeMode::Strict`] the first error
/// ends the stream. A truncated instruction always ends the stream.
///
/// # Examples
///
/// ```rust
/// use cilgraph::assembly::{InstructionStream, DecodeMode};
///
/// // nop, <unknown 0x24>, ret
/// let code = [0x00, 0x24, 0x2A];
///
/// let permissive: Vec<_> = InstructionStream::new(&code, DecodeMode::Permissive).collect();
/// assert_eq!(permissive.len(), 3);
/// assert!(permissive[1].is_err());
///
/// let strict: Vec<_> = InstructionStream::new(&code, DecodeMode::Strict).collect();
/// assert_eq!(strict.len(), 2);
/// ```
#[derive(Clone)]
pub struct InstructionStream<'a> {
    parser: Parser<'a>,
    mode: DecodeMode,
    finished: bool,
}

impl<'a> InstructionStream<'a> {
    /// Creates a stream positioned at the first byte of `data`.
    #[must_use]
    pub fn new(data: &'a [u8], mode: DecodeMode) -> Self {
        InstructionStream {
            parser: Parser::new(data),
            mode,
            finished: false,
        }
    }

    /// Rewinds the stream to the first byte.
    pub fn restart(&mut self) {
        self.parser = Parser::new(self.parser.data());
        self.finished = false;
    }

    /// The decode mode this stream was created with.
    #[must_use]
    pub fn mode(&self) -> DecodeMode {
        self.mode
    }

    /// Length of the underlying method body in bytes.
    #[must_use]
    pub fn body_len(&self) -> usize {
        self.parser.len()
    }
}

impl Iterator for InstructionStream<'_> {
    type Item = std::result::Result<Instruction, DecodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished || !self.parser.has_more_data() {
            self.finished = true;
            return None;
        }

        match decode_instruction(&mut self.parser) {
            Ok(instruction) => Some(Ok(instruction)),
            Err(error) => {
                match (&error, self.mode) {
                    (DecodeError::UnknownOpcode { offset, .. }, DecodeMode::Permissive) => {
                        if self.parser.seek(offset + 1).is_err() {
                            self.finished = true;
                        }
                    }
                    _ => self.finished = true,
                }
                Some(Err(error))
            }
        }
    }
}

impl FusedIterator for InstructionStream<'_> {}

/// All instructions of a method body, in offset order, plus recoverable decode failures.
#[derive(Debug, Clone, Default)]
pub struct DecodedBody {
    /// Successfully decoded instructions
    pub instructions: Vec<Instruction>,
    /// Failures that were skipped over (permissive mode) or ended decoding
    pub diagnostics: Vec<DecodeError>,
    /// Length of the decoded buffer in bytes
    pub body_len: usize,
}

impl DecodedBody {
    /// Returns `true` if every byte of the body was decoded without error.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.diagnostics.is_empty()
    }

    /// Index of the instruction starting at `offset`.
    #[must_use]
    pub fn index_of(&self, offset: usize) -> Option<usize> {
        self.instructions
            .binary_search_by_key(&offset, |instruction| instruction.offset)
            .ok()
    }

    /// The instruction starting at `offset`, if any.
    #[must_use]
    pub fn instruction_at(&self, offset: usize) -> Option<&Instruction> {
        self.index_of(offset).map(|index| &self.instructions[index])
    }
}

/// Decodes a whole method body.
///
/// In [`DecodeMode::Permissive`] decode failures are collected into
/// [`DecodedBody::diagnostics`] and the instructions decoded around them are kept.
///
/// # Errors
///
/// In [`DecodeMode::Strict`] the first [`DecodeError`] is returned as [`crate::Error::Decode`].
///
/// # Examples
///
/// ```rust
/// use cilgraph::assembly::{decode_stream, DecodeMode};
///
/// // ldc.i4.1, brtrue.s +0, ret
/// let body = decode_stream(&[0x17, 0x2D, 0x00, 0x2A], DecodeMode::Strict)?;
/// let offsets: Vec<usize> = body.instructions.iter().map(|i| i.offset).collect();
/// assert_eq!(offsets, vec![0, 1, 3]);
/// # Ok::<(), cilgraph::Error>(())
/// ```
pub fn decode_stream(data: &[u8], mode: DecodeMode) -> Result<DecodedBody> {
    let mut body = DecodedBody {
        body_len: data.len(),
        ..DecodedBody::default()
    };

    for item in InstructionStream::new(data, mode) {
        match item {
            Ok(instruction) => body.instructions.push(instruction),
            Err(error) if mode == DecodeMode::Strict => return Err(error.into()),
            Err(error) => body.diagnostics.push(error),
        }
    }

    Ok(body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        assembly::{FlowType, Immediate, Operand},
        metadata::token::Token,
        Error,
    };

    #[test]
    fn decode_instruction_basic() {
        let mut parser = Parser::new(&[0x06]);
        let instruction = decode_instruction(&mut parser).unwrap();

        assert_eq!(instruction.mnemonic(), "ldloc.0");
        assert_eq!(instruction.offset, 0);
        assert_eq!(instruction.size, 1);
        assert_eq!(instruction.operand, Operand::None);
    }

    #[test]
    fn decode_instruction_two_byte() {
        // ceq (0xFE, 0x01)
        let mut parser = Parser::new(&[0xFE, 0x01]);
        let instruction = decode_instruction(&mut parser).unwrap();

        assert_eq!(instruction.mnemonic(), "ceq");
        assert_eq!(instruction.size, 2);
        assert!(instruction.opcode.is_two_byte_form());
    }

    #[test]
    fn decode_instruction_long_variable() {
        // ldarg 0xFFFF
        let mut parser = Parser::new(&[0xFE, 0x09, 0xFF, 0xFF]);
        let instruction = decode_instruction(&mut parser).unwrap();

        assert_eq!(instruction.mnemonic(), "ldarg");
        assert_eq!(instruction.operand, Operand::Variable(0xFFFF));
        assert_eq!(instruction.operand_size(), 2);
    }

    #[test]
    fn decode_instruction_immediates() {
        let mut parser = Parser::new(&[0x1F, 0xF6]);
        let instruction = decode_instruction(&mut parser).unwrap();
        assert_eq!(instruction.operand, Operand::Immediate(Immediate::Int8(-10)));

        let mut parser = Parser::new(&[0x21, 0x01, 0, 0, 0, 0, 0, 0, 0x80]);
        let instruction = decode_instruction(&mut parser).unwrap();
        assert_eq!(
            instruction.operand,
            Operand::Immediate(Immediate::Int64(i64::MIN + 1))
        );
        assert_eq!(instruction.size, 9);
    }

    #[test]
    fn decode_instruction_token() {
        // call 0x0A000012
        let mut parser = Parser::new(&[0x28, 0x12, 0x00, 0x00, 0x0A]);
        let instruction = decode_instruction(&mut parser).unwrap();

        assert_eq!(instruction.flow_type(), FlowType::Call);
        assert_eq!(instruction.token(), Some(Token::new(0x0A00_0012)));
    }

    #[test]
    fn escape_at_end_is_truncated() {
        let mut parser = Parser::new(&[0x00, 0xFE]);
        parser.seek(1).unwrap();

        let result = decode_instruction(&mut parser);
        assert_eq!(result, Err(DecodeError::TruncatedStream { offset: 1 }));
        assert_eq!(parser.pos(), 1);
    }

    #[test]
    fn unknown_extended_opcode() {
        let mut parser = Parser::new(&[0xFE, 0xFF]);
        assert_eq!(
            decode_instruction(&mut parser),
            Err(DecodeError::UnknownOpcode {
                offset: 0,
                byte: 0xFF,
                extended: true
            })
        );
    }

    #[test]
    fn truncated_operand() {
        // ldc.i4 with only 2 operand bytes
        let result = decode_stream(&[0x00, 0x20, 0x01, 0x02], DecodeMode::Permissive).unwrap();
        assert_eq!(result.instructions.len(), 1);
        assert_eq!(
            result.diagnostics,
            vec![DecodeError::TruncatedStream { offset: 1 }]
        );

        let strict = decode_stream(&[0x00, 0x20, 0x01, 0x02], DecodeMode::Strict);
        assert!(matches!(
            strict,
            Err(Error::Decode(DecodeError::TruncatedStream { offset: 1 }))
        ));
    }

    #[test]
    fn permissive_resumes_after_unknown() {
        // nop, 0xA6 (unassigned), 0xA7 (unassigned), ret
        let body = decode_stream(&[0x00, 0xA6, 0xA7, 0x2A], DecodeMode::Permissive).unwrap();

        assert_eq!(body.instructions.len(), 2);
        assert_eq!(body.instructions[1].offset, 3);
        assert_eq!(body.diagnostics.len(), 2);
        assert!(!body.is_complete());
    }

    #[test]
    fn stream_restarts() {
        let code = [0x00, 0x00, 0x2A];
        let mut stream = InstructionStream::new(&code, DecodeMode::Strict);

        assert_eq!(stream.by_ref().count(), 3);
        assert!(stream.next().is_none());

        stream.restart();
        let first = stream.next().unwrap().unwrap();
        assert_eq!(first.offset, 0);

        let copy = stream.clone();
        assert_eq!(copy.count(), 2);
        assert_eq!(stream.body_len(), 3);
    }

    #[test]
    fn decode_stream_empty() {
        let body = decode_stream(&[], DecodeMode::Strict).unwrap();
        assert!(body.instructions.is_empty());
        assert!(body.is_complete());
    }

    #[test]
    fn instruction_lookup_by_offset() {
        // ldc.i4 5, pop, ret
        let body = decode_stream(&[0x20, 0x05, 0, 0, 0, 0x26, 0x2A], DecodeMode::Strict).unwrap();

        assert_eq!(body.index_of(5), Some(1));
        assert_eq!(body.instruction_at(6).unwrap().mnemonic(), "ret");
        assert!(body.instruction_at(2).is_none());
    }
}
