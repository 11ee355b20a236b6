//! Operand reader.
//!
//! Reads the inline operand that follows an opcode, according to its [`OperandKind`]. Branch
//! displacements are turned into [`BranchOffset`]s here, since the absolute target depends only
//! on where the operand ends.

use crate::{
    assembly::instruction::{BranchOffset, Immediate, Operand, OperandKind},
    file::parser::Parser,
    metadata::token::Token,
    DecodeError,
};

/// Reads the operand of kind `kind` at the parser's current position.
///
/// `instruction_offset` is the offset of the opcode the operand belongs to and is only used
/// for error reporting. On success the parser is positioned at the next instruction.
///
/// Branch targets are computed relative to the end of the operand. For switch tables every
/// entry is relative to the end of the whole table, not to the end of the entry.
///
/// # Errors
///
/// Returns [`DecodeError::TruncatedStream`] if the operand extends past the end of the buffer.
/// A switch whose declared count cannot fit in the remaining bytes is rejected before any
/// entries are read.
pub fn read_operand(
    parser: &mut Parser,
    kind: OperandKind,
    instruction_offset: usize,
) -> Result<Operand, DecodeError> {
    let truncated = |_| DecodeError::TruncatedStream {
        offset: instruction_offset,
    };

    let operand = match kind {
        OperandKind::None => Operand::None,
        OperandKind::Int8 => {
            Operand::Immediate(Immediate::Int8(parser.read_le::<i8>().map_err(truncated)?))
        }
        OperandKind::Int16 => {
            Operand::Immediate(Immediate::Int16(parser.read_le::<i16>().map_err(truncated)?))
        }
        OperandKind::Int32 => {
            Operand::Immediate(Immediate::Int32(parser.read_le::<i32>().map_err(truncated)?))
        }
        OperandKind::Int64 => {
            Operand::Immediate(Immediate::Int64(parser.read_le::<i64>().map_err(truncated)?))
        }
        OperandKind::Float32 => {
            Operand::Immediate(Immediate::Float32(parser.read_le::<f32>().map_err(truncated)?))
        }
        OperandKind::Float64 => {
            Operand::Immediate(Immediate::Float64(parser.read_le::<f64>().map_err(truncated)?))
        }
        OperandKind::VariableIndexShort => {
            Operand::Variable(u16::from(parser.read_le::<u8>().map_err(truncated)?))
        }
        OperandKind::VariableIndexLong => {
            Operand::Variable(parser.read_le::<u16>().map_err(truncated)?)
        }
        OperandKind::ShortBranchTarget => {
            let relative = i32::from(parser.read_le::<i8>().map_err(truncated)?);
            Operand::Target(branch_offset(parser.pos(), relative))
        }
        OperandKind::LongBranchTarget => {
            let relative = parser.read_le::<i32>().map_err(truncated)?;
            Operand::Target(branch_offset(parser.pos(), relative))
        }
        OperandKind::SwitchTable => {
            let count = parser.read_le::<u32>().map_err(truncated)? as usize;
            let table_len = count.checked_mul(4).ok_or(DecodeError::TruncatedStream {
                offset: instruction_offset,
            })?;
            if table_len > parser.remaining() {
                return Err(DecodeError::TruncatedStream {
                    offset: instruction_offset,
                });
            }

            let end = parser.pos() + table_len;
            let mut targets = Vec::with_capacity(count);
            for _ in 0..count {
                let relative = parser.read_le::<i32>().map_err(truncated)?;
                targets.push(branch_offset(end, relative));
            }

            Operand::Switch(targets)
        }
        OperandKind::MethodToken
        | OperandKind::FieldToken
        | OperandKind::TypeToken
        | OperandKind::StringToken
        | OperandKind::SignatureToken => {
            Operand::Token(Token::new(parser.read_le::<u32>().map_err(truncated)?))
        }
    };

    Ok(operand)
}

fn branch_offset(base: usize, relative: i32) -> BranchOffset {
    BranchOffset {
        relative,
        target: base as i64 + i64::from(relative),
    }
}
