//! Instruction encoding.
//!
//! Re-emits decoded instructions as CIL bytes. Branch operands are written from their stored
//! relative displacement, so a decode followed by an encode reproduces the input exactly.

use crate::{
    assembly::{
        instruction::{BranchOffset, Immediate, Instruction, Operand, OperandKind},
        instructions::FE_PREFIX,
    },
    file::io::write_le,
    Result,
};

/// Appends the encoding of `instruction` to `buffer`.
///
/// # Errors
///
/// Returns [`crate::Error::Malformed`] if the operand does not fit the opcode's operand kind,
/// for example an immediate of the wrong width or a short branch displacement outside `i8`.
pub fn encode_instruction(instruction: &Instruction, buffer: &mut Vec<u8>) -> Result<()> {
    let descriptor = instruction.opcode;
    if descriptor.is_two_byte_form() {
        buffer.push(FE_PREFIX);
    }
    buffer.push((descriptor.value & 0xFF) as u8);

    match (descriptor.operand_kind, &instruction.operand) {
        (OperandKind::None, Operand::None) => {}
        (OperandKind::Int8, Operand::Immediate(Immediate::Int8(value))) => write_le(buffer, *value),
        (OperandKind::Int16, Operand::Immediate(Immediate::Int16(value))) => {
            write_le(buffer, *value);
        }
        (OperandKind::Int32, Operand::Immediate(Immediate::Int32(value))) => {
            write_le(buffer, *value);
        }
        (OperandKind::Int64, Operand::Immediate(Immediate::Int64(value))) => {
            write_le(buffer, *value);
        }
        (OperandKind::Float32, Operand::Immediate(Immediate::Float32(value))) => {
            write_le(buffer, *value);
        }
        (OperandKind::Float64, Operand::Immediate(Immediate::Float64(value))) => {
            write_le(buffer, *value);
        }
        (OperandKind::VariableIndexShort, Operand::Variable(index)) => {
            let Ok(index) = u8::try_from(*index) else {
                return Err(malformed_error!(
                    "Variable index {} does not fit the short form of {}",
                    index,
                    descriptor.name
                ));
            };
            write_le(buffer, index);
        }
        (OperandKind::VariableIndexLong, Operand::Variable(index)) => write_le(buffer, *index),
        (OperandKind::ShortBranchTarget, Operand::Target(BranchOffset { relative, .. })) => {
            let Ok(relative) = i8::try_from(*relative) else {
                return Err(malformed_error!(
                    "Displacement {} does not fit the short form of {}",
                    relative,
                    descriptor.name
                ));
            };
            write_le(buffer, relative);
        }
        (OperandKind::LongBranchTarget, Operand::Target(BranchOffset { relative, .. })) => {
            write_le(buffer, *relative);
        }
        (OperandKind::SwitchTable, Operand::Switch(entries)) => {
            let Ok(count) = u32::try_from(entries.len()) else {
                return Err(malformed_error!("Switch table with {} entries", entries.len()));
            };
            write_le(buffer, count);
            for entry in entries {
                write_le(buffer, entry.relative);
            }
        }
        (kind, Operand::Token(token)) if kind.is_token() => write_le(buffer, token.value()),
        (kind, operand) => {
            return Err(malformed_error!(
                "Operand {:?} does not match operand kind {:?} of {}",
                operand,
                kind,
                descriptor.name
            ));
        }
    }

    Ok(())
}

/// Encodes a sequence of instructions back into a method body.
///
/// # Errors
///
/// Returns the first error reported by [`encode_instruction`].
///
/// # Examples
///
/// ```rust
/// use cilgraph::assembly::{decode_stream, encode_stream, DecodeMode};
///
/// let code = [0x16, 0x2C, 0x01, 0x00, 0x2A]; // ldc.i4.0, brfalse.s +1, nop, ret
/// let body = decode_stream(&code, DecodeMode::Strict)?;
/// assert_eq!(encode_stream(&body.instructions)?, code);
/// # Ok::<(), cilgraph::Error>(())
/// ```
pub fn encode_stream(instructions: &[Instruction]) -> Result<Vec<u8>> {
    let capacity = instructions.iter().map(|instruction| instruction.size).sum();
    let mut buffer = Vec::with_capacity(capacity);
    for instruction in instructions {
        encode_instruction(instruction, &mut buffer)?;
    }
    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        assembly::{decode_stream, find_by_name, DecodeMode},
        Error,
    };

    #[test]
    fn reencode_mixed_body() {
        let code = [
            0xFE, 0x0C, 0x01, 0x00, // ldloc 1
            0x22, 0x00, 0x00, 0xC0, 0x3F, // ldc.r4 1.5
            0x45, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, // switch (1) { +0 }
            0x73, 0x01, 0x00, 0x00, 0x06, // newobj 0x06000001
            0x2A, // ret
        ];
        let body = decode_stream(&code, DecodeMode::Strict).unwrap();
        assert_eq!(encode_stream(&body.instructions).unwrap(), code);
    }

    #[test]
    fn short_branch_overflow_is_rejected() {
        let instruction = Instruction {
            offset: 0,
            size: 2,
            opcode: find_by_name("br.s").unwrap(),
            operand: Operand::Target(BranchOffset {
                relative: 200,
                target: 202,
            }),
        };
        let mut buffer = Vec::new();
        assert!(matches!(
            encode_instruction(&instruction, &mut buffer),
            Err(Error::Malformed { .. })
        ));
    }

    #[test]
    fn mismatched_operand_is_rejected() {
        let instruction = Instruction {
            offset: 0,
            size: 5,
            opcode: find_by_name("ldc.i4").unwrap(),
            operand: Operand::Immediate(Immediate::Int8(1)),
        };
        let mut buffer = Vec::new();
        assert!(encode_instruction(&instruction, &mut buffer).is_err());
    }
}
