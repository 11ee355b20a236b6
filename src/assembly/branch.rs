//! Branch target resolution.
//!
//! Turns the [`BranchOffset`]s computed by the operand reader into validated absolute
//! offsets. A target is valid if it lies in `[0, body_len)`; anything else is reported as
//! [`ResolutionError::TargetOutOfRange`] rather than clamped.

use crate::{
    assembly::instruction::{BranchOffset, Instruction, Operand},
    ResolutionError,
};

/// Validates a single branch offset against the method body length.
///
/// # Errors
///
/// Returns [`ResolutionError::TargetOutOfRange`] if the target is negative or not below `body_len`.
pub fn resolve_target(
    source_offset: usize,
    branch: BranchOffset,
    body_len: usize,
) -> Result<usize, ResolutionError> {
    match usize::try_from(branch.target) {
        Ok(target) if target < body_len => Ok(target),
        _ => Err(ResolutionError::TargetOutOfRange {
            source_offset,
            target: branch.target,
        }),
    }
}

/// Returns every absolute offset `instruction` can transfer control to by branching.
///
/// Non-branching instructions yield an empty list. Switch targets are returned in table
/// order, duplicates included. Fall-through is not part of the result.
///
/// # Errors
///
/// Returns [`ResolutionError::TargetOutOfRange`] for the first target outside the body.
///
/// # Examples
///
/// ```rust
/// use cilgraph::{assembly::{resolve_targets, decode_instruction}, Parser};
///
/// // br.s -2 at offset 0: jumps to itself
/// let code = [0x2B, 0xFE];
/// let instruction = decode_instruction(&mut Parser::new(&code))?;
/// assert_eq!(resolve_targets(&instruction, code.len())?, vec![0]);
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub fn resolve_targets(
    instruction: &Instruction,
    body_len: usize,
) -> Result<Vec<usize>, ResolutionError> {
    match &instruction.operand {
        Operand::Target(branch) => Ok(vec![resolve_target(
            instruction.offset,
            *branch,
            body_len,
        )?]),
        Operand::Switch(entries) => entries
            .iter()
            .map(|entry| resolve_target(instruction.offset, *entry, body_len))
            .collect(),
        _ => Ok(Vec::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{assembly::decode_instruction, Parser};

    fn decode(code: &[u8], at: usize) -> Instruction {
        let mut parser = Parser::new(code);
        parser.seek(at).unwrap();
        decode_instruction(&mut parser).unwrap()
    }

    #[test]
    fn short_branch_zero_falls_through() {
        let code = [0x00, 0x00, 0x2B, 0x00, 0x2A];
        let instruction = decode(&code, 2);
        assert_eq!(resolve_targets(&instruction, code.len()).unwrap(), vec![4]);
    }

    #[test]
    fn long_branch_backward() {
        // nop, br -6 (back to offset 0)
        let code = [0x00, 0x38, 0xFA, 0xFF, 0xFF, 0xFF];
        let instruction = decode(&code, 1);
        assert_eq!(resolve_targets(&instruction, code.len()).unwrap(), vec![0]);
    }

    #[test]
    fn target_before_start() {
        let code = [0x2B, 0xF0];
        let instruction = decode(&code, 0);
        assert_eq!(
            resolve_targets(&instruction, code.len()),
            Err(ResolutionError::TargetOutOfRange {
                source_offset: 0,
                target: -14
            })
        );
    }

    #[test]
    fn target_at_body_end_is_out_of_range() {
        // br.s +1 lands one past the final byte
        let code = [0x2B, 0x01, 0x2A];
        let instruction = decode(&code, 0);
        assert!(resolve_targets(&instruction, code.len()).is_err());
    }

    #[test]
    fn extreme_long_displacement() {
        let code = [0x38, 0xFF, 0xFF, 0xFF, 0x7F];
        let instruction = decode(&code, 0);
        assert_eq!(
            resolve_targets(&instruction, code.len()),
            Err(ResolutionError::TargetOutOfRange {
                source_offset: 0,
                target: 5 + i64::from(i32::MAX)
            })
        );
    }

    #[test]
    fn switch_targets_in_table_order() {
        // switch (2) { +1, +0 }, nop, ret
        let code = [
            0x45, 0x02, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
            0x2A,
        ];
        let instruction = decode(&code, 0);
        assert_eq!(
            resolve_targets(&instruction, code.len()).unwrap(),
            vec![14, 13]
        );
    }

    #[test]
    fn non_branch_has_no_targets() {
        let instruction = decode(&[0x2A], 0);
        assert!(resolve_targets(&instruction, 1).unwrap().is_empty());
    }
}
