//! Control-flow classification of decoded instructions.
//!
//! Every instruction gets its outgoing [`ControlFlowEdge`]s, and every branching instruction
//! gets a [`BranchClass`]:
//!
//! - a branch to an earlier (or its own) offset is a [`BranchClass::Loop`]
//! - a branch to a later offset is a [`BranchClass::Conditional`], tagged with the condition
//!   the opcode tests, or [`BranchCondition::Always`] for unconditional jumps
//! - a `switch` is a [`BranchClass::Switch`], whatever the direction of its entries
//!
//! The loop rule looks at offsets only. It is an approximation, not a dominator-based loop
//! analysis.

use crate::{
    analysis::cfg::edge::{ControlFlowEdge, EdgeKind},
    assembly::{resolve_targets, BranchPredicate, DecodedBody, FlowType, Instruction},
    ResolutionError,
};

/// What has to hold for a branch to be taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BranchCondition {
    /// Unconditional jump or `leave`
    Always,
    /// Conditional branch
    When {
        /// What the opcode tests
        predicate: BranchPredicate,
        /// `true` for the `.un` variants
        unsigned: bool,
    },
}

impl BranchCondition {
    fn of(instruction: &Instruction) -> Self {
        match instruction.opcode.predicate {
            Some(predicate) => BranchCondition::When {
                predicate,
                unsigned: instruction.opcode.unsigned,
            },
            None => BranchCondition::Always,
        }
    }

    fn edge_kind(self) -> EdgeKind {
        match self {
            BranchCondition::Always => EdgeKind::Unconditional,
            BranchCondition::When {
                predicate,
                unsigned,
            } => EdgeKind::Conditional {
                predicate,
                unsigned,
            },
        }
    }
}

/// Structural classification of a branching instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BranchClass {
    /// Branch to an earlier offset, or to itself
    Loop {
        /// Branch target
        target: usize,
        /// Condition tested by the opcode
        condition: BranchCondition,
    },
    /// Branch to a later offset
    Conditional {
        /// Branch target
        target: usize,
        /// Condition tested by the opcode
        condition: BranchCondition,
    },
    /// Multi-way dispatch
    Switch {
        /// Targets in table order
        targets: Vec<usize>,
    },
}

/// A branching instruction and its classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifiedBranch {
    /// Offset of the branching instruction
    pub offset: usize,
    /// How it was classified
    pub class: BranchClass,
}

/// Result of classifying a whole body.
#[derive(Debug, Clone, Default)]
pub struct Classification {
    /// Outgoing edges of all instructions, in instruction order
    pub edges: Vec<ControlFlowEdge>,
    /// Branch classifications, in instruction order
    pub branches: Vec<ClassifiedBranch>,
    /// Branches whose targets could not be resolved
    pub errors: Vec<ResolutionError>,
}

/// Computes the outgoing edges of one instruction.
///
/// Branch edges come first (switch cases in table order), followed by the fall-through edge.
/// Unconditional jumps, `leave`, returns, throws and `endfinally` / `endfilter` have no
/// fall-through edge; neither does an instruction that ends exactly at `body_len`, except a
/// switch. A switch always carries its fall-through edge, which targets `body_len` (the method
/// exit) when the switch is the last instruction.
///
/// # Errors
///
/// Returns [`ResolutionError::TargetOutOfRange`] if any branch target lies outside the body.
///
/// # Examples
///
/// ```rust
/// use cilgraph::{Parser, assembly::decode_instruction};
/// use cilgraph::analysis::cfg::{instruction_edges, EdgeKind};
///
/// // brfalse.s +1, nop, ret
/// let code = [0x2C, 0x01, 0x00, 0x2A];
/// let instruction = decode_instruction(&mut Parser::new(&code))?;
/// let edges = instruction_edges(&instruction, code.len())?;
///
/// assert_eq!(edges.len(), 2);
/// assert_eq!(edges[0].target, 3);
/// assert!(edges[0].kind.is_conditional());
/// assert_eq!(edges[1].kind, EdgeKind::FallThrough);
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub fn instruction_edges(
    instruction: &Instruction,
    body_len: usize,
) -> Result<Vec<ControlFlowEdge>, ResolutionError> {
    let source = instruction.offset;
    let targets = resolve_targets(instruction, body_len)?;

    let mut edges: Vec<ControlFlowEdge> = match instruction.flow_type() {
        FlowType::Switch => targets
            .iter()
            .enumerate()
            .map(|(index, target)| {
                ControlFlowEdge::new(source, *target, EdgeKind::SwitchCase { index })
            })
            .collect(),
        _ => {
            let kind = BranchCondition::of(instruction).edge_kind();
            targets
                .iter()
                .map(|target| ControlFlowEdge::new(source, *target, kind))
                .collect()
        }
    };

    edges.extend(fall_through_edge(instruction, body_len));

    Ok(edges)
}

fn fall_through_edge(instruction: &Instruction, body_len: usize) -> Option<ControlFlowEdge> {
    let next = instruction.next_offset();
    let switch = instruction.flow_type() == FlowType::Switch;
    (instruction.has_fall_through() && (next < body_len || switch))
        .then(|| ControlFlowEdge::fall_through(instruction.offset, next))
}

/// Classifies one branching instruction. Returns `None` for instructions that do not branch.
///
/// # Errors
///
/// Returns [`ResolutionError::TargetOutOfRange`] if a target lies outside the body.
pub fn classify_branch(
    instruction: &Instruction,
    body_len: usize,
) -> Result<Option<BranchClass>, ResolutionError> {
    if !instruction.is_branch() {
        return Ok(None);
    }

    let targets = resolve_targets(instruction, body_len)?;
    if instruction.flow_type() == FlowType::Switch {
        return Ok(Some(BranchClass::Switch { targets }));
    }

    let Some(&target) = targets.first() else {
        return Ok(None);
    };
    let condition = BranchCondition::of(instruction);
    if target <= instruction.offset {
        Ok(Some(BranchClass::Loop { target, condition }))
    } else {
        Ok(Some(BranchClass::Conditional { target, condition }))
    }
}

/// Classifies every instruction of a decoded body.
///
/// Unresolvable branches are recorded in [`Classification::errors`]. Their fall-through edge
/// is kept when the opcode has one; the rest of the body is classified normally.
#[must_use]
pub fn classify(body: &DecodedBody) -> Classification {
    let mut classification = Classification::default();

    for instruction in &body.instructions {
        match instruction_edges(instruction, body.body_len) {
            Ok(edges) => classification.edges.extend(edges),
            Err(error) => {
                classification
                    .edges
                    .extend(fall_through_edge(instruction, body.body_len));
                classification.errors.push(error);
                continue;
            }
        }

        if let Ok(Some(class)) = classify_branch(instruction, body.body_len) {
            classification.branches.push(ClassifiedBranch {
                offset: instruction.offset,
                class,
            });
        }
    }

    classification
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembly::{decode_stream, DecodeMode};

    fn classify_bytes(code: &[u8]) -> Classification {
        classify(&decode_stream(code, DecodeMode::Strict).unwrap())
    }

    #[test]
    fn backward_branch_is_loop() {
        // nop, ldc.i4.1, brtrue.s -4 (to 0), ret
        let classification = classify_bytes(&[0x00, 0x17, 0x2D, 0xFC, 0x2A]);

        assert_eq!(
            classification.branches,
            vec![ClassifiedBranch {
                offset: 2,
                class: BranchClass::Loop {
                    target: 0,
                    condition: BranchCondition::When {
                        predicate: BranchPredicate::Truthy,
                        unsigned: false
                    }
                }
            }]
        );
    }

    #[test]
    fn forward_unconditional_branch() {
        // br.s +1, nop, ret
        let classification = classify_bytes(&[0x2B, 0x01, 0x00, 0x2A]);

        assert_eq!(
            classification.branches[0].class,
            BranchClass::Conditional {
                target: 3,
                condition: BranchCondition::Always
            }
        );
        let from_branch: Vec<_> = classification
            .edges
            .iter()
            .filter(|edge| edge.source == 0)
            .collect();
        assert_eq!(from_branch.len(), 1);
        assert_eq!(from_branch[0].kind, EdgeKind::Unconditional);
    }

    #[test]
    fn terminators_have_no_fall_through() {
        // ret, throw, ldnull, rethrow, nop
        let classification = classify_bytes(&[0x2A, 0x7A, 0x14, 0xFE, 0x1A, 0x00]);

        let sources: Vec<_> = classification.edges.iter().map(|edge| edge.source).collect();
        assert_eq!(sources, vec![2]);
    }

    #[test]
    fn trailing_switch_falls_through_to_exit() {
        // nop, switch (3) all to IL_0000
        let mut code = vec![0x00, 0x45, 0x03, 0x00, 0x00, 0x00];
        for _ in 0..3 {
            code.extend_from_slice(&(-18i32).to_le_bytes());
        }
        let classification = classify_bytes(&code);

        let kinds: Vec<_> = classification.edges.iter().map(|edge| edge.kind).collect();
        assert_eq!(
            kinds,
            vec![
                EdgeKind::SwitchCase { index: 0 },
                EdgeKind::SwitchCase { index: 1 },
                EdgeKind::SwitchCase { index: 2 },
                EdgeKind::FallThrough,
            ]
        );
        let exit = classification.edges.last().unwrap();
        assert_eq!(exit.target, code.len());
        assert!(classification.errors.is_empty());
    }

    #[test]
    fn leave_is_unconditional() {
        // leave.s +1, nop, endfinally
        let classification = classify_bytes(&[0xDE, 0x01, 0x00, 0xDC]);

        let leave_edges: Vec<_> = classification
            .edges
            .iter()
            .filter(|edge| edge.source == 0)
            .collect();
        assert_eq!(leave_edges.len(), 1);
        assert_eq!(leave_edges[0].kind, EdgeKind::Unconditional);
        assert_eq!(leave_edges[0].target, 3);
        assert!(classification.edges.iter().all(|edge| edge.source != 3));
    }

    #[test]
    fn switch_cases_plus_fall_through() {
        // switch (2) { +1, -11 }, nop, ret
        let code = [
            0x45, 0x02, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0xF5, 0xFF, 0xFF, 0xFF, 0x00,
            0x2A,
        ];
        let classification = classify_bytes(&code);

        let switch_edges: Vec<_> = classification
            .edges
            .iter()
            .filter(|edge| edge.source == 0)
            .collect();
        assert_eq!(switch_edges.len(), 3);
        assert_eq!(switch_edges[0].kind, EdgeKind::SwitchCase { index: 0 });
        assert_eq!(switch_edges[0].target, 14);
        assert_eq!(switch_edges[1].target, 2);
        assert_eq!(switch_edges[2].kind, EdgeKind::FallThrough);
        assert_eq!(switch_edges[2].target, 13);

        assert_eq!(
            classification.branches[0].class,
            BranchClass::Switch {
                targets: vec![14, 2]
            }
        );
    }

    #[test]
    fn unresolvable_branch_keeps_going() {
        // brtrue.s +100, nop, ret
        let classification = classify_bytes(&[0x2D, 0x64, 0x00, 0x2A]);

        assert_eq!(classification.errors.len(), 1);
        assert!(classification.branches.is_empty());
        assert!(classification
            .edges
            .contains(&ControlFlowEdge::fall_through(0, 2)));
        assert!(classification
            .edges
            .contains(&ControlFlowEdge::fall_through(2, 3)));
    }
}
