//! Control flow edge types.
//!
//! Edges connect instruction offsets within one method body and carry the reason control
//! can move along them.

use crate::assembly::BranchPredicate;

/// The kind of control flow represented by an edge.
///
/// # Examples
///
/// ```rust
/// use cilgraph::analysis::cfg::EdgeKind;
/// use cilgraph::assembly::BranchPredicate;
///
/// let edge_kind = EdgeKind::Conditional { predicate: BranchPredicate::Truthy, unsigned: false };
/// assert!(edge_kind.is_conditional());
/// assert!(!EdgeKind::FallThrough.is_branch());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EdgeKind {
    /// Taken every time: `br`, `br.s`, `leave`, `leave.s`.
    Unconditional,

    /// Taken when the branch condition holds.
    Conditional {
        /// What the opcode tests
        predicate: BranchPredicate,
        /// `true` for the unsigned / unordered `.un` variants
        unsigned: bool,
    },

    /// One entry of a switch jump table.
    SwitchCase {
        /// Position of the entry in the table
        index: usize,
    },

    /// Continuation with the next instruction in stream order.
    ///
    /// For conditional branches this is the not-taken path; for switches it is the case where
    /// the selector is outside the table.
    FallThrough,
}

impl EdgeKind {
    /// Returns `true` for [`EdgeKind::Conditional`] edges.
    #[must_use]
    pub const fn is_conditional(&self) -> bool {
        matches!(self, Self::Conditional { .. })
    }

    /// Returns `true` for [`EdgeKind::SwitchCase`] edges.
    #[must_use]
    pub const fn is_switch(&self) -> bool {
        matches!(self, Self::SwitchCase { .. })
    }

    /// Returns `true` for every edge created by an explicit branch target.
    #[must_use]
    pub const fn is_branch(&self) -> bool {
        !matches!(self, Self::FallThrough)
    }
}

/// An edge between two instruction offsets.
///
/// # Examples
///
/// ```rust
/// use cilgraph::analysis::cfg::{ControlFlowEdge, EdgeKind};
///
/// let edge = ControlFlowEdge::new(12, 2, EdgeKind::Unconditional);
/// assert!(edge.is_backward());
/// assert!(edge.is_loop());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ControlFlowEdge {
    /// Offset of the instruction the edge leaves from.
    pub source: usize,
    /// Offset of the instruction the edge leads to.
    pub target: usize,
    /// The kind of control flow this edge represents.
    pub kind: EdgeKind,
}

impl ControlFlowEdge {
    /// Creates a new edge.
    #[must_use]
    pub const fn new(source: usize, target: usize, kind: EdgeKind) -> Self {
        Self {
            source,
            target,
            kind,
        }
    }

    /// Creates a fall-through edge.
    #[must_use]
    pub const fn fall_through(source: usize, target: usize) -> Self {
        Self::new(source, target, EdgeKind::FallThrough)
    }

    /// Returns `true` if the edge leads to an earlier offset.
    #[must_use]
    pub const fn is_backward(&self) -> bool {
        self.target < self.source
    }

    /// Returns `true` if this edge is classified as a loop edge.
    ///
    /// Any backward branch counts as a loop. This is a structural approximation based only on
    /// offsets; there is no dominator analysis behind it, so a backward jump that merely
    /// shares code (for example in short-circuit evaluation) is reported as a loop as well.
    /// A branch to its own offset also counts as a loop.
    #[must_use]
    pub const fn is_loop(&self) -> bool {
        self.kind.is_branch() && self.target <= self.source
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn edge_kind_predicates() {
        let conditional = EdgeKind::Conditional {
            predicate: BranchPredicate::LessThan,
            unsigned: true,
        };
        assert!(conditional.is_conditional());
        assert!(!conditional.is_switch());
        assert!(EdgeKind::SwitchCase { index: 0 }.is_switch());
        assert!(EdgeKind::Unconditional.is_branch());
        assert!(!EdgeKind::FallThrough.is_branch());
    }

    #[test]
    fn loop_classification() {
        assert!(ControlFlowEdge::new(10, 0, EdgeKind::Unconditional).is_loop());
        assert!(ControlFlowEdge::new(10, 10, EdgeKind::Unconditional).is_loop());
        assert!(!ControlFlowEdge::new(10, 10, EdgeKind::Unconditional).is_backward());
        assert!(!ControlFlowEdge::new(10, 20, EdgeKind::Unconditional).is_loop());
        assert!(!ControlFlowEdge::fall_through(10, 11).is_loop());
    }
}
