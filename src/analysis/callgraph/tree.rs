//! The call tree produced by a traversal.
//!
//! Every method the walker reaches becomes a [`CallNode`]. Nodes that were not expanded carry
//! the reason in their [`NodeStatus`]; failures never propagate past the node they occurred
//! at.

use serde::{Serialize, Serializer};
use thiserror::Error;

use crate::{
    analysis::{callgraph::site::CallSite, cfg::MethodAnalysis},
    metadata::method::MethodIdentity,
    DecodeError, LoadError, ResolutionError,
};

/// Why a branch of the traversal failed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TraversalFailure {
    /// The module holding the method could not be loaded
    #[error(transparent)]
    Load(#[from] LoadError),
    /// The call site token does not name a method
    #[error(transparent)]
    Resolution(#[from] ResolutionError),
    /// The body could not be decoded in strict mode
    #[error(transparent)]
    Decode(#[from] DecodeError),
    /// The declaring type is not in any loaded module
    #[error("Type '{0}' not found")]
    TypeNotFound(String),
    /// The body could not be analyzed
    #[error("Analysis failed: {0}")]
    Analysis(String),
    /// The type has no method with that name
    #[error("Method '{type_name}.{method}' not found")]
    MethodNotFound {
        /// Declaring type
        type_name: String,
        /// Requested method name
        method: String,
    },
}

impl Serialize for TraversalFailure {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// How a node ended up in the tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum NodeStatus {
    /// Body decoded and call sites followed
    Expanded,
    /// Method was reached earlier in this traversal
    AlreadyAnalyzed,
    /// Node sits at the depth limit
    DepthExceeded,
    /// Declaring type belongs to a foundational namespace
    SystemLeaf,
    /// `calli` target, unknown until run time
    Indirect,
    /// Abstract, interface or runtime-provided method
    NoBody,
    /// This branch could not be followed
    Failed(TraversalFailure),
    /// Traversal was cancelled before this method was resolved
    Cancelled,
    /// The step budget ran out before this method was resolved
    BudgetExhausted,
}

impl NodeStatus {
    /// Returns `true` if the node was cut short by a limit rather than by what it is.
    #[must_use]
    pub const fn is_truncation(&self) -> bool {
        matches!(
            self,
            Self::DepthExceeded | Self::Cancelled | Self::BudgetExhausted
        )
    }

    /// Returns `true` for [`NodeStatus::Failed`].
    #[must_use]
    pub const fn is_failure(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

/// Size and control-flow shape of an expanded method body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct BodySummary {
    /// Code size in bytes
    pub body_size: usize,
    /// Decoded instructions
    pub instructions: usize,
    /// Backward branches
    pub loops: usize,
    /// Forward branches
    pub conditionals: usize,
    /// Switch instructions
    pub switches: usize,
    /// Recoverable decode, resolution and region problems
    pub diagnostics: usize,
}

impl From<&MethodAnalysis> for BodySummary {
    fn from(analysis: &MethodAnalysis) -> Self {
        BodySummary {
            body_size: analysis.body.body_len,
            instructions: analysis.instruction_count(),
            loops: analysis.loop_count(),
            conditionals: analysis.conditional_count(),
            switches: analysis.switch_count(),
            diagnostics: analysis.diagnostics.len(),
        }
    }
}

/// One method in the call tree.
#[derive(Debug, Clone, Serialize)]
pub struct CallNode {
    /// Display name: the qualified method name, or the raw token if it never resolved
    pub label: String,
    /// Resolved identity, if resolution got that far
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<MethodIdentity>,
    /// Distance from the root
    pub depth: usize,
    /// The call instruction in the parent this node was reached through
    #[serde(skip_serializing_if = "Option::is_none")]
    pub call_site: Option<CallSite>,
    /// Reached as the state machine step of an asynchronous parent
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub via_continuation: bool,
    /// Outcome
    #[serde(flatten)]
    pub status: NodeStatus,
    /// Body shape, for expanded nodes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<BodySummary>,
    /// Callees in call site order, continuation first
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<CallNode>,
}

impl CallNode {
    pub(crate) fn new(label: impl Into<String>, depth: usize, status: NodeStatus) -> Self {
        CallNode {
            label: label.into(),
            method: None,
            depth,
            call_site: None,
            via_continuation: false,
            status,
            summary: None,
            children: Vec::new(),
        }
    }

    /// Number of nodes in this subtree, including this one.
    #[must_use]
    pub fn node_count(&self) -> usize {
        1 + self.children.iter().map(CallNode::node_count).sum::<usize>()
    }

    /// Deepest depth reached in this subtree.
    #[must_use]
    pub fn max_depth(&self) -> usize {
        self.children
            .iter()
            .map(CallNode::max_depth)
            .max()
            .unwrap_or(self.depth)
    }

    /// Pre-order iterator over this subtree.
    #[must_use]
    pub fn iter(&self) -> CallNodeIter<'_> {
        CallNodeIter { stack: vec![self] }
    }

    /// First node in pre-order whose label is `label`.
    #[must_use]
    pub fn find(&self, label: &str) -> Option<&CallNode> {
        self.iter().find(|node| node.label == label)
    }

    /// All nodes in pre-order whose label is `label`.
    #[must_use]
    pub fn find_all<'a>(&'a self, label: &'a str) -> Vec<&'a CallNode> {
        self.iter().filter(|node| node.label == label).collect()
    }
}

/// Pre-order iterator over a [`CallNode`] subtree.
pub struct CallNodeIter<'a> {
    stack: Vec<&'a CallNode>,
}

impl<'a> Iterator for CallNodeIter<'a> {
    type Item = &'a CallNode;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.stack.pop()?;
        self.stack.extend(node.children.iter().rev());
        Some(node)
    }
}

/// Result of one top-level traversal.
#[derive(Debug, Clone, Serialize)]
pub struct Traversal {
    /// The root method
    pub root: CallNode,
    /// Module identities in the order they were loaded
    pub modules_loaded: Vec<String>,
    /// Methods whose bodies were decoded
    pub analyzed: usize,
    /// `true` if any branch hit the depth limit, the budget or a cancellation
    pub truncated: bool,
}

impl Traversal {
    /// Pre-order iterator over all nodes.
    #[must_use]
    pub fn nodes(&self) -> CallNodeIter<'_> {
        self.root.iter()
    }

    /// All failed nodes, in pre-order.
    #[must_use]
    pub fn failures(&self) -> Vec<&CallNode> {
        self.nodes().filter(|node| node.status.is_failure()).collect()
    }
}
