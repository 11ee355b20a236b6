//! Program analysis over decoded CIL.
//!
//! # Architecture
//!
//! - [`cfg`] - Per-method control flow: edges, loop / conditional / switch classification
//! - [`regions`] - Exception region lookup by offset
//! - [`callgraph`] - Depth-first, cycle-safe call graph traversal across modules
//!
//! The first two are pure functions over immutable input. The call graph walker keeps its
//! state in a per-traversal context and reaches modules only through the introspection
//! service.

pub mod callgraph;
pub mod cfg;
pub mod regions;

pub use callgraph::{CallGraphWalker, CallNode, NodeStatus, Traversal, WalkOptions};
pub use cfg::{analyze_method_body, BranchClass, ControlFlowEdge, EdgeKind, MethodAnalysis};
pub use regions::{ProtectedRegion, RegionKind, RegionMap};
