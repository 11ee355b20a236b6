//! Cross-module call graph traversal.
//!
//! Starting from one method, the walker decodes each body it reaches, pulls out the call
//! sites and follows them depth-first. Modules are loaded lazily, the first time a call site
//! leads into them, and everything module-specific goes through
//! [`crate::metadata::introspection::ModuleIntrospection`].
//!
//! # Components
//!
//! - [`CallGraphWalker`]: The traversal driver
//! - [`WalkOptions`]: Depth limit, decode mode, leaf namespaces, budget
//! - [`CallSite`] / [`CallType`]: Call instructions found in a body
//! - [`CallNode`] / [`NodeStatus`] / [`Traversal`]: The resulting call tree
//! - [`CancellationToken`]: Cooperative abort between method boundaries
//!
//! # Termination
//!
//! The visited set lives for one whole traversal, not one branch. A method is expanded at most
//! once; later call sites reaching it produce [`NodeStatus::AlreadyAnalyzed`] leaves, so
//! recursive and mutually recursive graphs terminate independently of the depth limit.

mod context;
mod options;
mod site;
mod tree;
mod walker;

pub use context::CancellationToken;
pub use options::{WalkOptions, DEFAULT_MAX_DEPTH};
pub use site::{extract_call_sites, CallSite, CallType};
pub use tree::{BodySummary, CallNode, CallNodeIter, NodeStatus, Traversal, TraversalFailure};
pub use walker::CallGraphWalker;
