//! # cilgraph Prelude
//!
//! The types needed for everyday decoding, analysis and traversal, for glob import.

// ================================================================================================
// Core Types and Error Handling
// ================================================================================================

/// The main error type for all cilgraph operations
pub use crate::Error;

/// The result type used throughout cilgraph
pub use crate::Result;

/// Error families of the individual stages
pub use crate::{DecodeError, LoadError, RegionError, ResolutionError};

/// Byte cursor
pub use crate::Parser;

// ================================================================================================
// Decoding
// ================================================================================================

/// Instruction model
pub use crate::assembly::{
    BranchPredicate, FlowType, Immediate, Instruction, OpcodeDescriptor, Operand, OperandKind,
};

/// Decoding and encoding entry points
pub use crate::assembly::{
    decode_instruction, decode_stream, encode_stream, DecodeMode, DecodedBody, InstructionStream,
};

// ================================================================================================
// Analysis
// ================================================================================================

/// Per-method control flow
pub use crate::analysis::cfg::{
    analyze_method_body, BranchClass, BranchCondition, ControlFlowEdge, EdgeKind, MethodAnalysis,
};

/// Exception regions
pub use crate::analysis::regions::{ProtectedRegion, RegionKind, RegionMap};

/// Call graph traversal
pub use crate::analysis::callgraph::{
    CallGraphWalker, CallNode, CallSite, CallType, CancellationToken, NodeStatus, Traversal,
    WalkOptions,
};

// ================================================================================================
// Metadata
// ================================================================================================

/// Metadata token
pub use crate::metadata::token::Token;

/// Method bodies and identities
pub use crate::metadata::method::{ExceptionHandler, MethodBody, MethodIdentity};

/// Introspection service
pub use crate::metadata::introspection::{
    MethodHandle, ModuleHandle, ModuleIntrospection, ModuleLocator,
};

/// Manifest backed introspection
pub use crate::metadata::manifest::{ManifestIntrospector, ModuleManifest, SearchPaths};
