//! Per-method control flow analysis.
//!
//! This module decodes a method body, classifies its branches and maps its protected regions,
//! all in one pass over immutable inputs. The result, a [`MethodAnalysis`], is what the call
//! graph walker attaches to every method it expands, and what `cilgraph disasm` prints.
//!
//! # Key Components
//!
//! - [`analyze_method_body`] - The per-method entry point
//! - [`MethodAnalysis`] - Instructions, edges, branch classes, regions and diagnostics
//! - [`ControlFlowEdge`] / [`EdgeKind`] - Typed control flow between offsets
//! - [`BranchClass`] - Loop, conditional or switch
//!
//! # Examples
//!
//! ```rust
//! use cilgraph::analysis::cfg::analyze_method_body;
//! use cilgraph::assembly::DecodeMode;
//!
//! // loop: ldc.i4.0, stloc.0, ldloc.0, ldc.i4.s 10, blt.s -5, ret
//! let code = [0x16, 0x0A, 0x06, 0x1F, 0x0A, 0x32, 0xFB, 0x2A];
//! let analysis = analyze_method_body(&code, Vec::new(), DecodeMode::Strict)?;
//!
//! assert_eq!(analysis.instruction_count(), 6);
//! assert_eq!(analysis.loop_count(), 1);
//! assert!(analysis.diagnostics.is_empty());
//! # Ok::<(), cilgraph::Error>(())
//! ```
//!
//! # Thread Safety
//!
//! Analysis holds no shared state; independent bodies can be analyzed concurrently.

mod classifier;
mod edge;

pub use classifier::{
    classify, classify_branch, instruction_edges, BranchClass, BranchCondition, Classification,
    ClassifiedBranch,
};
pub use edge::{ControlFlowEdge, EdgeKind};

use thiserror::Error;

use crate::{
    analysis::regions::{ProtectedRegion, RegionMap},
    assembly::{decode_stream, DecodeMode, DecodedBody, Instruction},
    DecodeError, RegionError, ResolutionError, Result,
};

/// A recoverable problem found while analyzing one method body.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Diagnostic {
    /// Bytes that could not be decoded
    #[error(transparent)]
    Decode(#[from] DecodeError),
    /// Branch targets outside the body
    #[error(transparent)]
    Resolution(#[from] ResolutionError),
    /// Inconsistent protected regions
    #[error(transparent)]
    Region(#[from] RegionError),
}

/// The annotated instruction list of one method body.
#[derive(Debug, Clone)]
pub struct MethodAnalysis {
    /// Decoded instructions
    pub body: DecodedBody,
    /// Outgoing edges of all instructions, in instruction order
    pub edges: Vec<ControlFlowEdge>,
    /// Branch classifications, in instruction order
    pub branches: Vec<ClassifiedBranch>,
    /// Protected region lookup
    pub regions: RegionMap,
    /// Everything that went wrong but did not stop the analysis
    pub diagnostics: Vec<Diagnostic>,
}

impl MethodAnalysis {
    /// The decoded instructions.
    #[must_use]
    pub fn instructions(&self) -> &[Instruction] {
        &self.body.instructions
    }

    /// Number of decoded instructions.
    #[must_use]
    pub fn instruction_count(&self) -> usize {
        self.body.instructions.len()
    }

    /// Edges leaving the instruction at `offset`.
    pub fn edges_from(&self, offset: usize) -> impl Iterator<Item = &ControlFlowEdge> {
        self.edges.iter().filter(move |edge| edge.source == offset)
    }

    /// Classification of the branch at `offset`, if it is one.
    #[must_use]
    pub fn branch_at(&self, offset: usize) -> Option<&BranchClass> {
        self.branches
            .iter()
            .find(|branch| branch.offset == offset)
            .map(|branch| &branch.class)
    }

    /// Number of branches classified as loops.
    #[must_use]
    pub fn loop_count(&self) -> usize {
        self.count(|class| matches!(class, BranchClass::Loop { .. }))
    }

    /// Number of forward branches.
    #[must_use]
    pub fn conditional_count(&self) -> usize {
        self.count(|class| matches!(class, BranchClass::Conditional { .. }))
    }

    /// Number of switches.
    #[must_use]
    pub fn switch_count(&self) -> usize {
        self.count(|class| matches!(class, BranchClass::Switch { .. }))
    }

    /// The protected regions enclosing `offset`, innermost first.
    #[must_use]
    pub fn regions_at(&self, offset: usize) -> Vec<&ProtectedRegion> {
        self.regions.regions_at(offset)
    }

    fn count(&self, predicate: impl Fn(&BranchClass) -> bool) -> usize {
        self.branches
            .iter()
            .filter(|branch| predicate(&branch.class))
            .count()
    }
}

/// Decodes, classifies and region-maps one method body.
///
/// Resolution and region failures never fail the call; they end up in
/// [`MethodAnalysis::diagnostics`]. Decode failures do the same in
/// [`DecodeMode::Permissive`].
///
/// # Errors
///
/// In [`DecodeMode::Strict`] the first [`DecodeError`] is returned as [`crate::Error::Decode`].
pub fn analyze_method_body(
    code: &[u8],
    regions: Vec<ProtectedRegion>,
    mode: DecodeMode,
) -> Result<MethodAnalysis> {
    let body = decode_stream(code, mode)?;
    let classification = classify(&body);
    let regions = RegionMap::new(regions);

    let mut diagnostics: Vec<Diagnostic> = body
        .diagnostics
        .iter()
        .cloned()
        .map(Diagnostic::from)
        .collect();
    diagnostics.extend(classification.errors.into_iter().map(Diagnostic::from));
    diagnostics.extend(regions.errors().iter().cloned().map(Diagnostic::from));

    Ok(MethodAnalysis {
        body,
        edges: classification.edges,
        branches: classification.branches,
        regions,
        diagnostics,
    })
}
