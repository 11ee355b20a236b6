// Copyright 2025 Johann Kempter
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![deny(missing_docs)]
#![deny(unsafe_code)]

//! # cilgraph
//!
//! CIL method body decoding, control-flow classification and lazy, cross-module call graph
//! traversal for .NET modules.
//!
//! ## Features
//!
//! - **🔍 Complete opcode table** - All ECMA-335 single-byte and `0xFE`-prefixed opcodes
//! - **⚡ Lazy decoding** - Restartable instruction streams, permissive or strict
//! - **🧭 Control-flow classification** - Loops, conditionals and switches with typed edges
//! - **🛡️ Exception regions** - try/catch/finally/fault/filter lookup by offset
//! - **🌳 Call graph traversal** - Depth-bounded, cycle-safe, loads modules on demand
//!
//! ## Quick Start
//!
//! ```rust
//! use cilgraph::prelude::*;
//!
//! // ldc.i4.0, stloc.0, ldloc.0, ldc.i4.s 10, blt.s -5, ret
//! let code = [0x16, 0x0A, 0x06, 0x1F, 0x0A, 0x32, 0xFB, 0x2A];
//! let analysis = analyze_method_body(&code, Vec::new(), DecodeMode::Permissive)?;
//!
//! for instruction in analysis.instructions() {
//!     println!("IL_{:04X}: {}", instruction.offset, instruction.mnemonic());
//! }
//! assert_eq!(analysis.loop_count(), 1);
//! # Ok::<(), cilgraph::Error>(())
//! ```
//!
//! ## Architecture
//!
//! - [`assembly`] - Opcode table, operand reader, decoder, branch resolver, encoder
//! - [`analysis`] - Per-method control flow, exception regions, call graph walker
//! - [`metadata`] - Tokens, method bodies, the introspection service and its manifest backend
//!
//! Everything module-specific, such as loading modules or resolving tokens, goes through
//! [`metadata::introspection::ModuleIntrospection`]. The decoding and analysis layers never
//! touch files.
//!
//! ## Error Handling
//!
//! All fallible operations return [`Result`]. Recoverable problems inside a method body
//! (unknown opcodes in permissive mode, out-of-range branches, malformed regions) are
//! collected as diagnostics instead, and a call graph traversal never fails as a whole: failed
//! branches are reported on the node they occurred at.

#[macro_use]
pub(crate) mod error;
pub(crate) mod file;

/// Shared functionality which is used in unit- and integration-tests
#[cfg(test)]
pub(crate) mod test;

/// Convenient re-exports of the most commonly used types and traits.
///
/// # Example
///
/// ```rust
/// use cilgraph::prelude::*;
///
/// let body = decode_stream(&[0x00, 0x2A], DecodeMode::Strict)?;
/// assert_eq!(body.instructions.len(), 2);
/// # Ok::<(), cilgraph::Error>(())
/// ```
pub mod prelude;

/// CIL instruction set, decoding and encoding based on ECMA-335
///
/// # Key Types
///
/// - [`assembly::Instruction`] - A decoded instruction with its typed operand
/// - [`assembly::OpcodeDescriptor`] - Static per-opcode data
/// - [`assembly::InstructionStream`] - Lazy instruction iterator
///
/// # Examples
///
/// ```rust
/// use cilgraph::{Parser, assembly::decode_instruction};
///
/// let bytecode = &[0x00, 0x2A]; // nop, ret
/// let mut parser = Parser::new(bytecode);
/// let instruction = decode_instruction(&mut parser)?;
///
/// assert_eq!(instruction.mnemonic(), "nop");
/// assert_eq!(instruction.next_offset(), 1);
/// # Ok::<(), cilgraph::DecodeError>(())
/// ```
pub mod assembly;

/// Control flow, exception region and call graph analysis
pub mod analysis;

/// Tokens, method bodies and module introspection
///
/// - [`metadata::token`] - Metadata tokens as carried by instruction operands
/// - [`metadata::method`] - Method bodies, exception clauses, method identities
/// - [`metadata::introspection`] - The module introspection service
/// - [`metadata::manifest`] - JSON manifest backed implementation of that service
pub mod metadata;

/// `cilgraph` Result type
///
/// A type alias for `std::result::Result<T, Error>` where the error type is always [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// `cilgraph` Error type and its domain families
///
/// [`Error`] wraps [`DecodeError`], [`ResolutionError`], [`RegionError`] and [`LoadError`],
/// each of which can also be handled on its own.
pub use error::{DecodeError, Error, LoadError, RegionError, ResolutionError};

/// Cursor over a byte buffer, used by the decoder and the method header parser.
///
/// # Example
///
/// ```rust
/// use cilgraph::Parser;
///
/// let mut parser = Parser::new(&[0x2A, 0x01, 0x00]);
/// assert_eq!(parser.read_le::<u8>()?, 0x2A);
/// assert_eq!(parser.read_le::<u16>()?, 1);
/// # Ok::<(), cilgraph::Error>(())
/// ```
pub use file::parser::Parser;
