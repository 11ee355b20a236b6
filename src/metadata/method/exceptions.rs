//! Exception handler clauses of CIL method bodies.
//!
//! Clauses use the ECMA-335 layout (Partition II, 25.4.6): a protected `try` range, a handler
//! range, and either a catch type token or a filter offset. They are turned into
//! [`crate::analysis::regions::ProtectedRegion`]s for offset lookups.

use std::ops::Range;

use bitflags::bitflags;

use crate::metadata::token::Token;

bitflags! {
    /// Exception handler flags defining the type of exception handling clause.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ExceptionHandlerFlags: u16 {
        /// A typed exception clause.
        ///
        /// The `class_token` field contains the metadata token of the exception type
        /// that this handler catches.
        const EXCEPTION = 0x0000;

        /// An exception filter and handler clause.
        ///
        /// The filter code starts at `filter_offset` and runs up to the handler.
        const FILTER = 0x0001;

        /// A finally clause.
        const FINALLY = 0x0002;

        /// A fault clause (finally that executes only on exception).
        const FAULT = 0x0004;
    }
}

/// One exception handling clause of a method body.
///
/// # Layout in IL
///
/// ```text
/// try {
///     // try_offset -> try_offset + try_length
/// }
/// filter {
///     // filter_offset -> handler_offset (FILTER clauses only)
/// }
/// catch / finally / fault {
///     // handler_offset -> handler_offset + handler_length
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExceptionHandler {
    /// Flags describing the type of exception handler (catch, filter, finally, fault).
    pub flags: ExceptionHandlerFlags,
    /// Offset in bytes of try block from start of method body.
    pub try_offset: u32,
    /// Length in bytes of the try block.
    pub try_length: u32,
    /// Location of the handler for this try block.
    pub handler_offset: u32,
    /// Size of the handler code in bytes.
    pub handler_length: u32,
    /// If flags == EXCEPTION, the type this clause catches.
    pub class_token: Option<Token>,
    /// Offset in method body for filter-based exception handler.
    pub filter_offset: u32,
}

impl ExceptionHandler {
    /// The protected range as a half-open offset interval.
    #[must_use]
    pub fn try_range(&self) -> Range<usize> {
        span(self.try_offset, self.try_length)
    }

    /// The handler range as a half-open offset interval.
    #[must_use]
    pub fn handler_range(&self) -> Range<usize> {
        span(self.handler_offset, self.handler_length)
    }

    /// The filter range for `FILTER` clauses: from `filter_offset` up to the handler.
    #[must_use]
    pub fn filter_range(&self) -> Option<Range<usize>> {
        self.flags
            .contains(ExceptionHandlerFlags::FILTER)
            .then(|| self.filter_offset as usize..self.handler_offset as usize)
    }
}

fn span(offset: u32, length: u32) -> Range<usize> {
    let start = offset as usize;
    start..start.saturating_add(length as usize)
}
