//! Exception region mapping.
//!
//! Maps protected regions (try, catch, finally, fault and filter ranges) onto instruction
//! offsets. Regions are half-open intervals. A handler region always belongs to exactly one
//! try region, referenced by its index in the region list.
//!
//! # Nesting
//!
//! ECMA-335 orders exception clauses innermost first, and so does a [`RegionMap`]: when
//! several regions contain an offset, they are returned in list order.
//!
//! # Validation
//!
//! [`RegionMap::new`] checks every region and records a [`RegionError::Malformed`] for each
//! inconsistent one. Malformed regions are left out of lookups; the remaining regions are
//! still mapped.
//!
//! # Examples
//!
//! ```rust
//! use cilgraph::analysis::regions::{ProtectedRegion, RegionKind, RegionMap};
//!
//! let map = RegionMap::new(vec![
//!     ProtectedRegion::protected(10, 50),
//!     ProtectedRegion::handler(RegionKind::Catch, 50, 70, 0),
//! ]);
//!
//! assert!(map.errors().is_empty());
//! assert_eq!(map.regions_at(30)[0].kind, RegionKind::Try);
//! assert!(map.regions_at(5).is_empty());
//! ```

use std::ops::Range;

use log::warn;

use crate::{
    metadata::{
        method::{ExceptionHandler, ExceptionHandlerFlags},
        token::Token,
    },
    RegionError,
};

/// The role of a protected region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegionKind {
    /// Protected code
    Try,
    /// Typed exception handler
    Catch,
    /// Handler that always runs when leaving the try region
    Finally,
    /// Handler that runs only when an exception leaves the try region
    Fault,
    /// Handler guarded by a filter block
    Filter,
}

impl RegionKind {
    /// Returns `true` for every kind except [`RegionKind::Try`].
    #[must_use]
    pub const fn is_handler(&self) -> bool {
        !matches!(self, RegionKind::Try)
    }
}

impl From<ExceptionHandlerFlags> for RegionKind {
    fn from(flags: ExceptionHandlerFlags) -> Self {
        if flags.contains(ExceptionHandlerFlags::FILTER) {
            RegionKind::Filter
        } else if flags.contains(ExceptionHandlerFlags::FINALLY) {
            RegionKind::Finally
        } else if flags.contains(ExceptionHandlerFlags::FAULT) {
            RegionKind::Fault
        } else {
            RegionKind::Catch
        }
    }
}

/// A single protected region of a method body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtectedRegion {
    /// Role of the region
    pub kind: RegionKind,
    /// First offset covered
    pub start: usize,
    /// First offset no longer covered
    pub end: usize,
    /// Filter block preceding the handler, [`RegionKind::Filter`] only
    pub filter: Option<Range<usize>>,
    /// Index of the owning try region, handlers only
    pub try_region: Option<usize>,
    /// Caught exception type, [`RegionKind::Catch`] only
    pub catch_type: Option<Token>,
}

impl ProtectedRegion {
    /// Creates a try region.
    #[must_use]
    pub fn protected(start: usize, end: usize) -> Self {
        ProtectedRegion {
            kind: RegionKind::Try,
            start,
            end,
            filter: None,
            try_region: None,
            catch_type: None,
        }
    }

    /// Creates a handler region owned by the try region at index `try_region`.
    #[must_use]
    pub fn handler(kind: RegionKind, start: usize, end: usize, try_region: usize) -> Self {
        ProtectedRegion {
            kind,
            start,
            end,
            filter: None,
            try_region: Some(try_region),
            catch_type: None,
        }
    }

    /// Sets the filter block of a filter region.
    #[must_use]
    pub fn with_filter(mut self, filter: Range<usize>) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Sets the caught exception type of a catch region.
    #[must_use]
    pub fn with_catch_type(mut self, token: Token) -> Self {
        self.catch_type = Some(token);
        self
    }

    /// The covered range.
    #[must_use]
    pub fn range(&self) -> Range<usize> {
        self.start..self.end
    }

    /// Returns `true` if `offset` lies in the region, or in its filter block.
    #[must_use]
    pub fn contains(&self, offset: usize) -> bool {
        self.range().contains(&offset)
            || self
                .filter
                .as_ref()
                .is_some_and(|filter| filter.contains(&offset))
    }

    /// Converts ECMA-335 exception clauses into regions.
    ///
    /// Each distinct try range becomes one [`RegionKind::Try`] region, placed before the first
    /// handler that protects it; clauses sharing a try range share that region. Clause order
    /// is preserved, so the innermost-first order of the clause table carries over.
    #[must_use]
    pub fn from_handlers(handlers: &[ExceptionHandler]) -> Vec<ProtectedRegion> {
        let mut regions = Vec::with_capacity(handlers.len() * 2);
        let mut try_regions: Vec<(Range<usize>, usize)> = Vec::new();

        for handler in handlers {
            let try_range = handler.try_range();
            let try_index = match try_regions.iter().find(|(range, _)| *range == try_range) {
                Some((_, index)) => *index,
                None => {
                    let index = regions.len();
                    regions.push(ProtectedRegion::protected(try_range.start, try_range.end));
                    try_regions.push((try_range, index));
                    index
                }
            };

            let handler_range = handler.handler_range();
            let mut region = ProtectedRegion::handler(
                RegionKind::from(handler.flags),
                handler_range.start,
                handler_range.end,
                try_index,
            );
            region.catch_type = handler.class_token;
            region.filter = handler.filter_range();
            regions.push(region);
        }

        regions
    }
}

/// Offset lookup over a validated list of protected regions.
#[derive(Debug, Clone, Default)]
pub struct RegionMap {
    regions: Vec<ProtectedRegion>,
    valid: Vec<bool>,
    errors: Vec<RegionError>,
}

impl RegionMap {
    /// Validates `regions` and builds the lookup.
    ///
    /// Malformed regions are reported through [`RegionMap::errors`] and excluded from lookups.
    #[must_use]
    pub fn new(regions: Vec<ProtectedRegion>) -> Self {
        let mut valid = Vec::with_capacity(regions.len());
        let mut errors = Vec::new();

        for (index, region) in regions.iter().enumerate() {
            match check_region(&regions, &valid, index, region) {
                Ok(()) => valid.push(true),
                Err(reason) => {
                    warn!("Ignoring protected region #{index}: {reason}");
                    errors.push(RegionError::Malformed { index, reason });
                    valid.push(false);
                }
            }
        }

        RegionMap {
            regions,
            valid,
            errors,
        }
    }

    /// All regions, including malformed ones, in input order.
    #[must_use]
    pub fn regions(&self) -> &[ProtectedRegion] {
        &self.regions
    }

    /// Validation failures, one per malformed region.
    #[must_use]
    pub fn errors(&self) -> &[RegionError] {
        &self.errors
    }

    /// Number of regions that passed validation.
    #[must_use]
    pub fn len(&self) -> usize {
        self.valid.iter().filter(|valid| **valid).count()
    }

    /// Returns `true` if no region passed validation.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The valid regions containing `offset`, innermost first.
    ///
    /// Precedence follows the clause table, so the table decides which region is innermost.
    #[must_use]
    pub fn regions_at(&self, offset: usize) -> Vec<&ProtectedRegion> {
        self.iter_valid()
            .map(|(_, region)| region)
            .filter(|region| region.contains(offset))
            .collect()
    }

    /// The first valid region in table order containing `offset`.
    #[must_use]
    pub fn innermost_at(&self, offset: usize) -> Option<&ProtectedRegion> {
        self.iter_valid()
            .map(|(_, region)| region)
            .find(|region| region.contains(offset))
    }

    /// The valid handler regions owned by the try region at `try_index`.
    pub fn handlers_of(&self, try_index: usize) -> impl Iterator<Item = &ProtectedRegion> {
        self.iter_valid()
            .filter(move |(_, region)| region.try_region == Some(try_index))
            .map(|(_, region)| region)
    }

    fn iter_valid(&self) -> impl Iterator<Item = (usize, &ProtectedRegion)> {
        self.regions
            .iter()
            .enumerate()
            .filter(|(index, _)| self.valid[*index])
    }
}

fn check_region(
    regions: &[ProtectedRegion],
    valid: &[bool],
    index: usize,
    region: &ProtectedRegion,
) -> Result<(), String> {
    if region.start >= region.end {
        return Err(format!(
            "empty or inverted range [{}, {})",
            region.start, region.end
        ));
    }

    if !region.kind.is_handler() {
        if region.try_region.is_some() {
            return Err("try region references another try region".to_string());
        }
        if region.filter.is_some() {
            return Err("try region carries a filter block".to_string());
        }
        return Ok(());
    }

    let Some(try_index) = region.try_region else {
        return Err(format!("{:?} region without a try region", region.kind));
    };
    if try_index >= index {
        return Err(format!(
            "{:?} region references try region #{try_index}, which does not precede it",
            region.kind
        ));
    }
    let owner = &regions[try_index];
    if owner.kind != RegionKind::Try {
        return Err(format!(
            "{:?} region references #{try_index}, which is a {:?} region",
            region.kind, owner.kind
        ));
    }
    if !valid[try_index] {
        return Err(format!("owning try region #{try_index} is malformed"));
    }
    if owner.start <= region.start && region.end <= owner.end {
        return Err(format!(
            "{:?} region lies inside its own protected range",
            region.kind
        ));
    }

    match (&region.filter, region.kind) {
        (Some(filter), RegionKind::Filter) => {
            if filter.start >= filter.end || filter.end != region.start {
                return Err(format!(
                    "filter block [{}, {}) does not end where the handler begins at {}",
                    filter.start, filter.end, region.start
                ));
            }
        }
        (None, RegionKind::Filter) => return Err("filter region without filter block".to_string()),
        (Some(_), kind) => return Err(format!("{kind:?} region carries a filter block")),
        (None, _) => {}
    }

    Ok(())
}
