//! Method-level metadata: bodies, exception clauses and identities.
//!
//! # Key Components
//!
//! - [`MethodBody`] - Code bytes plus protected regions, optionally parsed from a full header
//! - [`ExceptionHandler`], [`ExceptionHandlerFlags`] - ECMA-335 exception clauses
//! - [`MethodIdentity`], [`VisitedMethodKey`] - Symbolic method names used by the walker

mod body;
mod exceptions;
mod identity;

pub use body::{MethodBody, MethodBodyFlags, SectionFlags};
pub use exceptions::{ExceptionHandler, ExceptionHandlerFlags};
pub use identity::{MethodIdentity, VisitedMethodKey};
