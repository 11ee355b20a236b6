//! Metadata consumed by the decoder and the call graph walker.
//!
//! The decoder only ever sees opaque [`token::Token`]s. Turning them into something meaningful
//! is the job of an [`introspection::ModuleIntrospection`] service, with
//! [`manifest::ManifestIntrospector`] as the shipped implementation. Method bodies and their
//! exception clauses live in [`method`].

pub mod introspection;
pub mod manifest;
pub mod method;
pub mod token;
