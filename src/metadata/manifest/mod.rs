//! JSON module manifests and the introspection service built on them.
//!
//! A manifest stands in for a compiled module: it lists the module's types and methods, the
//! raw CIL of each method body with its exception clauses, and the member references that
//! lead into other modules. [`ManifestIntrospector`] serves them through
//! [`crate::metadata::introspection::ModuleIntrospection`], loading referenced modules from an
//! ordered list of [`ModuleSource`]s.
//!
//! # Key Components
//!
//! - [`ModuleManifest`] - The serialized module description
//! - [`ManifestIntrospector`] - The introspection service
//! - [`SearchPaths`] / [`DirectorySource`] / [`MemorySource`] - Where named modules come from

mod introspector;
mod model;
mod sources;

pub use introspector::{ManifestIntrospector, ManifestMethod, ManifestModule, ManifestType};
pub use model::{
    CodeBytes, HandlerEntry, HandlerKind, MemberRefEntry, MethodEntry, ModuleManifest, TypeEntry,
};
pub use sources::{
    read_manifest, DirectorySource, MemorySource, ModuleSource, SearchPaths, MANIFEST_EXTENSION,
};
