use std::path::Path;

use anyhow::Context;
use cilgraph::{
    analysis::regions::RegionKind,
    metadata::{
        introspection::{ModuleIntrospection, ModuleLocator},
        manifest::{ManifestIntrospector, ManifestModule},
    },
};

/// Load the manifest at `path` through `service`, so later lookups share its cache.
pub fn load_manifest(
    service: &ManifestIntrospector,
    path: &Path,
) -> anyhow::Result<ManifestModule> {
    service
        .load_module(&ModuleLocator::Path(path.to_path_buf()))
        .with_context(|| format!("failed to load module manifest: {}", path.display()))
}

/// Returns true for files holding bare method bytes rather than a manifest.
pub fn is_raw_code(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("il" | "bin")
    )
}

/// Split `Type::Name` into its parts; a bare `Name` matches any type.
pub fn split_method_filter(filter: &str) -> (Option<&str>, &str) {
    match filter.rsplit_once("::") {
        Some((type_name, method)) => (Some(type_name), method),
        None => (None, filter),
    }
}

/// Extract a display-friendly filename from a path.
pub fn file_display_name(path: &Path) -> String {
    path.file_name().map_or_else(
        || path.display().to_string(),
        |f| f.to_string_lossy().to_string(),
    )
}

/// ildasm-style keyword for a region kind.
pub fn region_keyword(kind: RegionKind) -> &'static str {
    match kind {
        RegionKind::Try => "try",
        RegionKind::Catch => "catch",
        RegionKind::Finally => "finally",
        RegionKind::Fault => "fault",
        RegionKind::Filter => "filter",
    }
}
