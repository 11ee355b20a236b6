//! Ordered places to look for module manifests.
//!
//! Module lookup by name is deterministic: sources are consulted in the order they were
//! registered, and the first one that knows the module wins.

use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
};

use crate::{metadata::manifest::model::ModuleManifest, LoadError};

/// File extension of manifest files.
pub const MANIFEST_EXTENSION: &str = "json";

/// Something that can produce a module manifest by name.
pub trait ModuleSource: Send + Sync {
    /// Short description for log output.
    fn describe(&self) -> String;

    /// Returns the manifest of `name`, `Ok(None)` if this source does not have it.
    ///
    /// # Errors
    /// [`LoadError::Failed`] if the source has the module but cannot read it.
    fn fetch(&self, name: &str) -> Result<Option<ModuleManifest>, LoadError>;
}

/// Reads `<dir>/<name>.json`.
#[derive(Debug, Clone)]
pub struct DirectorySource {
    dir: PathBuf,
}

impl DirectorySource {
    /// Creates a source over `dir`.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        DirectorySource { dir: dir.into() }
    }

    /// The file a module called `name` would live in.
    #[must_use]
    pub fn candidate(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.{MANIFEST_EXTENSION}"))
    }
}

impl ModuleSource for DirectorySource {
    fn describe(&self) -> String {
        self.dir.display().to_string()
    }

    fn fetch(&self, name: &str) -> Result<Option<ModuleManifest>, LoadError> {
        let path = self.candidate(name);
        if !path.is_file() {
            return Ok(None);
        }
        read_manifest(&path).map(Some)
    }
}

/// Manifests held in memory, keyed by module name.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    modules: HashMap<String, ModuleManifest>,
}

impl MemorySource {
    /// Creates an empty source.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a manifest under its own name, replacing any previous one.
    pub fn insert(&mut self, manifest: ModuleManifest) {
        self.modules.insert(manifest.name.clone(), manifest);
    }

    /// Number of manifests held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.modules.len()
    }

    /// Returns `true` if no manifest is held.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}

impl FromIterator<ModuleManifest> for MemorySource {
    fn from_iter<I: IntoIterator<Item = ModuleManifest>>(iter: I) -> Self {
        let mut source = MemorySource::new();
        for manifest in iter {
            source.insert(manifest);
        }
        source
    }
}

impl ModuleSource for MemorySource {
    fn describe(&self) -> String {
        format!("memory ({} modules)", self.modules.len())
    }

    fn fetch(&self, name: &str) -> Result<Option<ModuleManifest>, LoadError> {
        Ok(self.modules.get(name).cloned())
    }
}

/// Ordered list of directories searched for referenced modules.
///
/// The first directory holding a loadable manifest wins. A manifest that fails to parse is
/// logged and skipped, and its error is only reported when no later directory has the module.
///
/// # Examples
///
/// ```rust
/// use std::path::PathBuf;
/// use cilgraph::metadata::manifest::SearchPaths;
///
/// let mut paths = SearchPaths::for_module("app/main.json");
/// paths.push("/opt/shared");
///
/// let dirs: Vec<_> = paths.iter().cloned().collect();
/// assert_eq!(
///     dirs,
///     vec![
///         PathBuf::from("app"),
///         PathBuf::from("app/bin"),
///         PathBuf::from("app/lib"),
///         PathBuf::from("/opt/shared"),
///     ]
/// );
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchPaths {
    dirs: Vec<PathBuf>,
}

impl SearchPaths {
    /// An empty list.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The directory of `module_path`, then its `bin` and `lib` subdirectories.
    pub fn for_module(module_path: impl AsRef<Path>) -> Self {
        let dir = module_path
            .as_ref()
            .parent()
            .filter(|parent| !parent.as_os_str().is_empty())
            .map_or_else(|| PathBuf::from("."), Path::to_path_buf);

        SearchPaths {
            dirs: vec![dir.clone(), dir.join("bin"), dir.join("lib")],
        }
    }

    /// Appends `dir` unless it is already listed.
    pub fn push(&mut self, dir: impl Into<PathBuf>) {
        let dir = dir.into();
        if !self.dirs.contains(&dir) {
            self.dirs.push(dir);
        }
    }

    /// Directories in search order.
    pub fn iter(&self) -> std::slice::Iter<'_, PathBuf> {
        self.dirs.iter()
    }

    /// Number of directories.
    #[must_use]
    pub fn len(&self) -> usize {
        self.dirs.len()
    }

    /// Returns `true` if no directory is listed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.dirs.is_empty()
    }

    /// One [`DirectorySource`] per directory, in search order.
    #[must_use]
    pub fn sources(&self) -> Vec<DirectorySource> {
        self.dirs.iter().map(DirectorySource::new).collect()
    }
}

impl<P: Into<PathBuf>> Extend<P> for SearchPaths {
    fn extend<I: IntoIterator<Item = P>>(&mut self, iter: I) {
        for dir in iter {
            self.push(dir);
        }
    }
}

/// Reads and parses the manifest at `path`.
///
/// # Errors
/// [`LoadError::NotFound`] if the file does not exist, [`LoadError::Failed`] if it cannot be
/// read or parsed.
pub fn read_manifest(path: &Path) -> Result<ModuleManifest, LoadError> {
    let locator = path.display().to_string();
    let text = fs::read_to_string(path).map_err(|error| match error.kind() {
        std::io::ErrorKind::NotFound => LoadError::NotFound {
            locator: locator.clone(),
        },
        _ => LoadError::Failed {
            locator: locator.clone(),
            reason: error.to_string(),
        },
    })?;

    ModuleManifest::from_json(&text).map_err(|error| LoadError::Failed {
        locator,
        reason: error.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manifest(name: &str) -> ModuleManifest {
        ModuleManifest {
            name: name.to_string(),
            types: Vec::new(),
            member_refs: Vec::new(),
        }
    }

    fn scratch_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("cilgraph-{tag}-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn search_order() {
        let paths = SearchPaths::for_module("main.json");
        let dirs: Vec<_> = paths.iter().cloned().collect();
        assert_eq!(dirs[0], PathBuf::from("."));
        assert_eq!(dirs[1], PathBuf::from("./bin"));
        assert_eq!(dirs.len(), 3);

        let mut paths = SearchPaths::new();
        paths.extend(["a", "b", "a"]);
        assert_eq!(paths.len(), 2);
    }

    #[test]
    fn memory_source() {
        let source: MemorySource = [manifest("A"), manifest("B")].into_iter().collect();
        assert_eq!(source.len(), 2);
        assert!(source.fetch("A").unwrap().is_some());
        assert!(source.fetch("C").unwrap().is_none());
    }

    #[test]
    fn directory_source() {
        let dir = scratch_dir("dirsource");
        fs::write(dir.join("Good.json"), manifest("Good").to_json().unwrap()).unwrap();
        fs::write(dir.join("Broken.json"), "{ not json").unwrap();

        let source = DirectorySource::new(&dir);
        assert_eq!(source.fetch("Good").unwrap().unwrap().name, "Good");
        assert!(source.fetch("Missing").unwrap().is_none());
        assert!(matches!(
            source.fetch("Broken"),
            Err(LoadError::Failed { .. })
        ));

        assert!(matches!(
            read_manifest(&dir.join("Missing.json")),
            Err(LoadError::NotFound { .. })
        ));

        fs::remove_dir_all(&dir).unwrap();
    }
}
