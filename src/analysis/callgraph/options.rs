//! Traversal configuration.

use crate::assembly::DecodeMode;

/// Default recursion ceiling.
pub const DEFAULT_MAX_DEPTH: usize = 20;

/// Configuration of a call graph traversal.
///
/// # Examples
///
/// ```rust
/// use cilgraph::analysis::callgraph::WalkOptions;
/// use cilgraph::assembly::DecodeMode;
///
/// let options = WalkOptions::default()
///     .max_depth(5)
///     .decode_mode(DecodeMode::Strict)
///     .leaf_namespace("Newtonsoft.");
///
/// assert!(options.is_leaf_type("System.Console"));
/// assert!(options.is_leaf_type("Newtonsoft.Json.JsonConvert"));
/// assert!(!options.is_leaf_type("Contoso.App"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalkOptions {
    /// Nodes at this depth are reported as `DepthExceeded`; the root is at depth 0
    pub max_depth: usize,
    /// Decoding mode used for every method body
    pub decode_mode: DecodeMode,
    /// Types that are reported but never expanded. An entry ending in `.` matches every type
    /// whose name starts with it; any other entry matches one type exactly.
    pub leaf_namespaces: Vec<String>,
    /// Follow compiler-generated state machines of asynchronous methods
    pub expand_continuations: bool,
    /// Maximum number of methods to resolve, `None` for no limit
    pub step_budget: Option<usize>,
}

impl Default for WalkOptions {
    fn default() -> Self {
        WalkOptions {
            max_depth: DEFAULT_MAX_DEPTH,
            decode_mode: DecodeMode::default(),
            leaf_namespaces: vec!["System.".to_string(), "System.Object".to_string()],
            expand_continuations: true,
            step_budget: None,
        }
    }
}

impl WalkOptions {
    /// Sets the depth limit.
    #[must_use]
    pub fn max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Sets the decoding mode.
    #[must_use]
    pub fn decode_mode(mut self, mode: DecodeMode) -> Self {
        self.decode_mode = mode;
        self
    }

    /// Adds a leaf namespace prefix or exact type name.
    #[must_use]
    pub fn leaf_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.leaf_namespaces.push(namespace.into());
        self
    }

    /// Replaces the leaf list. An empty list expands everything.
    #[must_use]
    pub fn leaf_namespaces<I, T>(mut self, namespaces: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.leaf_namespaces = namespaces.into_iter().map(Into::into).collect();
        self
    }

    /// Enables or disables continuation expansion.
    #[must_use]
    pub fn expand_continuations(mut self, expand: bool) -> Self {
        self.expand_continuations = expand;
        self
    }

    /// Limits the number of methods resolved.
    #[must_use]
    pub fn step_budget(mut self, budget: usize) -> Self {
        self.step_budget = Some(budget);
        self
    }

    /// Returns `true` if methods of `type_name` are reported as leaves.
    #[must_use]
    pub fn is_leaf_type(&self, type_name: &str) -> bool {
        self.leaf_namespaces.iter().any(|entry| {
            if entry.ends_with('.') {
                type_name.starts_with(entry.as_str())
            } else {
                type_name == entry
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let options = WalkOptions::default();
        assert_eq!(options.max_depth, 20);
        assert_eq!(options.decode_mode, DecodeMode::Permissive);
        assert!(options.expand_continuations);
        assert!(options.step_budget.is_none());
    }

    #[test]
    fn leaf_matching() {
        let options = WalkOptions::default();
        assert!(options.is_leaf_type("System.Object"));
        assert!(options.is_leaf_type("System.Threading.Tasks.Task"));
        assert!(!options.is_leaf_type("SystemTools.Helper"));
        assert!(!options.is_leaf_type("System"));

        let exact = WalkOptions::default().leaf_namespaces(["Contoso.Log"]);
        assert!(exact.is_leaf_type("Contoso.Log"));
        assert!(!exact.is_leaf_type("Contoso.Logger"));
        assert!(!exact.is_leaf_type("System.String"));

        assert!(!WalkOptions::default()
            .leaf_namespaces(Vec::<String>::new())
            .is_leaf_type("System.String"));
    }
}
