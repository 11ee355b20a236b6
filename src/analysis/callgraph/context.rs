//! Per-traversal state.
//!
//! One [`TraversalContext`] exists per top-level walk and is dropped with it. Nothing here is
//! process-wide, so independent traversals can run side by side on different threads.

use std::{
    collections::{HashMap, HashSet},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use log::{info, warn};

use crate::{
    metadata::{
        introspection::{ModuleHandle, ModuleIntrospection, ModuleLocator},
        method::VisitedMethodKey,
    },
    LoadError,
};

/// Cooperative cancellation flag shared between a walker and whoever may abort it.
///
/// The walker checks the flag before resolving each method; decoding a single body is never
/// interrupted.
///
/// # Examples
///
/// ```rust
/// use cilgraph::analysis::callgraph::CancellationToken;
///
/// let token = CancellationToken::new();
/// let handle = token.clone();
/// handle.cancel();
/// assert!(token.is_cancelled());
/// ```
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    /// Creates a token that is not cancelled.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    /// Returns `true` once [`CancellationToken::cancel`] was called on any clone.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Visited set, module cache and counters of one traversal.
pub(crate) struct TraversalContext<M: ModuleHandle> {
    visited: HashSet<VisitedMethodKey>,
    modules: Vec<M>,
    failed_loads: HashMap<String, LoadError>,
    pub(crate) steps: usize,
    pub(crate) analyzed: usize,
    pub(crate) truncated: bool,
}

impl<M: ModuleHandle> TraversalContext<M> {
    pub(crate) fn new() -> Self {
        TraversalContext {
            visited: HashSet::new(),
            modules: Vec::new(),
            failed_loads: HashMap::new(),
            steps: 0,
            analyzed: 0,
            truncated: false,
        }
    }

    /// Records `key`; returns `false` if it was already present.
    pub(crate) fn mark_visited(&mut self, key: VisitedMethodKey) -> bool {
        self.visited.insert(key)
    }

    pub(crate) fn is_visited(&self, key: &VisitedMethodKey) -> bool {
        self.visited.contains(key)
    }

    /// Modules loaded so far, in load order.
    pub(crate) fn modules(&self) -> &[M] {
        &self.modules
    }

    /// Loads the root module from an explicit locator.
    pub(crate) fn load_root<S>(
        &mut self,
        service: &S,
        locator: &ModuleLocator,
    ) -> Result<M, LoadError>
    where
        S: ModuleIntrospection<Module = M>,
    {
        let module = service.load_module(locator)?;
        info!("Loaded root module {}", module.identity());
        self.remember(module.clone());
        Ok(module)
    }

    /// Returns the module called `identity`, loading it on first use.
    ///
    /// Each module is requested from the service at most once per traversal; a failed load is
    /// remembered and reported again for later call sites.
    pub(crate) fn module<S>(&mut self, service: &S, identity: &str) -> Result<M, LoadError>
    where
        S: ModuleIntrospection<Module = M>,
    {
        if let Some(module) = self
            .modules
            .iter()
            .find(|module| module.identity() == identity)
        {
            return Ok(module.clone());
        }
        if let Some(error) = self.failed_loads.get(identity) {
            return Err(error.clone());
        }

        match service.load_module(&ModuleLocator::Name(identity.to_string())) {
            Ok(module) => {
                info!("Loaded module {identity} on demand");
                self.remember(module.clone());
                Ok(module)
            }
            Err(error) => {
                warn!("{error}");
                self.failed_loads
                    .insert(identity.to_string(), error.clone());
                Err(error)
            }
        }
    }

    /// Identities of the loaded modules, in load order.
    pub(crate) fn loaded_identities(&self) -> Vec<String> {
        self.modules
            .iter()
            .map(|module| module.identity().to_string())
            .collect()
    }

    fn remember(&mut self, module: M) {
        if !self
            .modules
            .iter()
            .any(|known| known.identity() == module.identity())
        {
            self.modules.push(module);
        }
    }
}
