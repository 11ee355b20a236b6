//! Depth-first call graph traversal.
//!
//! The walker starts at one method, decodes its body, extracts its call sites and follows each
//! of them in call site order. Modules are loaded through the introspection service the first
//! time a call site leads into them.
//!
//! For every method reached the checks run in a fixed order:
//!
//! 1. cancellation and step budget, before anything is resolved
//! 2. `calli` sites become [`NodeStatus::Indirect`] leaves
//! 3. token resolution; failures become [`NodeStatus::Failed`] leaves
//! 4. leaf namespaces ([`NodeStatus::SystemLeaf`])
//! 5. the visited set ([`NodeStatus::AlreadyAnalyzed`])
//! 6. the depth limit ([`NodeStatus::DepthExceeded`])
//!
//! Only then is the module loaded, the method looked up and its body analyzed. A failure in
//! any of these steps prunes that node and nothing else.

use log::{debug, warn};

use crate::{
    analysis::{
        callgraph::{
            context::{CancellationToken, TraversalContext},
            options::WalkOptions,
            site::{extract_call_sites, CallSite},
            tree::{BodySummary, CallNode, NodeStatus, Traversal, TraversalFailure},
        },
        cfg::analyze_method_body,
    },
    metadata::{
        introspection::{MethodHandle, ModuleIntrospection, ModuleLocator},
        method::MethodIdentity,
    },
    Error,
};

/// What a child node starts from.
enum Target<Mod, M> {
    /// A call instruction that still has to be resolved in the calling module
    Site(CallSite, Mod),
    /// A method handle found through the introspection service
    Method(M),
}

/// Walks call graphs through a [`ModuleIntrospection`] service.
///
/// The walker itself is stateless between calls: each [`CallGraphWalker::walk`] gets a fresh
/// visited set and module cache.
///
/// # Examples
///
/// ```rust,ignore
/// use cilgraph::prelude::*;
///
/// let service = ManifestIntrospector::new(SearchPaths::default());
/// let walker = CallGraphWalker::new(&service, WalkOptions::default().max_depth(8));
/// let traversal = walker.walk(
///     &ModuleLocator::Path("app.json".into()),
///     "Contoso.Program",
///     "Main",
/// );
///
/// for node in traversal.nodes() {
///     println!("{}{}", "  ".repeat(node.depth), node.label);
/// }
/// ```
pub struct CallGraphWalker<'s, S: ModuleIntrospection> {
    service: &'s S,
    options: WalkOptions,
    cancellation: CancellationToken,
}

impl<'s, S: ModuleIntrospection> CallGraphWalker<'s, S> {
    /// Creates a walker over `service`.
    pub fn new(service: &'s S, options: WalkOptions) -> Self {
        CallGraphWalker {
            service,
            options,
            cancellation: CancellationToken::new(),
        }
    }

    /// Uses `token` to abort traversals from elsewhere.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    /// The configuration in use.
    pub fn options(&self) -> &WalkOptions {
        &self.options
    }

    /// A handle that cancels this walker's traversals.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation.clone()
    }

    /// Traverses the call graph rooted at `type_name.method_name` in the module at `locator`.
    ///
    /// This never fails as a whole. If the root itself cannot be found, the returned root node
    /// carries the failure.
    pub fn walk(&self, locator: &ModuleLocator, type_name: &str, method_name: &str) -> Traversal {
        let mut context = TraversalContext::new();
        let label = format!("{type_name}.{method_name}");

        let root = match self.find_root(&mut context, locator, type_name, method_name) {
            Ok(method) => self.visit(&mut context, Target::Method(method), 0, false),
            Err(failure) => {
                warn!("Cannot start traversal at {label}: {failure}");
                CallNode::new(label, 0, NodeStatus::Failed(failure))
            }
        };

        Traversal {
            root,
            modules_loaded: context.loaded_identities(),
            analyzed: context.analyzed,
            truncated: context.truncated,
        }
    }

    fn find_root(
        &self,
        context: &mut TraversalContext<S::Module>,
        locator: &ModuleLocator,
        type_name: &str,
        method_name: &str,
    ) -> Result<S::Method, TraversalFailure> {
        let module = context.load_root(self.service, locator)?;
        let ty = self
            .service
            .find_type(type_name, std::slice::from_ref(&module))
            .ok_or_else(|| TraversalFailure::TypeNotFound(type_name.to_string()))?;

        self.service
            .find_methods(&ty, method_name)
            .into_iter()
            .next()
            .ok_or_else(|| TraversalFailure::MethodNotFound {
                type_name: type_name.to_string(),
                method: method_name.to_string(),
            })
    }

    /// Builds the node for one target, recursing into its callees.
    fn visit(
        &self,
        context: &mut TraversalContext<S::Module>,
        target: Target<S::Module, S::Method>,
        depth: usize,
        via_continuation: bool,
    ) -> CallNode {
        let call_site = match &target {
            Target::Site(site, _) => Some(*site),
            Target::Method(_) => None,
        };
        let mut node = self.resolve(context, target, depth);
        node.call_site = call_site;
        node.via_continuation = via_continuation;
        node
    }

    fn resolve(
        &self,
        context: &mut TraversalContext<S::Module>,
        target: Target<S::Module, S::Method>,
        depth: usize,
    ) -> CallNode {
        let placeholder = match &target {
            Target::Site(site, _) => site.token.to_string(),
            Target::Method(method) => method.identity().qualified_name(),
        };

        if self.cancellation.is_cancelled() {
            context.truncated = true;
            return CallNode::new(placeholder, depth, NodeStatus::Cancelled);
        }
        if let Some(budget) = self.options.step_budget {
            if context.steps >= budget {
                context.truncated = true;
                return CallNode::new(placeholder, depth, NodeStatus::BudgetExhausted);
            }
        }

        let (identity, handle) = match target {
            Target::Site(site, _) if site.call_type.is_indirect() => {
                debug!("Indirect call at 0x{:04X}, not followed", site.offset);
                return CallNode::new(placeholder, depth, NodeStatus::Indirect);
            }
            Target::Site(site, caller) => {
                context.steps += 1;
                match self.service.resolve_method_token(&caller, site.token) {
                    Ok(identity) => (identity, None),
                    Err(error) => {
                        warn!("Unresolved call at 0x{:04X}: {error}", site.offset);
                        return CallNode::new(
                            placeholder,
                            depth,
                            NodeStatus::Failed(error.into()),
                        );
                    }
                }
            }
            Target::Method(method) => {
                context.steps += 1;
                (method.identity().clone(), Some(method))
            }
        };

        let mut node = CallNode::new(identity.qualified_name(), depth, NodeStatus::Expanded);
        node.method = Some(identity.clone());

        if self.options.is_leaf_type(&identity.declaring_type) {
            node.status = NodeStatus::SystemLeaf;
            return node;
        }
        if context.is_visited(&identity.key()) {
            node.status = NodeStatus::AlreadyAnalyzed;
            return node;
        }
        if depth >= self.options.max_depth {
            debug!("Depth limit reached at {identity}");
            context.truncated = true;
            node.status = NodeStatus::DepthExceeded;
            return node;
        }

        let method = match handle {
            Some(method) => method,
            None => match self.find_method(context, &identity) {
                Ok(method) => method,
                Err(failure) => {
                    warn!("Cannot follow {identity}: {failure}");
                    node.status = NodeStatus::Failed(failure);
                    return node;
                }
            },
        };

        if !context.mark_visited(method.identity().key()) {
            node.status = NodeStatus::AlreadyAnalyzed;
            return node;
        }
        context.mark_visited(identity.key());

        self.expand(context, &method, &mut node);
        node
    }

    /// Finds the method behind `identity`, loading its module on first use.
    fn find_method(
        &self,
        context: &mut TraversalContext<S::Module>,
        identity: &MethodIdentity,
    ) -> Result<S::Method, TraversalFailure> {
        let module = context.module(self.service, &identity.module)?;
        let ty = self
            .service
            .find_type(&identity.declaring_type, std::slice::from_ref(&module))
            .or_else(|| {
                self.service
                    .find_type(&identity.declaring_type, context.modules())
            })
            .ok_or_else(|| TraversalFailure::TypeNotFound(identity.declaring_type.clone()))?;

        let overloads = self.service.find_methods(&ty, &identity.name);
        let matching = identity.signature.as_ref().and_then(|signature| {
            overloads
                .iter()
                .position(|method| method.identity().signature.as_ref() == Some(signature))
        });

        overloads
            .into_iter()
            .nth(matching.unwrap_or(0))
            .ok_or_else(|| TraversalFailure::MethodNotFound {
                type_name: identity.declaring_type.clone(),
                method: identity.name.clone(),
            })
    }

    /// Analyzes the body of `method` and appends its callees to `node`.
    fn expand(
        &self,
        context: &mut TraversalContext<S::Module>,
        method: &S::Method,
        node: &mut CallNode,
    ) {
        let identity = method.identity();
        let Some(body) = self.service.method_body(method) else {
            debug!("{identity} has no body");
            node.status = NodeStatus::NoBody;
            return;
        };

        let analysis = match analyze_method_body(&body.code, body.regions, self.options.decode_mode)
        {
            Ok(analysis) => analysis,
            Err(Error::Decode(error)) => {
                warn!("Cannot decode {identity}: {error}");
                node.status = NodeStatus::Failed(TraversalFailure::Decode(error));
                return;
            }
            Err(error) => {
                warn!("Cannot analyze {identity}: {error}");
                node.status = NodeStatus::Failed(TraversalFailure::Analysis(error.to_string()));
                return;
            }
        };
        context.analyzed += 1;
        node.summary = Some(BodySummary::from(&analysis));
        debug!(
            "Analyzed {identity}: {} instructions, {} diagnostics",
            analysis.instruction_count(),
            analysis.diagnostics.len()
        );

        let module = match context.module(self.service, &identity.module) {
            Ok(module) => module,
            Err(error) => {
                node.status = NodeStatus::Failed(error.into());
                return;
            }
        };

        let depth = node.depth + 1;
        if self.options.expand_continuations && self.service.is_async_entry_point(method) {
            if let Some(step) = self.service.find_continuation_method(method) {
                debug!("Following state machine of {identity}");
                let child = self.visit(context, Target::Method(step), depth, true);
                node.children.push(child);
            }
        }

        for site in extract_call_sites(analysis.instructions()) {
            let child = self.visit(context, Target::Site(site, module.clone()), depth, false);
            node.children.push(child);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        assembly::DecodeMode,
        metadata::{
            manifest::{ManifestIntrospector, ModuleManifest},
            token::Token,
        },
        test::{IlBuilder, ModuleBuilder},
        LoadError,
    };

    fn walk(manifests: Vec<ModuleManifest>, options: WalkOptions) -> Traversal {
        let service = ManifestIntrospector::from_manifests(manifests);
        CallGraphWalker::new(&service, options).walk(
            &ModuleLocator::Name("App".into()),
            "App.Program",
            "Main",
        )
    }

    #[test]
    fn leaves_and_failures_do_not_stop_siblings() {
        let mut app = ModuleBuilder::new("App");
        let console = app.member_ref("System.Runtime", "System.Console", "WriteLine");
        let missing = app.member_ref("Gone", "Gone.Thing", "Do");
        app.bodiless("App.Program", "Abstract");
        app.method(
            "App.Program",
            "Main",
            IlBuilder::new()
                .call(console)
                .calli(0x1100_0001)
                .call(0x0A00_00FF)
                .call(missing)
                .call(0x0600_0001)
                .ret()
                .build(),
        );

        let traversal = walk(vec![app.build()], WalkOptions::default());
        let statuses: Vec<_> = traversal
            .root
            .children
            .iter()
            .map(|child| child.status.clone())
            .collect();

        assert_eq!(traversal.root.status, NodeStatus::Expanded);
        assert_eq!(statuses[0], NodeStatus::SystemLeaf);
        assert_eq!(statuses[1], NodeStatus::Indirect);
        assert!(matches!(
            statuses[2],
            NodeStatus::Failed(TraversalFailure::Resolution(_))
        ));
        assert!(matches!(
            statuses[3],
            NodeStatus::Failed(TraversalFailure::Load(_))
        ));
        assert_eq!(statuses[4], NodeStatus::NoBody);

        assert_eq!(traversal.root.children[2].label, "0x0a0000ff");
        assert_eq!(traversal.modules_loaded, vec!["App"]);
        assert_eq!(traversal.analyzed, 1);
        assert!(!traversal.truncated);
        assert_eq!(traversal.failures().len(), 2);
    }

    #[test]
    fn call_site_is_attached() {
        let mut app = ModuleBuilder::new("App");
        let helper = app.method("App.Program", "Helper", vec![0x2A]);
        app.method(
            "App.Program",
            "Main",
            IlBuilder::new().op(0x00).call(helper).ret().build(),
        );

        let traversal = walk(vec![app.build()], WalkOptions::default());
        let child = &traversal.root.children[0];

        assert_eq!(child.label, "App.Program.Helper");
        assert_eq!(child.depth, 1);
        let site = child.call_site.unwrap();
        assert_eq!(site.offset, 1);
        assert_eq!(site.token, Token::new(helper));
        assert_eq!(child.summary.map(|summary| summary.instructions), Some(1));
    }

    #[test]
    fn system_leaf_wins_over_visited() {
        let mut app = ModuleBuilder::new("App");
        let object = app.member_ref("System.Runtime", "System.Object", ".ctor");
        app.method(
            "App.Program",
            "Main",
            IlBuilder::new().call(object).call(object).ret().build(),
        );

        let traversal = walk(vec![app.build()], WalkOptions::default());
        assert!(traversal
            .root
            .children
            .iter()
            .all(|child| child.status == NodeStatus::SystemLeaf));
    }

    #[test]
    fn empty_leaf_list_expands_everything() {
        let mut app = ModuleBuilder::new("App");
        let console = app.member_ref("System.Runtime", "System.Console", "WriteLine");
        app.method("App.Program", "Main", IlBuilder::new().call(console).ret().build());

        let options = WalkOptions::default().leaf_namespaces(Vec::<String>::new());
        let traversal = walk(vec![app.build()], options);
        assert!(matches!(
            traversal.root.children[0].status,
            NodeStatus::Failed(TraversalFailure::Load(_))
        ));
    }

    #[test]
    fn budget_limits_resolution() {
        let mut app = ModuleBuilder::new("App");
        let a = app.method("App.Program", "A", vec![0x2A]);
        let b = app.method("App.Program", "B", vec![0x2A]);
        app.method(
            "App.Program",
            "Main",
            IlBuilder::new().call(a).call(b).ret().build(),
        );

        let traversal = walk(vec![app.build()], WalkOptions::default().step_budget(2));
        assert_eq!(traversal.root.children[0].status, NodeStatus::Expanded);
        assert_eq!(traversal.root.children[1].status, NodeStatus::BudgetExhausted);
        assert!(traversal.truncated);
    }

    #[test]
    fn missing_root() {
        let mut app = ModuleBuilder::new("App");
        app.method("App.Program", "Other", vec![0x2A]);

        let traversal = walk(vec![app.build()], WalkOptions::default());
        assert!(matches!(
            traversal.root.status,
            NodeStatus::Failed(TraversalFailure::MethodNotFound { .. })
        ));
        assert_eq!(traversal.root.label, "App.Program.Main");

        let traversal = walk(Vec::new(), WalkOptions::default());
        assert!(matches!(
            traversal.root.status,
            NodeStatus::Failed(TraversalFailure::Load(LoadError::NotFound { .. }))
        ));
        assert!(traversal.modules_loaded.is_empty());
    }

    #[test]
    fn strict_decode_failure_is_local() {
        let mut app = ModuleBuilder::new("App");
        let broken = app.method("App.Program", "Broken", vec![0x00, 0xA6, 0x2A]);
        let fine = app.method("App.Program", "Fine", vec![0x2A]);
        app.method(
            "App.Program",
            "Main",
            IlBuilder::new().call(broken).call(fine).ret().build(),
        );

        let strict = walk(
            vec![app.build()],
            WalkOptions::default().decode_mode(DecodeMode::Strict),
        );
        assert!(matches!(
            strict.root.children[0].status,
            NodeStatus::Failed(TraversalFailure::Decode(_))
        ));
        assert_eq!(strict.root.children[1].status, NodeStatus::Expanded);
    }

    #[test]
    fn permissive_decode_counts_diagnostics() {
        let mut app = ModuleBuilder::new("App");
        app.method("App.Program", "Main", vec![0x00, 0xA6, 0x2A]);

        let traversal = walk(vec![app.build()], WalkOptions::default());
        let summary = traversal.root.summary.unwrap();
        assert_eq!(summary.instructions, 2);
        assert_eq!(summary.diagnostics, 1);
    }
}
