//! Call graph traversal over in-memory manifests, using only the public API.

use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Mutex,
};

use cilgraph::{
    analysis::callgraph::{
        CallGraphWalker, CallNode, CancellationToken, NodeStatus, TraversalFailure, WalkOptions,
    },
    metadata::{
        introspection::{ModuleIntrospection, ModuleLocator},
        manifest::{
            ManifestIntrospector, ManifestMethod, ManifestModule, ManifestType, MemberRefEntry,
            MethodEntry, ModuleManifest, TypeEntry,
        },
        method::{MethodBody, MethodIdentity},
        token::Token,
    },
    LoadError, ResolutionError,
};

/// `call` for each token, then `ret`.
fn calls(tokens: &[u32]) -> Vec<u8> {
    let mut code = Vec::with_capacity(tokens.len() * 5 + 1);
    for token in tokens {
        code.push(0x28);
        code.extend_from_slice(&token.to_le_bytes());
    }
    code.push(0x2A);
    code
}

fn method_def(row: u32) -> u32 {
    0x0600_0000 | row
}

/// A manifest under construction; method rows are assigned in insertion order.
struct Module {
    manifest: ModuleManifest,
}

impl Module {
    fn new(name: &str) -> Self {
        Module {
            manifest: ModuleManifest {
                name: name.to_string(),
                types: Vec::new(),
                member_refs: Vec::new(),
            },
        }
    }

    fn next_token(&self) -> Token {
        let rows: usize = self.manifest.types.iter().map(|ty| ty.methods.len()).sum();
        Token::new(method_def(rows as u32 + 1))
    }

    fn add(&mut self, type_name: &str, entry: MethodEntry) -> u32 {
        let token = entry.token.value();
        match self
            .manifest
            .types
            .iter_mut()
            .find(|ty| ty.name == type_name)
        {
            Some(ty) => ty.methods.push(entry),
            None => self.manifest.types.push(TypeEntry {
                name: type_name.to_string(),
                methods: vec![entry],
            }),
        }
        token
    }

    fn method(&mut self, type_name: &str, name: &str, code: Vec<u8>) -> u32 {
        let token = self.next_token();
        self.add(type_name, MethodEntry::new(name, token, code))
    }

    fn import(&mut self, module: &str, type_name: &str, name: &str) -> u32 {
        let token = Token::new(0x0A00_0001 + self.manifest.member_refs.len() as u32);
        self.manifest.member_refs.push(MemberRefEntry {
            token,
            module: Some(module.to_string()),
            declaring_type: type_name.to_string(),
            name: name.to_string(),
            signature: None,
        });
        token.value()
    }
}

/// Records module loads and can cancel a traversal after a number of token resolutions.
struct Recording {
    inner: ManifestIntrospector,
    loads: Mutex<Vec<String>>,
    resolutions: AtomicUsize,
    cancel_after: Option<(usize, CancellationToken)>,
}

impl Recording {
    fn new(modules: Vec<Module>) -> Self {
        Recording {
            inner: ManifestIntrospector::from_manifests(modules.into_iter().map(|m| m.manifest)),
            loads: Mutex::new(Vec::new()),
            resolutions: AtomicUsize::new(0),
            cancel_after: None,
        }
    }

    fn cancel_after(mut self, resolutions: usize, token: CancellationToken) -> Self {
        self.cancel_after = Some((resolutions, token));
        self
    }

    fn loads(&self) -> Vec<String> {
        self.loads.lock().unwrap().clone()
    }
}

impl ModuleIntrospection for Recording {
    type Module = ManifestModule;
    type Type = ManifestType;
    type Method = ManifestMethod;

    fn load_module(&self, locator: &ModuleLocator) -> Result<ManifestModule, LoadError> {
        self.loads.lock().unwrap().push(locator.to_string());
        self.inner.load_module(locator)
    }

    fn resolve_method_token(
        &self,
        module: &ManifestModule,
        token: Token,
    ) -> Result<MethodIdentity, ResolutionError> {
        let count = self.resolutions.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some((limit, cancellation)) = &self.cancel_after {
            if count >= *limit {
                cancellation.cancel();
            }
        }
        self.inner.resolve_method_token(module, token)
    }

    fn find_type(&self, name: &str, scope: &[ManifestModule]) -> Option<ManifestType> {
        self.inner.find_type(name, scope)
    }

    fn find_methods(&self, ty: &ManifestType, name: &str) -> Vec<ManifestMethod> {
        self.inner.find_methods(ty, name)
    }

    fn method_body(&self, method: &ManifestMethod) -> Option<MethodBody> {
        self.inner.method_body(method)
    }

    fn is_async_entry_point(&self, method: &ManifestMethod) -> bool {
        self.inner.is_async_entry_point(method)
    }

    fn find_continuation_method(&self, method: &ManifestMethod) -> Option<ManifestMethod> {
        self.inner.find_continuation_method(method)
    }
}

fn app() -> ModuleLocator {
    ModuleLocator::Name("App".to_string())
}

fn labels(nodes: &[CallNode]) -> Vec<&str> {
    nodes.iter().map(|node| node.label.as_str()).collect()
}

#[test]
fn mutual_recursion_terminates() {
    let mut module = Module::new("App");
    // Main (row 1) calls Ping (row 2), Ping calls Pong (row 3), Pong calls Ping and Main
    module.method("App.Program", "Main", calls(&[method_def(2)]));
    module.method("App.Program", "Ping", calls(&[method_def(3)]));
    module.method(
        "App.Program",
        "Pong",
        calls(&[method_def(2), method_def(1)]),
    );

    let service = Recording::new(vec![module]);
    let traversal = CallGraphWalker::new(&service, WalkOptions::default()).walk(
        &app(),
        "App.Program",
        "Main",
    );

    assert_eq!(traversal.analyzed, 3);
    let expanded: Vec<&str> = traversal
        .nodes()
        .filter(|node| node.status == NodeStatus::Expanded)
        .map(|node| node.label.as_str())
        .collect();
    assert_eq!(
        expanded,
        vec!["App.Program.Main", "App.Program.Ping", "App.Program.Pong"]
    );

    let pong = traversal.root.find("App.Program.Pong").unwrap();
    assert!(pong
        .children
        .iter()
        .all(|child| child.status == NodeStatus::AlreadyAnalyzed));
    assert!(!traversal.truncated);
}

#[test]
fn recursion_terminates_at_any_depth_limit() {
    let mut module = Module::new("App");
    module.method("App.Program", "Main", calls(&[method_def(2)]));
    module.method("App.Program", "Ping", calls(&[method_def(3)]));
    module.method(
        "App.Program",
        "Pong",
        calls(&[method_def(2), method_def(1)]),
    );
    let service = Recording::new(vec![module]);

    for max_depth in [1, 2, 3, 64, usize::MAX] {
        let options = WalkOptions::default().max_depth(max_depth);
        let traversal =
            CallGraphWalker::new(&service, options).walk(&app(), "App.Program", "Main");

        let mut expanded: Vec<&str> = traversal
            .nodes()
            .filter(|node| node.status == NodeStatus::Expanded)
            .map(|node| node.label.as_str())
            .collect();
        assert_eq!(expanded.len(), max_depth.min(3), "max_depth {max_depth}");
        expanded.sort_unstable();
        expanded.dedup();
        assert_eq!(expanded.len(), max_depth.min(3), "max_depth {max_depth}");
        assert_eq!(traversal.analyzed, max_depth.min(3));
        assert!(traversal.nodes().count() <= 5);
    }
}

#[test]
fn depth_limit_truncates_long_chains() {
    const CHAIN: u32 = 25;

    let mut module = Module::new("App");
    for row in 1..=CHAIN {
        let code = if row < CHAIN {
            calls(&[method_def(row + 1)])
        } else {
            calls(&[])
        };
        module.method("App.Chain", &format!("Step{row}"), code);
    }

    let service = Recording::new(vec![module]);
    let traversal = CallGraphWalker::new(&service, WalkOptions::default().max_depth(20)).walk(
        &app(),
        "App.Chain",
        "Step1",
    );

    assert_eq!(traversal.root.max_depth(), 20);
    assert_eq!(traversal.root.node_count(), 21);
    assert_eq!(traversal.analyzed, 20);
    assert!(traversal.truncated);

    let deepest: Vec<&CallNode> = traversal.nodes().filter(|node| node.depth == 20).collect();
    assert_eq!(deepest.len(), 1);
    assert_eq!(deepest[0].status, NodeStatus::DepthExceeded);
    assert_eq!(deepest[0].label, "App.Chain.Step21");
    assert!(deepest[0].children.is_empty());
}

#[test]
fn unresolvable_call_does_not_stop_siblings() {
    let mut module = Module::new("App");
    module.method(
        "App.Program",
        "Main",
        calls(&[method_def(2), 0x0A00_0042, method_def(3)]),
    );
    module.method("App.Program", "First", calls(&[]));
    module.method("App.Program", "Last", calls(&[]));

    let service = Recording::new(vec![module]);
    let traversal = CallGraphWalker::new(&service, WalkOptions::default()).walk(
        &app(),
        "App.Program",
        "Main",
    );

    let children = &traversal.root.children;
    assert_eq!(children.len(), 3);
    assert_eq!(children[0].status, NodeStatus::Expanded);
    assert!(matches!(
        children[1].status,
        NodeStatus::Failed(TraversalFailure::Resolution(_))
    ));
    assert_eq!(children[2].status, NodeStatus::Expanded);
    assert_eq!(children[2].label, "App.Program.Last");
    assert_eq!(traversal.failures().len(), 1);
}

#[test]
fn modules_load_lazily_and_once() {
    let mut core = Module::new("Core");
    core.method("Core.Service", "Start", calls(&[]));
    core.method("Core.Service", "Stop", calls(&[]));

    let mut plugins = Module::new("Plugins");
    plugins.method("Plugins.Entry", "Init", calls(&[]));

    let mut app_module = Module::new("App");
    let start = app_module.import("Core", "Core.Service", "Start");
    let stop = app_module.import("Core", "Core.Service", "Stop");
    app_module.method("App.Program", "Main", calls(&[start, stop]));

    let service = Recording::new(vec![app_module, core, plugins]);
    let traversal = CallGraphWalker::new(&service, WalkOptions::default()).walk(
        &app(),
        "App.Program",
        "Main",
    );

    assert_eq!(service.loads(), vec!["App", "Core"]);
    assert_eq!(traversal.modules_loaded, vec!["App", "Core"]);
    assert_eq!(
        labels(&traversal.root.children),
        vec!["Core.Service.Start", "Core.Service.Stop"]
    );
    assert!(traversal
        .root
        .children
        .iter()
        .all(|child| child.status == NodeStatus::Expanded));
}

#[test]
fn missing_module_is_reported_once_per_traversal() {
    let mut app_module = Module::new("App");
    let first = app_module.import("Missing", "Missing.Api", "First");
    let second = app_module.import("Missing", "Missing.Api", "Second");
    app_module.method("App.Program", "Main", calls(&[first, second]));

    let service = Recording::new(vec![app_module]);
    let traversal = CallGraphWalker::new(&service, WalkOptions::default()).walk(
        &app(),
        "App.Program",
        "Main",
    );

    assert_eq!(service.loads(), vec!["App", "Missing"]);
    for child in &traversal.root.children {
        assert!(matches!(
            child.status,
            NodeStatus::Failed(TraversalFailure::Load(LoadError::NotFound { .. }))
        ));
    }
}

#[test]
fn async_continuation_comes_first() {
    let mut module = Module::new("App");
    let log = module.import("System.Runtime", "System.Console", "WriteLine");
    let main = module.next_token();
    module.add(
        "App.Program",
        MethodEntry::new("Main", main, calls(&[method_def(2)])),
    );

    let mut run = MethodEntry::new("RunAsync", module.next_token(), calls(&[log]));
    run.is_async = true;
    module.add("App.Program", run);
    module.method(
        "App.Program+<RunAsync>d__1",
        "MoveNext",
        calls(&[method_def(4)]),
    );
    module.method("App.Program", "Work", calls(&[]));

    let service = Recording::new(vec![module]);
    let traversal = CallGraphWalker::new(&service, WalkOptions::default()).walk(
        &app(),
        "App.Program",
        "Main",
    );

    let run = &traversal.root.children[0];
    assert_eq!(run.label, "App.Program.RunAsync");
    assert_eq!(run.children.len(), 2);
    assert!(run.children[0].via_continuation);
    assert_eq!(run.children[0].label, "App.Program+<RunAsync>d__1.MoveNext");
    assert_eq!(run.children[0].status, NodeStatus::Expanded);
    assert_eq!(labels(&run.children[0].children), vec!["App.Program.Work"]);
    assert!(!run.children[1].via_continuation);
    assert_eq!(run.children[1].status, NodeStatus::SystemLeaf);

    let without = CallGraphWalker::new(&service, WalkOptions::default().expand_continuations(false))
        .walk(&app(), "App.Program", "Main");
    let run = &without.root.children[0];
    assert_eq!(run.children.len(), 1);
    assert_eq!(run.children[0].status, NodeStatus::SystemLeaf);
}

#[test]
fn cancellation_stops_before_the_next_method() {
    let mut module = Module::new("App");
    module.method(
        "App.Program",
        "Main",
        calls(&[method_def(2), method_def(3), method_def(4)]),
    );
    module.method("App.Program", "A", calls(&[]));
    module.method("App.Program", "B", calls(&[]));
    module.method("App.Program", "C", calls(&[]));

    let token = CancellationToken::new();
    let service = Recording::new(vec![module]).cancel_after(1, token.clone());
    let traversal = CallGraphWalker::new(&service, WalkOptions::default())
        .with_cancellation(token)
        .walk(&app(), "App.Program", "Main");

    let statuses: Vec<&NodeStatus> = traversal
        .root
        .children
        .iter()
        .map(|child| &child.status)
        .collect();
    assert_eq!(
        statuses,
        vec![
            &NodeStatus::Expanded,
            &NodeStatus::Cancelled,
            &NodeStatus::Cancelled
        ]
    );
    assert!(traversal.truncated);
    assert_eq!(traversal.analyzed, 2);
}

#[test]
fn system_calls_are_leaves() {
    let mut module = Module::new("App");
    let write = module.import("System.Runtime", "System.Console", "WriteLine");
    let ctor = module.import("System.Runtime", "System.Object", ".ctor");
    let own = module.import("App", "App.Systematic", "Run");
    module.method("App.Program", "Main", calls(&[write, ctor, own]));
    module.method("App.Systematic", "Run", calls(&[]));

    let service = Recording::new(vec![module]);
    let traversal = CallGraphWalker::new(&service, WalkOptions::default()).walk(
        &app(),
        "App.Program",
        "Main",
    );

    let children = &traversal.root.children;
    assert_eq!(children[0].status, NodeStatus::SystemLeaf);
    assert_eq!(children[1].status, NodeStatus::SystemLeaf);
    assert_eq!(children[2].status, NodeStatus::Expanded);
    assert_eq!(service.loads(), vec!["App"]);
}

#[test]
fn traversal_serializes_to_json() {
    let mut module = Module::new("App");
    module.method("App.Program", "Main", calls(&[0x0A00_0042]));

    let service = Recording::new(vec![module]);
    let traversal = CallGraphWalker::new(&service, WalkOptions::default()).walk(
        &app(),
        "App.Program",
        "Main",
    );

    let json = serde_json::to_value(&traversal).unwrap();
    assert_eq!(json["root"]["status"], "expanded");
    assert_eq!(json["root"]["children"][0]["status"], "failed");
    assert_eq!(json["modules_loaded"][0], "App");
}
