//! [`ModuleIntrospection`] over module manifests.

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::Arc,
};

use dashmap::DashMap;

use crate::{
    metadata::{
        introspection::{MethodHandle, ModuleHandle, ModuleIntrospection, ModuleLocator},
        manifest::{
            model::{MethodEntry, ModuleManifest},
            sources::{read_manifest, MemorySource, ModuleSource, SearchPaths},
        },
        method::{ExceptionHandler, MethodBody, MethodIdentity},
        token::Token,
    },
    LoadError, ResolutionError,
};

/// Name of the step method of compiler-generated state machines.
const STATE_MACHINE_STEP: &str = "MoveNext";

/// A loaded manifest, validated and indexed.
#[derive(Debug)]
struct LoadedModule {
    name: String,
    origin: Option<PathBuf>,
    types: Vec<LoadedType>,
    member_refs: HashMap<Token, MethodIdentity>,
}

#[derive(Debug)]
struct LoadedType {
    name: String,
    methods: Vec<LoadedMethod>,
}

#[derive(Debug)]
struct LoadedMethod {
    identity: MethodIdentity,
    token: Token,
    body: Option<MethodBody>,
    is_async: bool,
    state_machine: Option<String>,
}

impl LoadedModule {
    fn from_manifest(
        manifest: ModuleManifest,
        origin: Option<PathBuf>,
        locator: &str,
    ) -> Result<Self, LoadError> {
        let failed = |reason: String| LoadError::Failed {
            locator: locator.to_string(),
            reason,
        };

        let mut types = Vec::with_capacity(manifest.types.len());
        for ty in manifest.types {
            let mut methods = Vec::with_capacity(ty.methods.len());
            for method in ty.methods {
                let body = load_body(&method)
                    .map_err(|error| failed(format!("{}.{}: {error}", ty.name, method.name)))?;

                let mut identity = MethodIdentity::new(&manifest.name, &ty.name, &method.name);
                identity.signature = method.signature;
                methods.push(LoadedMethod {
                    identity,
                    token: method.token,
                    body,
                    is_async: method.is_async,
                    state_machine: method.state_machine,
                });
            }
            types.push(LoadedType {
                name: ty.name,
                methods,
            });
        }

        let member_refs = manifest
            .member_refs
            .into_iter()
            .map(|entry| {
                let mut identity = MethodIdentity::new(
                    entry.module.unwrap_or_else(|| manifest.name.clone()),
                    entry.declaring_type,
                    entry.name,
                );
                identity.signature = entry.signature;
                (entry.token, identity)
            })
            .collect();

        Ok(LoadedModule {
            name: manifest.name,
            origin,
            types,
            member_refs,
        })
    }

    fn method_by_token(&self, token: Token) -> Option<&LoadedMethod> {
        self.types
            .iter()
            .flat_map(|ty| ty.methods.iter())
            .find(|method| method.token == token)
    }

    fn type_index(&self, name: &str) -> Option<usize> {
        self.types.iter().position(|ty| ty.name == name)
    }
}

fn load_body(method: &MethodEntry) -> crate::Result<Option<MethodBody>> {
    let Some(code) = &method.body else {
        return Ok(None);
    };
    let bytes = code.to_bytes()?;

    if method.has_header {
        return MethodBody::parse(&bytes).map(Some);
    }

    let handlers: Vec<ExceptionHandler> = method
        .exception_handlers
        .iter()
        .map(ExceptionHandler::from)
        .collect();
    Ok(Some(MethodBody::new(bytes, &handlers)))
}

/// A module loaded from a manifest. Clones share the module.
#[derive(Debug, Clone)]
pub struct ManifestModule(Arc<LoadedModule>);

impl ManifestModule {
    /// Module name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.0.name
    }

    /// File the module was read from, if any.
    #[must_use]
    pub fn origin(&self) -> Option<&Path> {
        self.0.origin.as_deref()
    }

    /// Names of all types, in manifest order.
    pub fn type_names(&self) -> impl Iterator<Item = &str> {
        self.0.types.iter().map(|ty| ty.name.as_str())
    }

    /// All methods of the module, in manifest order.
    #[must_use]
    pub fn methods(&self) -> Vec<ManifestMethod> {
        self.0
            .types
            .iter()
            .enumerate()
            .flat_map(|(type_index, ty)| {
                (0..ty.methods.len()).map(move |method_index| (type_index, method_index))
            })
            .map(|(type_index, method_index)| ManifestMethod {
                module: self.clone(),
                type_index,
                method_index,
            })
            .collect()
    }
}

impl ModuleHandle for ManifestModule {
    fn identity(&self) -> &str {
        &self.0.name
    }
}

/// A type within a [`ManifestModule`].
#[derive(Debug, Clone)]
pub struct ManifestType {
    module: ManifestModule,
    index: usize,
}

impl ManifestType {
    /// Fully qualified type name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.module.0.types[self.index].name
    }
}

/// A method within a [`ManifestModule`].
#[derive(Debug, Clone)]
pub struct ManifestMethod {
    module: ManifestModule,
    type_index: usize,
    method_index: usize,
}

impl ManifestMethod {
    fn entry(&self) -> &LoadedMethod {
        &self.module.0.types[self.type_index].methods[self.method_index]
    }

    /// MethodDef token.
    #[must_use]
    pub fn token(&self) -> Token {
        self.entry().token
    }

    /// The declaring module.
    #[must_use]
    pub fn module(&self) -> &ManifestModule {
        &self.module
    }
}

impl MethodHandle for ManifestMethod {
    fn identity(&self) -> &MethodIdentity {
        &self.entry().identity
    }
}

/// Module introspection backed by JSON module manifests.
///
/// Named modules are looked up in the registered sources, in registration order. Every
/// module is parsed once and cached for the lifetime of the introspector.
///
/// # Examples
///
/// ```rust
/// use cilgraph::metadata::introspection::{ModuleIntrospection, ModuleLocator};
/// use cilgraph::metadata::manifest::{ManifestIntrospector, ModuleManifest};
///
/// let manifest = ModuleManifest::from_json(r#"{
///     "name": "App",
///     "types": [{ "name": "App.Program", "methods": [
///         { "name": "Main", "token": "0x06000001", "body": "2A" }
///     ]}]
/// }"#)?;
///
/// let service = ManifestIntrospector::from_manifests([manifest]);
/// let module = service.load_module(&ModuleLocator::Name("App".into()))?;
/// let program = service.find_type("App.Program", &[module]).unwrap();
/// let main = &service.find_methods(&program, "Main")[0];
///
/// assert_eq!(service.method_body(main).unwrap().code, vec![0x2A]);
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Default)]
pub struct ManifestIntrospector {
    sources: Vec<Box<dyn ModuleSource>>,
    cache: DashMap<String, ManifestModule>,
}

impl ManifestIntrospector {
    /// An introspector without sources; only explicit paths can be loaded.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// An introspector over in-memory manifests.
    pub fn from_manifests(manifests: impl IntoIterator<Item = ModuleManifest>) -> Self {
        Self::new().with_source(manifests.into_iter().collect::<MemorySource>())
    }

    /// Appends one directory source per search path.
    #[must_use]
    pub fn with_search_paths(mut self, paths: &SearchPaths) -> Self {
        for source in paths.sources() {
            self.add_source(source);
        }
        self
    }

    /// Appends `source` to the lookup order.
    #[must_use]
    pub fn with_source(mut self, source: impl ModuleSource + 'static) -> Self {
        self.add_source(source);
        self
    }

    /// Appends `source` to the lookup order.
    pub fn add_source(&mut self, source: impl ModuleSource + 'static) {
        self.sources.push(Box::new(source));
    }

    /// Descriptions of the registered sources, in lookup order.
    #[must_use]
    pub fn source_descriptions(&self) -> Vec<String> {
        self.sources.iter().map(|source| source.describe()).collect()
    }

    /// Number of modules parsed so far.
    #[must_use]
    pub fn cached_modules(&self) -> usize {
        self.cache.len()
    }

    fn remember(&self, module: LoadedModule) -> ManifestModule {
        let name = module.name.clone();
        self.cache
            .entry(name)
            .or_insert_with(|| ManifestModule(Arc::new(module)))
            .value()
            .clone()
    }

    fn load_by_name(&self, name: &str) -> Result<ManifestModule, LoadError> {
        if let Some(module) = self.cache.get(name) {
            return Ok(module.value().clone());
        }

        let mut first_error = None;
        for source in &self.sources {
            let loaded = source.fetch(name).and_then(|manifest| match manifest {
                None => Ok(None),
                Some(manifest) if manifest.name != name => Err(LoadError::Failed {
                    locator: name.to_string(),
                    reason: format!(
                        "{} holds module '{}' instead",
                        source.describe(),
                        manifest.name
                    ),
                }),
                Some(manifest) => LoadedModule::from_manifest(manifest, None, name).map(Some),
            });

            match loaded {
                Ok(Some(module)) => {
                    log::debug!("Found module {name} in {}", source.describe());
                    return Ok(self.remember(module));
                }
                Ok(None) => {}
                Err(error) => {
                    log::warn!("Skipping {} for module {name}: {error}", source.describe());
                    first_error.get_or_insert(error);
                }
            }
        }

        Err(first_error.unwrap_or_else(|| LoadError::NotFound {
            locator: name.to_string(),
        }))
    }

    fn load_by_path(&self, path: &Path) -> Result<ManifestModule, LoadError> {
        let manifest = read_manifest(path)?;
        if let Some(module) = self.cache.get(&manifest.name) {
            return Ok(module.value().clone());
        }

        let locator = path.display().to_string();
        let module = LoadedModule::from_manifest(manifest, Some(path.to_path_buf()), &locator)?;
        Ok(self.remember(module))
    }
}

impl ModuleIntrospection for ManifestIntrospector {
    type Module = ManifestModule;
    type Type = ManifestType;
    type Method = ManifestMethod;

    fn load_module(&self, locator: &ModuleLocator) -> Result<ManifestModule, LoadError> {
        match locator {
            ModuleLocator::Path(path) => self.load_by_path(path),
            ModuleLocator::Name(name) => self.load_by_name(name),
        }
    }

    fn resolve_method_token(
        &self,
        module: &ManifestModule,
        token: Token,
    ) -> Result<MethodIdentity, ResolutionError> {
        let unresolvable = |reason: &str| ResolutionError::TokenUnresolvable {
            token,
            reason: reason.to_string(),
        };

        match token.table() {
            Token::METHOD_DEF => module
                .0
                .method_by_token(token)
                .map(|method| method.identity.clone())
                .ok_or_else(|| unresolvable("no such method definition")),
            Token::MEMBER_REF | Token::METHOD_SPEC => module
                .0
                .member_refs
                .get(&token)
                .cloned()
                .ok_or_else(|| unresolvable("no such member reference")),
            _ => Err(unresolvable("not a method token")),
        }
    }

    fn find_type(&self, name: &str, scope: &[ManifestModule]) -> Option<ManifestType> {
        scope.iter().find_map(|module| {
            module.0.type_index(name).map(|index| ManifestType {
                module: module.clone(),
                index,
            })
        })
    }

    fn find_methods(&self, ty: &ManifestType, name: &str) -> Vec<ManifestMethod> {
        ty.module.0.types[ty.index]
            .methods
            .iter()
            .enumerate()
            .filter(|(_, method)| method.identity.name == name)
            .map(|(method_index, _)| ManifestMethod {
                module: ty.module.clone(),
                type_index: ty.index,
                method_index,
            })
            .collect()
    }

    fn method_body(&self, method: &ManifestMethod) -> Option<MethodBody> {
        method.entry().body.clone()
    }

    fn is_async_entry_point(&self, method: &ManifestMethod) -> bool {
        method.entry().is_async
    }

    fn find_continuation_method(&self, method: &ManifestMethod) -> Option<ManifestMethod> {
        let entry = method.entry();
        let module = &method.module;
        let declaring = &entry.identity.declaring_type;

        let type_index = match &entry.state_machine {
            Some(name) => module.0.type_index(name).or_else(|| {
                module
                    .0
                    .types
                    .iter()
                    .position(|ty| {
                        is_nested_in(&ty.name, declaring) && simple_name(&ty.name) == name.as_str()
                    })
            }),
            None => {
                let prefix = format!("<{}>d__", entry.identity.name);
                module.0.types.iter().position(|ty| {
                    is_nested_in(&ty.name, declaring) && simple_name(&ty.name).starts_with(&prefix)
                })
            }
        }?;

        let state_machine = ManifestType {
            module: module.clone(),
            index: type_index,
        };
        self.find_methods(&state_machine, STATE_MACHINE_STEP)
            .into_iter()
            .next()
    }
}

/// Last segment of a nested type name (`Outer+Inner`, `Outer/Inner`).
fn simple_name(type_name: &str) -> &str {
    type_name.rsplit(['+', '/']).next().unwrap_or(type_name)
}

fn is_nested_in(type_name: &str, outer: &str) -> bool {
    type_name
        .strip_prefix(outer)
        .is_some_and(|rest| rest.starts_with('+') || rest.starts_with('/'))
}
