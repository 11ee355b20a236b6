//! The module introspection service.
//!
//! Everything the call graph walker needs to know about modules goes through the
//! [`ModuleIntrospection`] trait: loading modules, resolving tokens to method identities,
//! finding types and methods, and fetching method bodies. The walker itself never touches a
//! file or a metadata table, which keeps it testable against in-memory fakes.
//!
//! [`crate::metadata::manifest::ManifestIntrospector`] is the implementation shipped with this
//! crate.

use std::{fmt, path::PathBuf};

use crate::{
    metadata::{
        method::{MethodBody, MethodIdentity},
        token::Token,
    },
    LoadError, ResolutionError,
};

/// Where to find a module.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ModuleLocator {
    /// An explicit file
    Path(PathBuf),
    /// A module name, looked up through the service's resolution order
    Name(String),
}

impl fmt::Display for ModuleLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModuleLocator::Path(path) => write!(f, "{}", path.display()),
            ModuleLocator::Name(name) => f.write_str(name),
        }
    }
}

/// A loaded module. Handles are cheap to clone and share the underlying module.
pub trait ModuleHandle: Clone {
    /// Stable identity of the module, as used in [`MethodIdentity::module`].
    fn identity(&self) -> &str;
}

/// A method found through [`ModuleIntrospection::find_methods`].
pub trait MethodHandle: Clone {
    /// Symbolic identity of the method.
    fn identity(&self) -> &MethodIdentity;
}

/// Access to modules, types, methods and method bodies.
///
/// All operations take `&self`; implementations that cache do so internally. The walker keeps
/// its own per-traversal module cache and calls [`ModuleIntrospection::load_module`] at most
/// once per module and traversal.
pub trait ModuleIntrospection {
    /// Loaded module
    type Module: ModuleHandle;
    /// Type within a module
    type Type: Clone;
    /// Method within a type
    type Method: MethodHandle;

    /// Loads the module at `locator`. Loading the same locator twice yields the same module.
    ///
    /// # Errors
    /// [`LoadError::NotFound`] if no source knows the module, [`LoadError::Failed`] if it
    /// exists but cannot be read.
    fn load_module(&self, locator: &ModuleLocator) -> Result<Self::Module, LoadError>;

    /// Maps a method token used inside `module` to the identity of the method it names.
    ///
    /// # Errors
    /// [`ResolutionError::TokenUnresolvable`] if the token does not name a method.
    fn resolve_method_token(
        &self,
        module: &Self::Module,
        token: Token,
    ) -> Result<MethodIdentity, ResolutionError>;

    /// Finds a type by its fully qualified name, searching `scope` in order.
    fn find_type(&self, name: &str, scope: &[Self::Module]) -> Option<Self::Type>;

    /// All methods of `ty` called `name`, in declaration order.
    fn find_methods(&self, ty: &Self::Type, name: &str) -> Vec<Self::Method>;

    /// Code and protected regions of `method`, or `None` if it has no body.
    fn method_body(&self, method: &Self::Method) -> Option<MethodBody>;

    /// Returns `true` if `method` is a compiler-generated asynchronous entry point.
    fn is_async_entry_point(&self, method: &Self::Method) -> bool;

    /// The state machine step method (`MoveNext`) belonging to an asynchronous entry point.
    fn find_continuation_method(&self, method: &Self::Method) -> Option<Self::Method>;
}
