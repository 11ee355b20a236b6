//! Stable, symbolic names for methods across modules.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Identity of a method as resolved through the introspection service.
///
/// The identity is symbolic: it names the module, declaring type and method rather than a
/// token, so it stays meaningful across module boundaries.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MethodIdentity {
    /// Identity of the module declaring the method
    pub module: String,
    /// Fully qualified name of the declaring type
    pub declaring_type: String,
    /// Method name
    pub name: String,
    /// Signature text used to tell overloads apart, if known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
}

impl MethodIdentity {
    /// Creates an identity without overload information.
    pub fn new(
        module: impl Into<String>,
        declaring_type: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        MethodIdentity {
            module: module.into(),
            declaring_type: declaring_type.into(),
            name: name.into(),
            signature: None,
        }
    }

    /// Attaches an overload signature.
    #[must_use]
    pub fn with_signature(mut self, signature: impl Into<String>) -> Self {
        self.signature = Some(signature.into());
        self
    }

    /// `Type.Method`, the form used in call trees.
    #[must_use]
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.declaring_type, self.name)
    }

    /// Key under which a traversal remembers this method as visited.
    #[must_use]
    pub fn key(&self) -> VisitedMethodKey {
        VisitedMethodKey {
            declaring_type: self.declaring_type.clone(),
            method: self.name.clone(),
            overload: self.signature.clone().unwrap_or_default(),
        }
    }
}

impl fmt::Display for MethodIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.declaring_type, self.name)?;
        if let Some(signature) = &self.signature {
            write!(f, "{signature}")?;
        }
        Ok(())
    }
}

/// Cycle detection key: `(declaring type, method name, overload disambiguator)`.
///
/// The module is deliberately absent, so the same type reached through two modules counts as
/// one method.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VisitedMethodKey {
    /// Fully qualified declaring type
    pub declaring_type: String,
    /// Method name
    pub method: String,
    /// Overload signature, empty when unknown
    pub overload: String,
}
