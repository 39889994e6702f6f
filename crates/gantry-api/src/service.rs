//! Service Definitions
//!
//! Plain-value descriptions of a service and its callable functions,
//! supplied explicitly at registration time. Addins build these in their
//! entry function; the host builds one for the reserved system service.

use std::sync::Arc;

use crate::meta::InputMetaData;

/// A callable function body
///
/// Handlers are synchronous string-to-string functions. They must not
/// call back into registration APIs; calling other host surfaces (the
/// lifecycle manager, the registry's read side) is allowed.
pub type Handler = Arc<dyn Fn(&str) -> anyhow::Result<String> + Send + Sync>;

/// Definition of a single function within a service
#[derive(Clone)]
pub struct FunctionDef {
    pub name: String,
    pub inputs: Vec<InputMetaData>,
    pub handler: Handler,
}

impl FunctionDef {
    /// Create a function definition from a name and handler
    pub fn new(
        name: impl Into<String>,
        handler: impl Fn(&str) -> anyhow::Result<String> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            inputs: Vec::new(),
            handler: Arc::new(handler),
        }
    }

    /// Declare an input for discovery metadata
    pub fn input(mut self, input: InputMetaData) -> Self {
        self.inputs.push(input);
        self
    }
}

/// Definition of a service: a named group of functions
#[derive(Clone, Default)]
pub struct ServiceDef {
    pub name: String,
    pub functions: Vec<FunctionDef>,
}

impl ServiceDef {
    /// Create an empty service definition
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            functions: Vec::new(),
        }
    }

    /// Add a function to the service
    pub fn function(mut self, function: FunctionDef) -> Self {
        self.functions.push(function);
        self
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Debug implementations
// ─────────────────────────────────────────────────────────────────────────────

impl std::fmt::Debug for FunctionDef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FunctionDef")
            .field("name", &self.name)
            .field("inputs", &self.inputs)
            .finish()
    }
}

impl std::fmt::Debug for ServiceDef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceDef")
            .field("name", &self.name)
            .field("functions", &self.functions)
            .finish()
    }
}
