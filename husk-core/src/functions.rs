//! The session's named-function table.

use std::collections::HashMap;
use std::sync::Arc;

use husk_parser::ast;

/// A registered function.
#[derive(Clone)]
pub struct FunctionRegistration {
    /// The function's definition.
    pub(crate) definition: Arc<ast::FunctionDefinition>,
    /// Whether the definition is exported to child sessions.
    pub(crate) exported: bool,
}

impl FunctionRegistration {
    /// Returns the function's definition.
    pub fn definition(&self) -> &ast::FunctionDefinition {
        &self.definition
    }

    /// Returns whether the function is exported.
    pub const fn is_exported(&self) -> bool {
        self.exported
    }
}

impl From<ast::FunctionDefinition> for FunctionRegistration {
    fn from(definition: ast::FunctionDefinition) -> Self {
        Self {
            definition: Arc::new(definition),
            exported: false,
        }
    }
}

/// The function table.
#[derive(Clone, Default)]
pub struct FunctionEnv {
    functions: HashMap<String, FunctionRegistration>,
}

impl FunctionEnv {
    /// Looks up a function by name.
    pub fn get(&self, name: &str) -> Option<&FunctionRegistration> {
        self.functions.get(name)
    }

    /// Returns whether the named function exists.
    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    /// Defines (or replaces) a function.
    pub fn define(&mut self, name: String, definition: Arc<ast::FunctionDefinition>) {
        self.functions.insert(
            name,
            FunctionRegistration {
                definition,
                exported: false,
            },
        );
    }

    /// Removes a function; returns whether it existed.
    pub fn remove(&mut self, name: &str) -> bool {
        self.functions.remove(name).is_some()
    }

    /// Updates a function's export disposition.
    pub fn set_exported(&mut self, name: &str, exported: bool) {
        if let Some(registration) = self.functions.get_mut(name) {
            registration.exported = exported;
        }
    }

    /// Iterates over registered functions.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &FunctionRegistration)> {
        self.functions.iter()
    }
}
