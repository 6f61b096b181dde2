//! Static tool registration table.

use std::collections::HashMap;

use super::{Arguments, ToolError, ToolHost, builtin};
use crate::model::ToolSpec;

/// A local tool handler.
///
/// Handlers never fail: bad input produces an empty string.
pub type Handler = fn(&Arguments) -> String;

/// One row of the registration table.
#[derive(Debug, Clone)]
pub struct ToolEntry {
    pub spec: ToolSpec,
    pub handler: Handler,
}

impl ToolEntry {
    pub fn new(spec: ToolSpec, handler: Handler) -> Self {
        Self { spec, handler }
    }
}

/// Ordered, immutable set of local tools.
#[derive(Debug, Clone, Default)]
pub struct ToolRegistry {
    specs: Vec<ToolSpec>,
    handlers: HashMap<String, Handler>,
}

impl ToolRegistry {
    /// Build a registry from table entries.
    ///
    /// If two entries share a name the first one is kept.
    pub fn new(entries: impl IntoIterator<Item = ToolEntry>) -> Self {
        let mut specs = Vec::new();
        let mut handlers = HashMap::new();

        for entry in entries {
            if handlers.contains_key(&entry.spec.name) {
                tracing::warn!(tool = %entry.spec.name, "duplicate tool name, keeping first");
                continue;
            }
            handlers.insert(entry.spec.name.clone(), entry.handler);
            specs.push(entry.spec);
        }

        Self { specs, handlers }
    }

    /// The built-in `say_hello` and `vulcan_salute` tools.
    pub fn builtin() -> Self {
        Self::new(builtin::entries())
    }

    /// Look up a handler by exact name.
    pub fn get(&self, name: &str) -> Option<Handler> {
        self.handlers.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }
}

impl ToolHost for ToolRegistry {
    fn specs(&self) -> &[ToolSpec] {
        &self.specs
    }

    fn execute(&self, name: &str, arguments: &Arguments) -> Result<String, ToolError> {
        let handler = self
            .get(name)
            .ok_or_else(|| ToolError::NotFound(name.to_string()))?;
        Ok(handler(arguments))
    }
}
