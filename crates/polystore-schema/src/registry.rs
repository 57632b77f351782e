//! Entity registry.

use std::sync::Arc;

use crate::descriptor::EntitySchema;
use crate::entities::builtin_schemas;
use crate::error::SchemaResult;

/// Named descriptors, resolved case-insensitively.
///
/// Registration order is preserved; schema sync runs in that order so that
/// referenced tables exist before the tables pointing at them.
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    entries: Vec<(String, Arc<EntitySchema>)>,
}

impl SchemaRegistry {
    /// An empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding the built-in `User` and `Repo` entities.
    ///
    /// # Errors
    ///
    /// Only fails if a built-in definition is broken.
    pub fn with_builtins() -> SchemaResult<Self> {
        let mut registry = Self::new();
        for schema in builtin_schemas()? {
            registry.register(schema);
        }
        Ok(registry)
    }

    /// Add or replace a descriptor. Returns the replaced one, if any.
    pub fn register(&mut self, schema: EntitySchema) -> Option<Arc<EntitySchema>> {
        let key = schema.entity_name().to_lowercase();
        let schema = Arc::new(schema);
        if let Some(entry) = self.entries.iter_mut().find(|(k, _)| *k == key) {
            return Some(std::mem::replace(&mut entry.1, schema));
        }
        self.entries.push((key, schema));
        None
    }

    /// Resolve an entity by name, ignoring case.
    #[must_use]
    pub fn resolve(&self, name: &str) -> Option<Arc<EntitySchema>> {
        let key = name.trim().to_lowercase();
        self.entries
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, schema)| Arc::clone(schema))
    }

    /// Registered descriptors in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<EntitySchema>> {
        self.entries.iter().map(|(_, schema)| schema)
    }

    /// Canonical entity names in registration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(_, schema)| schema.entity_name())
    }

    /// Number of registered entities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
