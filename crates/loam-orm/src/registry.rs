//! The model registry.
//!
//! Maps entity names to resolved schemas so that foreign-key declarations
//! can reference entities by name before the target is defined. The registry
//! is owned by the repository and passed around explicitly; there is no
//! process-wide state. Entries are only ever added, never removed.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{OrmError, Result};
use crate::schema::{EntityDef, EntityKind, EntitySchema};

/// Mapping from entity name to resolved schema.
#[derive(Debug, Clone, Default)]
pub struct ModelRegistry {
    models: HashMap<String, Arc<EntitySchema>>,
}

impl ModelRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a declaration and returns the resolved schema.
    ///
    /// A derived entity's parent must already be registered and must itself
    /// be a root entity (a single level of inheritance is supported).
    ///
    /// # Errors
    ///
    /// [`OrmError::Schema`] on duplicate names, duplicate fields, primary-key
    /// arity violations, or a second level of inheritance;
    /// [`OrmError::UnresolvedEntityReference`] if the parent is unknown.
    pub fn register(&mut self, def: EntityDef) -> Result<Arc<EntitySchema>> {
        if self.models.contains_key(def.name()) {
            return Err(OrmError::Schema(format!(
                "entity '{}' is already registered",
                def.name()
            )));
        }

        let parent = match def.kind() {
            EntityKind::Root => None,
            EntityKind::Extends(parent) => Some(self.get(parent)?),
        };
        if let Some(parent) = &parent {
            if parent.parent().is_some() {
                return Err(OrmError::Schema(format!(
                    "entity '{}' extends derived entity '{}'; only one level of inheritance is supported",
                    def.name(),
                    parent.name()
                )));
            }
        }

        let schema = Arc::new(EntitySchema::resolve(def, parent.as_deref())?);
        self.models
            .insert(schema.name().to_string(), schema.clone());
        Ok(schema)
    }

    /// Looks up a registered entity by name.
    ///
    /// # Errors
    ///
    /// [`OrmError::UnresolvedEntityReference`] for unknown names.
    pub fn get(&self, name: &str) -> Result<Arc<EntitySchema>> {
        self.models
            .get(name)
            .cloned()
            .ok_or_else(|| OrmError::UnresolvedEntityReference(name.to_string()))
    }

    /// Returns whether an entity is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.models.contains_key(name)
    }
}
