//! Per-objType construction and lifecycle hooks.
//!
//! The original system derived per-type behavior from class-name strings
//! at runtime; here a registry maps objType to a behavior object at
//! startup and the factory consults it on every construction.

use crate::Entity;
use std::collections::HashMap;
use std::sync::Arc;

/// Optional lifecycle hooks for an object type.
///
/// Most types need none of these — the generic pipeline handles
/// everything from the definition. Implement only for type-specific side
/// effects (e.g. an email thread touching its message counters).
pub trait EntityBehavior: Send + Sync {
    /// Called before the row write, after defaults and unique-name
    /// assignment.
    fn on_before_save(&self, entity: &mut Entity) {
        let _ = entity;
    }

    /// Called after the row write and sync bookkeeping.
    fn on_after_save(&self, entity: &Entity) {
        let _ = entity;
    }

    /// Called before a hard delete removes the row.
    fn on_before_delete(&self, entity: &Entity) {
        let _ = entity;
    }

    /// Called after a hard delete removed the row.
    fn on_after_delete(&self, entity: &Entity) {
        let _ = entity;
    }
}

struct NoBehavior;

impl EntityBehavior for NoBehavior {}

/// Registry mapping objType to construction behavior, populated at startup.
pub struct EntityFactory {
    behaviors: HashMap<String, Arc<dyn EntityBehavior>>,
    default_behavior: Arc<dyn EntityBehavior>,
}

impl EntityFactory {
    /// Creates an empty factory; unregistered types get no-op behavior.
    #[must_use]
    pub fn new() -> Self {
        Self {
            behaviors: HashMap::new(),
            default_behavior: Arc::new(NoBehavior),
        }
    }

    /// Registers behavior for an object type, replacing any prior entry.
    pub fn register(&mut self, obj_type: &str, behavior: Arc<dyn EntityBehavior>) {
        self.behaviors.insert(obj_type.to_string(), behavior);
    }

    /// Constructs a fresh entity of the given type.
    #[must_use]
    pub fn create(&self, obj_type: &str) -> Entity {
        Entity::new(obj_type)
    }

    /// Returns the behavior for a type (no-op when unregistered).
    #[must_use]
    pub fn behavior(&self, obj_type: &str) -> Arc<dyn EntityBehavior> {
        self.behaviors
            .get(obj_type)
            .cloned()
            .unwrap_or_else(|| self.default_behavior.clone())
    }
}

impl Default for EntityFactory {
    fn default() -> Self {
        Self::new()
    }
}
