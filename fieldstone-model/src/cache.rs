//! Definition cache.
//!
//! Definitions are immutable once loaded and cached per objType. The
//! cache is request-scoped state: the only cross-request invalidation
//! protocol is the explicit `invalidate`/`clear` calls the save pipeline
//! issues on a stale-definition retry.

use crate::EntityDefinition;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Loads definitions on cache miss (e.g. from application config).
pub trait DefinitionSource: Send + Sync {
    fn load(&self, obj_type: &str) -> Option<EntityDefinition>;
}

/// Per-objType definition cache with explicit invalidation.
pub struct DefinitionCache {
    cached: Mutex<HashMap<String, Arc<EntityDefinition>>>,
    source: Option<Arc<dyn DefinitionSource>>,
}

impl DefinitionCache {
    /// Creates a cache with no backing source; definitions must be
    /// registered explicitly.
    #[must_use]
    pub fn new() -> Self {
        Self {
            cached: Mutex::new(HashMap::new()),
            source: None,
        }
    }

    /// Creates a cache that consults `source` on miss.
    #[must_use]
    pub fn with_source(source: Arc<dyn DefinitionSource>) -> Self {
        Self {
            cached: Mutex::new(HashMap::new()),
            source: Some(source),
        }
    }

    /// Registers a definition directly.
    pub fn insert(&self, def: EntityDefinition) {
        let mut cached = self.cached.lock().unwrap();
        cached.insert(def.obj_type.clone(), Arc::new(def));
    }

    /// Returns the cached definition, loading from the source on miss.
    #[must_use]
    pub fn get(&self, obj_type: &str) -> Option<Arc<EntityDefinition>> {
        let mut cached = self.cached.lock().unwrap();
        if let Some(def) = cached.get(obj_type) {
            return Some(def.clone());
        }
        let loaded = self.source.as_ref()?.load(obj_type)?;
        let def = Arc::new(loaded);
        cached.insert(obj_type.to_string(), def.clone());
        Some(def)
    }

    /// Drops one cached definition so the next `get` reloads it.
    pub fn invalidate(&self, obj_type: &str) {
        self.cached.lock().unwrap().remove(obj_type);
    }

    /// Drops every cached definition.
    pub fn clear(&self) {
        self.cached.lock().unwrap().clear();
    }
}

impl Default for DefinitionCache {
    fn default() -> Self {
        Self::new()
    }
}
