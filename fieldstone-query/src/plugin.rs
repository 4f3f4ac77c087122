//! Query plugins.
//!
//! Before and after execution the index runs the plugin registered for
//! the query's object type, plus every universal plugin (recurrence
//! expansion registers as universal). Plugins may rewrite the query and
//! inspect results; they are an extension point, not core logic.

use crate::{EntityQuery, Results};
use std::collections::HashMap;
use std::sync::Arc;

/// Hooks around query execution.
pub trait QueryPlugin: Send + Sync {
    /// May rewrite the query before compilation.
    fn before_query(&self, query: &mut EntityQuery) {
        let _ = query;
    }

    /// May inspect or annotate results after decode.
    fn after_query(&self, query: &EntityQuery, results: &mut Results) {
        let _ = (query, results);
    }
}

/// Registry of per-objType and universal query plugins.
#[derive(Default)]
pub struct QueryPluginRegistry {
    by_type: HashMap<String, Arc<dyn QueryPlugin>>,
    universal: Vec<Arc<dyn QueryPlugin>>,
}

impl QueryPluginRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a plugin for one object type, replacing any prior entry.
    pub fn register(&mut self, obj_type: &str, plugin: Arc<dyn QueryPlugin>) {
        self.by_type.insert(obj_type.to_string(), plugin);
    }

    /// Registers a plugin that runs for every query.
    pub fn register_universal(&mut self, plugin: Arc<dyn QueryPlugin>) {
        self.universal.push(plugin);
    }

    /// Runs all applicable before-hooks, universal plugins first.
    pub fn run_before(&self, query: &mut EntityQuery) {
        for plugin in &self.universal {
            plugin.before_query(query);
        }
        if let Some(plugin) = self.by_type.get(&query.obj_type) {
            plugin.before_query(query);
        }
    }

    /// Runs all applicable after-hooks, universal plugins first.
    pub fn run_after(&self, query: &EntityQuery, results: &mut Results) {
        for plugin in &self.universal {
            plugin.after_query(query, results);
        }
        if let Some(plugin) = self.by_type.get(&query.obj_type) {
            plugin.after_query(query, results);
        }
    }
}
