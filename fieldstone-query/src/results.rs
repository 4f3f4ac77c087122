//! Query results.
//!
//! A [`Results`] page is created (or reused) per execution, populated by
//! the index during decode, and read-only to callers after return.

use fieldstone_model::Entity;
use std::collections::HashMap;

/// One bucket of a terms aggregation.
#[derive(Debug, Clone, PartialEq)]
pub struct TermCount {
    pub term: String,
    pub count: i64,
}

/// A computed aggregation value.
#[derive(Debug, Clone, PartialEq)]
pub enum AggregateValue {
    Number(f64),
    Stats {
        min: f64,
        max: f64,
        avg: f64,
        sum: f64,
        count: i64,
    },
    Terms(Vec<TermCount>),
}

/// The result page of one query execution.
#[derive(Debug, Default)]
pub struct Results {
    pub total_num: usize,
    entities: Vec<Entity>,
    aggregations: HashMap<String, AggregateValue>,
}

impl Results {
    /// Creates an empty result page.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Drops prior entities when a page object is reused across executions.
    pub fn clear_entities(&mut self) {
        self.entities.clear();
    }

    /// Appends a decoded entity.
    pub fn add_entity(&mut self, entity: Entity) {
        self.entities.push(entity);
    }

    /// The decoded page.
    #[must_use]
    pub fn entities(&self) -> &[Entity] {
        &self.entities
    }

    /// Number of entities on this page (not the total match count).
    #[must_use]
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Attaches a computed aggregation under its requested name.
    pub fn set_aggregation(&mut self, name: &str, value: AggregateValue) {
        self.aggregations.insert(name.to_string(), value);
    }

    /// Reads a computed aggregation by name.
    #[must_use]
    pub fn aggregation(&self, name: &str) -> Option<&AggregateValue> {
        self.aggregations.get(name)
    }
}
