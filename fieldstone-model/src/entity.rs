//! The in-memory entity aggregate.
//!
//! An [`Entity`] holds a JSON value per field plus two pieces of derived
//! state the persistence pipeline depends on: a display-name cache for
//! reference fields (`fkey_names`) and a changelog of before/after pairs
//! populated only by setters since the last reset. The two value maps are
//! kept consistent by the foreign-key refresh step of the save pipeline,
//! not by the setters themselves.

use crate::definition::{DefaultOn, DefaultValue, EntityDefinition, DELETED_FIELD};
use crate::recurrence::RecurrencePattern;
use fieldstone_types::{CommitId, EntityId, Guid, UserContext};
use serde_json::Value;
use std::collections::HashMap;

/// What kind of save is being performed; drives default resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityEvent {
    Create,
    Update,
}

/// A before/after pair recorded by a setter.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldChange {
    pub old: Value,
    pub new: Value,
}

/// A typed, dynamically-schemaed business record.
#[derive(Debug, Clone)]
pub struct Entity {
    pub obj_type: String,
    pub id: Option<EntityId>,
    pub guid: Guid,
    pub revision: i64,
    pub commit_id: Option<CommitId>,
    values: serde_json::Map<String, Value>,
    /// field name → { referenced id → cached display name }
    fkey_names: HashMap<String, HashMap<String, String>>,
    changelog: HashMap<String, FieldChange>,
    pub recurrence_pattern: Option<RecurrencePattern>,
    pub is_recurrence_exception: bool,
}

impl Entity {
    /// Creates an empty, unpersisted entity of the given type.
    #[must_use]
    pub fn new(obj_type: &str) -> Self {
        Self {
            obj_type: obj_type.into(),
            id: None,
            guid: Guid::new(),
            revision: 0,
            commit_id: None,
            values: serde_json::Map::new(),
            fkey_names: HashMap::new(),
            changelog: HashMap::new(),
            recurrence_pattern: None,
            is_recurrence_exception: false,
        }
    }

    // ── Values ───────────────────────────────────────────────────

    /// Returns a field value, if set.
    #[must_use]
    pub fn get_value(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    /// Returns a text field's value.
    #[must_use]
    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.values.get(name).and_then(|v| v.as_str())
    }

    /// Returns a boolean field's value.
    #[must_use]
    pub fn get_bool(&self, name: &str) -> Option<bool> {
        self.values.get(name).and_then(|v| v.as_bool())
    }

    /// Returns an integer field's value.
    #[must_use]
    pub fn get_i64(&self, name: &str) -> Option<i64> {
        self.values.get(name).and_then(|v| v.as_i64())
    }

    /// Sets a field value, recording the change in the changelog.
    ///
    /// A repeated set keeps the original `old` so the changelog reflects
    /// the diff since the last reset, not the last call.
    pub fn set_value(&mut self, name: &str, value: Value) {
        let old = self.values.get(name).cloned().unwrap_or(Value::Null);
        if old == value {
            return;
        }
        self.changelog
            .entry(name.to_string())
            .and_modify(|c| c.new = value.clone())
            .or_insert_with(|| FieldChange {
                old,
                new: value.clone(),
            });
        self.values.insert(name.to_string(), value);
    }

    /// Sets a reference field and its cached display name in one step.
    pub fn set_value_with_name(&mut self, name: &str, value: Value, key: &str, display: &str) {
        self.set_value(name, value);
        self.set_value_name(name, key, display);
    }

    /// Appends to a multi-valued field, recording the change.
    /// A non-array current value is replaced by a fresh single-element list.
    pub fn add_multi_value(&mut self, name: &str, value: Value) {
        let mut list = match self.values.get(name) {
            Some(Value::Array(items)) => items.clone(),
            _ => Vec::new(),
        };
        if list.contains(&value) {
            return;
        }
        list.push(value);
        self.set_value(name, Value::Array(list));
    }

    /// Removes a value from a multi-valued field, if present.
    pub fn remove_multi_value(&mut self, name: &str, value: &Value) {
        if let Some(Value::Array(items)) = self.values.get(name) {
            if items.contains(value) {
                let list: Vec<Value> = items.iter().filter(|v| *v != value).cloned().collect();
                self.set_value(name, Value::Array(list));
            }
        }
    }

    /// All set field names and values, in document order.
    pub fn values(&self) -> &serde_json::Map<String, Value> {
        &self.values
    }

    /// Replaces the whole document without touching the changelog.
    /// Used by the store when decoding a loaded row.
    pub fn set_values_raw(&mut self, values: serde_json::Map<String, Value>) {
        self.values = values;
    }

    // ── Display-name cache ───────────────────────────────────────

    /// Caches a display name for one referenced id of a field.
    pub fn set_value_name(&mut self, field: &str, key: &str, display: &str) {
        self.fkey_names
            .entry(field.to_string())
            .or_default()
            .insert(key.to_string(), display.to_string());
    }

    /// Returns the cached display names for a reference field.
    #[must_use]
    pub fn value_names(&self, field: &str) -> Option<&HashMap<String, String>> {
        self.fkey_names.get(field)
    }

    /// Drops all cached names for a field (before a refresh re-resolves them).
    pub fn clear_value_names(&mut self, field: &str) {
        self.fkey_names.remove(field);
    }

    // ── Changelog ────────────────────────────────────────────────

    /// True if the named field changed since the last reset.
    #[must_use]
    pub fn field_changed(&self, name: &str) -> bool {
        self.changelog.contains_key(name)
    }

    /// The value the named field held before the first set since reset.
    #[must_use]
    pub fn previous_value(&self, name: &str) -> Option<&Value> {
        self.changelog.get(name).map(|c| &c.old)
    }

    /// The full diff map.
    #[must_use]
    pub fn changelog(&self) -> &HashMap<String, FieldChange> {
        &self.changelog
    }

    /// True if any field changed since the last reset.
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        !self.changelog.is_empty()
    }

    /// Clears the changelog. Called after every successful load or save.
    pub fn reset_dirty(&mut self) {
        self.changelog.clear();
    }

    // ── Derived state ────────────────────────────────────────────

    /// The human-readable name: the `name` field, falling back to
    /// `title`, then the id.
    #[must_use]
    pub fn display_name(&self) -> String {
        if let Some(name) = self.get_str("name").filter(|s| !s.is_empty()) {
            return name.to_string();
        }
        if let Some(title) = self.get_str("title").filter(|s| !s.is_empty()) {
            return title.to_string();
        }
        match self.id {
            Some(id) => id.to_string(),
            None => self.guid.to_string(),
        }
    }

    /// Reads the soft-delete flag.
    #[must_use]
    pub fn is_deleted(&self) -> bool {
        self.get_bool(DELETED_FIELD).unwrap_or(false)
    }

    /// Sets the soft-delete flag.
    pub fn set_deleted(&mut self, deleted: bool) {
        self.set_value(DELETED_FIELD, Value::Bool(deleted));
    }

    /// Applies field defaults for a save event.
    ///
    /// Create events apply both create and update defaults; update events
    /// apply update defaults only. A field the caller explicitly set since
    /// the last reset is never overwritten, and a default that computes to
    /// the current value writes nothing.
    pub fn apply_defaults(
        &mut self,
        def: &EntityDefinition,
        event: EntityEvent,
        user: Option<&UserContext>,
        now: i64,
    ) {
        let defaults: Vec<(String, Value)> = def
            .fields
            .iter()
            .filter_map(|field| {
                let rule = field.default.as_ref()?;
                let fires = match rule.on {
                    DefaultOn::Create => event == EntityEvent::Create,
                    DefaultOn::Update => true,
                };
                if !fires || self.field_changed(&field.name) {
                    return None;
                }
                let computed = match &rule.value {
                    DefaultValue::Now => Value::from(now),
                    DefaultValue::CurrentUser => Value::from(user?.id.as_i64()),
                    DefaultValue::Literal(v) => v.clone(),
                };
                Some((field.name.clone(), computed))
            })
            .collect();

        for (name, computed) in defaults {
            if self.get_value(&name) != Some(&computed) {
                self.set_value(&name, computed);
            }
        }
    }
}
