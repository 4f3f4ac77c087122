//! Recurrence patterns for recurring entity series.
//!
//! A pattern and its first occurrence reference each other, so the save
//! pipeline allocates the pattern's identity before the entity row is
//! written and saves the pattern content afterward.

use fieldstone_types::EntityId;
use serde::{Deserialize, Serialize};

/// How often a series repeats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecurrenceType {
    Daily,
    Weekly,
    Monthly,
    Yearly,
}

/// The recurrence rule attached to a series' entities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecurrencePattern {
    /// None until the identity pre-allocation step of the save pipeline.
    pub id: Option<EntityId>,
    pub obj_type: String,
    /// The series' original (non-exception) occurrence.
    pub first_entity_id: Option<EntityId>,
    pub recurrence_type: RecurrenceType,
    pub interval: u32,
    /// Epoch seconds of the series start.
    pub date_start: i64,
    /// Epoch seconds of the series end, open-ended when None.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_end: Option<i64>,
}

impl RecurrencePattern {
    /// Creates an unsaved pattern.
    #[must_use]
    pub fn new(obj_type: &str, recurrence_type: RecurrenceType, interval: u32, date_start: i64) -> Self {
        Self {
            id: None,
            obj_type: obj_type.into(),
            first_entity_id: None,
            recurrence_type,
            interval,
            date_start,
            date_end: None,
        }
    }
}
