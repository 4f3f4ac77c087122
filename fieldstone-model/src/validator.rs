//! Pluggable pre-save validation.

use crate::{Entity, EntityDefinition};

/// A field-level validation failure, surfaced to the caller as data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Validates an entity before it is persisted.
///
/// Returning errors aborts the save with no partial write.
pub trait EntityValidator: Send + Sync {
    fn validate(
        &self,
        entity: &Entity,
        def: &EntityDefinition,
    ) -> Result<(), Vec<ValidationError>> {
        let _ = (entity, def);
        Ok(())
    }
}

/// The default validator: accepts everything.
pub struct AcceptAll;

impl EntityValidator for AcceptAll {}
