//! Error types for the storage layer.

use fieldstone_model::ValidationError;
use thiserror::Error;

/// Result type for storage operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur in storage operations.
///
/// Validation failures are recoverable, caller-visible outcomes; the
/// contract-violation variants (missing definition, unknown field,
/// circular hierarchy) are expected to abort the request-level operation.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Database error from SQLite.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The entity failed validation; nothing was written.
    #[error("validation failed ({} error(s))", .0.len())]
    Validation(Vec<ValidationError>),

    /// No definition exists for the query's or entity's object type.
    #[error("no definition for object type: {0}")]
    MissingDefinition(String),

    /// A condition referenced a field the definition does not declare.
    #[error("unknown field {field} on object type {obj_type}")]
    UnknownField { obj_type: String, field: String },

    /// A hierarchy walk revisited an id.
    #[error("circular reference detected: {0}")]
    CircularReference(String),

    /// A stored row could not be decoded.
    #[error("invalid data: {0}")]
    InvalidData(String),

    /// The cached definition no longer matches the stored schema.
    /// Auto-recovered once via cache reset + retry.
    #[error("stale definition: {0}")]
    StaleDefinition(String),
}
