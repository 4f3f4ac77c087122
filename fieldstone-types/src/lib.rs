//! Core type definitions for Fieldstone.
//!
//! This crate defines the fundamental, storage-agnostic types used
//! throughout the entity engine:
//! - Entity, commit and guid identifiers
//! - Typed object references (the `objType:id|name` encoding)
//! - The authenticated-user context used for sentinel substitution
//!
//! Everything that talks to the database belongs in `fieldstone-store`,
//! not here.

mod ids;
mod objref;
mod user;

pub use ids::{CommitId, EntityId, Guid};
pub use objref::ObjRef;
pub use user::{UserContext, CURRENT_USER_SENTINELS};

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in type operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid UUID: {0}")]
    InvalidUuid(#[from] uuid::Error),

    #[error("invalid entity id: {0}")]
    InvalidId(#[from] std::num::ParseIntError),

    #[error("invalid object reference: {0}")]
    InvalidObjRef(String),
}
