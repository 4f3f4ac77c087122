//! Entity model for Fieldstone.
//!
//! Defines the types the query index and persistence pipeline operate on:
//! - [`EntityDefinition`] — an entity type's typed fields and structural metadata
//! - [`Entity`] — the in-memory aggregate: values, display-name cache, changelog
//! - [`EntityFactory`] / [`EntityBehavior`] — per-objType construction and hooks
//! - [`EntityValidator`] — pluggable pre-save validation
//! - [`DefinitionCache`] — per-objType definition cache with explicit invalidation
//!
//! Nothing in this crate touches storage; it is the contract between the
//! application layer and `fieldstone-store`.

mod behavior;
mod cache;
mod definition;
mod entity;
mod recurrence;
mod validator;

pub use behavior::{EntityBehavior, EntityFactory};
pub use cache::{DefinitionCache, DefinitionSource};
pub use definition::{
    DefaultOn, DefaultValue, EntityDefinition, Field, FieldDefault, FieldType, DELETED_FIELD,
};
pub use entity::{Entity, EntityEvent, FieldChange};
pub use recurrence::{RecurrencePattern, RecurrenceType};
pub use validator::{AcceptAll, EntityValidator, ValidationError};
