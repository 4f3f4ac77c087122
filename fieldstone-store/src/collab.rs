//! Outbound collaborator seams.
//!
//! The save pipeline drives these after the core write; all defaults are
//! no-ops so the mapper works standalone. Real implementations live in
//! the application layer (notification dispatch, loader caches,
//! dependent-aggregate recompute).

use fieldstone_model::Entity;
use fieldstone_types::EntityId;

/// Receives entity events after a successful write.
pub trait Notifier: Send + Sync {
    fn notify(&self, event: &str, entity: &Entity) {
        let _ = (event, entity);
    }
}

/// Invalidated whenever an entity changes so cached loads never go stale.
pub trait LoaderCacheInvalidator: Send + Sync {
    fn invalidate(&self, obj_type: &str, id: EntityId) {
        let _ = (obj_type, id);
    }
}

/// Recomputes aggregate fields on entities that depend on the saved one.
pub trait EntityAggregator: Send + Sync {
    fn recompute_dependents(&self, entity: &Entity) {
        let _ = entity;
    }
}

pub(crate) struct NullNotifier;
impl Notifier for NullNotifier {}

pub(crate) struct NullInvalidator;
impl LoaderCacheInvalidator for NullInvalidator {}

pub(crate) struct NullAggregator;
impl EntityAggregator for NullAggregator {}
