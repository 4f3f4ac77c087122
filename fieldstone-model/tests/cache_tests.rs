use fieldstone_model::{DefinitionCache, DefinitionSource, EntityDefinition, Field};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

struct CountingSource {
    loads: AtomicUsize,
}

impl DefinitionSource for CountingSource {
    fn load(&self, obj_type: &str) -> Option<EntityDefinition> {
        if obj_type == "task" {
            self.loads.fetch_add(1, Ordering::SeqCst);
            Some(EntityDefinition::new("task").with_field(Field::text("name")))
        } else {
            None
        }
    }
}

#[test]
fn get_without_source_misses() {
    let cache = DefinitionCache::new();
    assert!(cache.get("task").is_none());
}

#[test]
fn insert_then_get() {
    let cache = DefinitionCache::new();
    cache.insert(EntityDefinition::new("task"));
    assert!(cache.get("task").is_some());
}

#[test]
fn source_consulted_once_until_invalidated() {
    let source = Arc::new(CountingSource {
        loads: AtomicUsize::new(0),
    });
    let cache = DefinitionCache::with_source(source.clone());

    assert!(cache.get("task").is_some());
    assert!(cache.get("task").is_some());
    assert_eq!(source.loads.load(Ordering::SeqCst), 1);

    cache.invalidate("task");
    assert!(cache.get("task").is_some());
    assert_eq!(source.loads.load(Ordering::SeqCst), 2);
}

#[test]
fn clear_drops_everything() {
    let source = Arc::new(CountingSource {
        loads: AtomicUsize::new(0),
    });
    let cache = DefinitionCache::with_source(source.clone());
    cache.get("task");
    cache.clear();
    cache.get("task");
    assert_eq!(source.loads.load(Ordering::SeqCst), 2);
}

#[test]
fn unknown_type_stays_missing() {
    let source = Arc::new(CountingSource {
        loads: AtomicUsize::new(0),
    });
    let cache = DefinitionCache::with_source(source);
    assert!(cache.get("nope").is_none());
}
