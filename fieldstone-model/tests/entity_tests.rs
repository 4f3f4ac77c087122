use fieldstone_model::{
    DefaultOn, DefaultValue, Entity, EntityDefinition, EntityEvent, Field, DELETED_FIELD,
};
use fieldstone_types::{EntityId, UserContext};
use pretty_assertions::assert_eq;
use serde_json::json;

fn task_def() -> EntityDefinition {
    EntityDefinition::new("task")
        .with_field(Field::text("name"))
        .with_field(Field::object("owner", "user"))
        .with_field(
            Field::timestamp("ts_entered")
                .readonly()
                .with_default(DefaultOn::Create, DefaultValue::Now),
        )
        .with_field(
            Field::timestamp("ts_updated")
                .readonly()
                .with_default(DefaultOn::Update, DefaultValue::Now),
        )
        .with_field(
            Field::object("creator", "user")
                .with_default(DefaultOn::Create, DefaultValue::CurrentUser),
        )
}

// ── Values & changelog ───────────────────────────────────────────

#[test]
fn set_value_records_changelog() {
    let mut e = Entity::new("task");
    e.set_value("name", json!("Write report"));

    assert_eq!(e.get_str("name"), Some("Write report"));
    assert!(e.field_changed("name"));
    assert_eq!(e.previous_value("name"), Some(&json!(null)));
}

#[test]
fn repeated_set_keeps_original_old_value() {
    let mut e = Entity::new("task");
    e.set_value("name", json!("first"));
    e.reset_dirty();

    e.set_value("name", json!("second"));
    e.set_value("name", json!("third"));

    assert_eq!(e.previous_value("name"), Some(&json!("first")));
    assert_eq!(e.get_str("name"), Some("third"));
}

#[test]
fn set_same_value_is_not_a_change() {
    let mut e = Entity::new("task");
    e.set_value("name", json!("x"));
    e.reset_dirty();

    e.set_value("name", json!("x"));
    assert!(!e.is_dirty());
}

#[test]
fn reset_dirty_clears_changelog() {
    let mut e = Entity::new("task");
    e.set_value("name", json!("x"));
    assert!(e.is_dirty());

    e.reset_dirty();
    assert!(!e.is_dirty());
    assert!(!e.field_changed("name"));
}

// ── Multi values ─────────────────────────────────────────────────

#[test]
fn add_multi_value_builds_list() {
    let mut e = Entity::new("task");
    e.add_multi_value("watchers", json!(1));
    e.add_multi_value("watchers", json!(2));

    assert_eq!(e.get_value("watchers"), Some(&json!([1, 2])));
}

#[test]
fn add_multi_value_ignores_duplicates() {
    let mut e = Entity::new("task");
    e.add_multi_value("watchers", json!(1));
    e.reset_dirty();
    e.add_multi_value("watchers", json!(1));

    assert!(!e.is_dirty());
    assert_eq!(e.get_value("watchers"), Some(&json!([1])));
}

#[test]
fn remove_multi_value_filters_list() {
    let mut e = Entity::new("task");
    e.add_multi_value("watchers", json!(1));
    e.add_multi_value("watchers", json!(2));
    e.remove_multi_value("watchers", &json!(1));

    assert_eq!(e.get_value("watchers"), Some(&json!([2])));
}

#[test]
fn remove_absent_multi_value_is_noop() {
    let mut e = Entity::new("task");
    e.add_multi_value("watchers", json!(1));
    e.reset_dirty();
    e.remove_multi_value("watchers", &json!(9));

    assert!(!e.is_dirty());
}

// ── Display-name cache ───────────────────────────────────────────

#[test]
fn value_names_track_reference_display() {
    let mut e = Entity::new("task");
    e.set_value_with_name("owner", json!(7), "7", "Alice");

    assert_eq!(e.get_value("owner"), Some(&json!(7)));
    assert_eq!(
        e.value_names("owner").and_then(|m| m.get("7")).map(String::as_str),
        Some("Alice")
    );
}

#[test]
fn clear_value_names_drops_cache() {
    let mut e = Entity::new("task");
    e.set_value_with_name("owner", json!(7), "7", "Alice");
    e.clear_value_names("owner");

    assert!(e.value_names("owner").is_none());
}

// ── Display name & deletion flag ─────────────────────────────────

#[test]
fn display_name_prefers_name_then_title() {
    let mut e = Entity::new("task");
    assert_eq!(e.display_name(), e.guid.to_string());

    e.set_value("title", json!("A title"));
    assert_eq!(e.display_name(), "A title");

    e.set_value("name", json!("A name"));
    assert_eq!(e.display_name(), "A name");
}

#[test]
fn display_name_falls_back_to_id() {
    let mut e = Entity::new("task");
    e.id = Some(EntityId::new(42));
    assert_eq!(e.display_name(), "42");
}

#[test]
fn deleted_flag_roundtrip() {
    let mut e = Entity::new("task");
    assert!(!e.is_deleted());
    e.set_deleted(true);
    assert!(e.is_deleted());
    assert!(e.field_changed(DELETED_FIELD));
}

// ── Defaults ─────────────────────────────────────────────────────

#[test]
fn create_event_applies_create_and_update_defaults() {
    let def = task_def();
    let user = UserContext::new(EntityId::new(5), "alice");
    let mut e = Entity::new("task");

    e.apply_defaults(&def, EntityEvent::Create, Some(&user), 1_700_000_000);

    assert_eq!(e.get_i64("ts_entered"), Some(1_700_000_000));
    assert_eq!(e.get_i64("ts_updated"), Some(1_700_000_000));
    assert_eq!(e.get_i64("creator"), Some(5));
}

#[test]
fn update_event_skips_create_defaults() {
    let def = task_def();
    let mut e = Entity::new("task");
    e.reset_dirty();

    e.apply_defaults(&def, EntityEvent::Update, None, 1_700_000_500);

    assert_eq!(e.get_i64("ts_entered"), None);
    assert_eq!(e.get_i64("ts_updated"), Some(1_700_000_500));
}

#[test]
fn explicit_value_is_not_overwritten_by_default() {
    let def = task_def();
    let mut e = Entity::new("task");
    e.set_value("ts_updated", json!(123));

    e.apply_defaults(&def, EntityEvent::Update, None, 1_700_000_500);

    assert_eq!(e.get_i64("ts_updated"), Some(123));
}

#[test]
fn unchanged_default_writes_nothing() {
    let def = task_def();
    let mut e = Entity::new("task");
    e.apply_defaults(&def, EntityEvent::Update, None, 999);
    e.reset_dirty();

    e.apply_defaults(&def, EntityEvent::Update, None, 999);
    assert!(!e.is_dirty());
}
