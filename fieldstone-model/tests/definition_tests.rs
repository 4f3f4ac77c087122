use fieldstone_model::{EntityDefinition, Field, FieldType, DELETED_FIELD};
use pretty_assertions::assert_eq;

#[test]
fn new_definition_has_conventional_table_and_deleted_field() {
    let def = EntityDefinition::new("customer");
    assert_eq!(def.table_name, "entities_customer");
    assert!(def.has_deleted_field());
    assert_eq!(
        def.field(DELETED_FIELD).map(|f| f.field_type),
        Some(FieldType::Bool)
    );
}

#[test]
fn field_lookup_by_name() {
    let def = EntityDefinition::new("task").with_field(Field::text("name"));
    assert!(def.field("name").is_some());
    assert!(def.field("nonexistent").is_none());
}

#[test]
fn parent_field_declaration() {
    let def = EntityDefinition::new("folder")
        .with_field(Field::object("parent_id", "folder"))
        .with_parent_field("parent_id");

    assert!(def.is_parent_field("parent_id"));
    assert!(!def.is_parent_field("name"));
}

#[test]
fn object_field_carries_subtype() {
    let f = Field::object("owner", "user");
    assert_eq!(f.field_type, FieldType::Object);
    assert_eq!(f.subtype.as_deref(), Some("user"));
    assert!(f.is_user_reference());
}

#[test]
fn non_user_object_is_not_user_reference() {
    assert!(!Field::object("company", "customer").is_user_reference());
    assert!(!Field::grouping("status").is_user_reference());
}

#[test]
fn multi_value_type_predicate() {
    assert!(FieldType::ObjectMulti.is_multi_value());
    assert!(FieldType::GroupingMulti.is_multi_value());
    assert!(!FieldType::Object.is_multi_value());
    assert!(!FieldType::Text.is_multi_value());
}

#[test]
fn reference_type_predicate() {
    assert!(FieldType::Object.is_reference());
    assert!(FieldType::Grouping.is_reference());
    assert!(!FieldType::Number.is_reference());
}

#[test]
fn revisions_default_on_and_can_be_disabled() {
    assert!(EntityDefinition::new("task").store_revisions);
    assert!(!EntityDefinition::new("log").without_revisions().store_revisions);
}

#[test]
fn definition_serde_roundtrip() {
    let def = EntityDefinition::new("task")
        .with_field(Field::text("name"))
        .with_field(Field::grouping("status"))
        .with_unique_name("name")
        .with_capped(1000);

    let json = serde_json::to_string(&def).unwrap();
    let back: EntityDefinition = serde_json::from_str(&json).unwrap();
    assert_eq!(back, def);
}
