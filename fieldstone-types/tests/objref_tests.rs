use fieldstone_types::{EntityId, ObjRef};
use proptest::prelude::*;

#[test]
fn encode_without_name() {
    let r = ObjRef::new("task", EntityId::new(123));
    assert_eq!(r.encode(), "task:123");
}

#[test]
fn encode_with_name() {
    let r = ObjRef::with_name("customer", EntityId::new(5), "Acme Corp");
    assert_eq!(r.encode(), "customer:5|Acme Corp");
}

#[test]
fn parse_without_name() {
    let r: ObjRef = "task:123".parse().unwrap();
    assert_eq!(r.obj_type, "task");
    assert_eq!(r.id, EntityId::new(123));
    assert_eq!(r.name, None);
}

#[test]
fn parse_with_name() {
    let r: ObjRef = "customer:5|Acme Corp".parse().unwrap();
    assert_eq!(r.obj_type, "customer");
    assert_eq!(r.id, EntityId::new(5));
    assert_eq!(r.name.as_deref(), Some("Acme Corp"));
}

#[test]
fn parse_name_may_contain_colon() {
    let r: ObjRef = "note:9|re: meeting".parse().unwrap();
    assert_eq!(r.name.as_deref(), Some("re: meeting"));
}

#[test]
fn parse_missing_colon_fails() {
    assert!("123".parse::<ObjRef>().is_err());
}

#[test]
fn parse_empty_obj_type_fails() {
    assert!(":123".parse::<ObjRef>().is_err());
}

#[test]
fn parse_non_numeric_id_fails() {
    assert!("task:abc".parse::<ObjRef>().is_err());
}

proptest! {
    #[test]
    fn encode_parse_roundtrip(obj_type in "[a-z_]{1,12}", id in 1i64..1_000_000, name in proptest::option::of("[A-Za-z0-9 .:]{1,24}")) {
        let original = ObjRef {
            obj_type: obj_type.clone(),
            id: EntityId::new(id),
            name: name.clone(),
        };
        let parsed: ObjRef = original.encode().parse().unwrap();
        prop_assert_eq!(parsed, original);
    }
}
