mod common;

use common::{definitions, factory, open_store, task_def};
use fieldstone_model::{
    DefinitionCache, Entity, EntityDefinition, EntityValidator, RecurrencePattern,
    RecurrenceType, ValidationError,
};
use fieldstone_query::{EntityQuery, Operator};
use fieldstone_store::{EntityDataMapper, EntityQueryIndex, StoreError};
use fieldstone_types::EntityId;
use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::Arc;

fn mapper_with(defs: Arc<DefinitionCache>) -> EntityDataMapper {
    EntityDataMapper::new(open_store(), defs, factory())
}

fn mapper() -> EntityDataMapper {
    mapper_with(definitions())
}

// ── Save basics & round-trip ─────────────────────────────────────

#[test]
fn save_assigns_id_and_increments_revision() {
    let m = mapper();
    let mut e = Entity::new("task");
    e.set_value("name", json!("first"));

    let id = m.save(&mut e).unwrap();
    assert_eq!(e.id, Some(id));
    assert_eq!(e.revision, 1);
    assert!(!e.is_dirty());

    e.set_value("name", json!("second"));
    m.save(&mut e).unwrap();
    assert_eq!(e.revision, 2);
}

#[test]
fn saved_entity_round_trips_by_id() {
    let m = mapper();
    let mut e = Entity::new("task");
    e.set_value("name", json!("Round trip"));
    e.set_value("points", json!(8));
    e.add_multi_value("watchers", json!(3));
    e.add_multi_value("watchers", json!(4));
    let id = m.save(&mut e).unwrap();

    let loaded = m.get_by_id("task", id).unwrap().unwrap();
    assert_eq!(loaded.get_str("name"), Some("Round trip"));
    assert_eq!(loaded.get_i64("points"), Some(8));
    assert_eq!(loaded.get_value("watchers"), Some(&json!([3, 4])));
    assert_eq!(loaded.guid, e.guid);
    assert_eq!(loaded.revision, 1);
    assert!(!loaded.is_dirty());
}

#[test]
fn create_defaults_are_applied_once() {
    let m = mapper();
    let mut e = Entity::new("task");
    e.set_value("name", json!("defaults"));
    let id = m.save(&mut e).unwrap();

    let first = m.get_by_id("task", id).unwrap().unwrap();
    let entered = first.get_i64("ts_entered").unwrap();
    assert!(entered > 0);

    let mut again = first;
    again.set_value("name", json!("still defaults"));
    m.save(&mut again).unwrap();
    assert_eq!(again.get_i64("ts_entered"), Some(entered));
}

#[test]
fn missing_definition_fails_hard() {
    let m = mapper();
    let mut e = Entity::new("ghost");
    assert!(matches!(
        m.save(&mut e),
        Err(StoreError::MissingDefinition(_))
    ));
}

// ── Validation ───────────────────────────────────────────────────

struct RequireName;

impl EntityValidator for RequireName {
    fn validate(
        &self,
        entity: &Entity,
        _def: &EntityDefinition,
    ) -> Result<(), Vec<ValidationError>> {
        if entity.get_str("name").is_some_and(|s| !s.is_empty()) {
            Ok(())
        } else {
            Err(vec![ValidationError::new("name", "required")])
        }
    }
}

#[test]
fn validation_failure_aborts_with_no_write() {
    let conn = open_store();
    let defs = definitions();
    let m = EntityDataMapper::new(conn.clone(), defs.clone(), factory())
        .with_validator(Arc::new(RequireName));
    let index = EntityQueryIndex::new(conn, defs, factory());

    let mut e = Entity::new("task");
    let err = m.save(&mut e).unwrap_err();
    let StoreError::Validation(errors) = err else {
        panic!("expected validation error");
    };
    assert_eq!(errors[0].field, "name");
    assert_eq!(e.id, None);
    assert_eq!(e.revision, 0);

    let r = index.execute_query(&EntityQuery::new("task"), None).unwrap();
    assert_eq!(r.total_num, 0);
}

// ── Commits & staleness ──────────────────────────────────────────

#[test]
fn each_save_allocates_a_newer_commit() {
    let m = mapper();
    let mut e = Entity::new("task");
    e.set_value("name", json!("committed"));
    m.save(&mut e).unwrap();
    let first = e.commit_id.unwrap();

    e.set_value("points", json!(1));
    m.save(&mut e).unwrap();
    let second = e.commit_id.unwrap();
    assert!(second > first);
}

#[test]
fn superseded_commit_is_marked_stale() {
    let conn = open_store();
    let defs = definitions();
    let m = EntityDataMapper::new(conn.clone(), defs, factory());

    let mut e = Entity::new("task");
    e.set_value("name", json!("sync me"));
    m.save(&mut e).unwrap();
    let first = e.commit_id.unwrap();
    e.set_value("points", json!(2));
    m.save(&mut e).unwrap();
    let second = e.commit_id.unwrap();

    let stale = fieldstone_store::SyncStaleness::new(conn)
        .stale_commits("task", fieldstone_types::CommitId::new(0))
        .unwrap();
    assert_eq!(stale, vec![(first, second)]);
}

// ── Unique names ─────────────────────────────────────────────────

fn slugged_defs() -> Arc<DefinitionCache> {
    let cache = DefinitionCache::new();
    cache.insert(task_def().with_unique_name("name"));
    cache.insert(common::user_def());
    cache.insert(common::project_def());
    Arc::new(cache)
}

#[test]
fn unique_name_is_slugified_from_the_seed() {
    let m = mapper_with(slugged_defs());
    let mut e = Entity::new("task");
    e.set_value("name", json!("Hello World"));
    m.save(&mut e).unwrap();
    assert_eq!(e.get_str("uname"), Some("hello-world"));
}

#[test]
fn slug_normalization_rules() {
    let m = mapper_with(slugged_defs());
    let mut e = Entity::new("task");
    e.set_value("name", json!("Rock & Roll: Greatest Hits!"));
    m.save(&mut e).unwrap();
    assert_eq!(e.get_str("uname"), Some("rock-_and_-roll-greatest-hits"));
}

#[test]
fn unique_name_collision_gets_a_suffix() {
    let m = mapper_with(slugged_defs());
    let mut first = Entity::new("task");
    first.set_value("name", json!("Duplicate"));
    m.save(&mut first).unwrap();

    let mut second = Entity::new("task");
    second.set_value("name", json!("Duplicate"));
    m.save(&mut second).unwrap();

    let a = first.get_str("uname").unwrap().to_string();
    let b = second.get_str("uname").unwrap().to_string();
    assert_eq!(a, "duplicate");
    assert_ne!(a, b);
    assert!(b.starts_with("duplicate-"));
}

#[test]
fn existing_unique_name_is_left_alone() {
    let m = mapper_with(slugged_defs());
    let mut e = Entity::new("task");
    e.set_value("name", json!("Keep Me"));
    e.set_value("uname", json!("custom-slug"));
    m.save(&mut e).unwrap();
    assert_eq!(e.get_str("uname"), Some("custom-slug"));
}

// ── Foreign-key display names ────────────────────────────────────

#[test]
fn reference_display_names_are_cached_on_save() {
    let m = mapper();
    let mut alice = Entity::new("user");
    alice.set_value("name", json!("Alice"));
    let alice_id = m.save(&mut alice).unwrap();

    let status = m.groupings().add("task", "status", "Open", None, None).unwrap();

    let mut e = Entity::new("task");
    e.set_value("name", json!("refs"));
    e.set_value("owner", json!(alice_id.as_i64()));
    e.set_value("status", json!(status));
    let id = m.save(&mut e).unwrap();

    let loaded = m.get_by_id("task", id).unwrap().unwrap();
    assert_eq!(
        loaded
            .value_names("owner")
            .and_then(|n| n.get(&alice_id.to_string()))
            .map(String::as_str),
        Some("Alice")
    );
    assert_eq!(
        loaded
            .value_names("status")
            .and_then(|n| n.get(&status.to_string()))
            .map(String::as_str),
        Some("Open")
    );
}

#[test]
fn renamed_reference_refreshes_the_cached_name() {
    let m = mapper();
    let mut project = Entity::new("project");
    project.set_value("name", json!("Old Name"));
    let project_id = m.save(&mut project).unwrap();

    let mut e = Entity::new("task");
    e.set_value("name", json!("tracks project"));
    e.set_value("project", json!(project_id.as_i64()));
    let id = m.save(&mut e).unwrap();

    project.set_value("name", json!("New Name"));
    m.save(&mut project).unwrap();

    let mut reloaded = m.get_by_id("task", id).unwrap().unwrap();
    m.save(&mut reloaded).unwrap();
    assert_eq!(
        reloaded
            .value_names("project")
            .and_then(|n| n.get(&project_id.to_string()))
            .map(String::as_str),
        Some("New Name")
    );
}

#[test]
fn encoded_reference_strings_are_reencoded_with_fresh_names() {
    let m = mapper();
    let mut project = Entity::new("project");
    project.set_value("name", json!("Apollo"));
    let project_id = m.save(&mut project).unwrap();

    let mut e = Entity::new("task");
    e.set_value("name", json!("encoded"));
    e.set_value("project", json!(format!("project:{}|Stale Name", project_id)));
    m.save(&mut e).unwrap();

    assert_eq!(
        e.get_str("project"),
        Some(format!("project:{project_id}|Apollo").as_str())
    );
}

#[test]
fn private_groupings_are_scoped_to_the_owner() {
    let m = mapper();
    let mine = m.groupings().add("task", "status", "My Bucket", None, Some(7)).unwrap();

    let mut e = Entity::new("task");
    e.set_value("name", json!("scoped"));
    e.set_value("owner_id", json!(7));
    e.set_value("status", json!(mine));
    m.save(&mut e).unwrap();
    assert!(e.value_names("status").and_then(|n| n.get(&mine.to_string())).is_some());

    let mut other = Entity::new("task");
    other.set_value("name", json!("not mine"));
    other.set_value("owner_id", json!(8));
    other.set_value("status", json!(mine));
    m.save(&mut other).unwrap();
    assert!(other.value_names("status").is_none());
}

// ── Delete ───────────────────────────────────────────────────────

#[test]
fn delete_is_soft_by_default_and_hard_when_repeated() {
    let conn = open_store();
    let defs = definitions();
    let m = EntityDataMapper::new(conn.clone(), defs.clone(), factory());
    let index = EntityQueryIndex::new(conn, defs, factory());

    let mut e = Entity::new("task");
    e.set_value("name", json!("doomed"));
    let id = m.save(&mut e).unwrap();

    let hard = m.delete(&mut e, false).unwrap();
    assert!(!hard);
    assert!(e.is_deleted());
    // Row still present, just flagged.
    assert!(m.get_by_id("task", id).unwrap().is_some());

    let hard = m.delete(&mut e, false).unwrap();
    assert!(hard);
    assert!(m.get_by_id("task", id).unwrap().is_none());
    let r = index.execute_query(&EntityQuery::new("task"), None).unwrap();
    assert_eq!(r.total_num, 0);
}

#[test]
fn soft_delete_then_restore() {
    let conn = open_store();
    let defs = definitions();
    let m = EntityDataMapper::new(conn.clone(), defs.clone(), factory());
    let index = EntityQueryIndex::new(conn, defs, factory());

    let mut e = Entity::new("task");
    e.set_value("name", json!("phoenix"));
    m.save(&mut e).unwrap();
    m.delete(&mut e, false).unwrap();
    assert_eq!(
        index.execute_query(&EntityQuery::new("task"), None).unwrap().total_num,
        0
    );

    e.set_deleted(false);
    m.save(&mut e).unwrap();
    assert_eq!(
        index.execute_query(&EntityQuery::new("task"), None).unwrap().total_num,
        1
    );
}

#[test]
fn hard_delete_removes_association_rows() {
    let conn = open_store();
    let defs = definitions();
    let m = EntityDataMapper::new(conn.clone(), defs, factory());

    let mut e = Entity::new("task");
    e.set_value("name", json!("linked"));
    e.add_multi_value("watchers", json!(9));
    m.save(&mut e).unwrap();
    m.delete(&mut e, true).unwrap();

    let guard = conn.lock().unwrap();
    let count: i64 = guard
        .query_row("SELECT COUNT(*) FROM object_assoc", [], |row| row.get(0))
        .unwrap();
    assert_eq!(count, 0);
}

// ── Moved-entity redirection ─────────────────────────────────────

#[test]
fn get_by_id_follows_moved_redirects() {
    let m = mapper();
    let mut survivor = Entity::new("task");
    survivor.set_value("name", json!("survivor"));
    let survivor_id = m.save(&mut survivor).unwrap();

    let mut merged = Entity::new("task");
    merged.set_value("name", json!("merged away"));
    let merged_id = m.save(&mut merged).unwrap();
    m.delete(&mut merged, true).unwrap();
    m.set_entity_moved_to("task", merged_id, survivor_id).unwrap();

    let loaded = m.get_by_id("task", merged_id).unwrap().unwrap();
    assert_eq!(loaded.id, Some(survivor_id));
    assert_eq!(loaded.get_str("name"), Some("survivor"));

    // Memoized second lookup takes the cache path.
    let again = m.get_by_id("task", merged_id).unwrap().unwrap();
    assert_eq!(again.id, Some(survivor_id));
}

#[test]
fn missing_and_unmoved_id_is_not_found_not_an_error() {
    let m = mapper();
    assert!(m.get_by_id("task", EntityId::new(424_242)).unwrap().is_none());
}

// ── Stale definition retry ───────────────────────────────────────

#[test]
fn stale_definition_write_retries_once_after_cache_reset() {
    let conn = open_store();
    let defs = definitions();
    let m = EntityDataMapper::new(conn.clone(), defs, factory());

    let mut e = Entity::new("task");
    e.set_value("name", json!("resilient"));
    let id = m.save(&mut e).unwrap();

    // Simulate schema drift: the table disappears between saves.
    conn.lock()
        .unwrap()
        .execute_batch("DROP TABLE entities_task")
        .unwrap();

    e.set_value("points", json!(3));
    m.save(&mut e).unwrap();

    let reloaded = m.get_by_id("task", id).unwrap().unwrap();
    assert_eq!(reloaded.get_i64("points"), Some(3));
}

// ── Revisions ────────────────────────────────────────────────────

#[test]
fn revision_snapshots_accumulate() {
    let m = mapper();
    let mut e = Entity::new("task");
    e.set_value("name", json!("v1"));
    let id = m.save(&mut e).unwrap();
    e.set_value("name", json!("v2"));
    m.save(&mut e).unwrap();

    let revisions = m.get_revisions("task", id).unwrap();
    assert_eq!(revisions.len(), 2);
    assert_eq!(revisions[0].0, 1);
    assert_eq!(revisions[0].1["name"], json!("v1"));
    assert_eq!(revisions[1].1["name"], json!("v2"));
}

#[test]
fn revisions_can_be_disabled_per_definition() {
    let cache = DefinitionCache::new();
    cache.insert(task_def().without_revisions());
    let m = mapper_with(Arc::new(cache));

    let mut e = Entity::new("task");
    e.set_value("name", json!("no history"));
    let id = m.save(&mut e).unwrap();
    assert!(m.get_revisions("task", id).unwrap().is_empty());
}

// ── Recurrence ───────────────────────────────────────────────────

fn recurring_defs() -> Arc<DefinitionCache> {
    let cache = DefinitionCache::new();
    cache.insert(task_def().with_recurrence());
    Arc::new(cache)
}

#[test]
fn recurrence_identity_is_allocated_before_the_row_write() {
    let conn = open_store();
    let m = EntityDataMapper::new(conn.clone(), recurring_defs(), factory());

    let mut e = Entity::new("task");
    e.set_value("name", json!("standup"));
    e.recurrence_pattern = Some(RecurrencePattern::new(
        "task",
        RecurrenceType::Weekly,
        1,
        1_700_000_000,
    ));
    let id = m.save(&mut e).unwrap();

    let pattern = e.recurrence_pattern.as_ref().unwrap();
    let pattern_id = pattern.id.unwrap();
    assert_eq!(pattern.first_entity_id, Some(id));
    assert_eq!(
        e.get_i64("recurrence_pattern_id"),
        Some(pattern_id.as_i64())
    );

    let guard = conn.lock().unwrap();
    let (first, rtype): (Option<i64>, Option<String>) = guard
        .query_row(
            "SELECT first_entity_id, recurrence_type FROM recurrence_patterns WHERE id = ?1",
            rusqlite::params![pattern_id.as_i64()],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .unwrap();
    assert_eq!(first, Some(id.as_i64()));
    assert_eq!(rtype.as_deref(), Some("weekly"));
}

#[test]
fn recurrence_exception_does_not_write_pattern_content() {
    let conn = open_store();
    let m = EntityDataMapper::new(conn.clone(), recurring_defs(), factory());

    let mut e = Entity::new("task");
    e.set_value("name", json!("moved occurrence"));
    e.recurrence_pattern = Some(RecurrencePattern::new(
        "task",
        RecurrenceType::Daily,
        1,
        1_700_000_000,
    ));
    e.is_recurrence_exception = true;
    m.save(&mut e).unwrap();

    let guard = conn.lock().unwrap();
    let first: Option<i64> = guard
        .query_row(
            "SELECT first_entity_id FROM recurrence_patterns WHERE id = ?1",
            rusqlite::params![e.recurrence_pattern.as_ref().unwrap().id.unwrap().as_i64()],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(first, None);
}

// ── Capped collections ───────────────────────────────────────────

#[test]
fn capped_definition_trims_oldest_rows() {
    let cache = DefinitionCache::new();
    cache.insert(task_def().with_capped(3));
    let conn = open_store();
    let defs = Arc::new(cache);
    let m = EntityDataMapper::new(conn.clone(), defs.clone(), factory());
    let index = EntityQueryIndex::new(conn, defs, factory());

    for i in 0..5 {
        let mut e = Entity::new("task");
        e.set_value("name", json!(format!("t{i}")));
        m.save(&mut e).unwrap();
    }

    let r = index.execute_query(&EntityQuery::new("task"), None).unwrap();
    assert_eq!(r.total_num, 3);
    let q = EntityQuery::new("task").and_where("name", Operator::Equal, json!("t0"));
    assert_eq!(index.execute_query(&q, None).unwrap().total_num, 0);
}

// ── Activity log ─────────────────────────────────────────────────

#[test]
fn events_land_in_the_activity_log() {
    let conn = open_store();
    let m = EntityDataMapper::new(conn.clone(), definitions(), factory());

    let mut e = Entity::new("task");
    e.set_value("name", json!("audited"));
    m.save(&mut e).unwrap();
    e.set_value("points", json!(1));
    m.save(&mut e).unwrap();

    let guard = conn.lock().unwrap();
    let events: Vec<String> = guard
        .prepare("SELECT event FROM activity_log ORDER BY id ASC")
        .unwrap()
        .query_map([], |row| row.get(0))
        .unwrap()
        .filter_map(|r| r.ok())
        .collect();
    assert_eq!(events, vec!["create", "update"]);
}
