//! The entity write path.
//!
//! [`EntityDataMapper::save`] turns an in-memory entity into durable
//! state plus the side effects consistency depends on: revisioning,
//! commit/sync bookkeeping, unique-name assignment, display-name
//! refresh, revision snapshots, collaborator notification. The document
//! write, side-table sync and revision snapshot share one transaction; a
//! stale-definition failure forces a definition-cache reset and retries
//! exactly once.

use crate::collab::{
    EntityAggregator, LoaderCacheInvalidator, Notifier, NullAggregator, NullInvalidator,
    NullNotifier,
};
use crate::commit::{CommitManager, SyncStaleness};
use crate::error::{StoreError, StoreResult};
use crate::fragment::{json_field, ref_id, sql_quote};
use crate::groupings::GroupingStore;
use crate::index::decode_row;
use crate::{fulltext, schema};
use fieldstone_model::{
    AcceptAll, DefinitionCache, Entity, EntityDefinition, EntityEvent, EntityFactory,
    EntityValidator, FieldType,
};
use fieldstone_types::{EntityId, ObjRef, UserContext};
use rusqlite::{params, Connection};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

/// Name of the unique-name slug field.
pub const UNAME_FIELD: &str = "uname";

/// Orchestrates entity persistence for every object type.
pub struct EntityDataMapper {
    conn: Arc<Mutex<Connection>>,
    definitions: Arc<DefinitionCache>,
    factory: Arc<EntityFactory>,
    validator: Arc<dyn EntityValidator>,
    commits: CommitManager,
    staleness: SyncStaleness,
    groupings: GroupingStore,
    notifier: Arc<dyn Notifier>,
    loader_cache: Arc<dyn LoaderCacheInvalidator>,
    aggregator: Arc<dyn EntityAggregator>,
    user: Option<UserContext>,
    /// Request-scoped memo of moved-entity redirects.
    moved_cache: Mutex<HashMap<(String, i64), i64>>,
}

impl EntityDataMapper {
    pub fn new(
        conn: Arc<Mutex<Connection>>,
        definitions: Arc<DefinitionCache>,
        factory: Arc<EntityFactory>,
    ) -> Self {
        Self {
            commits: CommitManager::new(conn.clone()),
            staleness: SyncStaleness::new(conn.clone()),
            groupings: GroupingStore::new(conn.clone()),
            conn,
            definitions,
            factory,
            validator: Arc::new(AcceptAll),
            notifier: Arc::new(NullNotifier),
            loader_cache: Arc::new(NullInvalidator),
            aggregator: Arc::new(NullAggregator),
            user: None,
            moved_cache: Mutex::new(HashMap::new()),
        }
    }

    #[must_use]
    pub fn with_validator(mut self, validator: Arc<dyn EntityValidator>) -> Self {
        self.validator = validator;
        self
    }

    #[must_use]
    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    #[must_use]
    pub fn with_loader_cache(mut self, cache: Arc<dyn LoaderCacheInvalidator>) -> Self {
        self.loader_cache = cache;
        self
    }

    #[must_use]
    pub fn with_aggregator(mut self, aggregator: Arc<dyn EntityAggregator>) -> Self {
        self.aggregator = aggregator;
        self
    }

    #[must_use]
    pub fn with_user(mut self, user: UserContext) -> Self {
        self.user = Some(user);
        self
    }

    /// The commit allocator this mapper writes through.
    pub fn commits(&self) -> &CommitManager {
        &self.commits
    }

    /// The grouping store this mapper resolves display names against.
    pub fn groupings(&self) -> &GroupingStore {
        &self.groupings
    }

    // ── Save ─────────────────────────────────────────────────────

    /// Saves an entity and runs every consistency side effect.
    ///
    /// Validation failure is the only abort-before-write; everything
    /// after the row write proceeds best-effort, and a write failure
    /// after the single stale-definition retry propagates.
    pub fn save(&self, entity: &mut Entity) -> StoreResult<EntityId> {
        let def = self
            .definitions
            .get(&entity.obj_type)
            .ok_or_else(|| StoreError::MissingDefinition(entity.obj_type.clone()))?;

        // 1. Validate; abort with no partial write.
        self.validator
            .validate(entity, &def)
            .map_err(StoreError::Validation)?;

        let event = if entity.id.is_none() {
            EntityEvent::Create
        } else {
            EntityEvent::Update
        };
        if event == EntityEvent::Create {
            let conn = self.conn.lock().unwrap();
            schema::ensure_entity_table(&conn, &def)?;
        }

        // 2. Revision increment (starts at 1).
        entity.revision += 1;

        // 3. Commit allocation; keep the previous id for staleness marking.
        let prev_commit = entity.commit_id;
        let new_commit = self
            .commits
            .create_commit(&format!("entities/{}", entity.obj_type))?;
        entity.commit_id = Some(new_commit);

        // 4. Field defaults for this event.
        entity.apply_defaults(&def, event, self.user.as_ref(), now_secs());

        // 5. Unique name, when required and not yet set.
        self.assign_unique_name(&def, entity)?;

        // 6. Display-name cache refresh for reference fields.
        self.refresh_foreign_names(&def, entity)?;

        // 7. Recurrence identity pre-allocation breaks the circular
        //    entity/pattern reference before the row write.
        self.allocate_recurrence_identity(&def, entity)?;

        // 8. Type-specific pre-save hook.
        let behavior = self.factory.behavior(&entity.obj_type);
        behavior.on_before_save(entity);

        // 9-10. Row write + side tables + revision snapshot, one
        // transaction, retried once on a stale definition.
        match self.write_row(&def, entity) {
            Err(StoreError::StaleDefinition(msg)) => {
                warn!(obj_type = %entity.obj_type, %msg, "stale definition, resetting cache and retrying write");
                self.definitions.invalidate(&entity.obj_type);
                let def = match self.definitions.get(&entity.obj_type) {
                    Some(fresh) => fresh,
                    None => {
                        // No backing source to reload from; re-register
                        // the definition we already hold.
                        self.definitions.insert((*def).clone());
                        def.clone()
                    }
                };
                {
                    let conn = self.conn.lock().unwrap();
                    schema::ensure_entity_table(&conn, &def)?;
                }
                self.write_row(&def, entity)?;
            }
            other => other?,
        }
        let id = entity
            .id
            .ok_or_else(|| StoreError::InvalidData("row write did not assign an id".into()))?;

        // 11-12. The entity table is the query index, so visibility is
        // immediate; still invalidate any loader cache entry.
        self.loader_cache.invalidate(&entity.obj_type, id);

        // 13. Mark the superseded commit stale for sync consumers.
        if let Some(prev) = prev_commit {
            self.staleness
                .mark_stale(&entity.obj_type, prev, new_commit)?;
        }

        // 14. Notify.
        let event_name = match event {
            EntityEvent::Create => "create",
            EntityEvent::Update => "update",
        };
        self.notifier.notify(event_name, entity);

        // 15. Type-specific post-save hook.
        behavior.on_after_save(entity);

        // 16. Dependent-aggregate recompute.
        self.aggregator.recompute_dependents(entity);

        // 17. The entity was just persisted; its diff is spent.
        entity.reset_dirty();

        // 18. Persist recurrence content for the series original.
        self.save_recurrence_content(&def, entity)?;

        // 19. Audit trail.
        self.log_activity(entity, event_name)?;

        debug!(obj_type = %entity.obj_type, %id, revision = entity.revision, "saved entity");
        Ok(id)
    }

    fn write_row(&self, def: &EntityDefinition, entity: &mut Entity) -> StoreResult<()> {
        let doc = build_document(def, entity)?;
        let search_text = fulltext::build_search_text(def, entity);

        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction().map_err(stale_guard)?;

        let assigned_id: i64 = match entity.id {
            None => {
                tx.execute(
                    &format!(
                        "INSERT INTO {} (guid, field_data, tsv_fulltext, revision, commit_id)
                         VALUES (?1, ?2, ?3, ?4, ?5)",
                        def.table_name
                    ),
                    params![
                        entity.guid.to_string(),
                        doc,
                        search_text,
                        entity.revision,
                        entity.commit_id.map(|c| c.as_i64()),
                    ],
                )
                .map_err(stale_guard)?;
                tx.last_insert_rowid()
            }
            Some(id) => {
                let updated = tx
                    .execute(
                        &format!(
                            "UPDATE {} SET field_data = ?1, tsv_fulltext = ?2, revision = ?3,
                                    commit_id = ?4 WHERE id = ?5",
                            def.table_name
                        ),
                        params![
                            doc,
                            search_text,
                            entity.revision,
                            entity.commit_id.map(|c| c.as_i64()),
                            id.as_i64(),
                        ],
                    )
                    .map_err(stale_guard)?;
                if updated == 0 {
                    // Row vanished (e.g. restored after a schema reset);
                    // reinsert under the same id.
                    tx.execute(
                        &format!(
                            "INSERT INTO {} (id, guid, field_data, tsv_fulltext, revision, commit_id)
                             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                            def.table_name
                        ),
                        params![
                            id.as_i64(),
                            entity.guid.to_string(),
                            doc,
                            search_text,
                            entity.revision,
                            entity.commit_id.map(|c| c.as_i64()),
                        ],
                    )
                    .map_err(stale_guard)?;
                }
                id.as_i64()
            }
        };

        sync_side_tables(&tx, def, entity, assigned_id).map_err(stale_guard_store)?;

        if def.store_revisions {
            tx.execute(
                "INSERT OR REPLACE INTO entity_revisions
                     (obj_type, entity_id, revision, field_data, ts_saved)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![def.obj_type, assigned_id, entity.revision, doc, now_secs()],
            )
            .map_err(stale_guard)?;
        }

        if let Some(cap) = def.capped {
            // Trim oldest rows beyond the cap.
            tx.execute(
                &format!(
                    "DELETE FROM {t} WHERE id NOT IN
                         (SELECT id FROM {t} ORDER BY id DESC LIMIT {cap})",
                    t = def.table_name
                ),
                [],
            )
            .map_err(stale_guard)?;
        }

        tx.commit().map_err(stale_guard)?;
        entity.id = Some(EntityId::new(assigned_id));
        Ok(())
    }

    // ── Delete ───────────────────────────────────────────────────

    /// Deletes an entity: soft by default, hard when forced or when the
    /// entity is already soft-deleted. Returns true for a hard delete.
    pub fn delete(&self, entity: &mut Entity, force_hard: bool) -> StoreResult<bool> {
        let def = self
            .definitions
            .get(&entity.obj_type)
            .ok_or_else(|| StoreError::MissingDefinition(entity.obj_type.clone()))?;
        let Some(id) = entity.id else {
            return Ok(false);
        };

        if !force_hard && !entity.is_deleted() {
            // Soft delete rides the save pipeline: new commit id,
            // staleness mark, snapshot, notification.
            entity.set_deleted(true);
            self.save(entity)?;
            return Ok(false);
        }

        let behavior = self.factory.behavior(&entity.obj_type);
        behavior.on_before_delete(entity);

        // Purge the owned recurrence pattern when this entity is the
        // series' first occurrence.
        if let Some(pattern) = &entity.recurrence_pattern {
            if let Some(pattern_id) = pattern.id {
                let owns_series =
                    !entity.is_recurrence_exception && pattern.first_entity_id == Some(id);
                if owns_series {
                    let conn = self.conn.lock().unwrap();
                    conn.execute(
                        "DELETE FROM recurrence_patterns WHERE id = ?1",
                        params![pattern_id.as_i64()],
                    )?;
                }
            }
        }

        let prev_commit = entity.commit_id;
        let new_commit = self
            .commits
            .create_commit(&format!("entities/{}", entity.obj_type))?;

        {
            let mut conn = self.conn.lock().unwrap();
            let tx = conn.transaction()?;
            tx.execute(
                "DELETE FROM object_assoc WHERE obj_type = ?1 AND entity_id = ?2",
                params![def.obj_type, id.as_i64()],
            )?;
            tx.execute(
                "DELETE FROM grouping_mem WHERE obj_type = ?1 AND entity_id = ?2",
                params![def.obj_type, id.as_i64()],
            )?;
            tx.execute(
                &format!("DELETE FROM {} WHERE id = ?1", def.table_name),
                params![id.as_i64()],
            )?;
            tx.commit()?;
        }

        behavior.on_after_delete(entity);

        if let Some(prev) = prev_commit {
            self.staleness
                .mark_stale(&entity.obj_type, prev, new_commit)?;
        }
        self.loader_cache.invalidate(&entity.obj_type, id);
        self.notifier.notify("delete", entity);
        self.log_activity(entity, "delete")?;

        debug!(obj_type = %entity.obj_type, %id, "hard deleted entity");
        Ok(true)
    }

    // ── Load ─────────────────────────────────────────────────────

    /// Loads an entity by id. A missing id consults the moved-entity
    /// redirection table and transparently loads the target; exhausted
    /// lookup is `Ok(None)`, not an error.
    pub fn get_by_id(&self, obj_type: &str, id: EntityId) -> StoreResult<Option<Entity>> {
        let def = self
            .definitions
            .get(obj_type)
            .ok_or_else(|| StoreError::MissingDefinition(obj_type.to_string()))?;

        let mut current = id.as_i64();
        let mut seen: HashSet<i64> = HashSet::new();
        loop {
            if !seen.insert(current) {
                // Redirect loop; give up rather than spin.
                return Ok(None);
            }
            if let Some(entity) = self.load_row(&def, current)? {
                return Ok(Some(entity));
            }
            match self.moved_to(obj_type, current)? {
                Some(target) => current = target,
                None => return Ok(None),
            }
        }
    }

    /// Records that `from` was merged/renamed into `to`.
    pub fn set_entity_moved_to(
        &self,
        obj_type: &str,
        from: EntityId,
        to: EntityId,
    ) -> StoreResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT OR REPLACE INTO entity_moved (obj_type, from_id, to_id) VALUES (?1, ?2, ?3)",
            params![obj_type, from.as_i64(), to.as_i64()],
        )?;
        drop(conn);
        self.moved_cache
            .lock()
            .unwrap()
            .insert((obj_type.to_string(), from.as_i64()), to.as_i64());
        Ok(())
    }

    /// Revision-history snapshots for one entity, oldest first.
    pub fn get_revisions(&self, obj_type: &str, id: EntityId) -> StoreResult<Vec<(i64, Value)>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT revision, field_data FROM entity_revisions
             WHERE obj_type = ?1 AND entity_id = ?2 ORDER BY revision ASC",
        )?;
        let rows: Vec<(i64, String)> = stmt
            .query_map(params![obj_type, id.as_i64()], |row| {
                Ok((row.get(0)?, row.get(1)?))
            })?
            .filter_map(|r| r.ok())
            .collect();
        drop(stmt);
        drop(conn);

        let mut result = Vec::with_capacity(rows.len());
        for (revision, doc) in rows {
            result.push((revision, serde_json::from_str(&doc)?));
        }
        Ok(result)
    }

    fn load_row(&self, def: &EntityDefinition, id: i64) -> StoreResult<Option<Entity>> {
        let conn = self.conn.lock().unwrap();
        schema::ensure_entity_table(&conn, def)?;
        let row = conn
            .query_row(
                &format!(
                    "SELECT id, guid, field_data, revision, commit_id FROM {} WHERE id = ?1",
                    def.table_name
                ),
                params![id],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, i64>(3)?,
                        row.get::<_, Option<i64>>(4)?,
                    ))
                },
            )
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(other),
            })?;
        drop(conn);

        match row {
            Some((id, guid, field_data, revision, commit_id)) => Ok(Some(decode_row(
                &self.factory,
                &def.obj_type,
                id,
                &guid,
                &field_data,
                revision,
                commit_id,
            )?)),
            None => Ok(None),
        }
    }

    fn moved_to(&self, obj_type: &str, id: i64) -> StoreResult<Option<i64>> {
        if let Some(target) = self
            .moved_cache
            .lock()
            .unwrap()
            .get(&(obj_type.to_string(), id))
        {
            return Ok(Some(*target));
        }
        let conn = self.conn.lock().unwrap();
        let target: Option<i64> = conn
            .query_row(
                "SELECT to_id FROM entity_moved WHERE obj_type = ?1 AND from_id = ?2",
                params![obj_type, id],
                |row| row.get(0),
            )
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(other),
            })?;
        drop(conn);
        if let Some(target) = target {
            self.moved_cache
                .lock()
                .unwrap()
                .insert((obj_type.to_string(), id), target);
        }
        Ok(target)
    }

    // ── Unique names ─────────────────────────────────────────────

    fn assign_unique_name(&self, def: &EntityDefinition, entity: &mut Entity) -> StoreResult<()> {
        let Some(path) = &def.unique_name_path else {
            return Ok(());
        };
        if entity
            .get_str(UNAME_FIELD)
            .is_some_and(|s| !s.is_empty())
        {
            return Ok(());
        }

        let segments: Vec<&str> = path.split(':').collect();
        let seed_field = segments.last().copied().unwrap_or("name");
        let seed = if seed_field == "name" {
            entity.display_name()
        } else {
            value_to_string(entity.get_value(seed_field))
        };

        let mut slug = slugify(&seed);
        if slug.is_empty() {
            slug = random_token();
        }

        let namespaces: Vec<(&str, String)> = segments[..segments.len() - 1]
            .iter()
            .map(|ns| (*ns, value_to_string(entity.get_value(ns))))
            .collect();

        if !self.uname_is_unique(def, entity, &slug, &namespaces)? {
            let suffix = match entity.id {
                Some(id) => id.to_string(),
                None => random_token(),
            };
            slug = format!("{slug}-{suffix}");
        }
        entity.set_value(UNAME_FIELD, Value::String(slug));
        Ok(())
    }

    fn uname_is_unique(
        &self,
        def: &EntityDefinition,
        entity: &Entity,
        slug: &str,
        namespaces: &[(&str, String)],
    ) -> StoreResult<bool> {
        let conn = self.conn.lock().unwrap();
        schema::ensure_entity_table(&conn, def)?;

        let mut sql = format!(
            "SELECT COUNT(*) FROM {} WHERE {} = {}",
            def.table_name,
            json_field(UNAME_FIELD),
            sql_quote(slug)
        );
        for (field, value) in namespaces {
            sql.push_str(&format!(" AND {} = {}", json_field(field), sql_quote(value)));
        }
        if let Some(id) = entity.id {
            sql.push_str(&format!(" AND id != {}", id.as_i64()));
        }
        let count: i64 = conn.query_row(&sql, [], |row| row.get(0))?;
        Ok(count == 0)
    }

    // ── Foreign-key display names ────────────────────────────────

    /// Re-resolves the cached display name of every reference field so
    /// stale denormalized names never linger after a referenced record
    /// was renamed.
    fn refresh_foreign_names(&self, def: &EntityDefinition, entity: &mut Entity) -> StoreResult<()> {
        let owner = entity.get_i64("owner_id");

        for field in &def.fields {
            if !field.field_type.is_reference() {
                continue;
            }
            let Some(value) = entity.get_value(&field.name).cloned() else {
                continue;
            };
            entity.clear_value_names(&field.name);

            match field.field_type {
                FieldType::Grouping => {
                    if let Some(gid) = ref_id(&value) {
                        if let Some(name) = self.groupings.display_name(gid, owner)? {
                            entity.set_value_name(&field.name, &gid.to_string(), &name);
                        }
                    }
                }
                FieldType::GroupingMulti => {
                    if let Value::Array(items) = &value {
                        for item in items {
                            if let Some(gid) = ref_id(item) {
                                if let Some(name) = self.groupings.display_name(gid, owner)? {
                                    entity.set_value_name(&field.name, &gid.to_string(), &name);
                                }
                            }
                        }
                    }
                }
                FieldType::Object => {
                    if let Some(fresh) = self.resolve_object_name(&field.subtype, &value)? {
                        entity.set_value_name(&field.name, &fresh.0, &fresh.1);
                        if let Some(rewritten) = fresh.2 {
                            entity.set_value(&field.name, rewritten);
                        }
                    }
                }
                FieldType::ObjectMulti => {
                    if let Value::Array(items) = &value {
                        let mut rewritten = items.clone();
                        let mut changed = false;
                        for (i, item) in items.iter().enumerate() {
                            if let Some(fresh) = self.resolve_object_name(&field.subtype, item)? {
                                entity.set_value_name(&field.name, &fresh.0, &fresh.1);
                                if let Some(new_item) = fresh.2 {
                                    rewritten[i] = new_item;
                                    changed = true;
                                }
                            }
                        }
                        if changed {
                            entity.set_value(&field.name, Value::Array(rewritten));
                        }
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Resolves one object reference value to (cache key, display name,
    /// optional rewritten value). Encoded `objType:id|staleName` strings
    /// are re-encoded with the fresh name.
    fn resolve_object_name(
        &self,
        subtype: &Option<String>,
        value: &Value,
    ) -> StoreResult<Option<(String, String, Option<Value>)>> {
        match value {
            Value::Number(n) => {
                let Some(id) = n.as_i64() else {
                    return Ok(None);
                };
                let Some(target_type) = subtype.as_deref() else {
                    return Ok(None);
                };
                let Some(name) = self.fetch_display_name(target_type, id)? else {
                    return Ok(None);
                };
                Ok(Some((id.to_string(), name, None)))
            }
            Value::String(s) => {
                if let Ok(mut r) = s.parse::<ObjRef>() {
                    let Some(name) = self.fetch_display_name(&r.obj_type, r.id.as_i64())? else {
                        return Ok(None);
                    };
                    r.name = Some(name.clone());
                    let encoded = r.encode();
                    let rewritten = if encoded != *s {
                        Some(Value::String(encoded))
                    } else {
                        None
                    };
                    Ok(Some((r.id.to_string(), name, rewritten)))
                } else if let Ok(id) = s.parse::<i64>() {
                    let Some(target_type) = subtype.as_deref() else {
                        return Ok(None);
                    };
                    let Some(name) = self.fetch_display_name(target_type, id)? else {
                        return Ok(None);
                    };
                    Ok(Some((id.to_string(), name, None)))
                } else {
                    Ok(None)
                }
            }
            _ => Ok(None),
        }
    }

    fn fetch_display_name(&self, obj_type: &str, id: i64) -> StoreResult<Option<String>> {
        let Some(def) = self.definitions.get(obj_type) else {
            return Ok(None);
        };
        let conn = self.conn.lock().unwrap();
        schema::ensure_entity_table(&conn, &def)?;
        let doc: Option<String> = conn
            .query_row(
                &format!("SELECT field_data FROM {} WHERE id = ?1", def.table_name),
                params![id],
                |row| row.get(0),
            )
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(other),
            })?;
        let Some(doc) = doc else {
            return Ok(None);
        };
        let parsed: Value = serde_json::from_str(&doc)?;
        let name = parsed
            .get("name")
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
            .or_else(|| {
                parsed
                    .get("title")
                    .and_then(|v| v.as_str())
                    .filter(|s| !s.is_empty())
            })
            .map(|s| s.to_string())
            .unwrap_or_else(|| id.to_string());
        Ok(Some(name))
    }

    // ── Recurrence ───────────────────────────────────────────────

    fn allocate_recurrence_identity(
        &self,
        def: &EntityDefinition,
        entity: &mut Entity,
    ) -> StoreResult<()> {
        if !def.recurs {
            return Ok(());
        }
        let Some(pattern) = entity.recurrence_pattern.as_mut() else {
            return Ok(());
        };
        if pattern.id.is_none() {
            let conn = self.conn.lock().unwrap();
            conn.execute(
                "INSERT INTO recurrence_patterns (obj_type) VALUES (?1)",
                params![def.obj_type],
            )?;
            pattern.id = Some(EntityId::new(conn.last_insert_rowid()));
        }
        let pattern_id = pattern.id.map(|p| p.as_i64());
        entity.set_value("recurrence_pattern_id", Value::from(pattern_id));
        Ok(())
    }

    fn save_recurrence_content(
        &self,
        def: &EntityDefinition,
        entity: &mut Entity,
    ) -> StoreResult<()> {
        if !def.recurs || entity.is_recurrence_exception {
            return Ok(());
        }
        let entity_id = entity.id;
        let Some(pattern) = entity.recurrence_pattern.as_mut() else {
            return Ok(());
        };
        let Some(pattern_id) = pattern.id else {
            return Ok(());
        };
        if pattern.first_entity_id.is_none() {
            pattern.first_entity_id = entity_id;
        }
        let type_name = serde_json::to_value(pattern.recurrence_type)?
            .as_str()
            .unwrap_or("daily")
            .to_string();
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE recurrence_patterns
             SET first_entity_id = ?1, recurrence_type = ?2, interval = ?3,
                 date_start = ?4, date_end = ?5
             WHERE id = ?6",
            params![
                pattern.first_entity_id.map(|i| i.as_i64()),
                type_name,
                pattern.interval,
                pattern.date_start,
                pattern.date_end,
                pattern_id.as_i64(),
            ],
        )?;
        Ok(())
    }

    // ── Activity log ─────────────────────────────────────────────

    fn log_activity(&self, entity: &Entity, event: &str) -> StoreResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO activity_log (obj_type, entity_id, event, detail, ts)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                entity.obj_type,
                entity.id.map(|i| i.as_i64()),
                event,
                entity.display_name(),
                now_secs(),
            ],
        )?;
        Ok(())
    }
}

// ── Helpers ──────────────────────────────────────────────────────

fn now_secs() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

fn random_token() -> String {
    uuid::Uuid::new_v4().simple().to_string()[..8].to_string()
}

fn value_to_string(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        _ => String::new(),
    }
}

/// Lowercases, hyphenates spaces, spells out ampersands, and strips
/// everything outside `[a-z0-9_-]`.
fn slugify(seed: &str) -> String {
    seed.to_lowercase()
        .replace(' ', "-")
        .replace('&', "_and_")
        .chars()
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || *c == '-' || *c == '_')
        .collect()
}

/// Serializes the entity document, embedding `<field>_fval` display-name
/// maps for reference fields.
fn build_document(def: &EntityDefinition, entity: &Entity) -> StoreResult<String> {
    let mut doc = entity.values().clone();
    for field in &def.fields {
        if !field.field_type.is_reference() {
            continue;
        }
        if let Some(names) = entity.value_names(&field.name) {
            if !names.is_empty() {
                let map: serde_json::Map<String, Value> = names
                    .iter()
                    .map(|(k, v)| (k.clone(), Value::String(v.clone())))
                    .collect();
                doc.insert(format!("{}_fval", field.name), Value::Object(map));
            }
        }
    }
    Ok(serde_json::to_string(&Value::Object(doc))?)
}

/// Replaces the association and membership rows for an entity's
/// multi-valued reference fields.
fn sync_side_tables(
    conn: &Connection,
    def: &EntityDefinition,
    entity: &Entity,
    entity_id: i64,
) -> StoreResult<()> {
    for field in &def.fields {
        match field.field_type {
            FieldType::ObjectMulti => {
                conn.execute(
                    "DELETE FROM object_assoc WHERE obj_type = ?1 AND field = ?2 AND entity_id = ?3",
                    params![def.obj_type, field.name, entity_id],
                )?;
                if let Some(Value::Array(items)) = entity.get_value(&field.name) {
                    for item in items {
                        let Some(target_id) = ref_id(item) else {
                            continue;
                        };
                        let target_type = item
                            .as_str()
                            .and_then(|s| s.parse::<ObjRef>().ok())
                            .map(|r| r.obj_type)
                            .or_else(|| field.subtype.clone())
                            .unwrap_or_else(|| "_".to_string());
                        conn.execute(
                            "INSERT OR IGNORE INTO object_assoc
                                 (obj_type, field, entity_id, target_obj_type, target_id)
                             VALUES (?1, ?2, ?3, ?4, ?5)",
                            params![def.obj_type, field.name, entity_id, target_type, target_id],
                        )?;
                    }
                }
            }
            FieldType::GroupingMulti => {
                conn.execute(
                    "DELETE FROM grouping_mem WHERE obj_type = ?1 AND field = ?2 AND entity_id = ?3",
                    params![def.obj_type, field.name, entity_id],
                )?;
                if let Some(Value::Array(items)) = entity.get_value(&field.name) {
                    for item in items {
                        let Some(gid) = ref_id(item) else {
                            continue;
                        };
                        conn.execute(
                            "INSERT OR IGNORE INTO grouping_mem
                                 (obj_type, field, entity_id, grouping_id)
                             VALUES (?1, ?2, ?3, ?4)",
                            params![def.obj_type, field.name, entity_id, gid],
                        )?;
                    }
                }
            }
            _ => {}
        }
    }
    Ok(())
}

/// Maps schema-drift database failures into the retryable class.
fn stale_guard(e: rusqlite::Error) -> StoreError {
    let msg = e.to_string();
    if msg.contains("no such table") || msg.contains("no such column") || msg.contains("has no column")
    {
        StoreError::StaleDefinition(msg)
    } else {
        StoreError::Database(e)
    }
}

fn stale_guard_store(e: StoreError) -> StoreError {
    match e {
        StoreError::Database(db) => stale_guard(db),
        other => other,
    }
}
