//! Store schema bootstrap.
//!
//! Shared tables are created once at open; per-objType entity tables are
//! created on demand from the definition's table name.

use crate::error::StoreResult;
use fieldstone_model::EntityDefinition;
use rusqlite::Connection;

/// Creates the shared tables used by every object type.
pub fn initialize_store_schema(conn: &Connection) -> StoreResult<()> {
    conn.execute_batch(
        "
        -- Multi-valued object references: one row per (entity, field, target).
        CREATE TABLE IF NOT EXISTS object_assoc (
            obj_type        TEXT NOT NULL,
            field           TEXT NOT NULL,
            entity_id       INTEGER NOT NULL,
            target_obj_type TEXT NOT NULL,
            target_id       INTEGER NOT NULL,
            UNIQUE(obj_type, field, entity_id, target_obj_type, target_id)
        );
        CREATE INDEX IF NOT EXISTS idx_object_assoc_entity
            ON object_assoc(obj_type, field, entity_id);

        -- Shared categorical lookup, optionally hierarchical, optionally
        -- private to one user.
        CREATE TABLE IF NOT EXISTS groupings (
            id        INTEGER PRIMARY KEY AUTOINCREMENT,
            obj_type  TEXT NOT NULL,
            field     TEXT NOT NULL,
            name      TEXT NOT NULL,
            parent_id INTEGER,
            user_id   INTEGER
        );
        CREATE INDEX IF NOT EXISTS idx_groupings_scope ON groupings(obj_type, field);

        -- Multi-valued grouping membership.
        CREATE TABLE IF NOT EXISTS grouping_mem (
            obj_type    TEXT NOT NULL,
            field       TEXT NOT NULL,
            entity_id   INTEGER NOT NULL,
            grouping_id INTEGER NOT NULL,
            UNIQUE(obj_type, field, entity_id, grouping_id)
        );
        CREATE INDEX IF NOT EXISTS idx_grouping_mem_entity
            ON grouping_mem(obj_type, field, entity_id);

        -- Monotonic commit sequence per sync collection key.
        CREATE TABLE IF NOT EXISTS entity_commits (
            collection_key TEXT PRIMARY KEY,
            seq            INTEGER NOT NULL
        );

        -- Staleness transitions for incremental-sync consumers: exports at
        -- old_commit_id are stale once new_commit_id exists.
        CREATE TABLE IF NOT EXISTS entity_sync_stale (
            collection_type TEXT NOT NULL,
            old_commit_id   INTEGER NOT NULL,
            new_commit_id   INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_sync_stale_type
            ON entity_sync_stale(collection_type, new_commit_id);

        -- Moved/merged entity redirection, consulted on lookup miss.
        CREATE TABLE IF NOT EXISTS entity_moved (
            obj_type TEXT NOT NULL,
            from_id  INTEGER NOT NULL,
            to_id    INTEGER NOT NULL,
            PRIMARY KEY (obj_type, from_id)
        );

        -- Revision-history snapshots.
        CREATE TABLE IF NOT EXISTS entity_revisions (
            obj_type   TEXT NOT NULL,
            entity_id  INTEGER NOT NULL,
            revision   INTEGER NOT NULL,
            field_data TEXT NOT NULL,
            ts_saved   INTEGER NOT NULL,
            PRIMARY KEY (obj_type, entity_id, revision)
        );

        -- Audit trail of entity events.
        CREATE TABLE IF NOT EXISTS activity_log (
            id        INTEGER PRIMARY KEY AUTOINCREMENT,
            obj_type  TEXT NOT NULL,
            entity_id INTEGER,
            event     TEXT NOT NULL,
            detail    TEXT NOT NULL,
            ts        INTEGER NOT NULL
        );

        -- Recurrence patterns; identity rows are allocated before the
        -- first occurrence's row write, content filled afterward.
        CREATE TABLE IF NOT EXISTS recurrence_patterns (
            id              INTEGER PRIMARY KEY AUTOINCREMENT,
            obj_type        TEXT NOT NULL,
            first_entity_id INTEGER,
            recurrence_type TEXT,
            interval        INTEGER,
            date_start      INTEGER,
            date_end        INTEGER
        );
        ",
    )?;
    Ok(())
}

/// Creates the entity table for one object type if it does not exist.
///
/// One JSON document per row plus the derived full-text column; the
/// soft-delete flag lives inside the document.
pub fn ensure_entity_table(conn: &Connection, def: &EntityDefinition) -> StoreResult<()> {
    conn.execute_batch(&format!(
        "
        CREATE TABLE IF NOT EXISTS {table} (
            id           INTEGER PRIMARY KEY AUTOINCREMENT,
            guid         TEXT NOT NULL UNIQUE,
            field_data   TEXT NOT NULL,
            tsv_fulltext TEXT NOT NULL DEFAULT '',
            revision     INTEGER NOT NULL DEFAULT 0,
            commit_id    INTEGER
        );
        CREATE INDEX IF NOT EXISTS idx_{table}_commit ON {table}(commit_id);
        ",
        table = def.table_name,
    ))?;
    Ok(())
}
