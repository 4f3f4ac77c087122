//! The shared grouping lookup table.
//!
//! Groupings are single-select categorical values (status, priority,
//! folders) scoped to one (objType, field) pair, optionally hierarchical
//! via `parent_id`, and optionally private to one user.

use crate::error::StoreResult;
use crate::hierarchy;
use rusqlite::{params, Connection};
use std::sync::{Arc, Mutex};

/// One row of the grouping lookup.
#[derive(Debug, Clone, PartialEq)]
pub struct Grouping {
    pub id: i64,
    pub obj_type: String,
    pub field: String,
    pub name: String,
    pub parent_id: Option<i64>,
    pub user_id: Option<i64>,
}

/// CRUD and hierarchy access for groupings.
#[derive(Clone)]
pub struct GroupingStore {
    conn: Arc<Mutex<Connection>>,
}

impl GroupingStore {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    /// Adds a grouping and returns its id.
    pub fn add(
        &self,
        obj_type: &str,
        field: &str,
        name: &str,
        parent_id: Option<i64>,
        user_id: Option<i64>,
    ) -> StoreResult<i64> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO groupings (obj_type, field, name, parent_id, user_id)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![obj_type, field, name, parent_id, user_id],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Looks up one grouping by id.
    pub fn get(&self, id: i64) -> StoreResult<Option<Grouping>> {
        let conn = self.conn.lock().unwrap();
        let row = conn
            .query_row(
                "SELECT id, obj_type, field, name, parent_id, user_id
                 FROM groupings WHERE id = ?1",
                params![id],
                |row| {
                    Ok(Grouping {
                        id: row.get(0)?,
                        obj_type: row.get(1)?,
                        field: row.get(2)?,
                        name: row.get(3)?,
                        parent_id: row.get(4)?,
                        user_id: row.get(5)?,
                    })
                },
            )
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(other),
            })?;
        Ok(row)
    }

    /// Resolves a grouping's display name, honoring private scoping: a
    /// row owned by another user is invisible.
    pub fn display_name(&self, id: i64, owner: Option<i64>) -> StoreResult<Option<String>> {
        let conn = self.conn.lock().unwrap();
        let name: Option<String> = conn
            .query_row(
                "SELECT name FROM groupings
                 WHERE id = ?1 AND (user_id IS NULL OR user_id = ?2)",
                params![id, owner],
                |row| row.get(0),
            )
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(other),
            })?;
        Ok(name)
    }

    /// Lists groupings for one (objType, field) scope, public rows plus
    /// the given user's private rows.
    pub fn list(
        &self,
        obj_type: &str,
        field: &str,
        user_id: Option<i64>,
    ) -> StoreResult<Vec<Grouping>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, obj_type, field, name, parent_id, user_id FROM groupings
             WHERE obj_type = ?1 AND field = ?2
               AND (user_id IS NULL OR user_id = ?3)
             ORDER BY name ASC",
        )?;
        let rows = stmt
            .query_map(params![obj_type, field, user_id], |row| {
                Ok(Grouping {
                    id: row.get(0)?,
                    obj_type: row.get(1)?,
                    field: row.get(2)?,
                    name: row.get(3)?,
                    parent_id: row.get(4)?,
                    user_id: row.get(5)?,
                })
            })?
            .filter_map(|r| r.ok())
            .collect();
        Ok(rows)
    }

    /// Removes a grouping row. Membership rows referencing it are left to
    /// the caller; the query index treats dangling ids as non-matching.
    pub fn remove(&self, id: i64) -> StoreResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute("DELETE FROM groupings WHERE id = ?1", params![id])?;
        Ok(())
    }

    /// Ids of the subtree rooted at `id` (inclusive), cycle-guarded.
    pub fn descendant_ids(&self, id: i64) -> StoreResult<Vec<i64>> {
        let conn = self.conn.lock().unwrap();
        hierarchy::descendant_grouping_ids(&conn, id)
    }

    /// Ids up the parent chain from `id` (inclusive), cycle-guarded.
    pub fn ancestor_ids(&self, id: i64) -> StoreResult<Vec<i64>> {
        let conn = self.conn.lock().unwrap();
        hierarchy::ancestor_grouping_ids(&conn, id)
    }
}
