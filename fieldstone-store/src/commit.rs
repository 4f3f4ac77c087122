//! Commit allocation and sync staleness bookkeeping.
//!
//! Every mutating save/delete allocates a commit id for its collection
//! key (`entities/<objType>`); consumers of incremental sync use the
//! staleness transitions to detect which exported copies are out of date.

use crate::error::StoreResult;
use fieldstone_types::CommitId;
use rusqlite::{params, Connection};
use std::sync::{Arc, Mutex};

/// Allocates strictly increasing commit ids per collection key.
///
/// Allocation is a single atomic upsert on the sequence row, so ids are
/// never duplicated even under concurrent writers sharing the database.
#[derive(Clone)]
pub struct CommitManager {
    conn: Arc<Mutex<Connection>>,
}

impl CommitManager {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    /// Allocates the next commit id for a collection key.
    pub fn create_commit(&self, key: &str) -> StoreResult<CommitId> {
        let conn = self.conn.lock().unwrap();
        let seq: i64 = conn.query_row(
            "INSERT INTO entity_commits (collection_key, seq) VALUES (?1, 1)
             ON CONFLICT(collection_key) DO UPDATE SET seq = seq + 1
             RETURNING seq",
            params![key],
            |row| row.get(0),
        )?;
        Ok(CommitId::new(seq))
    }

    /// The last allocated commit id for a key, if any.
    pub fn head_commit(&self, key: &str) -> StoreResult<Option<CommitId>> {
        let conn = self.conn.lock().unwrap();
        let seq: Option<i64> = conn
            .query_row(
                "SELECT seq FROM entity_commits WHERE collection_key = ?1",
                params![key],
                |row| row.get(0),
            )
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(other),
            })?;
        Ok(seq.map(CommitId::new))
    }
}

/// Records which exported commits became stale.
#[derive(Clone)]
pub struct SyncStaleness {
    conn: Arc<Mutex<Connection>>,
}

impl SyncStaleness {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    /// Registers that exports at `old` are stale now that `new` exists.
    pub fn mark_stale(&self, collection_type: &str, old: CommitId, new: CommitId) -> StoreResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO entity_sync_stale (collection_type, old_commit_id, new_commit_id)
             VALUES (?1, ?2, ?3)",
            params![collection_type, old.as_i64(), new.as_i64()],
        )?;
        Ok(())
    }

    /// Stale transitions for a collection type newer than `since`,
    /// ordered by the superseding commit.
    pub fn stale_commits(
        &self,
        collection_type: &str,
        since: CommitId,
    ) -> StoreResult<Vec<(CommitId, CommitId)>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT old_commit_id, new_commit_id FROM entity_sync_stale
             WHERE collection_type = ?1 AND new_commit_id > ?2
             ORDER BY new_commit_id ASC",
        )?;
        let rows = stmt
            .query_map(params![collection_type, since.as_i64()], |row| {
                Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?))
            })?
            .filter_map(|r| r.ok())
            .map(|(old, new)| (CommitId::new(old), CommitId::new(new)))
            .collect();
        Ok(rows)
    }
}
