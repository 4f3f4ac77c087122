//! Hierarchy traversal over entity parent fields and grouping parents.
//!
//! All walkers carry an explicit visited set; revisiting an id in either
//! direction is a `CircularReference` error, never an infinite loop.

use crate::error::{StoreError, StoreResult};
use fieldstone_model::EntityDefinition;
use rusqlite::{params, Connection};
use std::collections::HashSet;

/// Ids of the entity subtree rooted at `root` (inclusive), walking down
/// the definition's parent field.
pub fn descendant_entity_ids(
    conn: &Connection,
    def: &EntityDefinition,
    root: i64,
) -> StoreResult<Vec<i64>> {
    let parent = def
        .parent_field
        .as_deref()
        .ok_or_else(|| StoreError::UnknownField {
            obj_type: def.obj_type.clone(),
            field: "<parent_field>".into(),
        })?;

    let mut visited: HashSet<i64> = HashSet::new();
    let mut result = Vec::new();
    let mut frontier = vec![root];
    visited.insert(root);

    let sql = format!(
        "SELECT id FROM {} WHERE json_extract(field_data, '$.{}') = ?1",
        def.table_name, parent
    );
    while let Some(id) = frontier.pop() {
        result.push(id);
        let mut stmt = conn.prepare(&sql)?;
        let children: Vec<i64> = stmt
            .query_map(params![id], |row| row.get(0))?
            .filter_map(|r| r.ok())
            .collect();
        for child in children {
            if !visited.insert(child) {
                return Err(StoreError::CircularReference(format!(
                    "{} entity {} revisited walking down from {}",
                    def.obj_type, child, root
                )));
            }
            frontier.push(child);
        }
    }
    Ok(result)
}

/// Ids from `start` up its parent chain (inclusive).
pub fn ancestor_entity_ids(
    conn: &Connection,
    def: &EntityDefinition,
    start: i64,
) -> StoreResult<Vec<i64>> {
    let parent = def
        .parent_field
        .as_deref()
        .ok_or_else(|| StoreError::UnknownField {
            obj_type: def.obj_type.clone(),
            field: "<parent_field>".into(),
        })?;

    let mut visited: HashSet<i64> = HashSet::new();
    let mut result = Vec::new();
    let mut current = Some(start);

    let sql = format!(
        "SELECT json_extract(field_data, '$.{}') FROM {} WHERE id = ?1",
        parent, def.table_name
    );
    while let Some(id) = current {
        if !visited.insert(id) {
            return Err(StoreError::CircularReference(format!(
                "{} entity {} revisited walking up from {}",
                def.obj_type, id, start
            )));
        }
        result.push(id);
        let next: Option<i64> = conn
            .query_row(&sql, params![id], |row| row.get(0))
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(other),
            })?;
        current = next;
    }
    Ok(result)
}

/// Ids of the grouping subtree rooted at `root` (inclusive).
pub fn descendant_grouping_ids(conn: &Connection, root: i64) -> StoreResult<Vec<i64>> {
    let mut visited: HashSet<i64> = HashSet::new();
    let mut result = Vec::new();
    let mut frontier = vec![root];
    visited.insert(root);

    while let Some(id) = frontier.pop() {
        result.push(id);
        let mut stmt = conn.prepare("SELECT id FROM groupings WHERE parent_id = ?1")?;
        let children: Vec<i64> = stmt
            .query_map(params![id], |row| row.get(0))?
            .filter_map(|r| r.ok())
            .collect();
        for child in children {
            if !visited.insert(child) {
                return Err(StoreError::CircularReference(format!(
                    "grouping {child} revisited walking down from {root}"
                )));
            }
            frontier.push(child);
        }
    }
    Ok(result)
}

/// Ids from grouping `start` up its parent chain (inclusive).
pub fn ancestor_grouping_ids(conn: &Connection, start: i64) -> StoreResult<Vec<i64>> {
    let mut visited: HashSet<i64> = HashSet::new();
    let mut result = Vec::new();
    let mut current = Some(start);

    while let Some(id) = current {
        if !visited.insert(id) {
            return Err(StoreError::CircularReference(format!(
                "grouping {id} revisited walking up from {start}"
            )));
        }
        result.push(id);
        let next: Option<i64> = conn
            .query_row(
                "SELECT parent_id FROM groupings WHERE id = ?1",
                params![id],
                |row| row.get(0),
            )
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(other),
            })?;
        current = next;
    }
    Ok(result)
}
