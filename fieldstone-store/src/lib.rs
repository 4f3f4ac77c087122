//! SQLite storage layer for Fieldstone.
//!
//! Entities are stored one JSON document per row, one table per object
//! type, with derived search text and side tables for multi-valued
//! references and grouping membership.
//!
//! # Architecture
//!
//! - [`EntityQueryIndex`] compiles typed queries into SQL and decodes
//!   result rows back into entities
//! - [`EntityDataMapper`] is the write path: validation, revisioning,
//!   commit allocation, unique names, display-name refresh, deletes,
//!   moved-entity redirection
//! - [`CommitManager`] / [`SyncStaleness`] keep the incremental-sync
//!   bookkeeping honest
//! - [`GroupingStore`] owns the shared grouping lookup and its hierarchy

mod collab;
mod commit;
mod error;
mod fragment;
mod fulltext;
mod groupings;
mod hierarchy;
mod index;
mod mapper;
mod schema;

pub use collab::{EntityAggregator, LoaderCacheInvalidator, Notifier};
pub use commit::{CommitManager, SyncStaleness};
pub use error::{StoreError, StoreResult};
pub use groupings::{Grouping, GroupingStore};
pub use index::EntityQueryIndex;
pub use mapper::{EntityDataMapper, UNAME_FIELD};
pub use schema::{ensure_entity_table, initialize_store_schema};

use rusqlite::Connection;
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Opens (or creates) a store at the given path with the shared schema
/// bootstrapped. Per-objType entity tables are created on first use.
pub fn open(path: &Path) -> StoreResult<Arc<Mutex<Connection>>> {
    let conn = Connection::open(path)?;
    initialize_store_schema(&conn)?;
    Ok(Arc::new(Mutex::new(conn)))
}

/// Opens an in-memory store (for testing).
pub fn open_in_memory() -> StoreResult<Arc<Mutex<Connection>>> {
    let conn = Connection::open_in_memory()?;
    initialize_store_schema(&conn)?;
    Ok(Arc::new(Mutex::new(conn)))
}
