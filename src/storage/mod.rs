//! Storage module for persisting crawl data
//!
//! This module handles all database operations for the crawler, including:
//! - SQLite database initialization and schema management
//! - The primary store of resolved records
//! - The durable frontier used to resume interrupted crawls
//! - Serialized access for concurrent workers

mod schema;
mod shared;
mod sqlite;
mod traits;

pub use shared::{DynStorage, SharedStorage};
pub use sqlite::SqliteStorage;
pub use traits::{PendingEntry, Storage, StorageError, StorageResult};

use std::path::Path;

/// Opens the storage database, creating it if needed
pub fn open_storage(path: &Path) -> StorageResult<SqliteStorage> {
    SqliteStorage::new(path)
}
