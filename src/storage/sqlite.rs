//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the Storage trait.

use crate::state::{OidRecord, INFO_PLACEHOLDER};
use crate::storage::schema;
use crate::storage::traits::{PendingEntry, Storage, StorageError, StorageResult};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashSet;
use std::path::Path;

/// SQLite storage backend
pub struct SqliteStorage {
    conn: Connection,
}

impl SqliteStorage {
    /// Opens or creates the database at `path` and initializes its schema
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteStorage)` - Successfully opened/created database
    /// * `Err(StorageError)` - Failed to open database
    pub fn new(path: &Path) -> StorageResult<Self> {
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        let mut storage = Self { conn };
        storage.initialize_schema()?;
        Ok(storage)
    }

    /// Creates an in-memory database
    pub fn new_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        let mut storage = Self { conn };
        storage.initialize_schema()?;
        Ok(storage)
    }
}

impl Storage for SqliteStorage {
    fn initialize_schema(&mut self) -> StorageResult<()> {
        schema::initialize_schema(&self.conn)?;
        Ok(())
    }

    // ===== Primary Store =====

    fn insert_record(&mut self, oid: &str, record: &OidRecord) -> StorageResult<bool> {
        if !record.is_resolved() {
            return Ok(false);
        }

        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO mib (oid, name, sub_ch, sub_total, descr, inf, persisted_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(oid) DO UPDATE SET
                name = excluded.name,
                sub_ch = excluded.sub_ch,
                sub_total = excluded.sub_total,
                descr = excluded.descr,
                inf = excluded.inf,
                persisted_at = excluded.persisted_at",
            params![
                oid,
                record.name,
                record.sub_children,
                record.sub_total,
                record.description,
                record.information,
                now
            ],
        )?;
        Ok(true)
    }

    fn get_record(&self, oid: &str) -> StorageResult<Option<OidRecord>> {
        let record = self
            .conn
            .query_row(
                "SELECT name, sub_ch, sub_total, descr, inf FROM mib WHERE oid = ?1",
                params![oid],
                |row| {
                    Ok(OidRecord {
                        name: row.get(0)?,
                        sub_children: row.get(1)?,
                        sub_total: row.get(2)?,
                        description: row.get(3)?,
                        information: row.get(4)?,
                    })
                },
            )
            .optional()?;

        Ok(record)
    }

    fn count_records(&self) -> StorageResult<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM mib", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    fn load_persisted_ids(&self) -> StorageResult<HashSet<String>> {
        let mut stmt = self.conn.prepare("SELECT oid FROM mib")?;

        let ids = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<HashSet<String>, _>>()?;

        Ok(ids)
    }

    // ===== Durable Frontier =====

    fn enqueue_pending(&mut self, oid: &str) -> StorageResult<()> {
        self.conn
            .execute("INSERT INTO pending (oid) VALUES (?1)", params![oid])?;
        Ok(())
    }

    fn enqueue_discovered(&mut self, oid: &str, record: &OidRecord) -> StorageResult<()> {
        self.conn.execute(
            "INSERT INTO pending (oid, name, sub_ch, sub_total, descr, inf)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                oid,
                record.name,
                record.sub_children,
                record.sub_total,
                record.description,
                record.information
            ],
        )?;
        Ok(())
    }

    fn take_most_recent_pending(&mut self) -> StorageResult<PendingEntry> {
        let tx = self.conn.transaction()?;

        let entry = tx
            .query_row(
                "SELECT oid, name, sub_ch, sub_total, descr, inf FROM pending
                 WHERE leased = 0 ORDER BY id DESC LIMIT 1",
                [],
                |row| {
                    let name: Option<String> = row.get(1)?;
                    let record = match name {
                        Some(name) => Some(OidRecord {
                            name,
                            sub_children: row.get::<_, Option<i64>>(2)?.unwrap_or(0),
                            sub_total: row.get::<_, Option<i64>>(3)?.unwrap_or(0),
                            description: row.get::<_, Option<String>>(4)?.unwrap_or_default(),
                            information: row
                                .get::<_, Option<String>>(5)?
                                .unwrap_or_else(|| INFO_PLACEHOLDER.to_string()),
                        }),
                        None => None,
                    };
                    Ok(PendingEntry {
                        oid: row.get(0)?,
                        record,
                    })
                },
            )
            .optional()?;

        let entry = match entry {
            Some(entry) => entry,
            None => return Err(StorageError::FrontierEmpty),
        };

        // Duplicate entries for the same identifier are leased together
        tx.execute(
            "UPDATE pending SET leased = 1 WHERE oid = ?1",
            params![entry.oid],
        )?;
        tx.commit()?;

        Ok(entry)
    }

    fn peek_most_recent_pending(&self) -> StorageResult<Option<String>> {
        let oid = self
            .conn
            .query_row(
                "SELECT oid FROM pending WHERE leased = 0 ORDER BY id DESC LIMIT 1",
                [],
                |row| row.get(0),
            )
            .optional()?;
        Ok(oid)
    }

    fn remove_pending(&mut self, oid: &str) -> StorageResult<()> {
        let removed = self
            .conn
            .execute("DELETE FROM pending WHERE oid = ?1", params![oid])?;

        if removed == 0 {
            return Err(StorageError::PendingNotFound(oid.to_string()));
        }
        Ok(())
    }

    fn release_pending(&mut self, oid: &str) -> StorageResult<()> {
        let released = self.conn.execute(
            "UPDATE pending SET leased = 0 WHERE oid = ?1",
            params![oid],
        )?;

        if released == 0 {
            self.enqueue_pending(oid)?;
        }
        Ok(())
    }

    fn recover_leased(&mut self) -> StorageResult<u64> {
        let released = self
            .conn
            .execute("UPDATE pending SET leased = 0 WHERE leased = 1", [])?;
        Ok(released as u64)
    }

    fn count_pending(&self) -> StorageResult<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM pending", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    fn clear_pending(&mut self) -> StorageResult<()> {
        self.conn.execute("DELETE FROM pending", [])?;
        Ok(())
    }
}
