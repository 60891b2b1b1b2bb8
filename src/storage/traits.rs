//! Storage traits and error types
//!
//! This module defines the trait interface for storage backends and
//! associated error types.

use crate::state::OidRecord;
use std::collections::HashSet;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    /// No pending entry is available to take. Not a failure for the feeder.
    #[error("Frontier is empty")]
    FrontierEmpty,

    /// The pending entry to remove does not exist
    #[error("Pending entry not found: {0}")]
    PendingNotFound(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Storage lock poisoned")]
    LockPoisoned,

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

impl StorageError {
    /// True for the conditions the crawl treats as control flow, not failure
    pub fn is_benign(&self) -> bool {
        matches!(self, Self::FrontierEmpty | Self::PendingNotFound(_))
    }
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// A pending identifier and the record its parent page gave it, if any
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingEntry {
    pub oid: String,
    pub record: Option<OidRecord>,
}

/// Trait for storage backend implementations
///
/// The backend owns two tables: the primary store of resolved records, and
/// the durable frontier of identifiers that were discovered but not yet
/// finalized. Callers serialize access through
/// [`SharedStorage`](crate::storage::SharedStorage).
pub trait Storage {
    // ===== Schema =====

    /// Creates tables and indexes if they do not exist
    fn initialize_schema(&mut self) -> StorageResult<()>;

    // ===== Primary Store =====

    /// Writes the record for `oid`, replacing any earlier one
    ///
    /// Records without a name are skipped. Returns whether a row was written.
    fn insert_record(&mut self, oid: &str, record: &OidRecord) -> StorageResult<bool>;

    /// Gets the stored record for `oid`
    fn get_record(&self, oid: &str) -> StorageResult<Option<OidRecord>>;

    /// Counts stored records
    fn count_records(&self) -> StorageResult<u64>;

    /// Loads every identifier with a stored record
    ///
    /// Used once at startup to warm the dedup cache.
    fn load_persisted_ids(&self) -> StorageResult<HashSet<String>>;

    // ===== Durable Frontier =====

    /// Appends a pending entry with no record. Duplicates are tolerated.
    fn enqueue_pending(&mut self, oid: &str) -> StorageResult<()>;

    /// Appends a pending entry carrying the record found on the parent page
    ///
    /// The record survives a crash with the entry, so a resumed crawl can
    /// still persist it.
    fn enqueue_discovered(&mut self, oid: &str, record: &OidRecord) -> StorageResult<()>;

    /// Takes the most recently inserted pending entry
    ///
    /// The entry is leased rather than deleted: it stays on disk until
    /// [`remove_pending`](Storage::remove_pending) so a crash mid-processing
    /// does not lose it. Fails with [`StorageError::FrontierEmpty`] when no
    /// unleased entry remains.
    fn take_most_recent_pending(&mut self) -> StorageResult<PendingEntry>;

    /// Returns the most recently inserted unleased entry without taking it
    fn peek_most_recent_pending(&self) -> StorageResult<Option<String>>;

    /// Deletes every entry for `oid`
    ///
    /// Fails with [`StorageError::PendingNotFound`] when none exists.
    fn remove_pending(&mut self, oid: &str) -> StorageResult<()>;

    /// Returns a leased entry to the takeable set, re-enqueueing it if gone
    fn release_pending(&mut self, oid: &str) -> StorageResult<()>;

    /// Releases every lease left behind by an interrupted run
    ///
    /// Returns the number of entries released.
    fn recover_leased(&mut self) -> StorageResult<u64>;

    /// Counts pending entries, leased or not
    fn count_pending(&self) -> StorageResult<u64>;

    /// Drops the whole frontier
    fn clear_pending(&mut self) -> StorageResult<()>;
}
