//! Serialized access to the storage backend
//!
//! SQLite allows a single writer at a time. Every writer in the pipeline
//! (feeder, register workers, finalize workers) goes through the one mutex
//! held here. The lock is never held across an `.await`.

use crate::state::OidRecord;
use crate::storage::traits::{PendingEntry, Storage, StorageError, StorageResult};
use std::sync::{Arc, Mutex};

/// Storage backend usable from any worker thread
pub type DynStorage = dyn Storage + Send;

/// Cloneable handle to the single storage critical section
#[derive(Clone)]
pub struct SharedStorage {
    inner: Arc<Mutex<Box<DynStorage>>>,
}

impl SharedStorage {
    pub fn new<S>(storage: S) -> Self
    where
        S: Storage + Send + 'static,
    {
        Self {
            inner: Arc::new(Mutex::new(Box::new(storage))),
        }
    }

    /// Runs `f` inside the critical section
    pub fn with<T, F>(&self, f: F) -> StorageResult<T>
    where
        F: FnOnce(&mut DynStorage) -> StorageResult<T>,
    {
        let mut guard = self.inner.lock().map_err(|_| StorageError::LockPoisoned)?;
        f(&mut **guard)
    }

    pub fn enqueue_pending(&self, oid: &str) -> StorageResult<()> {
        self.with(|storage| storage.enqueue_pending(oid))
    }

    pub fn enqueue_discovered(&self, oid: &str, record: &OidRecord) -> StorageResult<()> {
        self.with(|storage| storage.enqueue_discovered(oid, record))
    }

    /// Takes the most recent pending entry, `None` when the frontier is empty
    pub fn take_pending(&self) -> StorageResult<Option<PendingEntry>> {
        match self.with(|storage| storage.take_most_recent_pending()) {
            Ok(oid) => Ok(Some(oid)),
            Err(StorageError::FrontierEmpty) => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub fn release_pending(&self, oid: &str) -> StorageResult<()> {
        self.with(|storage| storage.release_pending(oid))
    }

    /// Removes `oid` from the frontier and stores its record in one step
    ///
    /// A missing pending entry is not an error. Returns whether a record was
    /// written.
    pub fn finalize(&self, oid: &str, record: Option<&OidRecord>) -> StorageResult<bool> {
        self.with(|storage| {
            match storage.remove_pending(oid) {
                Ok(()) | Err(StorageError::PendingNotFound(_)) => {}
                Err(e) => return Err(e),
            }

            match record {
                Some(record) => storage.insert_record(oid, record),
                None => Ok(false),
            }
        })
    }
}
