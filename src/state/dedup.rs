//! Run-scoped dedup cache
//!
//! Every identifier discovered during a run is claimed here exactly once.
//! Claiming is a single atomic check-and-set on the identifier's shard, so
//! concurrent walkers that find the same link on sibling pages never both
//! dispatch it downstream.

use crate::state::OidRecord;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

/// Shared map of claimed identifiers to their resolved records
///
/// A `None` value means the identifier has been claimed but its record is
/// not known (yet). Entries are never removed during a run.
#[derive(Debug, Default)]
pub struct DedupCache {
    entries: DashMap<String, Option<OidRecord>>,
}

impl DedupCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a cache pre-claimed with identifiers persisted by earlier runs
    pub fn warmed<I>(ids: I) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        let cache = Self::new();
        cache.warm(ids);
        cache
    }

    /// Marks identifiers as claimed without a record
    pub fn warm<I>(&self, ids: I)
    where
        I: IntoIterator<Item = String>,
    {
        for id in ids {
            self.entries.entry(id).or_insert(None);
        }
    }

    /// Claims `id` if nobody has claimed it before
    ///
    /// Returns `true` only for the first caller.
    pub fn try_claim(&self, id: &str) -> bool {
        self.claim(id, None)
    }

    /// Claims `id` and stores its record in the same step
    pub fn try_claim_with(&self, id: &str, record: OidRecord) -> bool {
        self.claim(id, Some(record))
    }

    fn claim(&self, id: &str, record: Option<OidRecord>) -> bool {
        match self.entries.entry(id.to_string()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(record);
                true
            }
        }
    }

    /// Stores the resolved record for an identifier
    pub fn put(&self, id: &str, record: OidRecord) {
        self.entries.insert(id.to_string(), Some(record));
    }

    /// Stores `record` for an already-claimed identifier that has none yet
    ///
    /// Returns `false` when the identifier is unclaimed or already resolved.
    pub fn fill(&self, id: &str, record: OidRecord) -> bool {
        match self.entries.get_mut(id) {
            Some(mut entry) if entry.is_none() => {
                *entry = Some(record);
                true
            }
            _ => false,
        }
    }

    /// Returns the resolved record for `id`, if any
    pub fn get(&self, id: &str) -> Option<OidRecord> {
        self.entries.get(id).and_then(|entry| entry.value().clone())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
