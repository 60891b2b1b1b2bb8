//! Feeding the work stream from the durable frontier
//!
//! The feeder is the only reader of the pending table. It leases the most
//! recent entry, publishes it to the walkers, and detects quiescence: an
//! empty frontier with nothing in flight for several consecutive polls.

use crate::crawler::shutdown::ShutdownCoordinator;
use crate::state::DedupCache;
use crate::storage::{PendingEntry, SharedStorage, StorageError, StorageResult};
use crate::{Result, WalkerError};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Count of identifiers between publication and finalization
///
/// An identifier is counted from the moment it is placed on the work stream
/// until its finalize step completes, or until it is released back to the
/// durable frontier.
#[derive(Debug, Default)]
pub struct InFlight(AtomicUsize);

impl InFlight {
    pub fn begin(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }

    pub fn finish(&self) {
        // Never wraps below zero
        let _ = self
            .0
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
    }

    pub fn count(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

/// Where the first identifier of a run came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Seed {
    /// Taken from a frontier left by an earlier run
    Resumed(PendingEntry),
    /// The frontier was empty; the root was enqueued
    Root(PendingEntry),
}

impl Seed {
    pub fn oid(&self) -> &str {
        &self.entry().oid
    }

    pub fn entry(&self) -> &PendingEntry {
        match self {
            Seed::Resumed(entry) | Seed::Root(entry) => entry,
        }
    }

    pub fn into_entry(self) -> PendingEntry {
        match self {
            Seed::Resumed(entry) | Seed::Root(entry) => entry,
        }
    }
}

/// Claims a taken entry in the dedup cache and restores its stored record
///
/// Entries left by an earlier run were never claimed in this process, and
/// their record only exists on disk. Returns the identifier.
pub fn claim_entry(cache: &DedupCache, entry: PendingEntry) -> String {
    cache.try_claim(&entry.oid);
    if let Some(record) = entry.record {
        cache.put(&entry.oid, record);
    }
    entry.oid
}

/// Picks the identifier a run starts from
///
/// Leases abandoned by a crashed run are released first. If the frontier
/// still has entries the most recent one is resumed; otherwise `root` is
/// enqueued and taken, so every started identifier has a pending entry.
pub fn resolve_seed(storage: &SharedStorage, root: &str) -> StorageResult<Seed> {
    storage.with(|storage| {
        let recovered = storage.recover_leased()?;
        if recovered > 0 {
            tracing::info!("Recovered {} identifiers leased by an earlier run", recovered);
        }

        match storage.take_most_recent_pending() {
            Ok(entry) => Ok(Seed::Resumed(entry)),
            Err(StorageError::FrontierEmpty) => {
                storage.enqueue_pending(root)?;
                Ok(Seed::Root(storage.take_most_recent_pending()?))
            }
            Err(e) => Err(e),
        }
    })
}

/// Moves pending identifiers onto the work stream
pub struct FrontierFeeder {
    storage: SharedStorage,
    cache: Arc<DedupCache>,
    work_tx: mpsc::Sender<String>,
    in_flight: Arc<InFlight>,
    idle_backoff: Duration,
    idle_rounds: u32,
    shutdown: ShutdownCoordinator,
}

impl FrontierFeeder {
    pub fn new(
        storage: SharedStorage,
        cache: Arc<DedupCache>,
        work_tx: mpsc::Sender<String>,
        in_flight: Arc<InFlight>,
        idle_backoff: Duration,
        idle_rounds: u32,
        shutdown: ShutdownCoordinator,
    ) -> Self {
        Self {
            storage,
            cache,
            work_tx,
            in_flight,
            idle_backoff,
            idle_rounds,
            shutdown,
        }
    }

    /// Runs until shutdown, a storage failure, or quiescence
    pub async fn run(self) -> Result<()> {
        let token = self.shutdown.token();
        let mut idle = 0u32;

        while !token.is_cancelled() {
            // Sampled before the take so a finalize racing with an empty
            // poll cannot make the frontier look drained.
            let busy = self.in_flight.count();

            match self.storage.take_pending()? {
                Some(entry) => {
                    idle = 0;
                    let oid = claim_entry(&self.cache, entry);
                    self.in_flight.begin();

                    tokio::select! {
                        _ = token.cancelled() => break,
                        sent = self.work_tx.send(oid) => {
                            sent.map_err(|_| WalkerError::ChannelClosed { stream: "work" })?;
                        }
                    }
                }
                None => {
                    if busy == 0 {
                        idle += 1;
                        if self.idle_rounds > 0 && idle >= self.idle_rounds {
                            tracing::info!("Frontier drained, finishing crawl");
                            self.shutdown.complete();
                            break;
                        }
                    } else {
                        idle = 0;
                    }

                    tokio::select! {
                        _ = token.cancelled() => break,
                        _ = tokio::time::sleep(self.idle_backoff) => {}
                    }
                }
            }
        }

        Ok(())
    }
}
