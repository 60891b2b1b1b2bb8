//! Crawl pipeline orchestration
//!
//! This module wires the stages of a crawl together:
//! - A feeder moving identifiers from the durable frontier to the walkers
//! - Walkers fetching a page and extracting its children
//! - Register workers writing newly claimed children to the frontier
//! - Finalize workers removing the parent from the frontier and persisting
//!   its record
//!
//! A parent is handed to finalize only after all its children are durably
//! enqueued, so an interruption at any point leaves every unfinished
//! identifier in the pending table.

use crate::config::{Config, CrawlerConfig, FetchConfig};
use crate::crawler::fetcher::Fetcher;
use crate::crawler::frontier::{claim_entry, resolve_seed, FrontierFeeder, InFlight, Seed};
use crate::crawler::parser::{extract, Extracted};
use crate::crawler::shutdown::ShutdownCoordinator;
use crate::state::{DedupCache, OidRecord};
use crate::storage::{open_storage, SharedStorage};
use crate::{Result, WalkerError};
use std::future::Future;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;

/// Progress is logged every this many finalized identifiers
const PROGRESS_INTERVAL: u64 = 100;

/// Outcome of a crawl run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CrawlSummary {
    /// Pages fetched successfully
    pub pages_fetched: u64,
    /// Children newly claimed and written to the frontier
    pub discovered: u64,
    /// Identifiers whose record was written
    pub persisted: u64,
    /// Identifiers finalized without a resolved record
    pub unresolved: u64,
    /// Fetches that gave up and were re-queued
    pub requeued: u64,
    /// Pages whose body could not be parsed
    pub parse_anomalies: u64,
    /// Identifiers dropped after a permanent HTTP error
    pub dead_links: u64,
    /// True when the crawl stopped because no work was left
    pub completed: bool,
}

#[derive(Debug, Default)]
struct Counters {
    pages_fetched: AtomicU64,
    discovered: AtomicU64,
    persisted: AtomicU64,
    unresolved: AtomicU64,
    requeued: AtomicU64,
    parse_anomalies: AtomicU64,
    dead_links: AtomicU64,
}

impl Counters {
    fn bump(counter: &AtomicU64, by: u64) -> u64 {
        counter.fetch_add(by, Ordering::Relaxed) + by
    }

    fn snapshot(&self, completed: bool) -> CrawlSummary {
        CrawlSummary {
            pages_fetched: self.pages_fetched.load(Ordering::Relaxed),
            discovered: self.discovered.load(Ordering::Relaxed),
            persisted: self.persisted.load(Ordering::Relaxed),
            unresolved: self.unresolved.load(Ordering::Relaxed),
            requeued: self.requeued.load(Ordering::Relaxed),
            parse_anomalies: self.parse_anomalies.load(Ordering::Relaxed),
            dead_links: self.dead_links.load(Ordering::Relaxed),
            completed,
        }
    }
}

/// A fetched parent and the children it newly claimed
#[derive(Debug)]
struct Registration {
    parent: Finalization,
    children: Vec<(String, OidRecord)>,
}

/// An identifier ready to leave the frontier
#[derive(Debug)]
struct Finalization {
    oid: String,
    /// False for dead links: the entry is removed without a record
    keep_record: bool,
}

/// Receiving end shared by a pool of workers
type SharedReceiver<T> = Arc<Mutex<mpsc::Receiver<T>>>;

async fn recv_shared<T>(rx: &SharedReceiver<T>) -> Option<T> {
    rx.lock().await.recv().await
}

/// State every worker holds a handle to
#[derive(Clone)]
struct WorkerContext {
    storage: SharedStorage,
    cache: Arc<DedupCache>,
    fetcher: Fetcher,
    in_flight: Arc<InFlight>,
    counters: Arc<Counters>,
    shutdown: ShutdownCoordinator,
}

/// A configured crawl, ready to run
pub struct Pipeline {
    crawler: CrawlerConfig,
    fetch: FetchConfig,
    ctx: WorkerContext,
}

impl Pipeline {
    /// Creates a pipeline over `storage`
    ///
    /// The dedup cache is warmed with every identifier already persisted, so
    /// those are never dispatched again.
    pub fn new(config: &Config, storage: SharedStorage) -> Result<Self> {
        let fetcher = Fetcher::new(&config.fetch)?;
        Self::with_fetcher(config, storage, fetcher)
    }

    /// Creates a pipeline that uses a prepared fetcher
    pub fn with_fetcher(config: &Config, storage: SharedStorage, fetcher: Fetcher) -> Result<Self> {
        let persisted = storage.with(|s| s.load_persisted_ids())?;
        tracing::info!(
            "Loaded {} persisted identifiers into the dedup cache",
            persisted.len()
        );

        Ok(Self {
            crawler: config.crawler.clone(),
            fetch: config.fetch.clone(),
            ctx: WorkerContext {
                storage,
                cache: Arc::new(DedupCache::warmed(persisted)),
                fetcher,
                in_flight: Arc::new(InFlight::default()),
                counters: Arc::new(Counters::default()),
                shutdown: ShutdownCoordinator::new(),
            },
        })
    }

    /// Handle for stopping the crawl from outside, e.g. on Ctrl-C
    pub fn shutdown_handle(&self) -> ShutdownCoordinator {
        self.ctx.shutdown.clone()
    }

    pub fn cache(&self) -> Arc<DedupCache> {
        self.ctx.cache.clone()
    }

    /// Runs the crawl until quiescence, interrupt, or the first fatal error
    ///
    /// Every worker has exited by the time this returns. A fatal error from
    /// any stage is returned as is; a clean stop returns the summary.
    pub async fn run(self) -> Result<CrawlSummary> {
        let capacity = self.crawler.channel_capacity.max(1);
        let (work_tx, work_rx) = mpsc::channel::<String>(capacity);
        let (register_tx, register_rx) = mpsc::channel::<Registration>(capacity);
        let (finalize_tx, finalize_rx) = mpsc::channel::<Finalization>(capacity);

        let work_rx: SharedReceiver<String> = Arc::new(Mutex::new(work_rx));
        let register_rx: SharedReceiver<Registration> = Arc::new(Mutex::new(register_rx));
        let finalize_rx: SharedReceiver<Finalization> = Arc::new(Mutex::new(finalize_rx));

        let seed = resolve_seed(&self.ctx.storage, &self.fetch.root)?;
        match &seed {
            Seed::Resumed(entry) => tracing::info!("Resuming crawl from {}", entry.oid),
            Seed::Root(entry) => tracing::info!("Starting crawl at root {}", entry.oid),
        }
        let seed_oid = claim_entry(&self.ctx.cache, seed.into_entry());
        self.ctx.in_flight.begin();
        work_tx
            .send(seed_oid)
            .await
            .map_err(|_| WalkerError::ChannelClosed { stream: "work" })?;

        tracing::info!(
            "Starting {} walkers, {} register workers, {} finalize workers",
            self.crawler.walkers,
            self.crawler.register_workers,
            self.crawler.finalize_workers
        );

        let mut tasks = JoinSet::new();

        for id in 0..self.crawler.walkers {
            let ctx = self.ctx.clone();
            let work_rx = work_rx.clone();
            let work_tx = work_tx.clone();
            let register_tx = register_tx.clone();
            spawn_stage(&mut tasks, &self.ctx.shutdown, async move {
                run_walker(ctx, id, work_rx, work_tx, register_tx).await
            });
        }

        for _ in 0..self.crawler.register_workers {
            let ctx = self.ctx.clone();
            let register_rx = register_rx.clone();
            let finalize_tx = finalize_tx.clone();
            spawn_stage(&mut tasks, &self.ctx.shutdown, async move {
                run_register(ctx, register_rx, finalize_tx).await
            });
        }

        for _ in 0..self.crawler.finalize_workers {
            let ctx = self.ctx.clone();
            let finalize_rx = finalize_rx.clone();
            spawn_stage(&mut tasks, &self.ctx.shutdown, async move {
                run_finalize(ctx, finalize_rx).await
            });
        }

        let feeder = FrontierFeeder::new(
            self.ctx.storage.clone(),
            self.ctx.cache.clone(),
            work_tx,
            self.ctx.in_flight.clone(),
            self.crawler.idle_backoff(),
            self.crawler.idle_rounds,
            self.ctx.shutdown.clone(),
        );
        spawn_stage(&mut tasks, &self.ctx.shutdown, feeder.run());

        drop(register_tx);
        drop(finalize_tx);

        self.ctx.shutdown.cancelled().await;
        tracing::debug!("Shutdown signalled, waiting for {} tasks", tasks.len());

        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                self.ctx.shutdown.report(WalkerError::Join(e));
            }
        }

        if let Some(error) = self.ctx.shutdown.take_error() {
            return Err(error);
        }

        let summary = self
            .ctx
            .counters
            .snapshot(self.ctx.shutdown.is_completed());
        if summary.completed {
            tracing::info!("Crawl complete: {:?}", summary);
        } else {
            tracing::info!("Crawl interrupted: {:?}", summary);
        }
        Ok(summary)
    }
}

/// Spawns a stage task whose error is reported to the shutdown coordinator
fn spawn_stage<F>(tasks: &mut JoinSet<()>, shutdown: &ShutdownCoordinator, stage: F)
where
    F: Future<Output = Result<()>> + Send + 'static,
{
    let shutdown = shutdown.clone();
    tasks.spawn(async move {
        if let Err(e) = stage.await {
            shutdown.report(e);
        }
    });
}

/// Fetches identifiers from the work stream and extracts their children
async fn run_walker(
    ctx: WorkerContext,
    id: usize,
    work_rx: SharedReceiver<String>,
    work_tx: mpsc::Sender<String>,
    register_tx: mpsc::Sender<Registration>,
) -> Result<()> {
    let token = ctx.shutdown.token();

    loop {
        let oid = tokio::select! {
            _ = token.cancelled() => break,
            next = recv_shared(&work_rx) => match next {
                Some(oid) => oid,
                None => break,
            },
        };

        tracing::debug!("Walker {} fetching {}", id, oid);

        let fetched = tokio::select! {
            _ = token.cancelled() => break,
            fetched = ctx.fetcher.fetch(&oid) => fetched,
        };

        let registration = match fetched {
            Ok(body) => {
                Counters::bump(&ctx.counters.pages_fetched, 1);

                let extracted = match extract(&body) {
                    Ok(extracted) => extracted,
                    Err(e) => {
                        tracing::warn!("Could not parse page for {}: {}", oid, e);
                        Counters::bump(&ctx.counters.parse_anomalies, 1);
                        Extracted::new()
                    }
                };

                let children = claim_children(&ctx.cache, extracted);
                tracing::debug!("{} has {} new children", oid, children.len());

                Registration {
                    parent: Finalization {
                        oid,
                        keep_record: true,
                    },
                    children,
                }
            }
            Err(e) if e.is_recoverable() => {
                tracing::warn!("{}, re-queueing", e);
                Counters::bump(&ctx.counters.requeued, 1);
                requeue(&ctx, &work_tx, oid)?;
                continue;
            }
            Err(e) => {
                tracing::warn!("Dropping {}: {}", oid, e);
                Counters::bump(&ctx.counters.dead_links, 1);
                Registration {
                    parent: Finalization {
                        oid,
                        keep_record: false,
                    },
                    children: Vec::new(),
                }
            }
        };
        tokio::select! {
            _ = token.cancelled() => break,
            sent = register_tx.send(registration) => {
                sent.map_err(|_| WalkerError::ChannelClosed { stream: "register" })?;
            }
        }
    }

    Ok(())
}

/// Claims each extracted child, keeping only those this walker won
///
/// A child that was claimed earlier without a record (e.g. resumed from the
/// frontier) gets the record from this page.
fn claim_children(cache: &DedupCache, extracted: Extracted) -> Vec<(String, OidRecord)> {
    let mut claimed = Vec::with_capacity(extracted.len());

    for (child, record) in extracted {
        if cache.try_claim_with(&child, record.clone()) {
            claimed.push((child, record));
        } else if record.is_resolved() {
            cache.fill(&child, record);
        }
    }

    claimed
}

/// Puts an identifier whose fetch gave up back into circulation
///
/// The work stream is tried first. When it is full the lease is released so
/// the feeder takes the identifier again later.
fn requeue(ctx: &WorkerContext, work_tx: &mpsc::Sender<String>, oid: String) -> Result<()> {
    match work_tx.try_send(oid) {
        Ok(()) => Ok(()),
        Err(TrySendError::Full(oid)) => {
            ctx.storage.release_pending(&oid)?;
            ctx.in_flight.finish();
            Ok(())
        }
        Err(TrySendError::Closed(oid)) => Err(WalkerError::Requeue { oid }),
    }
}

/// Writes claimed children to the durable frontier, then hands off the parent
async fn run_register(
    ctx: WorkerContext,
    register_rx: SharedReceiver<Registration>,
    finalize_tx: mpsc::Sender<Finalization>,
) -> Result<()> {
    let token = ctx.shutdown.token();

    loop {
        let Registration { parent, children } = tokio::select! {
            _ = token.cancelled() => break,
            next = recv_shared(&register_rx) => match next {
                Some(registration) => registration,
                None => break,
            },
        };

        for (child, record) in &children {
            if token.is_cancelled() {
                return Ok(());
            }
            ctx.storage.enqueue_discovered(child, record)?;
        }
        Counters::bump(&ctx.counters.discovered, children.len() as u64);

        tokio::select! {
            _ = token.cancelled() => break,
            sent = finalize_tx.send(parent) => {
                sent.map_err(|_| WalkerError::ChannelClosed { stream: "finalize" })?;
            }
        }
    }

    Ok(())
}

/// Removes finished identifiers from the frontier and persists their records
async fn run_finalize(
    ctx: WorkerContext,
    finalize_rx: SharedReceiver<Finalization>,
) -> Result<()> {
    let token = ctx.shutdown.token();

    loop {
        let Finalization { oid, keep_record } = tokio::select! {
            _ = token.cancelled() => break,
            next = recv_shared(&finalize_rx) => match next {
                Some(finalization) => finalization,
                None => break,
            },
        };
        if token.is_cancelled() {
            break;
        }

        let record = if keep_record { ctx.cache.get(&oid) } else { None };
        if ctx.storage.finalize(&oid, record.as_ref())? {
            tracing::debug!("Stored record for {}", oid);
            let persisted = Counters::bump(&ctx.counters.persisted, 1);
            if persisted % PROGRESS_INTERVAL == 0 {
                tracing::info!(
                    "Progress: {} records stored, {} identifiers in flight",
                    persisted,
                    ctx.in_flight.count()
                );
            }
        } else {
            tracing::debug!("No record resolved for {}", oid);
            Counters::bump(&ctx.counters.unresolved, 1);
        }

        ctx.in_flight.finish();
    }

    Ok(())
}

/// Opens the configured database and crawls until done
pub async fn crawl(config: &Config) -> Result<CrawlSummary> {
    let storage = open_storage(Path::new(&config.output.database_path))?;
    Pipeline::new(config, SharedStorage::new(storage))?.run().await
}
