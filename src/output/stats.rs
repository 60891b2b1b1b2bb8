//! Statistics generation from the crawl database
//!
//! This module provides functionality for extracting and displaying
//! crawl statistics from the storage layer.

use crate::storage::{Storage, StorageResult};

/// Crawl statistics summary
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlStatistics {
    /// Records stored in the primary store
    pub persisted_records: u64,

    /// Entries still in the durable frontier
    pub pending_entries: u64,

    /// Most recent pending identifier, the next one a resumed crawl takes
    pub next_pending: Option<String>,
}

impl CrawlStatistics {
    /// True when an interrupted crawl left work behind
    pub fn is_resumable(&self) -> bool {
        self.pending_entries > 0
    }
}

/// Loads statistics from storage
pub fn load_statistics(storage: &dyn Storage) -> StorageResult<CrawlStatistics> {
    Ok(CrawlStatistics {
        persisted_records: storage.count_records()?,
        pending_entries: storage.count_pending()?,
        next_pending: storage.peek_most_recent_pending()?,
    })
}

/// Prints statistics to stdout in a formatted manner
pub fn print_statistics(stats: &CrawlStatistics) {
    println!("=== Crawl Statistics ===\n");

    println!("Overview:");
    println!("  Records stored: {}", stats.persisted_records);
    println!("  Pending identifiers: {}", stats.pending_entries);
    println!();

    match &stats.next_pending {
        Some(oid) => println!("Next crawl resumes from {}", oid),
        None => println!("Frontier is empty; next crawl starts from the root"),
    }
}
