//! Crawler module for walking the reference tree
//!
//! This module contains the core crawling logic, including:
//! - HTTP fetching with bounded retry
//! - Extraction of child identifiers and their records
//! - Feeding work from the durable frontier
//! - Pipeline coordination and shutdown

mod coordinator;
mod fetcher;
mod frontier;
mod parser;
mod shutdown;

pub use coordinator::{crawl, CrawlSummary, Pipeline};
pub use fetcher::{build_http_client, FetchError, Fetcher};
pub use frontier::{claim_entry, resolve_seed, FrontierFeeder, InFlight, Seed};
pub use parser::{extract, extract_str, is_child_link, row_fields, ExtractError, Extracted};
pub use shutdown::ShutdownCoordinator;
