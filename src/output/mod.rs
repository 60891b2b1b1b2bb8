//! Output module for reporting on the crawl database
//!
//! This module handles:
//! - Reading record and frontier counts from storage
//! - Printing them for the `--stats` command

pub mod stats;

pub use stats::{load_statistics, print_statistics, CrawlStatistics};
