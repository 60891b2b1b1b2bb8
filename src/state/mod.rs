//! State module for tracking crawl progress
//!
//! # Components
//!
//! - `OidRecord`: metadata resolved for one identifier
//! - `DedupCache`: run-scoped claim map that keeps each identifier from being
//!   dispatched more than once

mod dedup;
mod record;

// Re-export main types
pub use dedup::DedupCache;
pub use record::{OidRecord, INFO_PLACEHOLDER};
