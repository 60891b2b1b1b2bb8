//! oid-walker: a crash-resumable crawler for the global OID reference tree
//!
//! This crate walks an object-identifier reference site from its root,
//! extracting per-node metadata and persisting it to SQLite. Work that has
//! been discovered but not yet finalized is kept in a durable frontier so an
//! interrupted crawl picks up where it stopped.

pub mod config;
pub mod crawler;
pub mod output;
pub mod state;
pub mod storage;

use thiserror::Error;

/// Main error type for oid-walker operations
#[derive(Debug, Error)]
pub enum WalkerError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("Fetch error: {0}")]
    Fetch(#[from] crawler::FetchError),

    #[error("Extract error: {0}")]
    Extract(#[from] crawler::ExtractError),

    #[error("Could not re-queue {oid}: work stream closed")]
    Requeue { oid: String },

    #[error("{stream} stream closed unexpectedly")]
    ChannelClosed { stream: &'static str },

    #[error("Worker task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),
}

/// Result type alias for oid-walker operations
pub type Result<T> = std::result::Result<T, WalkerError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use config::Config;
pub use crawler::{crawl, CrawlSummary, Pipeline};
pub use state::{DedupCache, OidRecord};
