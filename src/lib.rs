//! Jobcrawl: a resumable paginated crawler for job listing APIs
//!
//! This crate discovers every result page of a listing search, extracts item
//! stubs, deduplicates them against previously ingested items, and backfills
//! per-item detail pages. All progress lives in SQLite so a crawl survives
//! partial failure and process restarts.

pub mod config;
pub mod crawler;
pub mod output;
pub mod query;
pub mod state;
pub mod storage;

use thiserror::Error;

/// Main error type for crawl operations
///
/// Fetch failures never show up here: the fetcher reports them as
/// [`crawler::FetchResult`] values so the orchestrator can record and move on.
#[derive(Debug, Error)]
pub enum CrawlError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Storage error: {0}")]
    StorageError(#[from] storage::StorageError),

    #[error("Unknown site profile: {0}")]
    UnknownSite(String),

    #[error("Invalid state transition: {from:?} -> {to:?}")]
    InvalidTransition {
        from: state::CrawlState,
        to: state::CrawlState,
    },
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

/// Result type alias for crawl operations
pub type Result<T> = std::result::Result<T, CrawlError>;

// Re-export commonly used types
pub use config::Config;
pub use crawler::Coordinator;
pub use query::{FilterSpec, QueryBuilder, QueryUrls};
pub use state::CrawlState;
pub use storage::{DedupStore, SqliteStore};
