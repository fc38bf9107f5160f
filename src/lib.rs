//! Tidewatch: a resumable crawler for a rate-limited social graph API
//!
//! This crate keeps a persistent frontier of tracked accounts and repeatedly
//! fetches their relations and posts through a quota-limited, paginated API,
//! so that crawling can be shared between workers and resumed across restarts
//! without duplicating or skipping data.

pub mod api;
pub mod config;
pub mod crawler;
pub mod output;
pub mod storage;

use thiserror::Error;

/// Main error type for Tidewatch operations
#[derive(Debug, Error)]
pub enum TidewatchError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("API error: {0}")]
    Api(#[from] api::ApiError),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("Export error: {0}")]
    Output(#[from] output::OutputError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] ::url::ParseError),

    #[error("Worker task failed: {0}")]
    Worker(String),
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

/// Result type alias for Tidewatch operations
pub type Result<T> = std::result::Result<T, TidewatchError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use api::{ContentId, Cursor, EntityId};
pub use config::Config;
pub use crawler::{CrawlSession, SessionReport, StopReason};
pub use storage::{FrontierEntry, FrontierStore, SqliteFrontier, Track};
