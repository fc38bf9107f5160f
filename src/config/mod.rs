//! Configuration module for Tidewatch
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//!
//! # Example
//!
//! ```no_run
//! use tidewatch::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("tidewatch.toml")).unwrap();
//! println!("Sessions run for {}s", config.crawler.session_budget_secs);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    ApiConfig, Config, CrawlerConfig, ExportConfig, FrontierConfig, RelationDetail, StorageConfig,
};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash, parse_config};

/// Environment variable overriding `api.bearer-token`
pub const BEARER_TOKEN_ENV: &str = "TIDEWATCH_BEARER_TOKEN";
