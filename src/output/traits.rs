//! Export sink traits and record types
//!
//! This module defines the trait interface for export sinks and the records
//! they receive.

use crate::api::{EntityId, Post, Profile};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur during output operations
#[derive(Debug, Error)]
pub enum OutputError {
    #[error("Failed to write output: {0}")]
    Write(String),

    #[error("Failed to format output: {0}")]
    Format(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for output operations
pub type OutputResult<T> = Result<T, OutputError>;

/// One exported observation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExportRecord {
    /// `source` follows `target`
    Edge {
        source: EntityId,
        target: EntityId,
        fetched_at: DateTime<Utc>,
    },

    /// Profile of an account seen in a relation listing
    Profile {
        observed_via: EntityId,
        fetched_at: DateTime<Utc>,
        profile: Profile,
    },

    /// A post of `author`
    Post {
        author: EntityId,
        fetched_at: DateTime<Utc>,
        post: Post,
    },
}

impl ExportRecord {
    /// Name of the stream this record belongs to
    pub fn stream(&self) -> &'static str {
        match self {
            Self::Edge { .. } => "edges",
            Self::Profile { .. } => "profiles",
            Self::Post { .. } => "posts",
        }
    }
}

/// Append-only destination for crawled records
///
/// Implementations are shared between workers. One call must land as a
/// single append so concurrent workers never interleave partial records.
pub trait ExportSink: Send + Sync {
    /// Appends the records fetched for `entity`
    fn append(&self, entity: EntityId, records: &[ExportRecord]) -> OutputResult<()>;
}
