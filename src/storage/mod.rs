//! Storage module for persisting crawl progress
//!
//! This module owns the only durable state of the crawler:
//! - The frontier table, one row per tracked entity
//! - Per-track claims that serialize select→fetch→commit for each entity
//! - The session journal used for reporting

mod schema;
mod sqlite;
mod traits;

pub use sqlite::SqliteFrontier;
pub use traits::{FrontierStore, StorageError, StorageResult};

use crate::api::{ContentId, EntityId};
use crate::crawler::StopReason;
use chrono::{DateTime, Utc};
use std::fmt;
use std::path::Path;

/// Opens (or creates) the frontier database at `path`
pub fn open_frontier(path: &Path) -> StorageResult<SqliteFrontier> {
    SqliteFrontier::new(path)
}

/// The two independent fairness tracks of the frontier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Track {
    /// Who an entity follows; only seeds are scheduled
    Relations,
    /// What an entity posts; every tracked entity is scheduled
    Content,
}

impl Track {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Relations => "relations",
            Self::Content => "content",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "relations" => Some(Self::Relations),
            "content" => Some(Self::Content),
            _ => None,
        }
    }
}

impl fmt::Display for Track {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.to_db_string())
    }
}

/// Crawl progress of one tracked entity
#[derive(Debug, Clone, PartialEq)]
pub struct FrontierEntry {
    pub entity_id: EntityId,

    /// Newest content item already retrieved
    pub latest_content_id: Option<ContentId>,

    pub content_last_fetched_at: Option<DateTime<Utc>>,

    pub relations_last_fetched_at: Option<DateTime<Utc>>,

    /// Primary subject of observation, as opposed to a discovered relation
    pub is_seed: bool,

    pub created_at: DateTime<Utc>,
}

impl FrontierEntry {
    /// When this entity was last serviced on `track`
    pub fn last_fetched(&self, track: Track) -> Option<DateTime<Utc>> {
        match track {
            Track::Relations => self.relations_last_fetched_at,
            Track::Content => self.content_last_fetched_at,
        }
    }
}

/// Exclusive update rights on one frontier row for one track
///
/// Produced by selection, consumed by commit or release. A claim that
/// outlives its expiry may be taken over by another worker, after which
/// committing it fails with [`StorageError::ClaimLost`].
#[derive(Debug, Clone, PartialEq)]
pub struct Claim {
    pub track: Track,
    pub entry: FrontierEntry,
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

impl Claim {
    pub fn entity_id(&self) -> EntityId {
        self.entry.entity_id
    }
}

/// Aggregate view of the frontier
#[derive(Debug, Clone, Default)]
pub struct FrontierStats {
    pub total_entities: u64,
    pub seeds: u64,
    pub content_never_fetched: u64,
    /// Seeds whose relations were never fetched
    pub relations_never_fetched: u64,
    /// Rows currently held by a live claim on either track
    pub claimed: u64,
    pub oldest_content_fetch: Option<DateTime<Utc>>,
    pub oldest_relations_fetch: Option<DateTime<Utc>>,
}

/// One journaled executor session
#[derive(Debug, Clone)]
pub struct SessionRecord {
    pub id: i64,
    pub track: Track,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub config_hash: String,
    pub processed: u64,
    pub unavailable: u64,
    pub skipped: u64,
    pub items: u64,
    pub stop_reason: Option<StopReason>,
}
