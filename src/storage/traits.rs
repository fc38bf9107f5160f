//! Storage traits and error types
//!
//! This module defines the trait interface for frontier backends and
//! associated error types.

use crate::api::{ContentId, EntityId};
use crate::crawler::SessionReport;
use crate::storage::{Claim, FrontierEntry, FrontierStats, SessionRecord, Track};
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Frontier has no entities eligible for the {0} track")]
    EmptyFrontier(Track),

    #[error("Every {0} candidate is claimed or excluded")]
    NothingAvailable(Track),

    #[error("Entity {0} is not tracked")]
    EntityNotFound(EntityId),

    #[error("Entity {entity} is already claimed on the {track} track")]
    AlreadyClaimed { entity: EntityId, track: Track },

    #[error("Claim on entity {entity} ({track}) was lost before commit")]
    ClaimLost { entity: EntityId, track: Track },

    #[error("Claim for the {claimed} track used to commit {requested}")]
    TrackMismatch { claimed: Track, requested: Track },

    #[error("Invalid stored timestamp: {0}")]
    Timestamp(String),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Trait for frontier backend implementations
///
/// Every method takes `&self`; implementations are shared between worker
/// tasks and must serialize access internally. Claims are enforced by the
/// backing store so that separate processes sharing it also cooperate.
pub trait FrontierStore: Send + Sync {
    // ===== Entities =====

    /// Starts tracking an entity
    ///
    /// Re-inserting a tracked entity is a no-op, except that `is_seed = true`
    /// promotes a discovered relation to a seed. Timestamps and bookmarks are
    /// never touched.
    ///
    /// # Returns
    ///
    /// `true` if the entity was not tracked before
    fn upsert(&self, entity: EntityId, is_seed: bool) -> StorageResult<bool>;

    /// Batch form of [`upsert`](Self::upsert), applied in one transaction
    ///
    /// # Returns
    ///
    /// The number of newly tracked entities
    fn upsert_many(&self, entities: &[EntityId], is_seed: bool) -> StorageResult<usize>;

    /// Gets the entry of a tracked entity
    fn get(&self, entity: EntityId) -> StorageResult<Option<FrontierEntry>>;

    // ===== Selection =====

    /// Claims the most overdue entity on `track`
    ///
    /// Never-fetched entities come first, then the least recently fetched;
    /// ties go to the lowest id. The relations track only considers seeds.
    /// Entities in `exclude` and rows with a live claim are passed over.
    ///
    /// # Errors
    ///
    /// * `EmptyFrontier` - the track has no eligible entities at all
    /// * `NothingAvailable` - every eligible entity is claimed or excluded
    fn next_for(&self, track: Track, exclude: &[EntityId]) -> StorageResult<Claim>;

    /// Claims the seed whose relations are most overdue
    fn next_for_relations(&self) -> StorageResult<Claim> {
        self.next_for(Track::Relations, &[])
    }

    /// Claims the entity whose content is most overdue
    fn next_for_content(&self) -> StorageResult<Claim> {
        self.next_for(Track::Content, &[])
    }

    /// Claims a specific entity on `track`, regardless of its position
    fn claim_entity(&self, track: Track, entity: EntityId) -> StorageResult<Claim>;

    // ===== Commit =====

    /// Records a completed relations fetch and drops the claim
    fn commit_relations(&self, claim: &Claim, fetched_at: DateTime<Utc>) -> StorageResult<()>;

    /// Records a completed content fetch and drops the claim
    ///
    /// `bookmark` is the newest item of this fetch, or `None` if nothing new
    /// was retrieved. The stored bookmark only ever moves forward.
    fn commit_content(
        &self,
        claim: &Claim,
        fetched_at: DateTime<Utc>,
        bookmark: Option<ContentId>,
    ) -> StorageResult<()>;

    /// Drops a claim without recording progress
    fn release(&self, claim: &Claim) -> StorageResult<()>;

    // ===== Reporting =====

    /// Whether any entity on `track` has never been fetched
    fn has_pending(&self, track: Track) -> StorageResult<bool>;

    /// Aggregate counts for reporting
    fn stats(&self) -> StorageResult<FrontierStats>;

    // ===== Session Journal =====

    /// Journals the start of a session and returns its id
    fn start_session(&self, track: Track, config_hash: &str) -> StorageResult<i64>;

    /// Journals the outcome of a session
    fn finish_session(&self, session_id: i64, report: &SessionReport) -> StorageResult<()>;

    /// Most recent sessions, newest first
    fn recent_sessions(&self, limit: usize) -> StorageResult<Vec<SessionRecord>>;
}
