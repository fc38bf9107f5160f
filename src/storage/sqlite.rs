//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the FrontierStore trait.
//! Claims live in the frontier rows themselves, so several processes pointing
//! at the same database file cooperate the same way worker tasks do.

use crate::api::{ContentId, EntityId};
use crate::crawler::{SessionReport, StopReason};
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{FrontierStore, StorageError, StorageResult};
use crate::storage::{Claim, FrontierEntry, FrontierStats, SessionRecord, Track};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSqlOutput, Type, ValueRef};
use rusqlite::{params, Connection, OptionalExtension, Row, ToSql, TransactionBehavior};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

const ENTRY_COLUMNS: &str = "entity_id, latest_content_id, content_last_fetched_at, \
     relations_last_fetched_at, is_seed, created_at";

/// Default lifetime of a claim
const DEFAULT_LEASE: Duration = Duration::from_secs(15 * 60);

/// Longest lease accepted; keeps expiry timestamps within four-digit years
const MAX_LEASE: Duration = Duration::from_secs(10 * 365 * 24 * 60 * 60);

static CLAIM_COUNTER: AtomicU64 = AtomicU64::new(0);

/// SQLite frontier backend
pub struct SqliteFrontier {
    conn: Mutex<Connection>,
    lease: chrono::Duration,
}

/// Column names backing one track
struct TrackColumns {
    fetched_at: &'static str,
    claim: &'static str,
    expires: &'static str,
    /// Which rows take part in the track
    scope: &'static str,
}

impl TrackColumns {
    fn of(track: Track) -> Self {
        match track {
            Track::Relations => Self {
                fetched_at: "relations_last_fetched_at",
                claim: "relations_claim",
                expires: "relations_claim_expires",
                scope: "is_seed = 1",
            },
            Track::Content => Self {
                fetched_at: "content_last_fetched_at",
                claim: "content_claim",
                expires: "content_claim_expires",
                scope: "1 = 1",
            },
        }
    }
}

impl SqliteFrontier {
    /// Opens or creates the frontier database at `path`
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteFrontier)` - Successfully opened/created database
    /// * `Err(StorageError)` - Failed to open database
    pub fn new(path: &Path) -> StorageResult<Self> {
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        // Other processes may hold the write lock while they claim or commit
        conn.busy_timeout(Duration::from_secs(5))?;

        initialize_schema(&conn)?;

        Ok(Self::from_connection(conn))
    }

    /// Creates an in-memory database (for testing)
    #[cfg(test)]
    pub fn new_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        initialize_schema(&conn)?;
        Ok(Self::from_connection(conn))
    }

    fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
            lease: to_chrono(DEFAULT_LEASE),
        }
    }

    /// Sets how long claims granted by this handle stay valid
    pub fn with_lease(mut self, lease: Duration) -> Self {
        self.lease = to_chrono(lease.min(MAX_LEASE));
        self
    }

    fn conn(&self) -> StorageResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| StorageError::Database("frontier connection lock poisoned".to_string()))
    }

    /// Marks `entry` as claimed on `track` inside the caller's transaction
    fn grant(
        &self,
        conn: &Connection,
        track: Track,
        entry: FrontierEntry,
        now: DateTime<Utc>,
    ) -> StorageResult<Claim> {
        let cols = TrackColumns::of(track);
        let token = next_claim_token(now);
        let expires_at = now + self.lease;

        conn.execute(
            &format!(
                "UPDATE frontier SET {} = ?1, {} = ?2 WHERE entity_id = ?3",
                cols.claim, cols.expires
            ),
            params![token, encode_ts(expires_at), entry.entity_id],
        )?;

        tracing::trace!("Claimed {} on {} track until {}", entry.entity_id, track, expires_at);

        Ok(Claim {
            track,
            entry,
            token,
            expires_at,
        })
    }
}

fn to_chrono(duration: Duration) -> chrono::Duration {
    chrono::Duration::from_std(duration).unwrap_or_else(|_| chrono::Duration::days(365))
}

/// Unique across processes (pid), time and calls within a process
fn next_claim_token(now: DateTime<Utc>) -> String {
    format!(
        "{}-{}-{}",
        std::process::id(),
        now.timestamp_micros(),
        CLAIM_COUNTER.fetch_add(1, Ordering::Relaxed)
    )
}

fn encode_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn decode_ts(raw: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(raw).map(|ts| ts.with_timezone(&Utc))
}

fn read_ts(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|s| {
        decode_ts(&s)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
    })
    .transpose()
}

fn row_to_entry(row: &Row<'_>) -> rusqlite::Result<FrontierEntry> {
    let created_at = read_ts(row, 5)?.ok_or(rusqlite::Error::InvalidColumnType(
        5,
        "created_at".to_string(),
        Type::Null,
    ))?;

    Ok(FrontierEntry {
        entity_id: row.get(0)?,
        latest_content_id: row.get(1)?,
        content_last_fetched_at: read_ts(row, 2)?,
        relations_last_fetched_at: read_ts(row, 3)?,
        is_seed: row.get(4)?,
        created_at,
    })
}

fn parse_optional_ts(raw: Option<String>) -> StorageResult<Option<DateTime<Utc>>> {
    raw.map(|s| decode_ts(&s).map_err(|e| StorageError::Timestamp(format!("{}: {}", s, e))))
        .transpose()
}

fn check_track(claim: &Claim, requested: Track) -> StorageResult<()> {
    if claim.track != requested {
        return Err(StorageError::TrackMismatch {
            claimed: claim.track,
            requested,
        });
    }
    Ok(())
}

fn insert_entity(conn: &Connection, entity: EntityId, is_seed: bool, now: &str) -> StorageResult<bool> {
    let inserted = conn.execute(
        "INSERT INTO frontier (entity_id, is_seed, created_at) VALUES (?1, ?2, ?3)
         ON CONFLICT(entity_id) DO NOTHING",
        params![entity, is_seed, now],
    )?;

    if inserted == 0 && is_seed {
        conn.execute(
            "UPDATE frontier SET is_seed = 1 WHERE entity_id = ?1 AND is_seed = 0",
            params![entity],
        )?;
    }

    Ok(inserted == 1)
}

impl ToSql for EntityId {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        let value = i64::try_from(self.0)
            .map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))?;
        Ok(ToSqlOutput::from(value))
    }
}

impl FromSql for EntityId {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let raw = i64::column_result(value)?;
        u64::try_from(raw)
            .map(EntityId)
            .map_err(|e| FromSqlError::Other(Box::new(e)))
    }
}

impl ToSql for ContentId {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        let value = i64::try_from(self.0)
            .map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))?;
        Ok(ToSqlOutput::from(value))
    }
}

impl FromSql for ContentId {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let raw = i64::column_result(value)?;
        u64::try_from(raw)
            .map(ContentId)
            .map_err(|e| FromSqlError::Other(Box::new(e)))
    }
}

impl FrontierStore for SqliteFrontier {
    // ===== Entities =====

    fn upsert(&self, entity: EntityId, is_seed: bool) -> StorageResult<bool> {
        let conn = self.conn()?;
        insert_entity(&conn, entity, is_seed, &encode_ts(Utc::now()))
    }

    fn upsert_many(&self, entities: &[EntityId], is_seed: bool) -> StorageResult<usize> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let now = encode_ts(Utc::now());

        let mut inserted = 0;
        for entity in entities {
            if insert_entity(&tx, *entity, is_seed, &now)? {
                inserted += 1;
            }
        }

        tx.commit()?;
        Ok(inserted)
    }

    fn get(&self, entity: EntityId) -> StorageResult<Option<FrontierEntry>> {
        let conn = self.conn()?;
        let entry = conn
            .query_row(
                &format!("SELECT {} FROM frontier WHERE entity_id = ?1", ENTRY_COLUMNS),
                params![entity],
                row_to_entry,
            )
            .optional()?;
        Ok(entry)
    }

    // ===== Selection =====

    fn next_for(&self, track: Track, exclude: &[EntityId]) -> StorageResult<Claim> {
        let cols = TrackColumns::of(track);
        let mut conn = self.conn()?;

        // IMMEDIATE takes the write lock up front, so select-then-claim is atomic
        // against other connections as well
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let eligible: i64 = tx.query_row(
            &format!("SELECT COUNT(*) FROM frontier WHERE {}", cols.scope),
            [],
            |row| row.get(0),
        )?;
        if eligible == 0 {
            return Err(StorageError::EmptyFrontier(track));
        }

        let now = Utc::now();
        let now_text = encode_ts(now);

        let exclusion = if exclude.is_empty() {
            String::new()
        } else {
            let placeholders: Vec<String> =
                (0..exclude.len()).map(|i| format!("?{}", i + 2)).collect();
            format!(" AND entity_id NOT IN ({})", placeholders.join(", "))
        };

        let sql = format!(
            "SELECT {columns} FROM frontier
             WHERE {scope} AND ({claim} IS NULL OR {expires} <= ?1){exclusion}
             ORDER BY {fetched} IS NOT NULL, {fetched} ASC, entity_id ASC
             LIMIT 1",
            columns = ENTRY_COLUMNS,
            scope = cols.scope,
            claim = cols.claim,
            expires = cols.expires,
            exclusion = exclusion,
            fetched = cols.fetched_at,
        );

        let mut sql_params: Vec<&dyn ToSql> = Vec::with_capacity(exclude.len() + 1);
        sql_params.push(&now_text);
        for entity in exclude {
            sql_params.push(entity);
        }

        let entry = tx
            .query_row(&sql, sql_params.as_slice(), row_to_entry)
            .optional()?
            .ok_or(StorageError::NothingAvailable(track))?;

        let claim = self.grant(&tx, track, entry, now)?;
        tx.commit()?;

        Ok(claim)
    }

    fn claim_entity(&self, track: Track, entity: EntityId) -> StorageResult<Claim> {
        let cols = TrackColumns::of(track);
        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let now = Utc::now();
        let row = tx
            .query_row(
                &format!(
                    "SELECT {}, ({} IS NOT NULL AND {} > ?2) FROM frontier WHERE entity_id = ?1",
                    ENTRY_COLUMNS, cols.claim, cols.expires
                ),
                params![entity, encode_ts(now)],
                |row| Ok((row_to_entry(row)?, row.get::<_, bool>(6)?)),
            )
            .optional()?;

        let (entry, held) = row.ok_or(StorageError::EntityNotFound(entity))?;
        if held {
            return Err(StorageError::AlreadyClaimed { entity, track });
        }

        let claim = self.grant(&tx, track, entry, now)?;
        tx.commit()?;

        Ok(claim)
    }

    // ===== Commit =====

    fn commit_relations(&self, claim: &Claim, fetched_at: DateTime<Utc>) -> StorageResult<()> {
        check_track(claim, Track::Relations)?;

        let conn = self.conn()?;
        let updated = conn.execute(
            "UPDATE frontier SET
                relations_last_fetched_at = CASE
                    WHEN relations_last_fetched_at IS NULL OR ?1 > relations_last_fetched_at THEN ?1
                    ELSE relations_last_fetched_at END,
                relations_claim = NULL,
                relations_claim_expires = NULL
             WHERE entity_id = ?2 AND relations_claim = ?3",
            params![encode_ts(fetched_at), claim.entity_id(), claim.token],
        )?;

        if updated == 0 {
            return Err(StorageError::ClaimLost {
                entity: claim.entity_id(),
                track: Track::Relations,
            });
        }

        Ok(())
    }

    fn commit_content(
        &self,
        claim: &Claim,
        fetched_at: DateTime<Utc>,
        bookmark: Option<ContentId>,
    ) -> StorageResult<()> {
        check_track(claim, Track::Content)?;

        // Both values are max-merged so a late commit can never move them back
        let conn = self.conn()?;
        let updated = conn.execute(
            "UPDATE frontier SET
                content_last_fetched_at = CASE
                    WHEN content_last_fetched_at IS NULL OR ?1 > content_last_fetched_at THEN ?1
                    ELSE content_last_fetched_at END,
                latest_content_id = CASE
                    WHEN ?2 IS NULL THEN latest_content_id
                    WHEN latest_content_id IS NULL OR ?2 > latest_content_id THEN ?2
                    ELSE latest_content_id END,
                content_claim = NULL,
                content_claim_expires = NULL
             WHERE entity_id = ?3 AND content_claim = ?4",
            params![encode_ts(fetched_at), bookmark, claim.entity_id(), claim.token],
        )?;

        if updated == 0 {
            return Err(StorageError::ClaimLost {
                entity: claim.entity_id(),
                track: Track::Content,
            });
        }

        Ok(())
    }

    fn release(&self, claim: &Claim) -> StorageResult<()> {
        let cols = TrackColumns::of(claim.track);
        let conn = self.conn()?;
        let released = conn.execute(
            &format!(
                "UPDATE frontier SET {claim} = NULL, {expires} = NULL
                 WHERE entity_id = ?1 AND {claim} = ?2",
                claim = cols.claim,
                expires = cols.expires
            ),
            params![claim.entity_id(), claim.token],
        )?;

        if released == 0 {
            tracing::debug!(
                "Claim on {} ({}) was already taken over when released",
                claim.entity_id(),
                claim.track
            );
        }

        Ok(())
    }

    // ===== Reporting =====

    fn has_pending(&self, track: Track) -> StorageResult<bool> {
        let cols = TrackColumns::of(track);
        let conn = self.conn()?;
        let pending: bool = conn.query_row(
            &format!(
                "SELECT EXISTS(SELECT 1 FROM frontier WHERE {} AND {} IS NULL)",
                cols.scope, cols.fetched_at
            ),
            [],
            |row| row.get(0),
        )?;
        Ok(pending)
    }

    fn stats(&self) -> StorageResult<FrontierStats> {
        let conn = self.conn()?;
        let now = encode_ts(Utc::now());

        let (total, seeds, content_never, relations_never, claimed, oldest_content, oldest_relations) =
            conn.query_row(
                "SELECT
                    COUNT(*),
                    COALESCE(SUM(is_seed), 0),
                    COALESCE(SUM(content_last_fetched_at IS NULL), 0),
                    COALESCE(SUM(is_seed = 1 AND relations_last_fetched_at IS NULL), 0),
                    COALESCE(SUM((content_claim IS NOT NULL AND content_claim_expires > ?1)
                        OR (relations_claim IS NOT NULL AND relations_claim_expires > ?1)), 0),
                    MIN(content_last_fetched_at),
                    MIN(CASE WHEN is_seed = 1 THEN relations_last_fetched_at END)
                 FROM frontier",
                params![now],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, i64>(2)?,
                        row.get::<_, i64>(3)?,
                        row.get::<_, i64>(4)?,
                        row.get::<_, Option<String>>(5)?,
                        row.get::<_, Option<String>>(6)?,
                    ))
                },
            )?;

        Ok(FrontierStats {
            total_entities: total as u64,
            seeds: seeds as u64,
            content_never_fetched: content_never as u64,
            relations_never_fetched: relations_never as u64,
            claimed: claimed as u64,
            oldest_content_fetch: parse_optional_ts(oldest_content)?,
            oldest_relations_fetch: parse_optional_ts(oldest_relations)?,
        })
    }

    // ===== Session Journal =====

    fn start_session(&self, track: Track, config_hash: &str) -> StorageResult<i64> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO sessions (track, started_at, config_hash) VALUES (?1, ?2, ?3)",
            params![track.to_db_string(), encode_ts(Utc::now()), config_hash],
        )?;
        Ok(conn.last_insert_rowid())
    }

    fn finish_session(&self, session_id: i64, report: &SessionReport) -> StorageResult<()> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE sessions SET finished_at = ?1, processed = ?2, unavailable = ?3,
             skipped = ?4, items = ?5, stop_reason = ?6 WHERE id = ?7",
            params![
                encode_ts(Utc::now()),
                report.processed,
                report.unavailable,
                report.skipped,
                report.items,
                report.stop_reason.to_db_string(),
                session_id
            ],
        )?;
        Ok(())
    }

    fn recent_sessions(&self, limit: usize) -> StorageResult<Vec<SessionRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, track, started_at, finished_at, config_hash, processed, unavailable,
             skipped, items, stop_reason
             FROM sessions ORDER BY id DESC LIMIT ?1",
        )?;

        let sessions = stmt
            .query_map(params![limit], |row| {
                Ok(SessionRecord {
                    id: row.get(0)?,
                    track: Track::from_db_string(&row.get::<_, String>(1)?)
                        .unwrap_or(Track::Content),
                    started_at: row.get(2)?,
                    finished_at: row.get(3)?,
                    config_hash: row.get(4)?,
                    processed: row.get::<_, i64>(5)? as u64,
                    unavailable: row.get::<_, i64>(6)? as u64,
                    skipped: row.get::<_, i64>(7)? as u64,
                    items: row.get::<_, i64>(8)? as u64,
                    stop_reason: row
                        .get::<_, Option<String>>(9)?
                        .as_deref()
                        .and_then(StopReason::from_db_string),
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(sessions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    fn seeded(ids: &[u64], is_seed: bool) -> SqliteFrontier {
        let store = SqliteFrontier::new_in_memory().unwrap();
        let ids: Vec<EntityId> = ids.iter().map(|id| EntityId(*id)).collect();
        store.upsert_many(&ids, is_seed).unwrap();
        store
    }

    #[test]
    fn test_create_in_memory() {
        assert!(SqliteFrontier::new_in_memory().is_ok());
    }

    #[test]
    fn test_upsert_is_idempotent() {
        let store = SqliteFrontier::new_in_memory().unwrap();
        assert!(store.upsert(EntityId(7), false).unwrap());
        assert!(!store.upsert(EntityId(7), false).unwrap());

        let entry = store.get(EntityId(7)).unwrap().unwrap();
        assert!(!entry.is_seed);
        assert!(entry.latest_content_id.is_none());
        assert!(entry.content_last_fetched_at.is_none());
    }

    #[test]
    fn test_upsert_never_touches_progress() {
        let store = seeded(&[7], false);
        let claim = store.next_for_content().unwrap();
        let fetched_at = Utc::now();
        store
            .commit_content(&claim, fetched_at, Some(ContentId(500)))
            .unwrap();

        // Promotion to seed keeps the bookmark and timestamp intact
        assert!(!store.upsert(EntityId(7), true).unwrap());
        let entry = store.get(EntityId(7)).unwrap().unwrap();
        assert!(entry.is_seed);
        assert_eq!(entry.latest_content_id, Some(ContentId(500)));
        assert!(entry.content_last_fetched_at.is_some());

        // A seed is never demoted
        store.upsert(EntityId(7), false).unwrap();
        assert!(store.get(EntityId(7)).unwrap().unwrap().is_seed);
    }

    #[test]
    fn test_upsert_many_counts_new_entities() {
        let store = seeded(&[1, 2], false);
        let added = store
            .upsert_many(&[EntityId(2), EntityId(3), EntityId(4)], false)
            .unwrap();
        assert_eq!(added, 2);
        assert_eq!(store.stats().unwrap().total_entities, 4);
    }

    #[test]
    fn test_empty_frontier() {
        let store = SqliteFrontier::new_in_memory().unwrap();
        assert!(matches!(
            store.next_for_content(),
            Err(StorageError::EmptyFrontier(Track::Content))
        ));

        // Relations only consider seeds
        store.upsert(EntityId(1), false).unwrap();
        assert!(matches!(
            store.next_for_relations(),
            Err(StorageError::EmptyFrontier(Track::Relations))
        ));
        assert!(store.next_for_content().is_ok());
    }

    #[test]
    fn test_content_order_never_fetched_then_stalest() {
        // A never fetched, B fetched at T-10, C fetched at T-1
        let store = seeded(&[1, 2, 3], false);
        let t = Utc::now();

        let b = store.claim_entity(Track::Content, EntityId(2)).unwrap();
        store
            .commit_content(&b, t - ChronoDuration::seconds(10), None)
            .unwrap();
        let c = store.claim_entity(Track::Content, EntityId(3)).unwrap();
        store
            .commit_content(&c, t - ChronoDuration::seconds(1), None)
            .unwrap();

        let first = store.next_for_content().unwrap();
        assert_eq!(first.entity_id(), EntityId(1));
        store
            .commit_content(&first, t + ChronoDuration::seconds(1), None)
            .unwrap();

        let second = store.next_for_content().unwrap();
        assert_eq!(second.entity_id(), EntityId(2));
        store
            .commit_content(&second, t + ChronoDuration::seconds(2), None)
            .unwrap();

        let third = store.next_for_content().unwrap();
        assert_eq!(third.entity_id(), EntityId(3));
    }

    #[test]
    fn test_staleness_never_decreases_across_rounds() {
        let store = seeded(&[10, 20, 30, 40], false);
        let base = Utc::now();
        let mut served = Vec::new();

        for step in 0..12 {
            let claim = store.next_for_content().unwrap();
            served.push(claim.entry.content_last_fetched_at);
            store
                .commit_content(&claim, base + ChronoDuration::seconds(step), None)
                .unwrap();
        }

        // First four picks are the never-fetched entities
        assert!(served[..4].iter().all(|ts| ts.is_none()));
        let fetched: Vec<_> = served[4..].iter().map(|ts| ts.unwrap()).collect();
        assert!(fetched.windows(2).all(|pair| pair[0] <= pair[1]));
    }

    #[test]
    fn test_relations_prefers_unfetched_seeds() {
        let store = seeded(&[5, 6], true);
        store.upsert(EntityId(1), false).unwrap();

        let first = store.next_for_relations().unwrap();
        assert_eq!(first.entity_id(), EntityId(5));
        store.commit_relations(&first, Utc::now()).unwrap();

        let second = store.next_for_relations().unwrap();
        assert_eq!(second.entity_id(), EntityId(6));
        store.commit_relations(&second, Utc::now()).unwrap();

        // Both seeds fetched: the older one comes back, never the non-seed
        let third = store.next_for_relations().unwrap();
        assert_eq!(third.entity_id(), EntityId(5));
    }

    #[test]
    fn test_claimed_rows_are_skipped() {
        let store = seeded(&[1, 2], false);

        let first = store.next_for_content().unwrap();
        let second = store.next_for_content().unwrap();
        assert_ne!(first.entity_id(), second.entity_id());

        assert!(matches!(
            store.next_for_content(),
            Err(StorageError::NothingAvailable(Track::Content))
        ));

        store.release(&first).unwrap();
        assert_eq!(store.next_for_content().unwrap().entity_id(), first.entity_id());
    }

    #[test]
    fn test_tracks_claim_independently() {
        let store = seeded(&[1], true);
        let content = store.next_for_content().unwrap();
        let relations = store.next_for_relations().unwrap();
        assert_eq!(content.entity_id(), relations.entity_id());

        assert!(matches!(
            store.commit_relations(&content, Utc::now()),
            Err(StorageError::TrackMismatch { .. })
        ));
    }

    #[test]
    fn test_exclusion_list() {
        let store = seeded(&[1, 2, 3], false);
        let claim = store
            .next_for(Track::Content, &[EntityId(1), EntityId(2)])
            .unwrap();
        assert_eq!(claim.entity_id(), EntityId(3));

        store.release(&claim).unwrap();
        assert!(matches!(
            store.next_for(Track::Content, &[EntityId(1), EntityId(2), EntityId(3)]),
            Err(StorageError::NothingAvailable(Track::Content))
        ));
    }

    #[test]
    fn test_claim_entity() {
        let store = seeded(&[1], false);
        let claim = store.claim_entity(Track::Content, EntityId(1)).unwrap();

        assert!(matches!(
            store.claim_entity(Track::Content, EntityId(1)),
            Err(StorageError::AlreadyClaimed { .. })
        ));
        assert!(matches!(
            store.claim_entity(Track::Content, EntityId(99)),
            Err(StorageError::EntityNotFound(EntityId(99)))
        ));

        store.commit_content(&claim, Utc::now(), None).unwrap();
    }

    #[test]
    fn test_commit_content_bookmark_is_monotonic() {
        let store = seeded(&[1], false);

        let claim = store.next_for_content().unwrap();
        store
            .commit_content(&claim, Utc::now(), Some(ContentId(200)))
            .unwrap();

        let claim = store.next_for_content().unwrap();
        store
            .commit_content(&claim, Utc::now(), Some(ContentId(150)))
            .unwrap();

        let claim = store.next_for_content().unwrap();
        store.commit_content(&claim, Utc::now(), None).unwrap();

        let entry = store.get(EntityId(1)).unwrap().unwrap();
        assert_eq!(entry.latest_content_id, Some(ContentId(200)));
    }

    #[test]
    fn test_commit_without_claim_fails() {
        let store = seeded(&[1], false);
        let claim = store.next_for_content().unwrap();
        store.commit_content(&claim, Utc::now(), None).unwrap();

        // The same claim cannot be applied twice
        assert!(matches!(
            store.commit_content(&claim, Utc::now(), Some(ContentId(9))),
            Err(StorageError::ClaimLost { .. })
        ));
        assert!(store.get(EntityId(1)).unwrap().unwrap().latest_content_id.is_none());
    }

    #[test]
    fn test_concurrent_handles_select_disjoint_entities() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("frontier.db");
        let worker_a = SqliteFrontier::new(&path).unwrap();
        let worker_b = SqliteFrontier::new(&path).unwrap();
        worker_a.upsert_many(&[EntityId(1), EntityId(2)], false).unwrap();

        let a = worker_a.next_for_content().unwrap();
        let b = worker_b.next_for_content().unwrap();
        assert_eq!(a.entity_id(), EntityId(1));
        assert_eq!(b.entity_id(), EntityId(2));

        assert!(matches!(
            worker_b.next_for_content(),
            Err(StorageError::NothingAvailable(Track::Content))
        ));

        worker_a.commit_content(&a, Utc::now(), Some(ContentId(10))).unwrap();
        worker_b.commit_content(&b, Utc::now(), Some(ContentId(20))).unwrap();
    }

    #[test]
    fn test_expired_claim_is_taken_over_and_stale_commit_loses() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("frontier.db");
        let slow = SqliteFrontier::new(&path)
            .unwrap()
            .with_lease(Duration::ZERO);
        let fast = SqliteFrontier::new(&path).unwrap();
        slow.upsert(EntityId(1), false).unwrap();

        let stale = slow.next_for_content().unwrap();
        let fresh = fast.next_for_content().unwrap();
        assert_eq!(fresh.entity_id(), EntityId(1));

        fast.commit_content(&fresh, Utc::now(), Some(ContentId(200))).unwrap();
        assert!(matches!(
            slow.commit_content(&stale, Utc::now(), Some(ContentId(150))),
            Err(StorageError::ClaimLost { .. })
        ));

        let entry = fast.get(EntityId(1)).unwrap().unwrap();
        assert_eq!(entry.latest_content_id, Some(ContentId(200)));
    }

    #[test]
    fn test_has_pending() {
        let store = seeded(&[1], true);
        assert!(store.has_pending(Track::Content).unwrap());
        assert!(store.has_pending(Track::Relations).unwrap());

        let claim = store.next_for_content().unwrap();
        store.commit_content(&claim, Utc::now(), None).unwrap();
        assert!(!store.has_pending(Track::Content).unwrap());
        assert!(store.has_pending(Track::Relations).unwrap());
    }

    #[test]
    fn test_stats() {
        let store = seeded(&[1, 2], true);
        store.upsert(EntityId(3), false).unwrap();
        let claim = store.next_for_content().unwrap();
        let _held = store.next_for_relations().unwrap();
        store.commit_content(&claim, Utc::now(), None).unwrap();

        let stats = store.stats().unwrap();
        assert_eq!(stats.total_entities, 3);
        assert_eq!(stats.seeds, 2);
        assert_eq!(stats.content_never_fetched, 2);
        assert_eq!(stats.relations_never_fetched, 2);
        assert_eq!(stats.claimed, 1);
        assert!(stats.oldest_content_fetch.is_some());
        assert!(stats.oldest_relations_fetch.is_none());
    }

    #[test]
    fn test_session_journal() {
        let store = SqliteFrontier::new_in_memory().unwrap();
        let id = store.start_session(Track::Content, "abc123").unwrap();

        let report = SessionReport {
            track: Track::Content,
            processed: 4,
            unavailable: 1,
            skipped: 0,
            claims_lost: 0,
            items: 37,
            stop_reason: StopReason::BudgetExhausted,
            elapsed: Duration::from_secs(3),
        };
        store.finish_session(id, &report).unwrap();

        let sessions = store.recent_sessions(5).unwrap();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].track, Track::Content);
        assert_eq!(sessions[0].processed, 4);
        assert_eq!(sessions[0].items, 37);
        assert_eq!(sessions[0].config_hash, "abc123");
        assert_eq!(sessions[0].stop_reason, Some(StopReason::BudgetExhausted));
        assert!(sessions[0].finished_at.is_some());
    }
}
