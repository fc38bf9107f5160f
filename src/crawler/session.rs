//! Crawl step executor
//!
//! A session runs select → fetch → export → commit for one track until its
//! time budget runs out, the quota yields, or the frontier has nothing left
//! for it. The budget is only checked between entities.

use crate::api::{ContentId, Cursor, EntityId, Profile, SocialApi};
use crate::config::{CrawlerConfig, RelationDetail};
use crate::crawler::backoff::BackoffPolicy;
use crate::crawler::pagination::{collect_content, collect_pages, Fetched};
use crate::output::{ExportRecord, ExportSink};
use crate::storage::{Claim, FrontierStore, StorageError, Track};
use chrono::{DateTime, SubsecRound, Utc};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Why a session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The time budget ran out
    BudgetExhausted,
    /// The quota window resets after the budget ends
    QuotaExhausted,
    /// The track has no eligible entities
    EmptyFrontier,
    /// Every remaining candidate is claimed by another worker or skipped
    NothingAvailable,
    /// Every entity was serviced since the session started
    CycleComplete,
    /// A single requested entity was handled
    Finished,
}

impl StopReason {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::BudgetExhausted => "budget_exhausted",
            Self::QuotaExhausted => "quota_exhausted",
            Self::EmptyFrontier => "empty_frontier",
            Self::NothingAvailable => "nothing_available",
            Self::CycleComplete => "cycle_complete",
            Self::Finished => "finished",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "budget_exhausted" => Some(Self::BudgetExhausted),
            "quota_exhausted" => Some(Self::QuotaExhausted),
            "empty_frontier" => Some(Self::EmptyFrontier),
            "nothing_available" => Some(Self::NothingAvailable),
            "cycle_complete" => Some(Self::CycleComplete),
            "finished" => Some(Self::Finished),
            _ => None,
        }
    }
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.to_db_string())
    }
}

/// Outcome counters of one session
#[derive(Debug, Clone, PartialEq)]
pub struct SessionReport {
    pub track: Track,
    /// Entities fetched and committed
    pub processed: u64,
    /// Entities that were protected, suspended or deleted
    pub unavailable: u64,
    /// Entities given up on after repeated transient failures
    pub skipped: u64,
    /// Commits rejected because another worker took the claim over
    pub claims_lost: u64,
    /// Records exported
    pub items: u64,
    pub stop_reason: StopReason,
    pub elapsed: Duration,
}

impl SessionReport {
    fn new(track: Track) -> Self {
        Self {
            track,
            processed: 0,
            unavailable: 0,
            skipped: 0,
            claims_lost: 0,
            items: 0,
            stop_reason: StopReason::BudgetExhausted,
            elapsed: Duration::ZERO,
        }
    }

    fn record(&mut self, step: &Step) {
        match step {
            Step::Complete { items } => {
                self.processed += 1;
                self.items += *items as u64;
            }
            Step::Unavailable => self.unavailable += 1,
            Step::Skipped => self.skipped += 1,
            Step::ClaimLost { items } => {
                self.claims_lost += 1;
                self.items += *items as u64;
            }
            Step::QuotaYield => {}
        }
    }
}

/// What happened to one claimed entity
#[derive(Debug, Clone, PartialEq)]
enum Step {
    Complete { items: usize },
    Unavailable,
    Skipped,
    ClaimLost { items: usize },
    QuotaYield,
}

/// One worker's bounded crawl loop over a single track
pub struct CrawlSession {
    store: Arc<dyn FrontierStore>,
    api: Arc<dyn SocialApi>,
    sink: Arc<dyn ExportSink>,
    track: Track,
    policy: BackoffPolicy,
    config: CrawlerConfig,
    config_hash: String,
}

impl CrawlSession {
    pub fn new(
        store: Arc<dyn FrontierStore>,
        api: Arc<dyn SocialApi>,
        sink: Arc<dyn ExportSink>,
        track: Track,
        config: &CrawlerConfig,
    ) -> Self {
        Self {
            store,
            api,
            sink,
            track,
            policy: BackoffPolicy::from_config(config),
            config: config.clone(),
            config_hash: String::new(),
        }
    }

    /// Sets the configuration hash journaled with the session
    pub fn with_config_hash(mut self, config_hash: impl Into<String>) -> Self {
        self.config_hash = config_hash.into();
        self
    }

    fn budget(&self) -> Duration {
        Duration::from_secs(self.config.session_budget_secs)
    }

    /// Runs the session until a stop condition is reached
    ///
    /// # Returns
    ///
    /// * `Ok(SessionReport)` - The session ended normally (including quota yields)
    /// * `Err(TidewatchError)` - Storage or export failed
    pub async fn run(&self) -> crate::Result<SessionReport> {
        let started = Instant::now();
        // Stored timestamps carry microseconds
        let started_at = Utc::now().trunc_subsecs(6);
        let deadline = started + self.budget();
        let session_id = self.store.start_session(self.track, &self.config_hash)?;

        tracing::info!(
            "Session {} started on {} track (budget {:?})",
            session_id,
            self.track,
            self.budget()
        );

        let mut report = SessionReport::new(self.track);
        let mut exclude: Vec<EntityId> = Vec::new();

        let stop_reason = loop {
            if Instant::now() >= deadline {
                break StopReason::BudgetExhausted;
            }

            let claim = match self.store.next_for(self.track, &exclude) {
                Ok(claim) => claim,
                Err(StorageError::EmptyFrontier(_)) => break StopReason::EmptyFrontier,
                Err(StorageError::NothingAvailable(_)) => break StopReason::NothingAvailable,
                Err(e) => return Err(e.into()),
            };

            // Selection is stalest-first, so this holds for every other entity too
            if serviced_since(&claim, started_at) {
                self.store.release(&claim)?;
                break StopReason::CycleComplete;
            }

            let step = self.process(&claim, Some(deadline)).await?;
            report.record(&step);

            match step {
                Step::Skipped => exclude.push(claim.entity_id()),
                Step::QuotaYield => break StopReason::QuotaExhausted,
                _ => {}
            }
        };

        report.stop_reason = stop_reason;
        report.elapsed = started.elapsed();
        self.store.finish_session(session_id, &report)?;

        tracing::info!(
            "Session {} on {} track stopped ({}): {} processed, {} unavailable, {} skipped, {} items in {:?}",
            session_id,
            self.track,
            report.stop_reason,
            report.processed,
            report.unavailable,
            report.skipped,
            report.items,
            report.elapsed
        );

        Ok(report)
    }

    /// Fetches one specific entity, ignoring its place in the fairness order
    pub async fn run_one(&self, entity: EntityId) -> crate::Result<SessionReport> {
        let started = Instant::now();
        let session_id = self.store.start_session(self.track, &self.config_hash)?;
        let claim = self.store.claim_entity(self.track, entity)?;

        let step = self.process(&claim, Some(started + self.budget())).await?;

        let mut report = SessionReport::new(self.track);
        report.record(&step);
        report.stop_reason = match step {
            Step::QuotaYield => StopReason::QuotaExhausted,
            _ => StopReason::Finished,
        };
        report.elapsed = started.elapsed();
        self.store.finish_session(session_id, &report)?;

        Ok(report)
    }

    async fn process(&self, claim: &Claim, deadline: Option<Instant>) -> crate::Result<Step> {
        tracing::debug!(
            "Fetching {} of {} (last fetched {:?})",
            claim.track,
            claim.entity_id(),
            claim.entry.last_fetched(claim.track)
        );

        match claim.track {
            Track::Content => self.fetch_content(claim, deadline).await,
            Track::Relations => self.fetch_relations(claim, deadline).await,
        }
    }

    async fn fetch_content(&self, claim: &Claim, deadline: Option<Instant>) -> crate::Result<Step> {
        let entity = claim.entity_id();
        let fetched = collect_content(
            self.api.as_ref(),
            &self.policy,
            entity,
            claim.entry.latest_content_id,
            self.config.content_page_size,
            self.config.max_content_pages,
            deadline,
        )
        .await;

        let posts = match fetched {
            Fetched::Complete { items, .. } => items,
            other => return self.handle_incomplete(claim, other),
        };

        let fetched_at = Utc::now();
        let bookmark = posts.iter().map(|p| p.id).max();
        let records: Vec<ExportRecord> = posts
            .into_iter()
            .map(|post| ExportRecord::Post {
                author: entity,
                fetched_at,
                post,
            })
            .collect();

        self.export(claim, &records)?;
        tracing::info!("{}: {} new posts", entity, records.len());

        self.commit(claim, fetched_at, bookmark, records.len())
    }

    async fn fetch_relations(&self, claim: &Claim, deadline: Option<Instant>) -> crate::Result<Step> {
        let entity = claim.entity_id();

        let fetched: Fetched<(EntityId, Option<Profile>)> = match self.config.relation_detail {
            RelationDetail::Ids => collect_pages(
                &self.policy,
                Cursor::Start,
                self.config.ids_page_size,
                deadline,
                |size, cursor| self.api.list_relation_ids(entity, size, cursor),
            )
            .await
            .map_items(|id| (id, None)),
            RelationDetail::Profiles => collect_pages(
                &self.policy,
                Cursor::Start,
                self.config.profiles_page_size,
                deadline,
                |size, cursor| self.api.list_relations(entity, size, cursor),
            )
            .await
            .map_items(|profile| (profile.id, Some(profile))),
        };

        let relations = match fetched {
            Fetched::Complete { items, .. } => items,
            other => return self.handle_incomplete(claim, other),
        };

        let fetched_at = Utc::now();
        let mut ids = Vec::with_capacity(relations.len());
        let mut records = Vec::with_capacity(relations.len());
        for (target, profile) in relations {
            ids.push(target);
            records.push(ExportRecord::Edge {
                source: entity,
                target,
                fetched_at,
            });
            if let Some(profile) = profile {
                records.push(ExportRecord::Profile {
                    observed_via: entity,
                    fetched_at,
                    profile,
                });
            }
        }

        self.export(claim, &records)?;
        let discovered = match self.store.upsert_many(&ids, false) {
            Ok(discovered) => discovered,
            Err(e) => {
                tracing::error!("Tracking relations of {} failed: {}", entity, e);
                self.store.release(claim)?;
                return Err(e.into());
            }
        };
        tracing::info!(
            "{}: {} relations ({} newly tracked)",
            entity,
            ids.len(),
            discovered
        );

        self.commit(claim, fetched_at, None, ids.len())
    }

    /// Handles every outcome of a fetch other than `Complete`
    fn handle_incomplete<T>(&self, claim: &Claim, fetched: Fetched<T>) -> crate::Result<Step> {
        let entity = claim.entity_id();

        match fetched {
            Fetched::Unavailable { reason } => {
                tracing::warn!("{} is unavailable on {}: {}", entity, claim.track, reason);
                // Refreshing the timestamp keeps the entity from being re-selected first forever
                match self.commit(claim, Utc::now(), None, 0)? {
                    Step::Complete { .. } => Ok(Step::Unavailable),
                    lost => Ok(lost),
                }
            }
            Fetched::RetriesExhausted {
                attempts,
                last_error,
            } => {
                tracing::warn!(
                    "Giving up on {} ({}) after {} attempts: {}",
                    entity,
                    claim.track,
                    attempts,
                    last_error
                );
                self.store.release(claim)?;
                Ok(Step::Skipped)
            }
            Fetched::QuotaExhausted { items, resume } => {
                tracing::info!(
                    "Quota exhausted while fetching {} at {}; discarding {} partial items",
                    entity,
                    resume,
                    items.len()
                );
                self.store.release(claim)?;
                Ok(Step::QuotaYield)
            }
            Fetched::Complete { .. } => self.commit(claim, Utc::now(), None, 0),
        }
    }

    fn export(&self, claim: &Claim, records: &[ExportRecord]) -> crate::Result<()> {
        if let Err(e) = self.sink.append(claim.entity_id(), records) {
            tracing::error!("Export for {} failed: {}", claim.entity_id(), e);
            self.store.release(claim)?;
            return Err(e.into());
        }
        Ok(())
    }

    fn commit(
        &self,
        claim: &Claim,
        fetched_at: DateTime<Utc>,
        bookmark: Option<ContentId>,
        items: usize,
    ) -> crate::Result<Step> {
        let result = match claim.track {
            Track::Content => self.store.commit_content(claim, fetched_at, bookmark),
            Track::Relations => self.store.commit_relations(claim, fetched_at),
        };

        match result {
            Ok(()) => Ok(Step::Complete { items }),
            Err(StorageError::ClaimLost { entity, track }) => {
                tracing::warn!(
                    "Claim on {} ({}) expired and was taken over; progress not recorded",
                    entity,
                    track
                );
                Ok(Step::ClaimLost { items })
            }
            Err(e) => Err(e.into()),
        }
    }
}

fn serviced_since(claim: &Claim, since: DateTime<Utc>) -> bool {
    claim
        .entry
        .last_fetched(claim.track)
        .map_or(false, |ts| ts >= since)
}
