//! Crawler module for the rate-limited fetch loop
//!
//! This module contains the core crawling logic, including:
//! - The retry and quota-window backoff policy
//! - Cursor and bookmark pagination over the remote API
//! - Bounded crawl sessions over the frontier
//! - Running concurrent workers per track

mod backoff;
#[cfg(test)]
pub(crate) mod fake;
mod pagination;
mod session;

pub use backoff::{next_window_boundary, BackoffPolicy, CallOutcome, Decision};
pub use pagination::{collect_content, collect_pages, Fetched};
pub use session::{CrawlSession, SessionReport, StopReason};

use crate::api::{EntityId, HttpApi, SocialApi};
use crate::config::{Config, CrawlerConfig};
use crate::output::{ExportSink, JsonlSink};
use crate::storage::{open_frontier, FrontierStore, Track};
use crate::TidewatchError;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Whether a crawl cycle on `track` has work that was never done
///
/// Schedulers can call this to skip runs while the frontier is fully serviced.
pub fn should_run(store: &dyn FrontierStore, track: Track) -> Result<bool, TidewatchError> {
    Ok(store.has_pending(track)?)
}

/// Shared collaborators of every worker in a crawl run
pub struct Crawler {
    store: Arc<dyn FrontierStore>,
    api: Arc<dyn SocialApi>,
    sink: Arc<dyn ExportSink>,
    config: CrawlerConfig,
    config_hash: String,
}

impl Crawler {
    pub fn new(
        store: Arc<dyn FrontierStore>,
        api: Arc<dyn SocialApi>,
        sink: Arc<dyn ExportSink>,
        config: CrawlerConfig,
        config_hash: impl Into<String>,
    ) -> Self {
        Self {
            store,
            api,
            sink,
            config,
            config_hash: config_hash.into(),
        }
    }

    /// Builds the SQLite frontier, HTTP client and JSON Lines sink from configuration
    ///
    /// # Arguments
    ///
    /// * `config` - The crawler configuration
    /// * `config_hash` - Hash of the configuration file, journaled per session
    ///
    /// # Returns
    ///
    /// * `Ok(Crawler)` - Every collaborator is ready
    /// * `Err(TidewatchError)` - Database, export directory or HTTP client failed
    pub fn from_config(config: &Config, config_hash: &str) -> Result<Self, TidewatchError> {
        let store = open_frontier(Path::new(&config.storage.database_path))?
            .with_lease(Duration::from_secs(config.crawler.claim_lease_secs));
        let api = HttpApi::from_config(&config.api)?;
        let sink = JsonlSink::new(Path::new(&config.export.directory))?;

        Ok(Self::new(
            Arc::new(store),
            Arc::new(api),
            Arc::new(sink),
            config.crawler.clone(),
            config_hash,
        ))
    }

    pub fn store(&self) -> &Arc<dyn FrontierStore> {
        &self.store
    }

    /// Adds seed entities to the frontier
    ///
    /// # Returns
    ///
    /// The number of entities that were not tracked before
    pub fn seed(&self, seeds: &[EntityId]) -> Result<usize, TidewatchError> {
        let added = self.store.upsert_many(seeds, true)?;
        if added > 0 {
            tracing::info!("Added {} new seeds to the frontier", added);
        }
        Ok(added)
    }

    /// Creates a session on `track` sharing this crawler's collaborators
    pub fn session(&self, track: Track) -> CrawlSession {
        CrawlSession::new(
            self.store.clone(),
            self.api.clone(),
            self.sink.clone(),
            track,
            &self.config,
        )
        .with_config_hash(self.config_hash.clone())
    }

    /// Runs `workers` concurrent sessions for each track and collects their reports
    pub async fn run(&self, tracks: &[Track], workers: u32) -> Result<Vec<SessionReport>, TidewatchError> {
        let mut handles = Vec::new();

        for track in tracks {
            for worker in 0..workers.max(1) {
                let session = self.session(*track);
                tracing::debug!("Spawning worker {} on {} track", worker, track);
                handles.push(tokio::spawn(async move { session.run().await }));
            }
        }

        let mut reports = Vec::with_capacity(handles.len());
        let mut first_error = None;

        // Wait for every worker so none is left running with a live claim
        for handle in handles {
            match handle.await {
                Ok(Ok(report)) => reports.push(report),
                Ok(Err(e)) => {
                    tracing::error!("Worker failed: {}", e);
                    first_error.get_or_insert(e);
                }
                Err(e) => {
                    tracing::error!("Worker task panicked: {}", e);
                    first_error.get_or_insert(TidewatchError::Worker(e.to_string()));
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(reports),
        }
    }
}
