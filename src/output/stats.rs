//! Statistics generation from the frontier database
//!
//! This module provides functionality for extracting and displaying
//! frontier statistics and the recent session journal.

use crate::storage::{FrontierStats, FrontierStore, SessionRecord};
use crate::TidewatchError;

/// Number of journaled sessions shown by default
const RECENT_SESSIONS: usize = 10;

/// Frontier statistics summary
#[derive(Debug, Clone)]
pub struct CrawlStatistics {
    pub frontier: FrontierStats,

    /// Most recent sessions, newest first
    pub recent_sessions: Vec<SessionRecord>,
}

/// Loads statistics from storage
///
/// # Arguments
///
/// * `store` - The frontier to query
///
/// # Returns
///
/// * `Ok(CrawlStatistics)` - Successfully loaded statistics
/// * `Err(TidewatchError)` - Failed to query statistics
pub fn load_statistics(store: &dyn FrontierStore) -> Result<CrawlStatistics, TidewatchError> {
    let frontier = store.stats()?;
    let recent_sessions = store.recent_sessions(RECENT_SESSIONS)?;

    Ok(CrawlStatistics {
        frontier,
        recent_sessions,
    })
}

fn percentage(part: u64, total: u64) -> f64 {
    if total > 0 {
        (part as f64 / total as f64) * 100.0
    } else {
        0.0
    }
}

/// Prints statistics to stdout in a formatted manner
pub fn print_statistics(stats: &CrawlStatistics) {
    let frontier = &stats.frontier;

    println!("=== Frontier Statistics ===\n");

    println!("Overview:");
    println!("  Tracked entities: {}", frontier.total_entities);
    println!("  Seeds: {}", frontier.seeds);
    println!("  Currently claimed: {}", frontier.claimed);
    println!();

    println!("Content track:");
    println!(
        "  Never fetched: {} ({:.1}%)",
        frontier.content_never_fetched,
        percentage(frontier.content_never_fetched, frontier.total_entities)
    );
    match frontier.oldest_content_fetch {
        Some(ts) => println!("  Stalest fetch: {}", ts),
        None => println!("  Stalest fetch: -"),
    }
    println!();

    println!("Relations track:");
    println!(
        "  Never fetched: {} ({:.1}%)",
        frontier.relations_never_fetched,
        percentage(frontier.relations_never_fetched, frontier.seeds)
    );
    match frontier.oldest_relations_fetch {
        Some(ts) => println!("  Stalest fetch: {}", ts),
        None => println!("  Stalest fetch: -"),
    }
    println!();

    if !stats.recent_sessions.is_empty() {
        println!("Recent Sessions ({}):", stats.recent_sessions.len());
        for session in &stats.recent_sessions {
            let stop = session
                .stop_reason
                .map(|r| r.to_string())
                .unwrap_or_else(|| "unfinished".to_string());
            println!(
                "  #{} {} {} processed={} unavailable={} skipped={} items={} ({})",
                session.id,
                session.track,
                session.started_at,
                session.processed,
                session.unavailable,
                session.skipped,
                session.items,
                stop
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::EntityId;
    use crate::storage::SqliteFrontier;

    #[test]
    fn test_load_statistics() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteFrontier::new(&dir.path().join("stats.db")).unwrap();
        store.upsert(EntityId(1), true).unwrap();
        store.upsert(EntityId(2), false).unwrap();
        store
            .start_session(crate::storage::Track::Content, "hash")
            .unwrap();

        let stats = load_statistics(&store).unwrap();
        assert_eq!(stats.frontier.total_entities, 2);
        assert_eq!(stats.frontier.seeds, 1);
        assert_eq!(stats.recent_sessions.len(), 1);
        assert!(stats.recent_sessions[0].stop_reason.is_none());
    }

    #[test]
    fn test_percentage_of_empty_total() {
        assert_eq!(percentage(3, 0), 0.0);
        assert_eq!(percentage(1, 4), 25.0);
    }
}
