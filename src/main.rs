//! Tidewatch main entry point
//!
//! This is the command-line interface for the Tidewatch social graph crawler.

use anyhow::{bail, Context};
use clap::{Parser, ValueEnum};
use std::path::{Path, PathBuf};
use tidewatch::api::EntityId;
use tidewatch::config::{load_config_with_hash, Config};
use tidewatch::crawler::{should_run, Crawler, SessionReport};
use tidewatch::storage::{open_frontier, Track};
use tracing_subscriber::EnvFilter;

/// Which frontier track(s) to crawl
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum TrackArg {
    Content,
    Relations,
    Both,
}

impl TrackArg {
    fn tracks(self) -> Vec<Track> {
        match self {
            Self::Content => vec![Track::Content],
            Self::Relations => vec![Track::Relations],
            Self::Both => vec![Track::Relations, Track::Content],
        }
    }
}

/// Tidewatch: a resumable crawler for a rate-limited social graph API
///
/// Each invocation runs one time-bounded crawl session per worker. Progress
/// lives in the frontier database, so repeated invocations (from cron or any
/// other scheduler) pick up where the previous ones stopped.
#[derive(Parser, Debug)]
#[command(name = "tidewatch")]
#[command(version)]
#[command(about = "A resumable crawler for a rate-limited social graph API", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Track(s) to crawl
    #[arg(long, value_enum, default_value = "content")]
    track: TrackArg,

    /// Concurrent sessions per track (overrides the config)
    #[arg(long)]
    workers: Option<u32>,

    /// Fetch a single entity instead of following the fairness order
    #[arg(long, value_name = "ID", conflicts_with = "workers")]
    entity: Option<u64>,

    /// Only crawl if some entity on the selected track was never fetched
    #[arg(long)]
    if_pending: bool,

    /// Add seed entities to the frontier before crawling
    #[arg(long, value_name = "ID", num_args = 1..)]
    seed: Vec<u64>,

    /// Validate config and show what would be crawled without actually crawling
    #[arg(long, conflicts_with = "stats")]
    dry_run: bool,

    /// Show statistics from the database and exit
    #[arg(long, conflicts_with = "dry_run")]
    stats: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    // Load and validate configuration
    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("Failed to load configuration from {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", config_hash);

    // Handle different modes
    if cli.dry_run {
        handle_dry_run(&config, &cli)
    } else if cli.stats {
        handle_stats(&config)
    } else {
        handle_crawl(&config, &config_hash, &cli).await
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("tidewatch=info,warn"),
            1 => EnvFilter::new("tidewatch=debug,info"),
            2 => EnvFilter::new("tidewatch=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Handles the --dry-run mode: validates config and shows what would be crawled
fn handle_dry_run(config: &Config, cli: &Cli) -> anyhow::Result<()> {
    println!("=== Tidewatch Dry Run ===\n");

    println!("API:");
    println!("  Base URL: {}", config.api.base_url);
    println!("  User agent: {}", config.api.user_agent);
    println!(
        "  Bearer token: {}",
        if config.api.bearer_token.is_some() { "set" } else { "not set" }
    );

    let crawler = &config.crawler;
    println!("\nCrawler Configuration:");
    println!("  Session budget: {}s", crawler.session_budget_secs);
    println!("  Workers per track: {}", cli.workers.unwrap_or(crawler.workers));
    println!("  Max attempts: {}", crawler.max_attempts);
    println!("  Retry delay: {}ms", crawler.retry_delay_ms);
    println!("  Quota window: {}s", crawler.quota_window_secs);
    println!("  Claim lease: {}s", crawler.claim_lease_secs);
    println!("  Relation detail: {:?}", crawler.relation_detail);

    println!("\nOutput:");
    println!("  Database: {}", config.storage.database_path);
    println!("  Export directory: {}", config.export.directory);

    let seed_count = config.frontier.seeds.len() + cli.seed.len();
    println!("\nSeeds ({}):", seed_count);
    for seed in config.frontier.seeds.iter().chain(cli.seed.iter()) {
        println!("  - {}", seed);
    }

    println!("\n✓ Configuration is valid");
    match cli.entity {
        Some(entity) => println!("✓ Would fetch entity {} on {:?}", entity, cli.track),
        None => println!("✓ Would crawl {:?} track(s)", cli.track),
    }

    Ok(())
}

/// Handles the --stats mode: shows statistics from the database
fn handle_stats(config: &Config) -> anyhow::Result<()> {
    use tidewatch::output::{load_statistics, print_statistics};

    println!("Database: {}\n", config.storage.database_path);

    let store = open_frontier(Path::new(&config.storage.database_path))?;
    let stats = load_statistics(&store)?;
    print_statistics(&stats);

    Ok(())
}

/// Handles the main crawl operation
async fn handle_crawl(config: &Config, config_hash: &str, cli: &Cli) -> anyhow::Result<()> {
    let crawler = Crawler::from_config(config, config_hash)?;

    let seeds: Vec<EntityId> = config
        .frontier
        .seeds
        .iter()
        .chain(cli.seed.iter())
        .map(|id| EntityId(*id))
        .collect();
    crawler.seed(&seeds)?;

    let mut tracks = cli.track.tracks();
    if cli.if_pending {
        let mut pending = Vec::new();
        for track in tracks {
            if should_run(crawler.store().as_ref(), track)? {
                pending.push(track);
            } else {
                tracing::info!("Nothing pending on {} track, skipping", track);
            }
        }
        tracks = pending;
    }

    if let Some(entity) = cli.entity {
        let entity = EntityId(entity);
        if crawler.store().get(entity)?.is_none() {
            bail!("Entity {} is not in the frontier; add it with --seed first", entity);
        }
        for track in tracks {
            let report = crawler.session(track).run_one(entity).await?;
            print_report(&report);
        }
        return Ok(());
    }

    if tracks.is_empty() {
        return Ok(());
    }

    let workers = cli.workers.unwrap_or(config.crawler.workers);
    tracing::info!("Starting {} worker(s) per track on {:?}", workers, tracks);

    let reports = crawler.run(&tracks, workers).await?;
    for report in &reports {
        print_report(report);
    }

    Ok(())
}

fn print_report(report: &SessionReport) {
    tracing::info!(
        "{} track: {} processed, {} unavailable, {} skipped, {} lost claims, {} items ({})",
        report.track,
        report.processed,
        report.unavailable,
        report.skipped,
        report.claims_lost,
        report.items,
        report.stop_reason
    );
}
