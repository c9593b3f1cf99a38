//! Leasecrawl main entry point
//!
//! This is the command-line interface for the Leasecrawl fetch scheduler.

use anyhow::{bail, Context};
use chrono::Duration as ChronoDuration;
use clap::{Args, Parser, Subcommand};
use leasecrawl::clock::{Clock, SystemClock};
use leasecrawl::config::{load_config_with_hash, validate, Config, ConfigOverrides};
use leasecrawl::crawler::{CrawlOrchestrator, CrawlTarget, HttpFetcher, TaskScheduler};
use leasecrawl::output::{print_summary, BatchSummary};
use leasecrawl::robots::HttpRobotsSource;
use leasecrawl::state::TaskStatus;
use leasecrawl::storage::{LocalContentStore, SqliteTaskStore, TaskStore, TaskTags};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Leasecrawl: a lease-based, polite web-fetch scheduler
///
/// Leasecrawl queues URLs in a shared task store, claims them under
/// time-bounded leases, and fetches them while respecting robots.txt and
/// per-domain rate limits.
#[derive(Parser, Debug)]
#[command(name = "leasecrawl")]
#[command(version)]
#[command(about = "A lease-based, polite web-fetch scheduler", long_about = None)]
struct Cli {
    /// Path to TOML configuration file (defaults apply if omitted)
    #[arg(short, long, global = true, value_name = "CONFIG")]
    config: Option<PathBuf>,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Add URLs to the task queue
    Enqueue(EnqueueArgs),

    /// Fetch a batch of URLs or claimed tasks
    Crawl(CrawlArgs),

    /// Reclaim expired leases and requeue stale tasks
    Maintain(MaintainArgs),
}

/// Context tags passed through to tasks
#[derive(Args, Debug, Default)]
struct TagArgs {
    #[arg(long)]
    brand: Option<String>,

    #[arg(long)]
    product: Option<String>,

    #[arg(long)]
    objective: Option<String>,
}

impl TagArgs {
    fn to_tags(&self) -> TaskTags {
        TaskTags {
            brand: self.brand.clone(),
            product: self.product.clone(),
            objective: self.objective.clone(),
        }
    }
}

#[derive(Args, Debug)]
struct EnqueueArgs {
    /// URL to enqueue (repeatable)
    #[arg(long = "url", value_name = "URL")]
    urls: Vec<String>,

    /// File with one URL per line ('#' starts a comment)
    #[arg(long)]
    urls_file: Option<PathBuf>,

    /// Create a new task even if the URL is already queued
    #[arg(long)]
    allow_duplicates: bool,

    #[command(flatten)]
    tags: TagArgs,
}

#[derive(Args, Debug)]
struct CrawlArgs {
    /// URL to crawl ad hoc (repeatable)
    #[arg(long = "url", value_name = "URL")]
    urls: Vec<String>,

    /// File with one URL per line ('#' starts a comment)
    #[arg(long)]
    urls_file: Option<PathBuf>,

    /// Claim pending tasks from the store instead of crawling given URLs
    #[arg(long, conflicts_with_all = ["urls", "urls_file"])]
    from_store: bool,

    /// Maximum tasks to claim
    #[arg(long, default_value_t = 50)]
    limit: usize,

    /// Lease length for claimed tasks (defaults to queue.running-stale-seconds)
    #[arg(long)]
    lease_seconds: Option<u64>,

    #[command(flatten)]
    tags: TagArgs,

    #[arg(long)]
    max_concurrent: Option<u32>,

    #[arg(long)]
    min_delay: Option<f64>,

    #[arg(long)]
    max_delay: Option<f64>,

    #[arg(long)]
    retries: Option<u32>,

    #[arg(long)]
    user_agent: Option<String>,
}

#[derive(Args, Debug)]
struct MaintainArgs {
    /// Maximum tasks touched per sweep
    #[arg(long, default_value_t = 200)]
    limit: usize,

    /// Reset running tasks whose lease has expired
    #[arg(long)]
    reclaim_running: bool,

    /// Requeue analyzed tasks older than this many hours (0 disables)
    #[arg(long)]
    requeue_analyzed_hours: Option<u64>,

    /// Requeue downloaded tasks older than this many hours (0 disables)
    #[arg(long)]
    requeue_downloaded_hours: Option<u64>,

    /// Requeue error tasks older than this many hours (0 disables)
    #[arg(long)]
    requeue_error_hours: Option<u64>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    let config = match &cli.config {
        Some(path) => {
            tracing::info!("Loading configuration from: {}", path.display());
            let (config, hash) = load_config_with_hash(path)
                .with_context(|| format!("failed to load {}", path.display()))?;
            tracing::info!("Configuration loaded successfully (hash: {})", hash);
            config
        }
        None => Config::default(),
    };

    match cli.command {
        Command::Enqueue(args) => handle_enqueue(&config, args),
        Command::Crawl(args) => handle_crawl(config, args).await,
        Command::Maintain(args) => handle_maintain(&config, args),
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("leasecrawl=info,warn"),
            1 => EnvFilter::new("leasecrawl=debug,info"),
            2 => EnvFilter::new("leasecrawl=trace,debug"),
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

fn open_store(config: &Config) -> anyhow::Result<Arc<SqliteTaskStore>> {
    let path = Path::new(&config.storage.database_path);
    let store = SqliteTaskStore::new(path)
        .with_context(|| format!("failed to open task store {}", path.display()))?;
    Ok(Arc::new(store))
}

/// Collects URLs from flags and an optional file, skipping blanks and comments
fn collect_urls(urls: &[String], urls_file: Option<&Path>) -> anyhow::Result<Vec<String>> {
    let mut collected: Vec<String> = urls.to_vec();

    if let Some(path) = urls_file {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        collected.extend(
            content
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty() && !line.starts_with('#'))
                .map(str::to_string),
        );
    }

    Ok(collected)
}

/// Handles the enqueue command
fn handle_enqueue(config: &Config, args: EnqueueArgs) -> anyhow::Result<()> {
    let urls = collect_urls(&args.urls, args.urls_file.as_deref())?;
    if urls.is_empty() {
        bail!("No URLs provided");
    }

    let store = open_store(config)?;
    let scheduler = TaskScheduler::new(store, Arc::new(SystemClock))
        .with_oversample(config.queue.claim_oversample);

    let touched = scheduler.enqueue(&urls, args.allow_duplicates, &args.tags.to_tags())?;
    println!("Enqueued: {}", touched);

    Ok(())
}

/// Handles the crawl command
async fn handle_crawl(base: Config, args: CrawlArgs) -> anyhow::Result<()> {
    let overrides = ConfigOverrides {
        max_concurrent: args.max_concurrent,
        min_delay: args.min_delay,
        max_delay: args.max_delay,
        retries: args.retries,
        user_agent: args.user_agent.clone(),
    };
    let config = base.with_overrides(&overrides);
    validate(&config).context("invalid configuration after overrides")?;

    let tags = args.tags.to_tags();
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let store = open_store(&config)?;

    let targets: Vec<CrawlTarget> = if args.from_store {
        let scheduler = TaskScheduler::new(store.clone(), clock.clone())
            .with_oversample(config.queue.claim_oversample);
        let lease_seconds = args
            .lease_seconds
            .unwrap_or(config.queue.running_stale_seconds);

        let reclaimed = scheduler.reclaim_expired_leases(args.limit, clock.now())?;
        if reclaimed > 0 {
            tracing::info!("Reclaimed {} expired leases", reclaimed);
        }

        let claimed = scheduler.claim(args.limit, lease_seconds)?;
        if claimed.is_empty() {
            println!("No pending tasks found");
            return Ok(());
        }
        claimed
            .iter()
            .map(|task| CrawlTarget::from_record(task).with_default_tags(&tags))
            .collect()
    } else {
        let urls = collect_urls(&args.urls, args.urls_file.as_deref())?;
        if urls.is_empty() {
            println!("No URLs provided");
            return Ok(());
        }
        urls.into_iter()
            .map(|url| CrawlTarget::from_url(url, tags.clone()))
            .collect()
    };

    tracing::info!(
        "Crawling {} targets with max concurrency {}",
        targets.len(),
        config.crawler.max_concurrent
    );

    let fetcher = HttpFetcher::new(&config.crawler)?;
    let robots = HttpRobotsSource::new(&config.robots.user_agent)?;
    let content = LocalContentStore::new(&config.storage.content_dir);
    let task_store: Arc<dyn TaskStore> = store;

    let orchestrator = CrawlOrchestrator::new(
        config,
        task_store,
        Arc::new(content),
        Arc::new(fetcher),
        Arc::new(robots),
        clock,
    );

    let results = orchestrator.run_batch(&targets).await;
    print_summary(&BatchSummary::from_results(&results));

    Ok(())
}

/// Handles the maintain command
fn handle_maintain(config: &Config, args: MaintainArgs) -> anyhow::Result<()> {
    let clock = SystemClock;
    let store = open_store(config)?;
    let scheduler = TaskScheduler::new(store, Arc::new(clock));
    let now = clock.now();

    if args.reclaim_running {
        let count = scheduler.reclaim_expired_leases(args.limit, now)?;
        println!("Reclaimed running: {}", count);
    }

    let analyzed_hours = args
        .requeue_analyzed_hours
        .unwrap_or(config.queue.requeue_analyzed_after_hours);
    if analyzed_hours > 0 {
        let cutoff = now - hours(analyzed_hours);
        let count = scheduler.requeue_stale_tasks(TaskStatus::Analyzed, cutoff, args.limit)?;
        println!("Requeued analyzed: {}", count);
    }

    let downloaded_hours = args
        .requeue_downloaded_hours
        .unwrap_or(config.queue.requeue_downloaded_after_hours);
    if downloaded_hours > 0 {
        let cutoff = now - hours(downloaded_hours);
        let count = scheduler.requeue_stale_tasks(TaskStatus::Downloaded, cutoff, args.limit)?;
        println!("Requeued downloaded: {}", count);
    }

    let error_hours = args
        .requeue_error_hours
        .unwrap_or(config.queue.requeue_error_after_hours);
    if error_hours > 0 {
        let cutoff = now - hours(error_hours);
        let count = scheduler.requeue_error_tasks(cutoff, args.limit)?;
        println!("Requeued error: {}", count);
    }

    Ok(())
}

/// Maximum accepted age threshold, about a century
const MAX_AGE_HOURS: u64 = 24 * 365 * 100;

fn hours(hours: u64) -> ChronoDuration {
    ChronoDuration::hours(hours.min(MAX_AGE_HOURS) as i64)
}
