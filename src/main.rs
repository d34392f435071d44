//! Jobcrawl main entry point
//!
//! This is the command-line interface for the Jobcrawl listing crawler.

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};
use jobcrawl::config::{load_config_with_hash, Config};
use jobcrawl::crawler::Coordinator;
use jobcrawl::output::{print_progress, print_request_list};
use jobcrawl::storage::BackfillScope;
use jobcrawl::{FilterSpec, QueryBuilder};
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use tracing_subscriber::EnvFilter;

/// Jobcrawl: a resumable crawler for job listing APIs
///
/// Jobcrawl walks every result page of a search, stores each listing once,
/// and backfills listing details. Interrupted crawls pick up where they
/// stopped.
#[derive(Parser, Debug)]
#[command(name = "jobcrawl")]
#[command(version)]
#[command(about = "A resumable crawler for job listing APIs", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose", global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Submit a new search and crawl it
    Start(StartArgs),

    /// Continue an interrupted crawl request
    Resume {
        /// Crawl request ID
        id: i64,
    },

    /// Fetch detail pages of already ingested jobs
    Backfill {
        /// Crawl request ID
        #[arg(required_unless_present = "all", conflicts_with = "all")]
        id: Option<i64>,

        /// Backfill jobs of every crawl request
        #[arg(long)]
        all: bool,

        /// Which jobs to select: pending, non-success or all
        #[arg(long, default_value = "pending", value_parser = parse_scope)]
        scope: BackfillScope,

        /// Maximum number of jobs to fetch
        #[arg(long)]
        limit: Option<u32>,
    },

    /// Show the progress of a crawl request
    Status {
        /// Crawl request ID
        id: i64,
    },

    /// List all crawl requests
    List,
}

#[derive(Args, Debug)]
struct StartArgs {
    /// Free-text search term
    #[arg(long)]
    term: Option<String>,

    /// Location filter
    #[arg(long)]
    location: Option<String>,

    /// Only listings published within the last N days
    #[arg(long)]
    days: Option<u32>,

    /// Work-load range in percent, e.g. 60-100
    #[arg(long, value_parser = parse_workload)]
    workload: Option<(u8, u8)>,

    /// Position type (repeatable)
    #[arg(long = "position")]
    positions: Vec<String>,

    /// Language skill (repeatable)
    #[arg(long = "language")]
    languages: Vec<String>,

    /// Employment type (repeatable)
    #[arg(long = "employment")]
    employment_types: Vec<String>,

    /// Company type (repeatable)
    #[arg(long = "company")]
    company_types: Vec<String>,

    /// Print the search URLs without crawling
    #[arg(long)]
    dry_run: bool,
}

impl StartArgs {
    fn to_filter(&self) -> FilterSpec {
        FilterSpec {
            term: self.term.clone(),
            location: self.location.clone(),
            days: self.days,
            workload: self.workload,
            position_types: self.positions.clone(),
            languages: self.languages.clone(),
            employment_types: self.employment_types.clone(),
            company_types: self.company_types.clone(),
            page: 1,
        }
    }
}

fn parse_scope(s: &str) -> Result<BackfillScope, String> {
    BackfillScope::from_name(s)
        .ok_or_else(|| format!("unknown scope '{}' (expected pending, non-success or all)", s))
}

fn parse_workload(s: &str) -> Result<(u8, u8), String> {
    let (min, max) = s
        .split_once('-')
        .ok_or_else(|| format!("expected MIN-MAX, got '{}'", s))?;
    let min: u8 = min.trim().parse().map_err(|e| format!("invalid minimum: {}", e))?;
    let max: u8 = max.trim().parse().map_err(|e| format!("invalid maximum: {}", e))?;

    if min > max || max > 100 {
        return Err(format!("workload range must satisfy MIN <= MAX <= 100, got '{}'", s));
    }
    Ok((min, max))
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

    match cli.command {
        Command::Start(args) if args.dry_run => handle_dry_run(&config, &args.to_filter()),
        Command::Start(args) => handle_start(config, &args.to_filter()).await,
        Command::Resume { id } => handle_resume(config, id).await,
        Command::Backfill {
            id,
            all,
            scope,
            limit,
        } => handle_backfill(config, id, all, scope, limit).await,
        Command::Status { id } => handle_status(config, id),
        Command::List => handle_list(config),
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("jobcrawl=info,warn"),
            1 => EnvFilter::new("jobcrawl=debug,info"),
            2 => EnvFilter::new("jobcrawl=trace,debug"),
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

/// Builds a coordinator whose stop flag is raised by Ctrl-C
fn open_coordinator(config: Config) -> anyhow::Result<Coordinator> {
    let coordinator = Coordinator::open(config).context("Failed to set up the crawler")?;

    let stop = coordinator.stop_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received; finishing in-flight work before stopping");
            stop.store(true, Ordering::Relaxed);
        }
    });

    Ok(coordinator)
}

/// Handles `start --dry-run`: shows the URLs a search would use
fn handle_dry_run(config: &Config, filter: &FilterSpec) -> anyhow::Result<()> {
    let urls = QueryBuilder::new(config.site.api_url.clone(), config.site.browser_url.clone())
        .build(filter);

    println!("=== Jobcrawl Dry Run ===\n");
    println!("Site: {}", config.crawler.site);
    println!("API URL:     {}", urls.url_api);
    println!("Browser URL: {}", urls.url_browser);
    println!("\nDatabase: {}", config.output.database_path);
    println!(
        "Workers: {} page, {} backfill",
        config.crawler.page_workers, config.crawler.backfill_workers
    );

    Ok(())
}

async fn handle_start(config: Config, filter: &FilterSpec) -> anyhow::Result<()> {
    let coordinator = open_coordinator(config)?;

    let request_id = coordinator
        .start(filter)
        .await
        .context("Crawl aborted")?;

    print_progress(&coordinator.status(request_id)?);
    Ok(())
}

async fn handle_resume(config: Config, id: i64) -> anyhow::Result<()> {
    let coordinator = open_coordinator(config)?;

    let state = coordinator.resume(id).await.context("Resume aborted")?;
    tracing::info!("Request {} is now {}", id, state);

    print_progress(&coordinator.status(id)?);
    Ok(())
}

async fn handle_backfill(
    config: Config,
    id: Option<i64>,
    all: bool,
    scope: BackfillScope,
    limit: Option<u32>,
) -> anyhow::Result<()> {
    let coordinator = open_coordinator(config)?;

    let summary = match (id, all) {
        (_, true) => coordinator.backfill_all(scope, limit).await?,
        (Some(id), false) => coordinator.backfill(id, scope, limit).await?,
        (None, false) => bail!("either a request ID or --all is required"),
    };

    println!(
        "Backfill: {} selected, {} fetched, {} rejected, {} pending",
        summary.selected, summary.backfilled, summary.rejected, summary.pending
    );

    if let (Some(id), false) = (id, all) {
        print_progress(&coordinator.status(id)?);
    }
    Ok(())
}

fn handle_status(config: Config, id: i64) -> anyhow::Result<()> {
    let coordinator = Coordinator::open(config)?;
    print_progress(&coordinator.status(id)?);
    Ok(())
}

fn handle_list(config: Config) -> anyhow::Result<()> {
    let coordinator = Coordinator::open(config)?;
    let requests = coordinator.store().list_requests()?;
    print_request_list(&requests);
    Ok(())
}
