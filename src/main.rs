//! oid-walker main entry point
//!
//! This is the command-line interface for the OID reference tree crawler.

use anyhow::Context;
use clap::Parser;
use oid_walker::config::{load_config_with_hash, validate, Config};
use oid_walker::crawler::Pipeline;
use oid_walker::output::{load_statistics, print_statistics};
use oid_walker::storage::{open_storage, SharedStorage, Storage};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

/// oid-walker: crawls the global OID reference tree into SQLite
///
/// The crawl starts at the root identifier, or resumes from the pending
/// frontier left by an interrupted run, and stores name, child counts,
/// description, and information for every node it reaches.
#[derive(Parser, Debug)]
#[command(name = "oid-walker")]
#[command(version = "1.0.0")]
#[command(about = "Crash-resumable crawler for the OID reference tree", long_about = None)]
struct Cli {
    /// Path to TOML configuration file (defaults apply when omitted)
    #[arg(value_name = "CONFIG")]
    config: Option<PathBuf>,

    /// SQLite database to write to, overriding the configuration
    #[arg(short, long, value_name = "PATH")]
    output: Option<String>,

    /// Identifier to start from when the frontier is empty
    #[arg(long, value_name = "OID")]
    root: Option<String>,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Discard the pending frontier before crawling; stored records are kept
    #[arg(long, conflicts_with_all = ["stats", "dry_run"])]
    fresh: bool,

    /// Validate config and show what would be crawled without crawling
    #[arg(long, conflicts_with = "stats")]
    dry_run: bool,

    /// Show statistics from the database and exit
    #[arg(long, conflicts_with = "dry_run")]
    stats: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    let config = resolve_config(&cli)?;

    if cli.dry_run {
        handle_dry_run(&config)?;
    } else if cli.stats {
        handle_stats(&config)?;
    } else {
        handle_crawl(config, cli.fresh).await?;
    }

    Ok(())
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("oid_walker=info,warn"),
            1 => EnvFilter::new("oid_walker=debug,info"),
            2 => EnvFilter::new("oid_walker=trace,debug"),
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

/// Loads the configuration file, if any, and applies command-line overrides
fn resolve_config(cli: &Cli) -> anyhow::Result<Config> {
    let mut config = match &cli.config {
        Some(path) => {
            tracing::info!("Loading configuration from: {}", path.display());
            let (config, hash) = load_config_with_hash(path)
                .with_context(|| format!("Failed to load configuration {}", path.display()))?;
            tracing::info!("Configuration loaded successfully (hash: {})", hash);
            config
        }
        None => {
            tracing::info!("No configuration file given, using defaults");
            Config::default()
        }
    };

    if let Some(output) = &cli.output {
        config.output.database_path = output.clone();
    }
    if let Some(root) = &cli.root {
        config.fetch.root = root.clone();
    }

    validate(&config).context("Invalid configuration after command-line overrides")?;
    Ok(config)
}

/// Handles the --dry-run mode: validates config and shows what would be crawled
fn handle_dry_run(config: &Config) -> anyhow::Result<()> {
    println!("=== oid-walker Dry Run ===\n");

    println!("Pipeline:");
    println!("  Walkers: {}", config.crawler.walkers);
    println!("  Register workers: {}", config.crawler.register_workers);
    println!("  Finalize workers: {}", config.crawler.finalize_workers);
    println!("  Channel capacity: {}", config.crawler.channel_capacity);
    println!(
        "  Idle backoff: {}ms x {} rounds",
        config.crawler.idle_backoff_ms, config.crawler.idle_rounds
    );

    println!("\nFetching:");
    println!("  Base URL: {}", config.fetch.base_url);
    println!("  Root: {}", config.fetch.root);
    println!(
        "  Attempts: {} ({}ms apart), cooldown {}s",
        config.fetch.max_attempts, config.fetch.retry_delay_ms, config.fetch.cooldown_secs
    );
    println!("  User agents: {}", config.fetch.user_agents.len());

    println!("\nOutput:");
    println!("  Database: {}", config.output.database_path);

    println!("\n✓ Configuration is valid");

    Ok(())
}

/// Handles the --stats mode: shows statistics from the database
fn handle_stats(config: &Config) -> anyhow::Result<()> {
    println!("Database: {}\n", config.output.database_path);

    let storage = open_storage(Path::new(&config.output.database_path))
        .context("Failed to open database")?;
    let stats = load_statistics(&storage)?;
    print_statistics(&stats);

    Ok(())
}

/// Handles the main crawl operation
async fn handle_crawl(config: Config, fresh: bool) -> anyhow::Result<()> {
    let mut storage = open_storage(Path::new(&config.output.database_path))
        .with_context(|| format!("Failed to open database {}", config.output.database_path))?;

    if fresh {
        tracing::info!("Starting fresh crawl (discarding pending frontier)");
        storage.clear_pending()?;
    } else {
        tracing::info!("Starting crawl (will resume if pending entries exist)");
    }

    let pipeline = Pipeline::new(&config, SharedStorage::new(storage))?;

    let shutdown = pipeline.shutdown_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, stopping crawl");
            shutdown.cancel();
        }
    });

    match pipeline.run().await {
        Ok(summary) => {
            println!(
                "{} records stored, {} without a record, {} pages fetched, {} re-queued, {} dead links",
                summary.persisted,
                summary.unresolved,
                summary.pages_fetched,
                summary.requeued,
                summary.dead_links
            );
            if !summary.completed {
                println!("Crawl interrupted; run again to resume");
            }
            Ok(())
        }
        Err(e) => {
            tracing::error!("Crawl failed: {}", e);
            Err(e.into())
        }
    }
}
