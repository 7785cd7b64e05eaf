//! Metascrape main entry point
//!
//! This is the command-line interface for the Metascrape metadata harvester.

use clap::Parser;
use metascrape::config::{load_config_with_hash, Config};
use metascrape::crawler::{plan, run_pipeline};
use metascrape::input::read_urls;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Metascrape: a resumable page metadata harvester
///
/// Metascrape reads a list of page URLs, fetches each page (falling back to a
/// headless browser when plain HTTP fails), extracts its metadata and
/// accumulates the results in a CSV file. Rerunning picks up where the last
/// run stopped and retries URLs that came back empty.
#[derive(Parser, Debug)]
#[command(name = "metascrape")]
#[command(version = "1.0.0")]
#[command(about = "A resumable page metadata harvester", long_about = None)]
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

    /// Validate config and show what would be fetched without fetching
    #[arg(long, conflicts_with = "stats")]
    dry_run: bool,

    /// Show statistics from the output file and exit
    #[arg(long, conflicts_with = "dry_run")]
    stats: bool,

    /// Skip the retry pass over URLs without metadata
    #[arg(long)]
    no_retry_pass: bool,

    /// Only read the first N rows of the input file
    #[arg(long, value_name = "N")]
    limit: Option<usize>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    // Load and validate configuration
    tracing::info!("Loading configuration from: {}", cli.config.display());
    let mut config = match load_config_with_hash(&cli.config) {
        Ok((cfg, hash)) => {
            tracing::info!("Configuration loaded successfully (hash: {})", hash);
            cfg
        }
        Err(e) => {
            tracing::error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    if cli.no_retry_pass {
        config.pipeline.retry_pass = false;
    }
    if cli.limit.is_some() {
        config.input.limit = cli.limit;
    }

    // Handle different modes
    if cli.dry_run {
        handle_dry_run(&config)?;
    } else if cli.stats {
        handle_stats(&config)?;
    } else {
        handle_run(config).await?;
    }

    Ok(())
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("metascrape=info,warn"),
            1 => EnvFilter::new("metascrape=debug,info"),
            2 => EnvFilter::new("metascrape=trace,debug"),
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

/// Handles the --dry-run mode: validates config and shows what would be fetched
fn handle_dry_run(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    println!("=== Metascrape Dry Run ===\n");

    println!("Pipeline:");
    println!("  Batch size: {}", config.pipeline.batch_size);
    println!("  Concurrency: {}", config.pipeline.concurrency);
    println!(
        "  Pacing: {}-{}ms between batches",
        config.pipeline.pacing_min_ms, config.pipeline.pacing_max_ms
    );
    println!("  Retry pass: {}", config.pipeline.retry_pass);

    println!("\nFetch:");
    println!("  Max attempts: {}", config.fetch.max_attempts);
    println!("  Timeout: {}s", config.fetch.timeout_secs);
    println!("  Backoff base: {}ms", config.fetch.backoff_base_ms);
    println!("  User agent: {}", config.fetch.user_agent);

    println!("\nBrowser fallback:");
    if config.browser.enabled {
        println!("  Timeout: {}s", config.browser.timeout_secs);
        println!(
            "  Max concurrent renders: {}",
            config.browser.max_concurrent_renders
        );
        if let Some(bin) = &config.browser.chrome_binary {
            println!("  Chrome binary: {}", bin.display());
        }
    } else {
        println!("  Disabled");
    }

    println!("\nFiles:");
    println!("  Input: {}", config.input.path.display());
    println!("  Output: {}", config.output.path.display());
    println!("  Retry output: {}", config.output.retry_path.display());
    println!("  Failure log: {}", config.output.failure_log.display());

    let urls = read_urls(&config.input)?;
    let plan = plan(&config.output, &urls)?;

    println!("\n✓ Configuration is valid");
    println!(
        "✓ {} input URLs, {} rows already stored",
        plan.input_urls, plan.stored_rows
    );
    println!("✓ Would fetch {} URLs", plan.work_set.len());
    if config.pipeline.retry_pass {
        println!(
            "✓ {} stored URLs without metadata would be retried",
            plan.failed.len()
        );
    }

    Ok(())
}

/// Handles the --stats mode: shows statistics from the output file
fn handle_stats(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    use metascrape::output::{load_statistics, print_statistics};
    use metascrape::storage::CsvStore;

    println!("Output: {}\n", config.output.path.display());

    let store = CsvStore::new(&config.output.path);
    let stats = load_statistics(&store)?;

    print_statistics(&stats);

    Ok(())
}

/// Handles the main run
async fn handle_run(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    tracing::info!(
        "Batch size {}, concurrency {}, browser fallback {}",
        config.pipeline.batch_size,
        config.pipeline.concurrency,
        if config.browser.enabled { "on" } else { "off" }
    );

    match run_pipeline(config).await {
        Ok(summary) => {
            println!("Input URLs: {}", summary.input_urls);
            println!("Rows with metadata: {}", summary.with_metadata);
            println!("Rows with no metadata: {}", summary.without_metadata());
            println!("Remaining: {}", summary.remaining);
            Ok(())
        }
        Err(e) => {
            tracing::error!("Run failed: {}", e);
            Err(e.into())
        }
    }
}
