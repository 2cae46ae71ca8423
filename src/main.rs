//! Archive-Harvester main entry point
//!
//! This is the command-line interface for the Archive-Harvester crawler.

use anyhow::Context;
use archive_harvester::config::{load_config_with_hash, Config};
use archive_harvester::crawler::{run_crawl, CrawlReport};
use archive_harvester::output::{export_csv, load_statistics, print_statistics};
use archive_harvester::storage::{open_sink, Sink};
use clap::Parser;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// Archive-Harvester: a resumable, rate-governed archive crawler
///
/// Walks every (date, category, page) of a paginated archive between two
/// local calendar dates, extracts records from the linked item pages and
/// stores them in SQLite. Interrupted runs resume from the last checkpoint.
#[derive(Parser, Debug)]
#[command(name = "archive-harvester")]
#[command(version)]
#[command(about = "A resumable, rate-governed archive crawler", long_about = None)]
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

    /// Discard the checkpoint and start from the first target
    #[arg(long, conflicts_with_all = ["dry_run", "stats", "export"])]
    fresh: bool,

    /// Validate config and show what would be crawled without actually crawling
    #[arg(long, conflicts_with = "stats")]
    dry_run: bool,

    /// Show statistics from the database and exit
    #[arg(long, conflicts_with = "dry_run")]
    stats: bool,

    /// Export stored records to a CSV file and exit
    #[arg(long, value_name = "PATH", conflicts_with_all = ["dry_run", "stats"])]
    export: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("Failed to load configuration {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", config_hash);

    if cli.dry_run {
        handle_dry_run(&config)
    } else if cli.stats {
        handle_stats(&config)
    } else if let Some(path) = &cli.export {
        handle_export(&config, path)
    } else {
        handle_crawl(&config, &config_hash, cli.fresh).await
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("archive_harvester=info,warn"),
            1 => EnvFilter::new("archive_harvester=debug,info"),
            2 => EnvFilter::new("archive_harvester=trace,debug"),
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
fn handle_dry_run(config: &Config) -> anyhow::Result<()> {
    let space = config.query_space()?;

    println!("=== Archive-Harvester Dry Run ===\n");

    println!("Query Space:");
    println!("  Dates: {} .. {}", space.start(), space.end());
    println!("  Categories ({}):", config.categories.len());
    for category in &config.categories {
        match &category.name {
            Some(name) => println!("    - {} ({})", category.id, name),
            None => println!("    - {}", category.id),
        }
    }
    println!("  Max pages per target: {}", config.crawl.max_pages_per_target);
    println!("  Targets: {}", space.len_hint());

    println!("\nArchive:");
    println!("  URL template: {}", config.archive.url_template);
    println!("  Fields: {}", config.fields.len());
    println!("  Date field: {} ({:?})", config.date.field, config.date.format);

    println!("\nGovernor:");
    println!("  Max in flight: {}", config.governor.max_in_flight);
    println!(
        "  Delay: {}ms .. {}ms",
        config.governor.min_delay_ms, config.governor.max_delay_ms
    );
    println!("  Max retries: {}", config.governor.max_retries);

    println!("\nOutput:");
    println!("  Database: {}", config.output.database_path.display());

    let resume_point = if config.output.database_path.exists() {
        open_sink(&config.output.database_path)?
            .read_checkpoint()?
            .and_then(|checkpoint| checkpoint.last_completed_target)
    } else {
        None
    };

    println!("\n✓ Configuration is valid");
    match resume_point {
        Some(target) => println!(
            "✓ Would resume after {} ({} of {} targets remaining)",
            target,
            space.resume_after(&target).count(),
            space.len_hint()
        ),
        None => println!("✓ Would start from the first of {} targets", space.len_hint()),
    }

    Ok(())
}

/// Handles the --stats mode: shows statistics from the database
fn handle_stats(config: &Config) -> anyhow::Result<()> {
    println!("Database: {}\n", config.output.database_path.display());

    let sink = open_sink(&config.output.database_path)
        .context("Failed to open database")?;
    let stats = load_statistics(&sink)?;
    print_statistics(&stats);

    Ok(())
}

/// Handles the --export mode: writes every stored record to a CSV file
fn handle_export(config: &Config, path: &Path) -> anyhow::Result<()> {
    let sink = open_sink(&config.output.database_path).context("Failed to open database")?;
    let fields: Vec<String> = config.fields.iter().map(|field| field.name.clone()).collect();

    let written = export_csv(&sink, &fields, path)
        .with_context(|| format!("Failed to export records to {}", path.display()))?;
    println!("Exported {} records to {}", written, path.display());

    Ok(())
}

/// Handles the main crawl operation
async fn handle_crawl(config: &Config, config_hash: &str, fresh: bool) -> anyhow::Result<()> {
    let cancel = CancellationToken::new();

    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Interrupt received, finishing in-flight work");
                cancel.cancel();
            }
        });
    }

    match run_crawl(config, config_hash, fresh, cancel).await {
        Ok(report) => {
            print_report(&report);
            Ok(())
        }
        Err(e) => {
            tracing::error!("Crawl failed: {}", e);
            Err(e.into())
        }
    }
}

fn print_report(report: &CrawlReport) {
    println!("\n=== Crawl Report ===\n");
    println!(
        "Status: {}",
        if report.cancelled { "interrupted" } else { "completed" }
    );
    println!(
        "Targets: {} exhausted, {} failed, {} cancelled",
        report.targets_exhausted, report.targets_failed, report.targets_cancelled
    );
    println!(
        "Records: {} accepted, {} written",
        report.records_accepted, report.records_flushed
    );
    for (reason, count) in &report.skipped {
        println!("Skipped ({}): {}", reason, count);
    }
    if let Some(target) = &report.checkpoint {
        println!("Checkpoint: after {}", target);
    }
    println!(
        "Requests: {} ({} retries, {} transient, {} permanent failures), final delay {:?}",
        report.governor.requests,
        report.governor.retries,
        report.governor.transient_failures,
        report.governor.permanent_failures,
        report.governor.current_delay
    );
    println!("Elapsed: {:?}", report.elapsed);
}
