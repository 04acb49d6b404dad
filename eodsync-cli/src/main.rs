//! eodsync CLI — sync, inspect, and bootstrap commands.
//!
//! Commands:
//! - `sync` — resolve symbols, fetch new EOD rows, reconcile, write the
//!   cache, and upload the CSV table
//! - `status` — report per-symbol cache coverage
//! - `symbols` — resolve and print the tracked symbol set
//! - `init` — write a commented starter config

use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use eodsync_core::cache::{CacheStore, CsvStore};
use eodsync_core::config::{Secrets, Settings, SAMPLE_CONFIG};
use eodsync_core::dune::DuneClient;
use eodsync_core::marketstack::MarketStackClient;
use eodsync_core::pipeline::{run, RunOptions, RunReport};
use eodsync_core::resolver;
use std::path::{Path, PathBuf};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Parser)]
#[command(
    name = "eodsync",
    about = "eodsync — incremental EOD price sync from MarketStack to Dune",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level when RUST_LOG is not set (trace, debug, info, warn, error).
    #[arg(long, default_value = "info", global = true)]
    log_level: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch new rows, reconcile, write the cache, and upload the table.
    Sync {
        /// Path to the TOML config file.
        #[arg(long, default_value = "eodsync.toml")]
        config: PathBuf,

        /// Fetch and reconcile, but write neither the cache nor the table.
        #[arg(long, default_value_t = false)]
        dry_run: bool,
    },
    /// Report per-symbol cache coverage.
    Status {
        /// Path to the TOML config file.
        #[arg(long, default_value = "eodsync.toml")]
        config: PathBuf,
    },
    /// Resolve and print the tracked symbol set.
    Symbols {
        /// Path to the TOML config file.
        #[arg(long, default_value = "eodsync.toml")]
        config: PathBuf,
    },
    /// Write a commented starter config.
    Init {
        /// Where to write it.
        #[arg(long, default_value = "eodsync.toml")]
        path: PathBuf,

        /// Overwrite an existing file.
        #[arg(long, default_value_t = false)]
        force: bool,
    },
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("eodsync_core={0},eodsync_cli={0}", cli.log_level).into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    match cli.command {
        Commands::Sync { config, dry_run } => run_sync(&config, dry_run),
        Commands::Status { config } => run_status(&config),
        Commands::Symbols { config } => run_symbols(&config),
        Commands::Init { path, force } => run_init(&path, force),
    }
}

fn load_settings(path: &Path) -> Result<Settings> {
    Settings::from_file(path).context("config load failed (`eodsync init` writes a starter file)")
}

fn run_sync(config: &Path, dry_run: bool) -> Result<()> {
    let settings = load_settings(config)?;
    let secrets = Secrets::from_env()?;

    let timeout = settings.request_timeout();
    let source = MarketStackClient::new(&secrets.marketstack_api_key, settings.page_limit, timeout);
    let dune = DuneClient::new(&secrets.dune_api_key, timeout);
    let store = CsvStore::new(&settings.cache_path);

    let opts = RunOptions {
        today: Utc::now().date_naive(),
        dry_run,
    };

    let report = run(&settings, &opts, &store, &source, &dune, &dune)?;
    print_report(&report, &settings, dry_run);
    Ok(())
}

fn run_status(config: &Path) -> Result<()> {
    let settings = load_settings(config)?;
    let store = CsvStore::new(&settings.cache_path);
    let series = store.load()?;

    if series.is_empty() {
        println!("Cache is empty: {}", settings.cache_path.display());
        return Ok(());
    }

    println!("Cache: {}", settings.cache_path.display());
    println!("Rows: {}", series.len());
    println!();
    println!("{:<8} {:<12} {:<12} {:>8}", "Symbol", "First", "Last", "Rows");
    println!("{}", "-".repeat(44));
    for symbol in series.symbols() {
        let first = series.first_date(&symbol);
        let last = series.last_date(&symbol);
        let rows = series.symbol_points(&symbol).count();
        println!(
            "{:<8} {:<12} {:<12} {:>8}",
            symbol,
            first.map(|d| d.to_string()).unwrap_or_default(),
            last.map(|d| d.to_string()).unwrap_or_default(),
            rows
        );
    }

    Ok(())
}

fn run_symbols(config: &Path) -> Result<()> {
    let settings = load_settings(config)?;
    let secrets = Secrets::from_env()?;
    let dune = DuneClient::new(&secrets.dune_api_key, settings.request_timeout());

    let symbols = resolver::resolve(&dune, settings.query_id, &settings.manual_symbols)?;

    println!("Tracking {} symbol(s):", symbols.len());
    for symbol in &symbols {
        println!("  {symbol}");
    }
    Ok(())
}

fn run_init(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        bail!("{} already exists; pass --force to overwrite", path.display());
    }

    std::fs::write(path, SAMPLE_CONFIG)
        .with_context(|| format!("cannot write {}", path.display()))?;

    println!("Wrote starter config to {}", path.display());
    println!("Set MARKETSTACK_API_KEY and DUNE_API_KEY, then run `eodsync sync`.");
    Ok(())
}

fn print_report(report: &RunReport, settings: &Settings, dry_run: bool) {
    let complete = report
        .batches
        .iter()
        .filter(|batch| batch.status.is_complete())
        .count();

    println!();
    println!("=== Sync Report ===");
    println!("Symbols:        {}", report.symbols.len());
    println!("Fetch window:   {} onward", report.fetch_from);
    println!(
        "Batches:        {} ({} complete, {} degraded)",
        report.batches.len(),
        complete,
        report.batches.len() - complete
    );
    println!(
        "Fetched rows:   {} ({} new)",
        report.fetched_rows, report.new_rows
    );
    println!(
        "Cache:          {} ({} rows, {})",
        settings.cache_path.display(),
        report.cache_rows,
        if report.cache_written { "written" } else { "unchanged" }
    );
    if report.published {
        println!(
            "Published:      {} rows to table \"{}\"",
            report.published_rows, settings.table_name
        );
    } else if dry_run {
        println!(
            "Published:      skipped (dry run, {} rows prepared)",
            report.published_rows
        );
    } else {
        println!("Published:      skipped (nothing to publish)");
    }

    for batch in &report.batches {
        if let Some(err) = batch.status.error() {
            println!(
                "WARNING: batch [{}] {}: {err}",
                batch.symbols.join(", "),
                batch.status.label()
            );
        }
    }
    println!();
}
