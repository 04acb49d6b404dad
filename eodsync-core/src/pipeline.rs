//! Sync pipeline orchestration.
//!
//! One run: resolve the symbol set, work out the fetch window from the
//! cache, fetch new rows batch by batch on a bounded worker pool, merge
//! them into the cache, then publish the forward-filled view. The cache is
//! written before the upload is attempted, so a publish failure never
//! loses fetched data.

use crate::cache::{CacheError, CacheStore};
use crate::config::Settings;
use crate::publish::{self, PublishError, TableSink};
use crate::reconcile;
use crate::resolver::{self, SymbolSource};
use crate::series::PriceSeries;
use crate::source::{BatchOutcome, BatchStatus, PriceSource, SourceError};
use chrono::{Duration, NaiveDate};
use rayon::prelude::*;
use thiserror::Error;
use tracing::{info, warn};

/// Errors that abort a run. Batch fetch failures are not here: they are
/// carried in the report instead.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("symbol resolution failed: {0}")]
    Resolve(#[source] SourceError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Encode(#[from] PublishError),

    #[error("publish failed: {0}")]
    Publish(#[source] SourceError),

    #[error("worker pool setup failed: {0}")]
    Pool(String),
}

/// Per-run inputs that are not configuration.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// The date the series is filled through, normally today in UTC.
    pub today: NaiveDate,
    /// Fetch and reconcile, but write neither the cache nor the table.
    pub dry_run: bool,
}

/// How one symbol batch fared.
#[derive(Debug)]
pub struct BatchReport {
    pub symbols: Vec<String>,
    pub rows: usize,
    pub status: BatchStatus,
}

/// What a run did, for logging and the CLI summary.
#[derive(Debug)]
pub struct RunReport {
    /// The resolved symbol set, sorted.
    pub symbols: Vec<String>,
    /// First date the fetcher asked for.
    pub fetch_from: NaiveDate,
    pub batches: Vec<BatchReport>,
    /// Rows fetched across all batches, before deduplication.
    pub fetched_rows: usize,
    /// Fetched rows that were new to the cache.
    pub new_rows: usize,
    /// Cache size after the merge.
    pub cache_rows: usize,
    pub cache_written: bool,
    /// Rows in the publish payload (after variants).
    pub published_rows: usize,
    pub published: bool,
}

impl RunReport {
    pub fn all_batches_complete(&self) -> bool {
        self.batches.iter().all(|batch| batch.status.is_complete())
    }
}

/// First date worth fetching: one day past the newest cached observation,
/// or the configured start date on a cold cache.
pub fn next_fetch_date(series: &PriceSeries, configured_start: NaiveDate) -> NaiveDate {
    series
        .max_date()
        .map_or(configured_start, |date| date + Duration::days(1))
}

/// Execute one sync run.
pub fn run(
    settings: &Settings,
    opts: &RunOptions,
    store: &dyn CacheStore,
    source: &dyn PriceSource,
    feed: &dyn SymbolSource,
    sink: &dyn TableSink,
) -> Result<RunReport, RunError> {
    let symbols = resolver::resolve(feed, settings.query_id, &settings.manual_symbols)
        .map_err(RunError::Resolve)?;
    info!(count = symbols.len(), "resolved symbol set");

    let mut series = store.load()?;
    let fetch_from = next_fetch_date(&series, settings.start_date);
    info!(%fetch_from, cached_rows = series.len(), "fetch window determined");

    let batches = chunk_symbols(&symbols, settings.batch_size);
    let outcomes = fetch_batches(source, &batches, fetch_from, settings.concurrency)?;

    let mut reports = Vec::with_capacity(outcomes.len());
    let mut fetched_rows = 0;
    let mut new_rows = 0;
    for outcome in outcomes {
        let BatchOutcome {
            symbols: batch_symbols,
            points,
            status,
        } = outcome;
        match &status {
            BatchStatus::Complete => {}
            BatchStatus::Partial(err) => {
                warn!(batch = ?batch_symbols, error = %err, "batch fetch incomplete; kept partial rows")
            }
            BatchStatus::Failed(err) => {
                warn!(batch = ?batch_symbols, error = %err, "batch fetch failed; no rows kept")
            }
        }
        let rows = points.len();
        fetched_rows += rows;
        new_rows += series.extend(points);
        reports.push(BatchReport {
            symbols: batch_symbols,
            rows,
            status,
        });
    }

    let mut cache_written = false;
    if fetched_rows > 0 && !opts.dry_run {
        store.save(&series)?;
        cache_written = true;
        info!(rows = series.len(), new = new_rows, "cache written");
    } else if fetched_rows == 0 {
        info!("no new rows fetched; cache left untouched");
    }

    let reconciled = reconcile::reconcile(&series, &symbols, opts.today);
    let payload = match settings.symbol_variant.as_deref() {
        Some(suffix) if !suffix.is_empty() => publish::with_symbol_variants(&reconciled, suffix),
        _ => reconciled,
    };

    let mut published = false;
    if payload.is_empty() {
        warn!("reconciled series is empty; skipping publish");
    } else if opts.dry_run {
        info!(rows = payload.len(), "dry run; skipping publish");
    } else {
        let csv_data = publish::encode_csv(&payload)?;
        sink.upload(&settings.table_name, &settings.table_description, &csv_data)
            .map_err(RunError::Publish)?;
        published = true;
        info!(
            rows = payload.len(),
            table = %settings.table_name,
            "published reconciled series"
        );
    }

    Ok(RunReport {
        symbols,
        fetch_from,
        batches: reports,
        fetched_rows,
        new_rows,
        cache_rows: series.len(),
        cache_written,
        published_rows: payload.len(),
        published,
    })
}

/// Split the sorted symbol set into fetch batches.
fn chunk_symbols(symbols: &[String], batch_size: usize) -> Vec<Vec<String>> {
    symbols
        .chunks(batch_size.max(1))
        .map(|chunk| chunk.to_vec())
        .collect()
}

/// Fetch all batches on a pool of `concurrency` workers. Outcomes come back
/// in batch order regardless of which worker finished first.
fn fetch_batches(
    source: &dyn PriceSource,
    batches: &[Vec<String>],
    from: NaiveDate,
    concurrency: usize,
) -> Result<Vec<BatchOutcome>, RunError> {
    if batches.is_empty() {
        return Ok(Vec::new());
    }

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(concurrency.max(1))
        .build()
        .map_err(|e| RunError::Pool(e.to_string()))?;

    Ok(pool.install(|| {
        batches
            .par_iter()
            .map(|batch| source.fetch_eod(batch, from))
            .collect()
    }))
}
