//! Local price cache.
//!
//! The cache is a single CSV file (`date,symbol,close`) holding every
//! observation fetched so far. Design points:
//! - Observed closes only: forward-filled rows are a publish-time view and
//!   never land on disk
//! - Atomic writes (write to .tmp, rename into place)
//! - A missing file is an empty cache, not an error
//!
//! The CacheStore trait keeps the pipeline storage-agnostic; MemoryStore
//! backs tests and could back a future non-file deployment.

use crate::series::{PricePoint, PriceSeries};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use thiserror::Error;
use tracing::debug;

/// Structured error types for cache storage.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache read failed: {0}")]
    Read(String),

    #[error("cache write failed: {0}")]
    Write(String),

    #[error("malformed cache row: {0}")]
    Parse(String),
}

/// Trait for cache storage backends.
pub trait CacheStore: Send + Sync {
    /// Load the full cached series. An absent backing file is an empty series.
    fn load(&self) -> Result<PriceSeries, CacheError>;

    /// Replace the stored series with `series`.
    fn save(&self, series: &PriceSeries) -> Result<(), CacheError>;
}

/// CSV-file cache store.
pub struct CsvStore {
    path: PathBuf,
}

impl CsvStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CacheStore for CsvStore {
    fn load(&self) -> Result<PriceSeries, CacheError> {
        if !self.path.exists() {
            debug!(path = %self.path.display(), "no cache file; starting empty");
            return Ok(PriceSeries::new());
        }

        let file = fs::File::open(&self.path).map_err(|e| CacheError::Read(e.to_string()))?;
        let mut reader = csv::Reader::from_reader(file);
        let mut series = PriceSeries::new();
        for row in reader.deserialize::<PricePoint>() {
            let point = row.map_err(|e| CacheError::Parse(e.to_string()))?;
            series.insert(point);
        }
        Ok(series)
    }

    /// Writes are atomic: write to .tmp then rename.
    fn save(&self, series: &PriceSeries) -> Result<(), CacheError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| CacheError::Write(e.to_string()))?;
            }
        }

        let tmp_path = self.path.with_extension("csv.tmp");
        {
            let file = fs::File::create(&tmp_path).map_err(|e| CacheError::Write(e.to_string()))?;
            let mut writer = csv::Writer::from_writer(file);
            for point in series.points() {
                writer
                    .serialize(&point)
                    .map_err(|e| CacheError::Write(e.to_string()))?;
            }
            writer.flush().map_err(|e| CacheError::Write(e.to_string()))?;
        }

        // Atomic rename
        fs::rename(&tmp_path, &self.path).map_err(|e| {
            // Clean up temp file on rename failure
            let _ = fs::remove_file(&tmp_path);
            CacheError::Write(format!("atomic rename failed: {e}"))
        })
    }
}

/// In-memory cache store. Counts saves so tests can assert write behavior.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<PriceSeries>,
    saves: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_series(series: PriceSeries) -> Self {
        Self {
            inner: Mutex::new(series),
            saves: AtomicUsize::new(0),
        }
    }

    /// Copy of the currently stored series.
    pub fn snapshot(&self) -> PriceSeries {
        self.inner.lock().expect("memory store poisoned").clone()
    }

    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }
}

impl CacheStore for MemoryStore {
    fn load(&self) -> Result<PriceSeries, CacheError> {
        Ok(self.snapshot())
    }

    fn save(&self, series: &PriceSeries) -> Result<(), CacheError> {
        *self.inner.lock().expect("memory store poisoned") = series.clone();
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
