//! Run configuration.
//!
//! Settings come from a TOML file; credentials come from the environment
//! only, so a config file is always safe to commit. Every knob except
//! `query_id` has a default, and `Settings::from_toml("query_id = 1")` is a
//! valid minimal config.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Structured error types for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config {path}: {reason}")]
    Read { path: String, reason: String },

    #[error("invalid config: {0}")]
    Parse(String),

    #[error("environment variable {0} is not set")]
    MissingSecret(&'static str),
}

/// Tunable pipeline settings, loaded from TOML.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Saved query whose latest result rows carry the tracked symbols.
    pub query_id: u64,

    /// Symbols tracked in addition to the remote feed.
    #[serde(default)]
    pub manual_symbols: Vec<String>,

    /// First date fetched when the cache is empty.
    #[serde(default = "default_start_date")]
    pub start_date: NaiveDate,

    /// Local CSV cache location.
    #[serde(default = "default_cache_path")]
    pub cache_path: PathBuf,

    /// Destination table.
    #[serde(default = "default_table_name")]
    pub table_name: String,

    #[serde(default = "default_table_description")]
    pub table_description: String,

    /// When set, every published row is duplicated under
    /// `<symbol><suffix>`. Off by default.
    #[serde(default)]
    pub symbol_variant: Option<String>,

    /// Rows per fetched page.
    #[serde(default = "default_page_limit")]
    pub page_limit: usize,

    /// Symbols per fetch request.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Worker threads fetching batches.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Per-request HTTP timeout.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_start_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2022, 1, 1).unwrap()
}

fn default_cache_path() -> PathBuf {
    PathBuf::from("data/eod_cache.csv")
}

fn default_table_name() -> String {
    "stock_prices".to_string()
}

fn default_table_description() -> String {
    "Daily stock prices".to_string()
}

fn default_page_limit() -> usize {
    100
}

fn default_batch_size() -> usize {
    10
}

fn default_concurrency() -> usize {
    4
}

fn default_request_timeout_secs() -> u64 {
    30
}

impl Settings {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Commented starter config written by `eodsync init`.
pub const SAMPLE_CONFIG: &str = r#"# eodsync configuration.
# Credentials are never stored here: set MARKETSTACK_API_KEY and
# DUNE_API_KEY in the environment or in a .env file.

# Saved Dune query whose latest result rows carry a `symbol` column.
# Its output is unioned with manual_symbols below.
query_id = 0

# Symbols tracked in addition to the query results.
manual_symbols = ["EXOD", "PLTR", "VOO", "HOOD"]

# First date fetched when the local cache is empty (quoted ISO date).
start_date = "2022-01-01"

# Local price cache, written atomically on each sync.
cache_path = "data/eod_cache.csv"

# Destination table on Dune.
table_name = "stock_prices"
table_description = "Daily stock prices"

# Publish every row a second time under `<symbol><suffix>`.
# Delete this line to publish each symbol once.
symbol_variant = ".d"

# Fetch tuning: rows per page, symbols per request, worker threads,
# per-request HTTP timeout.
page_limit = 100
batch_size = 10
concurrency = 4
request_timeout_secs = 30
"#;

/// API credentials, read from the environment.
#[derive(Debug, Clone)]
pub struct Secrets {
    pub marketstack_api_key: String,
    pub dune_api_key: String,
}

impl Secrets {
    pub const MARKETSTACK_VAR: &'static str = "MARKETSTACK_API_KEY";
    pub const DUNE_VAR: &'static str = "DUNE_API_KEY";

    /// Read both credentials from the environment. Fails before any network
    /// activity if either is absent; an empty or blank value counts as absent.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as `from_env` with an injectable lookup, so tests never touch
    /// process-global state.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let read = |name: &'static str| match lookup(name) {
            Some(value) if !value.trim().is_empty() => Ok(value),
            _ => Err(ConfigError::MissingSecret(name)),
        };
        Ok(Self {
            marketstack_api_key: read(Self::MARKETSTACK_VAR)?,
            dune_api_key: read(Self::DUNE_VAR)?,
        })
    }
}
