//! Price source trait and structured error types.
//!
//! The PriceSource trait abstracts over EOD data vendors so the pipeline can
//! swap implementations and script them for tests. A fetch never aborts the
//! run: every batch comes back as a BatchOutcome whose status says whether
//! the rows inside are the whole story.

use crate::series::PricePoint;
use chrono::NaiveDate;
use thiserror::Error;

/// Structured error types for remote HTTP sources.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("network error: {0}")]
    Network(String),

    #[error("HTTP {code}: {detail}")]
    Status { code: u16, detail: String },

    #[error("unexpected response shape: {0}")]
    Decode(String),
}

/// How a batch fetch ended.
#[derive(Debug)]
pub enum BatchStatus {
    /// Every available page was consumed.
    Complete,
    /// Some pages came back before the failure; the rows kept are valid but
    /// the batch may be missing its tail.
    Partial(SourceError),
    /// The first page already failed. No rows were kept.
    Failed(SourceError),
}

impl BatchStatus {
    pub fn is_complete(&self) -> bool {
        matches!(self, BatchStatus::Complete)
    }

    pub fn error(&self) -> Option<&SourceError> {
        match self {
            BatchStatus::Complete => None,
            BatchStatus::Partial(err) | BatchStatus::Failed(err) => Some(err),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            BatchStatus::Complete => "complete",
            BatchStatus::Partial(_) => "partial",
            BatchStatus::Failed(_) => "failed",
        }
    }
}

/// Rows fetched for one symbol batch, plus how the fetch ended.
#[derive(Debug)]
pub struct BatchOutcome {
    /// The symbols this batch asked for.
    pub symbols: Vec<String>,
    /// Rows kept, including rows from pages that arrived before a failure.
    pub points: Vec<PricePoint>,
    pub status: BatchStatus,
}

/// Trait for EOD price sources.
///
/// Implementations own pagination and transport details. `fetch_eod` is
/// infallible by signature: failures are folded into the outcome status so
/// one bad batch never takes down the batches running beside it.
pub trait PriceSource: Send + Sync {
    /// Human-readable name of this source.
    fn name(&self) -> &str;

    /// Fetch daily closes for a batch of symbols from `from` onward.
    fn fetch_eod(&self, symbols: &[String], from: NaiveDate) -> BatchOutcome;
}

/// First ~200 chars of an error response body, safe to embed in a message.
pub(crate) fn body_excerpt(body: &str) -> String {
    const MAX_CHARS: usize = 200;
    let trimmed = body.trim();
    if trimmed.chars().count() <= MAX_CHARS {
        return trimmed.to_string();
    }
    let head: String = trimmed.chars().take(MAX_CHARS).collect();
    format!("{head}...")
}
