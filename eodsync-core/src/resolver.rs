//! Tracked symbol resolution.
//!
//! The symbol set for a run is the union of a remote feed (the `symbol`
//! column of a saved query's latest results) and a manual list from config.
//! Resolution happens before any price fetch; if the feed is down the run
//! stops here rather than publishing a partial universe.

use crate::source::SourceError;
use std::collections::BTreeSet;

/// Trait for remote symbol feeds.
pub trait SymbolSource: Send + Sync {
    /// Symbols currently tracked by the saved query.
    fn tracked_symbols(&self, query_id: u64) -> Result<Vec<String>, SourceError>;
}

/// Resolve the symbol set for a run: remote feed ∪ manual list, trimmed,
/// deduplicated, sorted ascending. Blank entries are dropped.
pub fn resolve(
    feed: &dyn SymbolSource,
    query_id: u64,
    manual: &[String],
) -> Result<Vec<String>, SourceError> {
    let remote = feed.tracked_symbols(query_id)?;

    let mut set = BTreeSet::new();
    for symbol in remote.iter().chain(manual.iter()) {
        let trimmed = symbol.trim();
        if !trimmed.is_empty() {
            set.insert(trimmed.to_string());
        }
    }
    Ok(set.into_iter().collect())
}
