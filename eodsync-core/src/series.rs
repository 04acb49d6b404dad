//! Price series domain types.
//!
//! A PriceSeries is the canonical in-memory form of the cache: one close per
//! (symbol, date) pair, ordered by symbol then date. Both the fetcher and the
//! reconciler speak PricePoint, so merging fetched rows into cached history
//! is a plain extend.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One end-of-day closing price observation.
///
/// Field order matters: CSV encoding derives its header and column order
/// from this struct (`date,symbol,close`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub date: NaiveDate,
    pub symbol: String,
    pub close: f64,
}

/// Deduplicated close prices keyed by (symbol, date).
///
/// The BTreeMap keeps each symbol's observations contiguous and date-sorted,
/// so per-symbol scans are a single `range` walk.
#[derive(Debug, Clone, Default)]
pub struct PriceSeries {
    points: BTreeMap<(String, NaiveDate), f64>,
}

impl PriceSeries {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_points(points: impl IntoIterator<Item = PricePoint>) -> Self {
        let mut series = Self::new();
        series.extend(points);
        series
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Insert one observation. A later insert for the same (symbol, date)
    /// replaces the earlier close. Returns true if the pair was new.
    pub fn insert(&mut self, point: PricePoint) -> bool {
        self.points
            .insert((point.symbol, point.date), point.close)
            .is_none()
    }

    /// Merge a batch of observations. Returns how many (symbol, date) pairs
    /// were not already present.
    pub fn extend(&mut self, points: impl IntoIterator<Item = PricePoint>) -> usize {
        points
            .into_iter()
            .map(|point| self.insert(point))
            .filter(|new| *new)
            .count()
    }

    pub fn get(&self, symbol: &str, date: NaiveDate) -> Option<f64> {
        self.points.get(&(symbol.to_string(), date)).copied()
    }

    /// Newest observation date across all symbols.
    pub fn max_date(&self) -> Option<NaiveDate> {
        self.points.keys().map(|(_, date)| *date).max()
    }

    /// Distinct symbols, sorted ascending.
    pub fn symbols(&self) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for (symbol, _) in self.points.keys() {
            if out.last().map_or(true, |last| last != symbol) {
                out.push(symbol.clone());
            }
        }
        out
    }

    /// One symbol's observations in date order.
    pub fn symbol_points(
        &self,
        symbol: &str,
    ) -> impl DoubleEndedIterator<Item = (NaiveDate, f64)> + '_ {
        let start = (symbol.to_string(), NaiveDate::MIN);
        let end = (symbol.to_string(), NaiveDate::MAX);
        self.points
            .range(start..=end)
            .map(|((_, date), close)| (*date, *close))
    }

    pub fn first_date(&self, symbol: &str) -> Option<NaiveDate> {
        self.symbol_points(symbol).next().map(|(date, _)| date)
    }

    pub fn last_date(&self, symbol: &str) -> Option<NaiveDate> {
        self.symbol_points(symbol).next_back().map(|(date, _)| date)
    }

    /// All observations, ordered by symbol then date.
    pub fn points(&self) -> impl Iterator<Item = PricePoint> + '_ {
        self.points.iter().map(|((symbol, date), close)| PricePoint {
            date: *date,
            symbol: symbol.clone(),
            close: *close,
        })
    }
}
