//! Gap-free reconciliation.
//!
//! Markets close on weekends and holidays, and a fetch can end partway, so
//! cached observations have date gaps. Reconciliation turns them into the
//! published view: for each symbol, one row per calendar day from its first
//! observation through `today`, carrying the latest known close forward
//! across missing days. Days before a symbol's first observation are never
//! invented.

use crate::series::{PricePoint, PriceSeries};
use chrono::{Duration, NaiveDate};

/// Build the publishable series: every listed symbol forward-filled from its
/// first observation through `today`, grouped in list order with dates
/// ascending within each symbol.
///
/// Symbols with no observations yet are skipped, as are observations dated
/// after `today`. Running the output back through `reconcile` reproduces it
/// unchanged.
pub fn reconcile(series: &PriceSeries, symbols: &[String], today: NaiveDate) -> Vec<PricePoint> {
    let mut out = Vec::new();
    for symbol in symbols {
        fill_symbol(series, symbol, today, &mut out);
    }
    out
}

/// Single pass over one symbol: walk observations and the calendar together,
/// so the cost is O(days + observations) rather than a lookup per day.
fn fill_symbol(series: &PriceSeries, symbol: &str, today: NaiveDate, out: &mut Vec<PricePoint>) {
    let mut observed = series.symbol_points(symbol).peekable();
    let Some(&(first, first_close)) = observed.peek() else {
        return;
    };
    if first > today {
        return;
    }

    let mut last_close = first_close;
    let mut day = first;
    while day <= today {
        while let Some(&(date, close)) = observed.peek() {
            if date > day {
                break;
            }
            last_close = close;
            observed.next();
        }
        out.push(PricePoint {
            date: day,
            symbol: symbol.to_string(),
            close: last_close,
        });
        day += Duration::days(1);
    }
}
