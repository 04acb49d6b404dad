//! Publish-side encoding.
//!
//! The reconciled series goes out as one CSV payload (`date,symbol,close`).
//! The optional symbol-variant step duplicates every row under a suffixed
//! symbol name so a second naming scheme can live in the same table.

use crate::series::PricePoint;
use crate::source::SourceError;
use thiserror::Error;

/// Structured error types for payload encoding.
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("CSV encoding failed: {0}")]
    Encode(String),
}

/// Trait for table destinations.
pub trait TableSink: Send + Sync {
    /// Upload a CSV payload, replacing the named table.
    fn upload(&self, table_name: &str, description: &str, csv_data: &str)
        -> Result<(), SourceError>;
}

/// Encode rows as a CSV string with a `date,symbol,close` header.
pub fn encode_csv(points: &[PricePoint]) -> Result<String, PublishError> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::new());

    // Header written by hand so an empty series still encodes to a valid file
    writer
        .write_record(["date", "symbol", "close"])
        .map_err(|e| PublishError::Encode(e.to_string()))?;
    for point in points {
        writer
            .serialize(point)
            .map_err(|e| PublishError::Encode(e.to_string()))?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| PublishError::Encode(e.to_string()))?;
    String::from_utf8(bytes).map_err(|e| PublishError::Encode(e.to_string()))
}

/// Append a copy of every row under `<symbol><suffix>`. Originals keep their
/// position; variants follow in the same order.
pub fn with_symbol_variants(points: &[PricePoint], suffix: &str) -> Vec<PricePoint> {
    let mut out = Vec::with_capacity(points.len() * 2);
    out.extend_from_slice(points);
    out.extend(points.iter().map(|point| PricePoint {
        date: point.date,
        symbol: format!("{}{}", point.symbol, suffix),
        close: point.close,
    }));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn p(symbol: &str, date: &str, close: f64) -> PricePoint {
        PricePoint {
            date: NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap(),
            symbol: symbol.into(),
            close,
        }
    }

    #[test]
    fn encodes_header_and_rows() {
        let csv = encode_csv(&[
            p("VOO", "2025-06-01", 420.0),
            p("VOO", "2025-06-02", 421.5),
        ])
        .unwrap();

        assert_eq!(
            csv,
            "date,symbol,close\n2025-06-01,VOO,420.0\n2025-06-02,VOO,421.5\n"
        );
    }

    #[test]
    fn empty_input_still_has_a_header() {
        assert_eq!(encode_csv(&[]).unwrap(), "date,symbol,close\n");
    }

    #[test]
    fn symbols_with_commas_are_quoted() {
        let csv = encode_csv(&[p("BRK,B", "2025-06-01", 500.0)]).unwrap();
        assert_eq!(csv, "date,symbol,close\n2025-06-01,\"BRK,B\",500.0\n");
    }

    #[test]
    fn variants_double_the_rows_in_order() {
        let base = [p("VOO", "2025-06-01", 420.0), p("PLTR", "2025-06-01", 17.0)];
        let doubled = with_symbol_variants(&base, ".d");

        assert_eq!(doubled.len(), 4);
        assert_eq!(doubled[0].symbol, "VOO");
        assert_eq!(doubled[2].symbol, "VOO.d");
        assert_eq!(doubled[3].symbol, "PLTR.d");
        assert_eq!(doubled[2].close, 420.0);
        assert_eq!(doubled[2].date, doubled[0].date);
    }

    #[test]
    fn empty_variants_stay_empty() {
        assert!(with_symbol_variants(&[], ".d").is_empty());
    }
}
