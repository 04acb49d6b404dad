//! MarketStack EOD price source.
//!
//! Fetches daily closes from the `/eod` endpoint of the MarketStack v2 API.
//! One request covers a whole symbol batch (comma-joined) and the response
//! arrives in limit/offset pages. A mid-stream page failure ends the batch
//! but keeps every row already received, so the pipeline can still cache
//! and publish what arrived.

use crate::series::PricePoint;
use crate::source::{body_excerpt, BatchOutcome, BatchStatus, PriceSource, SourceError};
use chrono::{DateTime, NaiveDate};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

pub const DEFAULT_BASE_URL: &str = "https://api.marketstack.com/v2";

/// MarketStack `/eod` response page.
#[derive(Debug, Deserialize)]
struct EodResponse {
    pagination: Option<Pagination>,
    #[serde(default)]
    data: Vec<EodRow>,
}

#[derive(Debug, Deserialize)]
struct Pagination {
    #[serde(default)]
    offset: usize,
    #[serde(default)]
    count: usize,
    #[serde(default)]
    total: usize,
}

/// One row of the `data` array. Dates arrive as timestamps like
/// `2024-01-02T00:00:00+0000`; `close` is null for some halted listings.
#[derive(Debug, Deserialize)]
struct EodRow {
    date: String,
    symbol: String,
    close: Option<f64>,
}

/// MarketStack EOD client.
pub struct MarketStackClient {
    client: reqwest::blocking::Client,
    base_url: String,
    access_key: String,
    page_limit: usize,
}

impl MarketStackClient {
    pub fn new(access_key: impl Into<String>, page_limit: usize, timeout: Duration) -> Self {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .expect("failed to build HTTP client");

        Self {
            client,
            base_url: DEFAULT_BASE_URL.to_string(),
            access_key: access_key.into(),
            page_limit: page_limit.max(1),
        }
    }

    /// Point the client at a different host (test servers).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Fetch one page of the batch stream.
    fn eod_page(&self, symbols: &str, from: NaiveDate, offset: usize) -> Result<EodResponse, SourceError> {
        let url = format!("{}/eod", self.base_url);
        let resp = self
            .client
            .get(&url)
            .query(&[
                ("access_key", self.access_key.clone()),
                ("symbols", symbols.to_string()),
                ("date_from", from.to_string()),
                ("limit", self.page_limit.to_string()),
                ("offset", offset.to_string()),
            ])
            .send()
            .map_err(|e| SourceError::Network(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let detail = body_excerpt(&resp.text().unwrap_or_default());
            return Err(SourceError::Status {
                code: status.as_u16(),
                detail,
            });
        }

        resp.json::<EodResponse>()
            .map_err(|e| SourceError::Decode(format!("eod page: {e}")))
    }
}

impl PriceSource for MarketStackClient {
    fn name(&self) -> &str {
        "marketstack"
    }

    fn fetch_eod(&self, symbols: &[String], from: NaiveDate) -> BatchOutcome {
        let joined = symbols.join(",");
        let mut points: Vec<PricePoint> = Vec::new();
        let mut offset = 0usize;

        let status = loop {
            let page = match self.eod_page(&joined, from, offset) {
                Ok(page) => page,
                Err(err) => {
                    warn!(batch = %joined, offset, error = %err, "page fetch failed; ending batch stream");
                    break if points.is_empty() && offset == 0 {
                        BatchStatus::Failed(err)
                    } else {
                        BatchStatus::Partial(err)
                    };
                }
            };

            if page.data.is_empty() {
                break BatchStatus::Complete;
            }

            let mut bad_row: Option<SourceError> = None;
            for row in page.data {
                let date = match parse_eod_date(&row.date) {
                    Ok(date) => date,
                    Err(err) => {
                        bad_row = Some(err);
                        break;
                    }
                };
                match row.close {
                    Some(close) => points.push(PricePoint {
                        date,
                        symbol: row.symbol,
                        close,
                    }),
                    None => {
                        debug!(symbol = %row.symbol, date = %row.date, "skipping row with null close");
                    }
                }
            }
            if let Some(err) = bad_row {
                warn!(batch = %joined, offset, error = %err, "malformed row; ending batch stream");
                break if points.is_empty() && offset == 0 {
                    BatchStatus::Failed(err)
                } else {
                    BatchStatus::Partial(err)
                };
            }

            offset += self.page_limit;

            // The pagination block tells us when the stream is exhausted;
            // without one we keep going until an empty page.
            if let Some(p) = &page.pagination {
                if p.offset + p.count >= p.total {
                    break BatchStatus::Complete;
                }
            }
        };

        BatchOutcome {
            symbols: symbols.to_vec(),
            points,
            status,
        }
    }
}

/// Parse a MarketStack date, which is either a zoned timestamp
/// (`2024-01-02T00:00:00+0000`) or a plain ISO date.
fn parse_eod_date(raw: &str) -> Result<NaiveDate, SourceError> {
    if let Ok(dt) = DateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%z") {
        return Ok(dt.date_naive());
    }
    NaiveDate::parse_from_str(raw.get(..10).unwrap_or(raw), "%Y-%m-%d")
        .map_err(|_| SourceError::Decode(format!("unparseable date: {raw}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    fn client_for(server: &mockito::ServerGuard, page_limit: usize) -> MarketStackClient {
        MarketStackClient::new("test-key", page_limit, Duration::from_secs(5))
            .with_base_url(server.url())
    }

    fn from_date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
    }

    fn symbols(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn page_mock(server: &mut mockito::ServerGuard, offset: usize, body: &str) -> mockito::Mock {
        server
            .mock("GET", "/eod")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("access_key".into(), "test-key".into()),
                Matcher::UrlEncoded("symbols".into(), "VOO".into()),
                Matcher::UrlEncoded("date_from".into(), "2024-01-01".into()),
                Matcher::UrlEncoded("offset".into(), offset.to_string()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(body)
            .create()
    }

    #[test]
    fn paginates_until_total_is_reached() {
        let mut server = mockito::Server::new();
        let first = page_mock(
            &mut server,
            0,
            r#"{"pagination":{"limit":2,"offset":0,"count":2,"total":3},"data":[
                {"date":"2024-01-02T00:00:00+0000","symbol":"VOO","close":420.0},
                {"date":"2024-01-03T00:00:00+0000","symbol":"VOO","close":421.5}
            ]}"#,
        );
        let second = page_mock(
            &mut server,
            2,
            r#"{"pagination":{"limit":2,"offset":2,"count":1,"total":3},"data":[
                {"date":"2024-01-04T00:00:00+0000","symbol":"VOO","close":423.0}
            ]}"#,
        );

        let outcome = client_for(&server, 2).fetch_eod(&symbols(&["VOO"]), from_date());

        first.assert();
        second.assert();
        assert!(outcome.status.is_complete());
        assert_eq!(outcome.points.len(), 3);
        assert_eq!(outcome.points[2].close, 423.0);
        assert_eq!(
            outcome.points[0].date,
            NaiveDate::from_ymd_opt(2024, 1, 2).unwrap()
        );
    }

    #[test]
    fn empty_first_page_completes_with_no_rows() {
        let mut server = mockito::Server::new();
        let only = page_mock(
            &mut server,
            0,
            r#"{"pagination":{"limit":2,"offset":0,"count":0,"total":0},"data":[]}"#,
        );

        let outcome = client_for(&server, 2).fetch_eod(&symbols(&["VOO"]), from_date());

        only.assert();
        assert!(outcome.status.is_complete());
        assert!(outcome.points.is_empty());
    }

    #[test]
    fn failure_after_first_page_keeps_earlier_rows() {
        let mut server = mockito::Server::new();
        page_mock(
            &mut server,
            0,
            r#"{"pagination":{"limit":1,"offset":0,"count":1,"total":3},"data":[
                {"date":"2024-01-02T00:00:00+0000","symbol":"VOO","close":420.0}
            ]}"#,
        );
        server
            .mock("GET", "/eod")
            .match_query(Matcher::UrlEncoded("offset".into(), "1".into()))
            .with_status(502)
            .with_body("bad gateway")
            .create();

        let outcome = client_for(&server, 1).fetch_eod(&symbols(&["VOO"]), from_date());

        assert_eq!(outcome.points.len(), 1);
        match outcome.status {
            BatchStatus::Partial(SourceError::Status { code, .. }) => assert_eq!(code, 502),
            other => panic!("expected partial outcome, got {other:?}"),
        }
    }

    #[test]
    fn failed_first_page_keeps_nothing() {
        let mut server = mockito::Server::new();
        server
            .mock("GET", "/eod")
            .match_query(Matcher::UrlEncoded("offset".into(), "0".into()))
            .with_status(401)
            .with_body(r#"{"error":{"code":"invalid_access_key"}}"#)
            .create();

        let outcome = client_for(&server, 2).fetch_eod(&symbols(&["VOO"]), from_date());

        assert!(outcome.points.is_empty());
        match outcome.status {
            BatchStatus::Failed(SourceError::Status { code, detail }) => {
                assert_eq!(code, 401);
                assert!(detail.contains("invalid_access_key"));
            }
            other => panic!("expected failed outcome, got {other:?}"),
        }
    }

    #[test]
    fn null_close_rows_are_skipped() {
        let mut server = mockito::Server::new();
        page_mock(
            &mut server,
            0,
            r#"{"pagination":{"limit":3,"offset":0,"count":3,"total":3},"data":[
                {"date":"2024-01-02T00:00:00+0000","symbol":"VOO","close":420.0},
                {"date":"2024-01-03T00:00:00+0000","symbol":"VOO","close":null},
                {"date":"2024-01-04T00:00:00+0000","symbol":"VOO","close":423.0}
            ]}"#,
        );

        let outcome = client_for(&server, 3).fetch_eod(&symbols(&["VOO"]), from_date());

        assert!(outcome.status.is_complete());
        assert_eq!(outcome.points.len(), 2);
        assert_eq!(outcome.points[1].close, 423.0);
    }

    #[test]
    fn batch_symbols_are_comma_joined() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("GET", "/eod")
            .match_query(Matcher::UrlEncoded(
                "symbols".into(),
                "PLTR,VOO".into(),
            ))
            .with_status(200)
            .with_body(r#"{"pagination":{"limit":2,"offset":0,"count":0,"total":0},"data":[]}"#)
            .create();

        let outcome = client_for(&server, 2).fetch_eod(&symbols(&["PLTR", "VOO"]), from_date());

        mock.assert();
        assert!(outcome.status.is_complete());
        assert_eq!(outcome.symbols, symbols(&["PLTR", "VOO"]));
    }

    #[test]
    fn parses_both_date_shapes() {
        assert_eq!(
            parse_eod_date("2024-01-02T00:00:00+0000").unwrap(),
            NaiveDate::from_ymd_opt(2024, 1, 2).unwrap()
        );
        assert_eq!(
            parse_eod_date("2024-01-02").unwrap(),
            NaiveDate::from_ymd_opt(2024, 1, 2).unwrap()
        );
        assert!(parse_eod_date("not a date").is_err());
    }
}
