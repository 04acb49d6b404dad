//! Dune Analytics client.
//!
//! Two jobs: read the latest result rows of a saved query to learn which
//! symbols to track, and upload the reconciled series as a CSV table. Both
//! endpoints authenticate with the `X-DUNE-API-KEY` header.

use crate::publish::TableSink;
use crate::resolver::SymbolSource;
use crate::source::{body_excerpt, SourceError};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info};

pub const DEFAULT_BASE_URL: &str = "https://api.dune.com/api/v1";

const API_KEY_HEADER: &str = "X-DUNE-API-KEY";

/// Dune query results envelope. Rows stay as raw JSON objects; only the
/// `symbol` column is read.
#[derive(Debug, Deserialize)]
struct ResultsResponse {
    result: Option<ResultsBody>,
}

#[derive(Debug, Deserialize)]
struct ResultsBody {
    #[serde(default)]
    rows: Vec<serde_json::Value>,
}

/// Dune API client. Clone is cheap: the inner reqwest client is pooled.
#[derive(Debug, Clone)]
pub struct DuneClient {
    client: reqwest::blocking::Client,
    base_url: String,
    api_key: String,
}

impl DuneClient {
    pub fn new(api_key: impl Into<String>, timeout: Duration) -> Self {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .expect("failed to build HTTP client");

        Self {
            client,
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: api_key.into(),
        }
    }

    /// Point the client at a different host (test servers).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn check(resp: reqwest::blocking::Response) -> Result<reqwest::blocking::Response, SourceError> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let detail = body_excerpt(&resp.text().unwrap_or_default());
        Err(SourceError::Status {
            code: status.as_u16(),
            detail,
        })
    }
}

impl SymbolSource for DuneClient {
    /// Read the `symbol` column from a query's latest result rows.
    fn tracked_symbols(&self, query_id: u64) -> Result<Vec<String>, SourceError> {
        let url = format!("{}/query/{query_id}/results", self.base_url);
        let resp = self
            .client
            .get(&url)
            .header(API_KEY_HEADER, &self.api_key)
            .send()
            .map_err(|e| SourceError::Network(e.to_string()))?;
        let resp = Self::check(resp)?;

        let body: ResultsResponse = resp
            .json()
            .map_err(|e| SourceError::Decode(format!("query results: {e}")))?;

        let rows = body.result.map(|r| r.rows).unwrap_or_default();
        let mut symbols = Vec::with_capacity(rows.len());
        for row in rows {
            let symbol = row
                .get("symbol")
                .and_then(|v| v.as_str())
                .ok_or_else(|| SourceError::Decode("query row has no string `symbol` field".into()))?;
            symbols.push(symbol.to_string());
        }
        debug!(query_id, count = symbols.len(), "fetched tracked symbols");
        Ok(symbols)
    }
}

impl TableSink for DuneClient {
    /// Upload a CSV payload, replacing the named table.
    fn upload(&self, table_name: &str, description: &str, csv_data: &str) -> Result<(), SourceError> {
        let url = format!("{}/table/upload/csv", self.base_url);
        let payload = serde_json::json!({
            "table_name": table_name,
            "description": description,
            "data": csv_data,
        });

        let resp = self
            .client
            .post(&url)
            .header(API_KEY_HEADER, &self.api_key)
            .json(&payload)
            .send()
            .map_err(|e| SourceError::Network(e.to_string()))?;
        Self::check(resp)?;

        info!(table = table_name, "table upload accepted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    fn client_for(server: &mockito::ServerGuard) -> DuneClient {
        DuneClient::new("dune-key", Duration::from_secs(5)).with_base_url(server.url())
    }

    #[test]
    fn reads_symbol_column_from_query_results() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("GET", "/query/42/results")
            .match_header("x-dune-api-key", "dune-key")
            .with_status(200)
            .with_body(
                r#"{"result":{"rows":[
                    {"symbol":"EXOD","weight":1},
                    {"symbol":"PLTR","weight":2}
                ]}}"#,
            )
            .create();

        let symbols = client_for(&server).tracked_symbols(42).unwrap();

        mock.assert();
        assert_eq!(symbols, vec!["EXOD".to_string(), "PLTR".to_string()]);
    }

    #[test]
    fn missing_symbol_column_is_a_decode_error() {
        let mut server = mockito::Server::new();
        server
            .mock("GET", "/query/42/results")
            .with_status(200)
            .with_body(r#"{"result":{"rows":[{"ticker":"EXOD"}]}}"#)
            .create();

        let err = client_for(&server).tracked_symbols(42).unwrap_err();
        assert!(matches!(err, SourceError::Decode(_)));
    }

    #[test]
    fn empty_result_yields_no_symbols() {
        let mut server = mockito::Server::new();
        server
            .mock("GET", "/query/42/results")
            .with_status(200)
            .with_body(r#"{"result":null}"#)
            .create();

        let symbols = client_for(&server).tracked_symbols(42).unwrap();
        assert!(symbols.is_empty());
    }

    #[test]
    fn upload_sends_the_expected_payload() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("POST", "/table/upload/csv")
            .match_header("x-dune-api-key", "dune-key")
            .match_body(Matcher::Json(serde_json::json!({
                "table_name": "stock_prices",
                "description": "Daily stock prices",
                "data": "date,symbol,close\n2024-01-02,VOO,420.0\n",
            })))
            .with_status(200)
            .with_body(r#"{"success":true}"#)
            .create();

        client_for(&server)
            .upload(
                "stock_prices",
                "Daily stock prices",
                "date,symbol,close\n2024-01-02,VOO,420.0\n",
            )
            .unwrap();

        mock.assert();
    }

    #[test]
    fn upload_rejection_carries_status_and_body() {
        let mut server = mockito::Server::new();
        server
            .mock("POST", "/table/upload/csv")
            .with_status(403)
            .with_body(r#"{"error":"table quota exceeded"}"#)
            .create();

        let err = client_for(&server)
            .upload("stock_prices", "Daily stock prices", "date,symbol,close\n")
            .unwrap_err();

        match err {
            SourceError::Status { code, detail } => {
                assert_eq!(code, 403);
                assert!(detail.contains("quota"));
            }
            other => panic!("expected status error, got {other:?}"),
        }
    }
}
