//! HTTP transport for the ClickHouse HTTP interface.
//!
//! Provides the `HttpTransport` struct that implements the `QueryTransport`
//! trait by POSTing SQL to a host's HTTP endpoint using reqwest.

use crate::db::{QueryFormat, QueryTransport, Row, TransportRequest, TransportResponse};
use crate::error::{LookoutError, Result};
use crate::hosts::HostConfig;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Default timeout for query requests.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Header carrying the server-assigned query id.
const QUERY_ID_HEADER: &str = "x-clickhouse-query-id";

/// Header carrying the JSON progress summary.
const SUMMARY_HEADER: &str = "x-clickhouse-summary";

/// HTTP query transport.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    timeout_secs: u64,
}

impl HttpTransport {
    /// Creates a transport with the default timeout.
    pub fn new() -> Result<Self> {
        Self::with_timeout(DEFAULT_TIMEOUT_SECS)
    }

    /// Creates a transport with the given request timeout.
    pub fn with_timeout(timeout_secs: u64) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| LookoutError::internal(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            timeout_secs,
        })
    }

    /// Builds the URL query arguments: bound params and server settings.
    fn query_args(request: &TransportRequest) -> Vec<(String, String)> {
        let params = request
            .params
            .iter()
            .map(|(name, value)| (format!("param_{name}"), value_to_arg(value)));
        let settings = request
            .settings
            .iter()
            .map(|(name, value)| (name.clone(), value_to_arg(value)));
        params.chain(settings).collect()
    }

    /// Maps a reqwest failure to an error whose text classifies as a network failure.
    fn map_request_error(&self, error: reqwest::Error, host: &HostConfig) -> LookoutError {
        if error.is_timeout() {
            LookoutError::connection(format!(
                "Connection timeout after {}ms to {}",
                self.timeout_secs * 1000,
                host.address
            ))
        } else if error.is_connect() {
            LookoutError::connection(format!("Connect failed to {}: {error}", host.address))
        } else {
            LookoutError::connection(format!("Network error talking to {}: {error}", host.address))
        }
    }

    /// Maps a non-success HTTP status and body to an error.
    fn map_status_error(status: StatusCode, body: &str) -> LookoutError {
        let message = body.trim();
        let message = if message.is_empty() {
            status.to_string()
        } else {
            message.to_string()
        };

        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => LookoutError::permission(message),
            StatusCode::BAD_GATEWAY
            | StatusCode::SERVICE_UNAVAILABLE
            | StatusCode::GATEWAY_TIMEOUT => LookoutError::connection(message),
            _ => LookoutError::query(message),
        }
    }
}

#[async_trait]
impl QueryTransport for HttpTransport {
    async fn query(
        &self,
        host: &HostConfig,
        request: &TransportRequest,
    ) -> Result<TransportResponse> {
        let start = Instant::now();
        let body = with_format_clause(&request.sql, request.format);

        debug!(host = %host.address, format = %request.format, "Sending query");

        let response = self
            .client
            .post(format!("{}/", host.address))
            .basic_auth(&host.credentials.user, Some(&host.credentials.password))
            .query(&Self::query_args(request))
            .body(body)
            .send()
            .await
            .map_err(|e| self.map_request_error(e, host))?;

        let status = response.status();
        let query_id = header_str(&response, QUERY_ID_HEADER).unwrap_or_default();
        let server_elapsed_ms = header_str(&response, SUMMARY_HEADER)
            .as_deref()
            .and_then(elapsed_ms_from_summary);

        let text = response
            .text()
            .await
            .map_err(|e| self.map_request_error(e, host))?;

        if !status.is_success() {
            warn!(host = %host.address, %status, "Query failed");
            return Err(Self::map_status_error(status, &text));
        }

        let rows = parse_body(&text, request.format)?;
        let duration_ms =
            server_elapsed_ms.unwrap_or_else(|| start.elapsed().as_millis() as u64);

        Ok(TransportResponse {
            query_id,
            row_count: rows.len(),
            rows,
            duration_ms,
            raw_bytes_length: text.len(),
        })
    }
}

fn header_str(response: &reqwest::Response, name: &str) -> Option<String> {
    response
        .headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(String::from)
}

/// Appends a `FORMAT` clause, dropping any trailing semicolons first.
fn with_format_clause(sql: &str, format: QueryFormat) -> String {
    let trimmed = sql.trim_end().trim_end_matches(';').trim_end();
    format!("{trimmed}\nFORMAT {}", format.as_str())
}

/// Renders a parameter or setting value as a URL argument.
fn value_to_arg(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[derive(Debug, Deserialize)]
struct Summary {
    elapsed_ns: Option<String>,
}

fn elapsed_ms_from_summary(raw: &str) -> Option<u64> {
    let summary: Summary = serde_json::from_str(raw).ok()?;
    let nanos: u64 = summary.elapsed_ns?.parse().ok()?;
    Some(nanos / 1_000_000)
}

#[derive(Debug, Deserialize)]
struct JsonBody {
    #[serde(default)]
    data: Vec<Row>,
}

#[derive(Debug, Deserialize)]
struct CompactColumn {
    name: String,
}

#[derive(Debug, Deserialize)]
struct JsonCompactBody {
    #[serde(default)]
    meta: Vec<CompactColumn>,
    #[serde(default)]
    data: Vec<Vec<serde_json::Value>>,
}

/// Decodes a response body into rows according to the requested format.
fn parse_body(text: &str, format: QueryFormat) -> Result<Vec<Row>> {
    let malformed =
        |e: serde_json::Error| LookoutError::query(format!("Unreadable {format} response: {e}"));

    match format {
        QueryFormat::JsonEachRow => text
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| serde_json::from_str::<Row>(line).map_err(malformed))
            .collect(),
        QueryFormat::Json => {
            if text.trim().is_empty() {
                return Ok(Vec::new());
            }
            let body: JsonBody = serde_json::from_str(text).map_err(malformed)?;
            Ok(body.data)
        }
        QueryFormat::JsonCompact => {
            if text.trim().is_empty() {
                return Ok(Vec::new());
            }
            let body: JsonCompactBody = serde_json::from_str(text).map_err(malformed)?;
            Ok(body
                .data
                .into_iter()
                .map(|values| {
                    body.meta
                        .iter()
                        .map(|c| c.name.clone())
                        .zip(values)
                        .collect::<Row>()
                })
                .collect())
        }
        QueryFormat::Csv | QueryFormat::TabSeparated => {
            if text.is_empty() {
                return Ok(Vec::new());
            }
            let mut row = Row::new();
            row.insert("raw".to_string(), serde_json::Value::String(text.to_string()));
            Ok(vec![row])
        }
    }
}
