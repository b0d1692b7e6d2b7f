//! Transport request and response types for db-lookout.
//!
//! Defines the shapes exchanged with a database server's query interface.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Comment prepended to every outbound query so server logs can be correlated.
pub const TRACE_COMMENT: &str = "/* db-lookout */";

/// Prefixes SQL with the trace comment.
pub fn tag_sql(sql: &str) -> String {
    format!("{TRACE_COMMENT}\n{sql}")
}

/// A single result record, keyed by column name.
pub type Row = serde_json::Map<String, serde_json::Value>;

/// Named query parameters bound server-side.
pub type QueryParams = BTreeMap<String, serde_json::Value>;

/// Per-query server settings.
pub type QuerySettings = BTreeMap<String, serde_json::Value>;

/// Output format requested from the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum QueryFormat {
    /// One JSON object per line.
    #[default]
    #[serde(rename = "JSONEachRow")]
    JsonEachRow,
    /// Single JSON document with `meta`, `data` and statistics.
    #[serde(rename = "JSON")]
    Json,
    /// Like `JSON` but rows are arrays ordered by `meta`.
    #[serde(rename = "JSONCompact")]
    JsonCompact,
    /// Comma-separated values.
    #[serde(rename = "CSV")]
    Csv,
    /// Tab-separated values.
    #[serde(rename = "TabSeparated")]
    TabSeparated,
}

impl QueryFormat {
    /// Returns the format name as the server spells it.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::JsonEachRow => "JSONEachRow",
            Self::Json => "JSON",
            Self::JsonCompact => "JSONCompact",
            Self::Csv => "CSV",
            Self::TabSeparated => "TabSeparated",
        }
    }

    /// Parses a format name (case-insensitive).
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "jsoneachrow" => Some(Self::JsonEachRow),
            "json" => Some(Self::Json),
            "jsoncompact" => Some(Self::JsonCompact),
            "csv" => Some(Self::Csv),
            "tabseparated" | "tsv" => Some(Self::TabSeparated),
            _ => None,
        }
    }

    /// Returns true if the response body is structured JSON.
    pub fn is_json(&self) -> bool {
        matches!(self, Self::JsonEachRow | Self::Json | Self::JsonCompact)
    }
}

impl fmt::Display for QueryFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A query as handed to the transport.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransportRequest {
    /// SQL text, already version-selected and trace-tagged.
    pub sql: String,

    /// Named parameters.
    #[serde(default)]
    pub params: QueryParams,

    /// Output format.
    #[serde(default)]
    pub format: QueryFormat,

    /// Server settings.
    #[serde(default)]
    pub settings: QuerySettings,
}

impl TransportRequest {
    /// Creates a request with default format and no params or settings.
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            ..Default::default()
        }
    }

    /// Creates a request whose SQL carries the trace comment.
    pub fn tagged(sql: &str) -> Self {
        Self::new(tag_sql(sql))
    }

    /// Sets the parameters.
    pub fn with_params(mut self, params: QueryParams) -> Self {
        self.params = params;
        self
    }

    /// Sets the output format.
    pub fn with_format(mut self, format: QueryFormat) -> Self {
        self.format = format;
        self
    }

    /// Sets the server settings.
    pub fn with_settings(mut self, settings: QuerySettings) -> Self {
        self.settings = settings;
        self
    }
}

/// What the transport returns for a successful query.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransportResponse {
    /// Server-assigned query id.
    pub query_id: String,

    /// Result records.
    pub rows: Vec<Row>,

    /// Number of records returned.
    pub row_count: usize,

    /// Server-side or wall-clock duration in milliseconds.
    pub duration_ms: u64,

    /// Size of the raw response body in bytes.
    pub raw_bytes_length: usize,
}

impl TransportResponse {
    /// Creates a response from rows, deriving the row count.
    pub fn with_rows(rows: Vec<Row>) -> Self {
        let row_count = rows.len();
        Self {
            rows,
            row_count,
            ..Default::default()
        }
    }

    /// Returns true if no records were returned.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Builds a row from column/value pairs.
pub fn row<I, K, V>(pairs: I) -> Row
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<serde_json::Value>,
{
    pairs
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}
