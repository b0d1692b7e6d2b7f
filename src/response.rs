//! Response envelopes returned by every query endpoint.
//!
//! Success: `{success: true, data, metadata}`. Failure:
//! `{success: false, error: {type, message, details?}, metadata}`. Metadata
//! fields are never absent; missing numbers become 0 and missing strings "".

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::error;

use crate::classify::{ClassifiedError, DetailValue, ErrorKind};
use crate::db::Row;
use crate::query::ExecutionMetadata;

/// Envelope metadata.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseMetadata {
    pub query_id: String,
    /// Duration in milliseconds.
    pub duration: u64,
    /// Row count.
    pub rows: u64,
    /// Host display name.
    pub host: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sql: Option<String>,
}

/// Partially known metadata, as gathered by the caller.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetadataInput {
    pub query_id: Option<String>,
    pub duration: Option<u64>,
    pub rows: Option<u64>,
    pub host: Option<String>,
    pub server_version: Option<String>,
    pub sql: Option<String>,
}

impl From<MetadataInput> for ResponseMetadata {
    fn from(input: MetadataInput) -> Self {
        Self {
            query_id: input.query_id.unwrap_or_default(),
            duration: input.duration.unwrap_or_default(),
            rows: input.rows.unwrap_or_default(),
            host: input.host.unwrap_or_default(),
            server_version: input.server_version,
            sql: input.sql,
        }
    }
}

impl From<ExecutionMetadata> for MetadataInput {
    fn from(meta: ExecutionMetadata) -> Self {
        Self {
            query_id: Some(meta.query_id),
            duration: Some(meta.duration_ms),
            rows: Some(meta.row_count as u64),
            host: Some(meta.host),
            server_version: meta.server_version,
            sql: Some(meta.raw_sql),
        }
    }
}

/// The `error` object of a failure envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    #[serde(rename = "type")]
    pub kind: ErrorKind,
    pub message: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub details: BTreeMap<String, DetailValue>,
}

impl From<&ClassifiedError> for ErrorBody {
    fn from(e: &ClassifiedError) -> Self {
        Self {
            kind: e.kind,
            message: e.message.clone(),
            details: e.details.clone(),
        }
    }
}

/// Uniform response shape. Exactly one of `data` and `error` is set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Vec<Row>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
    pub metadata: ResponseMetadata,
}

impl Envelope {
    /// Serializes the envelope to a JSON value.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_else(|e| {
            serde_json::json!({
                "success": false,
                "error": { "type": "query_error", "message": e.to_string() },
                "metadata": { "queryId": "", "duration": 0, "rows": 0, "host": "" },
            })
        })
    }
}

/// Where a response is being sent; used for error logging.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResponseContext {
    pub route: String,
    pub method: String,
    pub host_id: Option<i64>,
    /// Host display name once resolved.
    pub host: Option<String>,
}

impl ResponseContext {
    pub fn new(route: impl Into<String>, method: impl Into<String>) -> Self {
        Self {
            route: route.into(),
            method: method.into(),
            ..Default::default()
        }
    }

    pub fn with_host_id(mut self, host_id: i64) -> Self {
        self.host_id = Some(host_id);
        self
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }
}

/// An envelope paired with its HTTP status.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: Envelope,
}

impl ApiResponse {
    pub fn is_success(&self) -> bool {
        self.body.success
    }
}

/// Builds a success envelope.
pub fn build_success(rows: Vec<Row>, metadata: impl Into<MetadataInput>) -> Envelope {
    Envelope {
        success: true,
        data: Some(rows),
        error: None,
        metadata: ResponseMetadata::from(metadata.into()),
    }
}

/// Builds a failure envelope and logs it once with the request context.
pub fn build_error(err: &ClassifiedError, status: u16, ctx: &ResponseContext) -> Envelope {
    error!(
        route = %ctx.route,
        method = %ctx.method,
        host_id = ?ctx.host_id,
        kind = %err.kind,
        status,
        "{}",
        err.message
    );

    Envelope {
        success: false,
        data: None,
        error: Some(ErrorBody::from(err)),
        metadata: ResponseMetadata {
            host: ctx.host.clone().unwrap_or_default(),
            ..Default::default()
        },
    }
}

/// Builds a failure envelope with the status implied by its kind.
pub fn error_response(err: &ClassifiedError, ctx: &ResponseContext) -> ApiResponse {
    let status = err.status_code();
    ApiResponse {
        status,
        body: build_error(err, status, ctx),
    }
}

/// Builds a 200 success response.
pub fn success_response(rows: Vec<Row>, metadata: impl Into<MetadataInput>) -> ApiResponse {
    ApiResponse {
        status: 200,
        body: build_success(rows, metadata),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::row;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_success_defaults_metadata() {
        let envelope = build_success(vec![row([("a", 1)])], MetadataInput::default());
        assert_eq!(envelope.metadata.duration, 0);
        assert_eq!(envelope.metadata.host, "");
        assert_eq!(envelope.metadata.query_id, "");

        let json = envelope.to_json();
        assert_eq!(json["success"], json!(true));
        assert_eq!(json["data"], json!([{"a": 1}]));
        assert_eq!(json["metadata"]["duration"], json!(0));
        assert_eq!(json["metadata"]["host"], json!(""));
        assert!(json.get("error").is_none());
    }

    #[test]
    fn test_success_from_partial_json_metadata() {
        let input: MetadataInput = serde_json::from_value(json!({})).unwrap();
        let envelope = build_success(vec![], input);
        assert_eq!(envelope.metadata, ResponseMetadata::default());
    }

    #[test]
    fn test_success_from_execution_metadata() {
        let meta = ExecutionMetadata {
            query_id: "q-1".to_string(),
            duration_ms: 12,
            row_count: 3,
            host: "ch-0".to_string(),
            server_version: Some("24.3.1.1".to_string()),
            raw_sql: "SELECT 1".to_string(),
            raw_response_length: 99,
        };
        let json = build_success(vec![], meta).to_json();
        assert_eq!(
            json["metadata"],
            json!({
                "queryId": "q-1",
                "duration": 12,
                "rows": 3,
                "host": "ch-0",
                "serverVersion": "24.3.1.1",
                "sql": "SELECT 1"
            })
        );
    }

    #[test]
    fn test_error_envelope_shape() {
        let err = ClassifiedError::missing_tables(vec!["system.backup_log".to_string()]);
        let ctx = ResponseContext::new("/api/v1/data", "GET")
            .with_host_id(0)
            .with_host("ch-0");
        let json = build_error(&err, 404, &ctx).to_json();

        assert_eq!(json["success"], json!(false));
        assert_eq!(json["error"]["type"], json!("table_not_found"));
        assert_eq!(
            json["error"]["details"]["missingTables"],
            json!(["system.backup_log"])
        );
        assert_eq!(
            json["metadata"],
            json!({"queryId": "", "duration": 0, "rows": 0, "host": "ch-0"})
        );
        assert!(json.get("data").is_none());
    }

    #[test]
    fn test_error_without_details_omits_them() {
        let err = ClassifiedError::validation("hostId is required");
        let json = build_error(&err, 400, &ResponseContext::default()).to_json();
        assert!(json["error"].get("details").is_none());
        assert_eq!(json["error"]["message"], json!("hostId is required"));
    }

    #[test]
    fn test_error_response_uses_kind_status() {
        let err = ClassifiedError::permission("Query is not in the dashboard allow-list");
        let response = error_response(&err, &ResponseContext::default());
        assert_eq!(response.status, 403);
        assert!(!response.is_success());
    }
}
