//! Query execution against a resolved host.
//!
//! Provides isolated query execution that can be tested independently
//! of the full pipeline: host lookup, trace tagging, timing and failure
//! classification.

use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::classify::{ClassifiedError, ErrorClassifier, KeywordClassifier};
use crate::db::{QueryFormat, QueryParams, QuerySettings, QueryTransport, Row, TransportRequest};
use crate::hosts::{HostConfig, HostRegistry};

/// A single query to run. Built fresh per call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExecutionRequest {
    /// Target host id, already parsed.
    pub host_id: i64,
    /// Version-selected SQL.
    pub sql: String,
    pub params: QueryParams,
    pub format: QueryFormat,
    pub settings: QuerySettings,
}

impl ExecutionRequest {
    pub fn new(host_id: i64, sql: impl Into<String>) -> Self {
        Self {
            host_id,
            sql: sql.into(),
            ..Default::default()
        }
    }
}

/// Metadata describing a successful execution.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionMetadata {
    pub query_id: String,
    /// Server-reported elapsed time, or the transport round trip when absent.
    pub duration_ms: u64,
    pub row_count: usize,
    /// Display name of the host.
    pub host: String,
    pub server_version: Option<String>,
    /// SQL as selected, without the trace comment.
    pub raw_sql: String,
    /// Raw response size, for observability only.
    pub raw_response_length: usize,
}

/// Result of executing a query: rows or a classified error, never both.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionResult {
    /// Query executed successfully.
    Success {
        rows: Vec<Row>,
        metadata: ExecutionMetadata,
    },
    /// Query was rejected or failed.
    Failure(ClassifiedError),
}

impl ExecutionResult {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    /// Returns the error, if any.
    pub fn error(&self) -> Option<&ClassifiedError> {
        match self {
            Self::Failure(e) => Some(e),
            Self::Success { .. } => None,
        }
    }
}

/// Runs queries against hosts from the registry.
pub struct QueryExecutor {
    registry: Arc<dyn HostRegistry>,
    transport: Arc<dyn QueryTransport>,
    classifier: Arc<dyn ErrorClassifier>,
}

impl QueryExecutor {
    /// Creates an executor with the default keyword classifier.
    pub fn new(registry: Arc<dyn HostRegistry>, transport: Arc<dyn QueryTransport>) -> Self {
        Self::with_classifier(registry, transport, Arc::new(KeywordClassifier::default()))
    }

    pub fn with_classifier(
        registry: Arc<dyn HostRegistry>,
        transport: Arc<dyn QueryTransport>,
        classifier: Arc<dyn ErrorClassifier>,
    ) -> Self {
        Self {
            registry,
            transport,
            classifier,
        }
    }

    /// Looks up the host, returning a validation error for an empty registry
    /// or an id outside `[0, host_count)`.
    pub fn resolve_host(&self, host_id: i64) -> std::result::Result<HostConfig, ClassifiedError> {
        let count = self.registry.host_count();
        if count == 0 {
            return Err(ClassifiedError::validation("No database hosts are configured")
                .with_detail("hostId", host_id));
        }

        self.registry.get(host_id).ok_or_else(|| {
            ClassifiedError::validation(format!(
                "Invalid hostId {host_id}: expected a value between 0 and {}",
                count - 1
            ))
            .with_detail("hostId", host_id)
            .with_detail("hostCount", count as i64)
        })
    }

    /// Resolves the host and runs the request.
    pub async fn execute(&self, request: &ExecutionRequest) -> ExecutionResult {
        match self.resolve_host(request.host_id) {
            Ok(host) => self.execute_on(&host, request).await,
            Err(e) => ExecutionResult::Failure(e),
        }
    }

    /// Runs the request against an already resolved host.
    pub async fn execute_on(&self, host: &HostConfig, request: &ExecutionRequest) -> ExecutionResult {
        let transport_request = TransportRequest::tagged(&request.sql)
            .with_params(request.params.clone())
            .with_format(request.format)
            .with_settings(request.settings.clone());

        let start = Instant::now();
        let result = self.transport.query(host, &transport_request).await;

        match result {
            Ok(response) => {
                info!(
                    host_id = host.id,
                    query_id = %response.query_id,
                    duration_ms = response.duration_ms,
                    rows = response.row_count,
                    "Query executed"
                );
                ExecutionResult::Success {
                    metadata: ExecutionMetadata {
                        query_id: response.query_id,
                        duration_ms: response.duration_ms,
                        row_count: response.row_count,
                        host: host.name.clone(),
                        server_version: None,
                        raw_sql: request.sql.clone(),
                        raw_response_length: response.raw_bytes_length,
                    },
                    rows: response.rows,
                }
            }
            Err(e) => {
                let classified = self.classifier.classify(&e);
                debug!(
                    host_id = host.id,
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    kind = %classified.kind,
                    "Query failed: {}",
                    classified.message
                );
                ExecutionResult::Failure(classified)
            }
        }
    }
}
