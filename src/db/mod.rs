//! Database transport layer for db-lookout.
//!
//! Provides a trait-based interface for talking to a database server, allowing
//! the HTTP client and the in-memory mock to be used interchangeably.

mod http;
mod mock;
mod types;

pub use http::HttpTransport;
pub use mock::MockTransport;
pub use types::{
    row, tag_sql, QueryFormat, QueryParams, QuerySettings, Row, TransportRequest,
    TransportResponse, TRACE_COMMENT,
};

use crate::error::Result;
use crate::hosts::HostConfig;
use async_trait::async_trait;

/// Trait defining the interface for query transports.
///
/// Failures carry a human-readable message; callers classify it rather than
/// matching on a structured code.
#[async_trait]
pub trait QueryTransport: Send + Sync {
    /// Executes a query against the given host.
    async fn query(&self, host: &HostConfig, request: &TransportRequest)
        -> Result<TransportResponse>;
}
