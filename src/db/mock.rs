//! Mock transport for testing.
//!
//! Provides an in-memory server with a scripted catalog, version and responses.

use super::{QueryTransport, Row, TransportRequest, TransportResponse};
use crate::error::{LookoutError, Result};
use crate::hosts::HostConfig;
use async_trait::async_trait;
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, MutexGuard};

/// A mock transport that returns predefined results.
///
/// Scripted failures are checked first, then scripted responses, then the
/// built-in `version()` and `system.tables` handlers. Anything else yields
/// an empty result. Every executed SQL text is recorded.
#[derive(Debug, Clone, Default)]
pub struct MockTransport {
    version: Option<String>,
    tables: BTreeSet<(String, String)>,
    responses: Vec<(String, Vec<Row>)>,
    failures: Vec<(String, LookoutError)>,
    duration_ms: Option<u64>,
    calls: Arc<Mutex<Vec<String>>>,
}

impl MockTransport {
    /// Creates a mock server with no tables and no version.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the version reported by `SELECT version()`.
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    /// Adds a table to the catalog.
    pub fn with_table(mut self, database: impl Into<String>, name: impl Into<String>) -> Self {
        self.tables.insert((database.into(), name.into()));
        self
    }

    /// Returns `rows` for any SQL containing `pattern`.
    pub fn with_rows(mut self, pattern: impl Into<String>, rows: Vec<Row>) -> Self {
        self.responses.push((pattern.into(), rows));
        self
    }

    /// Fails any SQL containing `pattern` with `error`.
    pub fn with_failure(mut self, pattern: impl Into<String>, error: LookoutError) -> Self {
        self.failures.push((pattern.into(), error));
        self
    }

    /// Sets the server-reported elapsed time of every response (default 1ms).
    pub fn with_duration(mut self, duration_ms: u64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }

    /// Returns every SQL text executed so far.
    pub fn calls(&self) -> Vec<String> {
        self.lock_calls().clone()
    }

    /// Counts executed queries containing `pattern`.
    pub fn calls_matching(&self, pattern: &str) -> usize {
        self.lock_calls()
            .iter()
            .filter(|sql| sql.contains(pattern))
            .count()
    }

    fn lock_calls(&self) -> MutexGuard<'_, Vec<String>> {
        self.calls
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn respond(&self, sql: &str) -> Result<Vec<Row>> {
        if let Some((_, error)) = self.failures.iter().find(|(p, _)| sql.contains(p.as_str())) {
            return Err(error.clone());
        }

        if let Some((_, rows)) = self.responses.iter().find(|(p, _)| sql.contains(p.as_str())) {
            return Ok(rows.clone());
        }

        if sql.contains("version()") {
            let version = self
                .version
                .clone()
                .ok_or_else(|| LookoutError::query("Mock server has no version configured"))?;
            return Ok(vec![super::row([("version", version)])]);
        }

        if sql.contains("system.tables") {
            return Ok(self
                .tables
                .iter()
                .map(|(db, name)| super::row([("database", db.as_str()), ("name", name.as_str())]))
                .collect());
        }

        Ok(Vec::new())
    }
}

#[async_trait]
impl QueryTransport for MockTransport {
    async fn query(
        &self,
        _host: &HostConfig,
        request: &TransportRequest,
    ) -> Result<TransportResponse> {
        let query_number = {
            let mut calls = self.lock_calls();
            calls.push(request.sql.clone());
            calls.len()
        };

        let rows = self.respond(&request.sql)?;
        let raw_bytes_length = rows
            .iter()
            .map(|r| serde_json::Value::Object(r.clone()).to_string().len() + 1)
            .sum();

        Ok(TransportResponse {
            query_id: format!("mock-{query_number}"),
            row_count: rows.len(),
            rows,
            duration_ms: self.duration_ms.unwrap_or(1),
            raw_bytes_length,
        })
    }
}
