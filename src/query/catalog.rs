//! Named query catalog.
//!
//! Maps `queryConfigName` values to query definitions. The built-in set
//! covers the server's own system tables.

use std::collections::HashMap;

use super::spec::{QueryConfig, QuerySpec, VersionedVariant};

/// Lookup table of named queries.
#[derive(Debug, Clone, Default)]
pub struct QueryCatalog {
    queries: HashMap<String, QueryConfig>,
}

impl QueryCatalog {
    /// Creates an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a catalog with the built-in monitoring queries.
    pub fn builtin() -> Self {
        let mut catalog = Self::new();
        for config in builtin_queries() {
            catalog.register(config);
        }
        catalog
    }

    /// Adds or replaces a query.
    pub fn register(&mut self, config: QueryConfig) {
        self.queries.insert(config.name.clone(), config);
    }

    /// Builder form of [`register`](Self::register).
    pub fn with(mut self, config: QueryConfig) -> Self {
        self.register(config);
        self
    }

    /// Looks up a query by name.
    pub fn get(&self, name: &str) -> Option<&QueryConfig> {
        self.queries.get(name)
    }

    /// Sorted query names.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.queries.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.queries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queries.is_empty()
    }
}

fn builtin_queries() -> Vec<QueryConfig> {
    vec![
        QueryConfig::new(
            "running-queries",
            "SELECT query_id, user, elapsed, read_rows, memory_usage, query \
             FROM system.processes \
             WHERE is_cancelled = 0 \
             ORDER BY elapsed DESC",
        ),
        QueryConfig::new(
            "merges",
            "SELECT database, table, elapsed, progress, num_parts, result_part_name \
             FROM system.merges \
             ORDER BY elapsed DESC",
        ),
        QueryConfig::new(
            "disks",
            "SELECT name, path, free_space, total_space, unreserved_space \
             FROM system.disks \
             ORDER BY name",
        ),
        QueryConfig::new(
            "replication-queue",
            "SELECT database, table, type, create_time, num_tries, last_exception \
             FROM system.replication_queue \
             ORDER BY create_time",
        ),
        QueryConfig::new(
            "backups",
            QuerySpec::Versioned(vec![
                VersionedVariant::new(
                    "23.8",
                    "SELECT id, name, status, error, start_time, end_time, total_size \
                     FROM system.backup_log \
                     ORDER BY start_time DESC",
                ),
                VersionedVariant::new(
                    "24.1",
                    "SELECT id, name, status, error, start_time, end_time, total_size, \
                     num_files, bytes_read \
                     FROM system.backup_log \
                     ORDER BY start_time DESC",
                ),
            ]),
        )
        .optional(),
        QueryConfig::new(
            "error-log",
            "SELECT event_time, code, error, value, remote \
             FROM system.error_log \
             WHERE event_time > now() - INTERVAL {hours:UInt32} HOUR \
             ORDER BY event_time DESC",
        )
        .optional()
        .with_table_check(["system.error_log"])
        .with_default_param("hours", 24),
        QueryConfig::new(
            "zookeeper-connection",
            "SELECT name, host, port, index, connected_time, is_expired \
             FROM system.zookeeper_connection",
        )
        .optional(),
    ]
}
