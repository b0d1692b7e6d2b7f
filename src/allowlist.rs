//! Dashboard query allow-list gate.
//!
//! Ad-hoc SQL from custom dashboards only runs when it matches, byte for byte,
//! a query registered in a server-side table. Each host's allow-list is cached
//! for a TTL; expiry is checked lazily on access and a refresh replaces the
//! whole set. When the list cannot be fetched the gate denies.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::clock::{system_clock, SharedClock};
use crate::config::AllowListConfig;
use crate::db::{QueryTransport, TransportRequest};
use crate::error::{LookoutError, Result};
use crate::hosts::HostConfig;

/// Default allow-list lifetime.
pub const DEFAULT_TTL: Duration = Duration::from_secs(5 * 60);

/// One host's allow-list snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllowListCacheEntry {
    pub host_id: usize,
    /// Exact SQL strings permitted on the host.
    pub queries: HashSet<String>,
    /// When the snapshot was fetched.
    pub timestamp: Instant,
}

/// TTL-cached allow-list check in front of ad-hoc query execution.
pub struct AllowListGate {
    transport: Arc<dyn QueryTransport>,
    clock: SharedClock,
    source: AllowListConfig,
    ttl_nanos: AtomicU64,
    entries: RwLock<HashMap<usize, Arc<AllowListCacheEntry>>>,
}

impl AllowListGate {
    /// Creates a gate with the system clock and the default TTL.
    pub fn new(transport: Arc<dyn QueryTransport>, source: AllowListConfig) -> Self {
        Self::with_clock(transport, source, system_clock(), DEFAULT_TTL)
    }

    pub fn with_clock(
        transport: Arc<dyn QueryTransport>,
        source: AllowListConfig,
        clock: SharedClock,
        ttl: Duration,
    ) -> Self {
        Self {
            transport,
            clock,
            source,
            ttl_nanos: AtomicU64::new(duration_to_nanos(ttl)),
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Current TTL.
    pub fn ttl(&self) -> Duration {
        Duration::from_nanos(self.ttl_nanos.load(Ordering::Relaxed))
    }

    /// Changes the TTL at runtime. Applies to existing entries on their next access.
    pub fn set_ttl(&self, ttl: Duration) {
        self.ttl_nanos
            .store(duration_to_nanos(ttl), Ordering::Relaxed);
    }

    /// Returns true if `sql` is allow-listed on the host. Any failure denies.
    pub async fn is_allowed(&self, host: &HostConfig, sql: &str) -> bool {
        self.check(host, sql).await.is_ok()
    }

    /// Verifies `sql` against the host's allow-list.
    ///
    /// Returns a permission error when the query is not listed or when the
    /// list cannot be retrieved.
    pub async fn check(&self, host: &HostConfig, sql: &str) -> Result<()> {
        let entry = match self.fresh_entry(host.id).await {
            Some(entry) => entry,
            None => self.refresh_entry(host).await.map_err(|e| {
                warn!(host_id = host.id, error = %e, "Allow-list unavailable, denying query");
                LookoutError::permission(format!(
                    "Unable to verify query against the dashboard allow-list: {}",
                    e.detail()
                ))
            })?,
        };

        if entry.queries.contains(sql) {
            Ok(())
        } else {
            debug!(host_id = host.id, "Query not in allow-list");
            Err(LookoutError::permission(
                "Query is not in the dashboard allow-list",
            ))
        }
    }

    /// Fetches the host's allow-list and replaces its cached set.
    pub async fn refresh(&self, host: &HostConfig) -> Result<HashSet<String>> {
        Ok(self.refresh_entry(host).await?.queries.clone())
    }

    /// Drops every cached allow-list.
    pub async fn clear_all(&self) {
        self.entries.write().await.clear();
    }

    /// Drops one host's cached allow-list.
    pub async fn clear_host(&self, host_id: usize) {
        self.entries.write().await.remove(&host_id);
    }

    /// Returns the host's cached snapshot if present and unexpired.
    pub async fn cached(&self, host_id: usize) -> Option<Arc<AllowListCacheEntry>> {
        self.fresh_entry(host_id).await
    }

    /// Clears the host's entry if it has expired, then reads it.
    async fn fresh_entry(&self, host_id: usize) -> Option<Arc<AllowListCacheEntry>> {
        let now = self.clock.now();
        let ttl = self.ttl();

        {
            let entries = self.entries.read().await;
            match entries.get(&host_id) {
                Some(entry) if now.duration_since(entry.timestamp) < ttl => {
                    return Some(Arc::clone(entry));
                }
                Some(_) => {}
                None => return None,
            }
        }

        let mut entries = self.entries.write().await;
        if entries
            .get(&host_id)
            .is_some_and(|entry| now.duration_since(entry.timestamp) >= ttl)
        {
            entries.remove(&host_id);
        }
        None
    }

    async fn refresh_entry(&self, host: &HostConfig) -> Result<Arc<AllowListCacheEntry>> {
        let sql = format!(
            "SELECT {} AS query FROM {}",
            self.source.column, self.source.table
        );
        let response = self
            .transport
            .query(host, &TransportRequest::tagged(&sql))
            .await?;

        let queries: HashSet<String> = response
            .rows
            .iter()
            .filter_map(|row| row.get("query").and_then(|v| v.as_str()).map(String::from))
            .collect();

        debug!(host_id = host.id, count = queries.len(), "Refreshed allow-list");

        let entry = Arc::new(AllowListCacheEntry {
            host_id: host.id,
            queries,
            timestamp: self.clock.now(),
        });
        self.entries
            .write()
            .await
            .insert(host.id, Arc::clone(&entry));
        Ok(entry)
    }
}

fn duration_to_nanos(d: Duration) -> u64 {
    u64::try_from(d.as_nanos()).unwrap_or(u64::MAX)
}
