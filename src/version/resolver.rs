//! Per-host server version resolution with a TTL cache.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;
use tracing::debug;

use super::ServerVersion;
use crate::clock::{system_clock, SharedClock};
use crate::db::{QueryTransport, TransportRequest};
use crate::error::{LookoutError, Result};
use crate::hosts::HostConfig;

/// Query used to read the server version.
pub const VERSION_QUERY: &str = "SELECT version() AS version";

/// Default cache window for resolved versions.
const DEFAULT_TTL: Duration = Duration::from_secs(600);

#[derive(Debug, Clone)]
struct CachedVersion {
    version: ServerVersion,
    fetched_at: Instant,
}

/// Resolves and caches each host's server version.
///
/// Resolution is idempotent and may miss the cache at any time; a miss costs
/// one round trip. Concurrent misses for the same host both query the server
/// and the later write wins.
pub struct VersionResolver {
    transport: Arc<dyn QueryTransport>,
    clock: SharedClock,
    ttl: Duration,
    cache: RwLock<HashMap<usize, CachedVersion>>,
}

impl VersionResolver {
    /// Creates a resolver using the system clock and default window.
    pub fn new(transport: Arc<dyn QueryTransport>) -> Self {
        Self::with_clock(transport, system_clock(), DEFAULT_TTL)
    }

    /// Creates a resolver with an explicit clock and window.
    pub fn with_clock(transport: Arc<dyn QueryTransport>, clock: SharedClock, ttl: Duration) -> Self {
        Self {
            transport,
            clock,
            ttl,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Returns the host's version, querying the server on a cache miss.
    pub async fn resolve(&self, host: &HostConfig) -> Result<ServerVersion> {
        if let Some(version) = self.cached(host.id).await {
            return Ok(version);
        }

        let response = self
            .transport
            .query(host, &TransportRequest::tagged(VERSION_QUERY))
            .await?;

        let raw = response
            .rows
            .first()
            .and_then(|row| row.get("version"))
            .and_then(|v| v.as_str())
            .ok_or_else(|| LookoutError::query("version() returned no rows"))?;

        let version = ServerVersion::parse(raw)?;
        debug!(host_id = host.id, version = %version, "Resolved server version");

        self.cache.write().await.insert(
            host.id,
            CachedVersion {
                version: version.clone(),
                fetched_at: self.clock.now(),
            },
        );

        Ok(version)
    }

    /// Returns the cached version if it is still inside the window.
    async fn cached(&self, host_id: usize) -> Option<ServerVersion> {
        let now = self.clock.now();
        let cache = self.cache.read().await;
        cache
            .get(&host_id)
            .filter(|entry| now.duration_since(entry.fetched_at) < self.ttl)
            .map(|entry| entry.version.clone())
    }

    /// Drops the cached version for one host.
    pub async fn invalidate(&self, host_id: usize) {
        self.cache.write().await.remove(&host_id);
    }

    /// Drops every cached version.
    pub async fn clear(&self) {
        self.cache.write().await.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::db::MockTransport;
    use crate::hosts::Credentials;

    fn host() -> HostConfig {
        HostConfig::new(0, "http://mock:8123", Credentials::default())
    }

    #[tokio::test]
    async fn test_resolve_parses_version() {
        let mock = MockTransport::new().with_version("24.3.1.2672");
        let resolver = VersionResolver::new(Arc::new(mock));

        let v = resolver.resolve(&host()).await.unwrap();
        assert_eq!((v.major, v.minor), (24, 3));
    }

    #[test]
    fn test_resolve_without_version_row_fails() {
        let resolver = VersionResolver::new(Arc::new(MockTransport::new()));
        let result = tokio_test::block_on(resolver.resolve(&host()));
        assert!(matches!(result, Err(LookoutError::Query(_))));
    }

    #[tokio::test]
    async fn test_resolve_is_cached_within_window() {
        let mock = MockTransport::new().with_version("23.8.1.1");
        let clock = ManualClock::new();
        let resolver =
            VersionResolver::with_clock(Arc::new(mock.clone()), Arc::new(clock.clone()), Duration::from_secs(60));

        resolver.resolve(&host()).await.unwrap();
        clock.advance(Duration::from_secs(30));
        resolver.resolve(&host()).await.unwrap();
        assert_eq!(mock.calls_matching("version()"), 1);

        clock.advance(Duration::from_secs(31));
        resolver.resolve(&host()).await.unwrap();
        assert_eq!(mock.calls_matching("version()"), 2);
    }

    #[tokio::test]
    async fn test_invalidate_forces_refetch() {
        let mock = MockTransport::new().with_version("23.8.1.1");
        let resolver = VersionResolver::new(Arc::new(mock.clone()));

        resolver.resolve(&host()).await.unwrap();
        resolver.invalidate(0).await;
        resolver.resolve(&host()).await.unwrap();
        assert_eq!(mock.calls_matching("version()"), 2);
    }

    #[tokio::test]
    async fn test_resolve_propagates_transport_error() {
        let mock = MockTransport::new()
            .with_failure("version()", LookoutError::connection("Connection refused"));
        let resolver = VersionResolver::new(Arc::new(mock));

        let err = resolver.resolve(&host()).await.unwrap_err();
        assert!(matches!(err, LookoutError::Connection(_)));
    }

    #[tokio::test]
    async fn test_resolve_without_rows_is_error() {
        let mock = MockTransport::new().with_rows("version()", vec![]);
        let resolver = VersionResolver::new(Arc::new(mock));

        assert!(resolver.resolve(&host()).await.is_err());
    }
}
