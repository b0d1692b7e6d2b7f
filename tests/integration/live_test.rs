//! Tests against a running ClickHouse server.
//!
//! Skipped unless CLICKHOUSE_URL is set (e.g. `http://localhost:8123`).
//! CLICKHOUSE_USER and CLICKHOUSE_PASSWORD are used when present.

use std::sync::Arc;

use db_lookout::classify::{ErrorClassifier, ErrorKind, KeywordClassifier};
use db_lookout::db::{HttpTransport, QueryFormat, QueryTransport, TransportRequest};
use db_lookout::hosts::{Credentials, HostConfig, StaticHostRegistry};
use db_lookout::query::QueryCatalog;
use db_lookout::response::ResponseContext;
use db_lookout::service::{DataService, InboundRequest};

/// Helper to get the test host from the environment.
fn get_test_host() -> Option<HostConfig> {
    let url = std::env::var("CLICKHOUSE_URL").ok()?;
    let credentials = Credentials::new(
        std::env::var("CLICKHOUSE_USER").unwrap_or_else(|_| "default".to_string()),
        std::env::var("CLICKHOUSE_PASSWORD").unwrap_or_default(),
    );
    Some(HostConfig::new(0, url, credentials))
}

fn get_test_service(host: HostConfig) -> DataService {
    let transport = HttpTransport::new().unwrap();
    DataService::builder(
        Arc::new(StaticHostRegistry::new(vec![host])),
        Arc::new(transport),
    )
    .catalog(QueryCatalog::builtin())
    .build()
}

#[tokio::test]
async fn test_live_version_parses() {
    let Some(host) = get_test_host() else {
        eprintln!("Skipping test: CLICKHOUSE_URL not set");
        return;
    };

    let resolved = get_test_service(host.clone())
        .versions()
        .resolve(&host)
        .await
        .unwrap();
    assert!(resolved.major >= 20);
}

#[tokio::test]
async fn test_live_parameterized_query() {
    let Some(host) = get_test_host() else {
        eprintln!("Skipping test: CLICKHOUSE_URL not set");
        return;
    };

    let transport = HttpTransport::new().unwrap();
    let mut params = db_lookout::db::QueryParams::new();
    params.insert("n".to_string(), serde_json::json!(3));
    let request = TransportRequest::new("SELECT number FROM system.numbers LIMIT {n:UInt32}")
        .with_params(params)
        .with_format(QueryFormat::JsonEachRow);

    let response = transport.query(&host, &request).await.unwrap();
    assert_eq!(response.row_count, 3);
    assert!(!response.query_id.is_empty());
}

#[tokio::test]
async fn test_live_unknown_table_classifies_as_not_found() {
    let Some(host) = get_test_host() else {
        eprintln!("Skipping test: CLICKHOUSE_URL not set");
        return;
    };

    let transport = HttpTransport::new().unwrap();
    let err = transport
        .query(&host, &TransportRequest::new("SELECT * FROM default.lookout_no_such_table"))
        .await
        .unwrap_err();

    let classified = KeywordClassifier::default().classify(&err);
    assert_eq!(classified.kind, ErrorKind::TableNotFound);
}

#[tokio::test]
async fn test_live_catalog_query() {
    let Some(host) = get_test_host() else {
        eprintln!("Skipping test: CLICKHOUSE_URL not set");
        return;
    };

    let response = get_test_service(host)
        .execute(&InboundRequest::named(0, "disks"), ResponseContext::new("live", "GET"))
        .await
        .unwrap();

    assert_eq!(response.status, 200);
    assert!(!response.body.metadata.query_id.is_empty());
    assert!(response.body.metadata.rows >= 1);
}
