//! End-to-end pipeline tests.
//!
//! Drives `DataService` from inbound request to response envelope over the
//! mock transport.

use std::sync::Arc;

use db_lookout::classify::ErrorKind;
use db_lookout::db::{row, MockTransport};
use db_lookout::error::LookoutError;
use db_lookout::hosts::{Credentials, HostConfig, StaticHostRegistry};
use db_lookout::query::{QueryCatalog, QueryConfig, QuerySpec, VersionedVariant, TRACE_COMMENT};
use db_lookout::response::ResponseContext;
use db_lookout::service::{DataService, InboundRequest};
use serde_json::json;

fn hosts(n: usize) -> Arc<StaticHostRegistry> {
    let hosts = (0..n)
        .map(|i| {
            HostConfig::new(i, format!("http://ch-{i}:8123"), Credentials::new("default", ""))
                .with_name(format!("ch-{i}"))
        })
        .collect();
    Arc::new(StaticHostRegistry::new(hosts))
}

fn service(mock: &MockTransport, catalog: QueryCatalog) -> DataService {
    DataService::builder(hosts(2), Arc::new(mock.clone()))
        .catalog(catalog)
        .build()
}

fn ctx() -> ResponseContext {
    ResponseContext::new("/api/v1/data", "GET")
}

fn versioned_catalog() -> QueryCatalog {
    QueryCatalog::new().with(QueryConfig::new(
        "versioned",
        QuerySpec::Versioned(vec![
            VersionedVariant::new("23.8", "SELECT 'A'"),
            VersionedVariant::new("24.1", "SELECT 'B'"),
        ]),
    ))
}

#[tokio::test]
async fn test_success_envelope_shape() {
    let mock = MockTransport::new()
        .with_rows("system.disks", vec![row([("name", json!("default")), ("free_space", json!(10))])]);
    let service = service(&mock, QueryCatalog::builtin());

    let response = service
        .execute(&InboundRequest::named(1, "disks"), ctx())
        .await
        .unwrap();
    let json = response.body.to_json();

    assert_eq!(response.status, 200);
    assert_eq!(json["success"], json!(true));
    assert_eq!(json["data"], json!([{"name": "default", "free_space": 10}]));
    assert_eq!(json["metadata"]["host"], json!("ch-1"));
    assert_eq!(json["metadata"]["rows"], json!(1));
    assert!(json["metadata"]["queryId"].as_str().unwrap().starts_with("mock-"));
    assert!(json.get("error").is_none());

    let sql = json["metadata"]["sql"].as_str().unwrap();
    assert!(!sql.contains(TRACE_COMMENT));
    assert!(mock
        .calls()
        .iter()
        .any(|c| c.starts_with(TRACE_COMMENT) && c.contains("system.disks")));
}

#[tokio::test]
async fn test_versioned_selection_by_server_version() {
    for (version, expected) in [("24.3.1.1", "SELECT 'B'"), ("23.9", "SELECT 'A'"), ("22.1", "SELECT 'A'")] {
        let mock = MockTransport::new().with_version(version);
        let service = service(&mock, versioned_catalog());

        let response = service
            .execute(&InboundRequest::named(0, "versioned"), ctx())
            .await
            .unwrap();

        assert_eq!(response.body.metadata.sql.as_deref(), Some(expected), "version {version}");
        assert_eq!(response.body.metadata.server_version.as_deref(), Some(version));
    }
}

#[tokio::test]
async fn test_version_is_cached_per_host() {
    let mock = MockTransport::new().with_version("24.3");
    let service = service(&mock, versioned_catalog());

    for host_id in [0, 0, 1, 1] {
        service
            .execute(&InboundRequest::named(host_id, "versioned"), ctx())
            .await
            .unwrap();
    }

    assert_eq!(mock.calls_matching("version()"), 2);
}

#[tokio::test]
async fn test_plain_query_never_resolves_version() {
    let mock = MockTransport::new().with_version("24.3");
    let service = service(&mock, QueryCatalog::builtin());

    service
        .execute(&InboundRequest::named(0, "merges"), ctx())
        .await
        .unwrap();

    assert_eq!(mock.calls_matching("version()"), 0);
}

#[tokio::test]
async fn test_version_failure_is_classified() {
    let mock = MockTransport::new()
        .with_failure("version()", LookoutError::connection("Connection refused"));
    let service = service(&mock, versioned_catalog());

    let response = service
        .execute(&InboundRequest::named(0, "versioned"), ctx())
        .await
        .unwrap();

    assert_eq!(response.status, 503);
    assert_eq!(response.body.error.unwrap().kind, ErrorKind::NetworkError);
}

#[tokio::test]
async fn test_out_of_range_host_ids() {
    let mock = MockTransport::new();
    let service = service(&mock, QueryCatalog::builtin());

    for host_id in [2i64, 100, -1] {
        let response = service
            .execute(&InboundRequest::named(host_id, "disks"), ctx())
            .await
            .unwrap();
        assert_eq!(response.status, 400, "hostId {host_id}");
        let error = response.body.error.unwrap();
        assert_eq!(error.kind, ErrorKind::ValidationError);
        assert_eq!(serde_json::to_value(&error.details["hostId"]).unwrap(), json!(host_id));
    }
    assert!(mock.calls().is_empty());
}

#[tokio::test]
async fn test_malformed_host_ids_raise() {
    let service = service(&MockTransport::new(), QueryCatalog::builtin());

    for raw in ["abc", "1.5", ""] {
        let err = service
            .execute(&InboundRequest::named(raw, "disks"), ctx())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Invalid hostId"), "{raw}");
    }

    let err = service
        .execute(&InboundRequest::named(f64::INFINITY, "disks"), ctx())
        .await
        .unwrap_err();
    assert!(err.to_string().contains("inf"));
}

#[tokio::test]
async fn test_empty_registry_is_validation_error() {
    let service = DataService::builder(
        Arc::new(StaticHostRegistry::empty()),
        Arc::new(MockTransport::new()),
    )
    .build();

    let response = service
        .execute(&InboundRequest::named(0, "disks"), ctx())
        .await
        .unwrap();
    assert_eq!(response.status, 400);
}

#[tokio::test]
async fn test_optional_query_missing_tables_is_404() {
    let mock = MockTransport::new().with_version("24.3");
    let service = service(&mock, QueryCatalog::builtin());

    let response = service
        .execute(&InboundRequest::named(0, "zookeeper-connection"), ctx())
        .await
        .unwrap();

    assert_eq!(response.status, 404);
    let json = response.body.to_json();
    assert_eq!(json["error"]["type"], json!("table_not_found"));
    assert_eq!(
        json["error"]["details"]["missingTables"],
        json!(["system.zookeeper_connection"])
    );
    assert_eq!(json["metadata"]["host"], json!("ch-0"));
    assert_eq!(mock.calls_matching("FROM system.zookeeper_connection"), 0);
}

#[tokio::test]
async fn test_optional_query_runs_when_tables_exist() {
    let mock = MockTransport::new()
        .with_version("24.3")
        .with_table("system", "backup_log")
        .with_rows("FROM system.backup_log", vec![row([("id", "b-1")])]);
    let service = service(&mock, QueryCatalog::builtin());

    let response = service
        .execute(&InboundRequest::named(0, "backups"), ctx())
        .await
        .unwrap();

    assert_eq!(response.status, 200);
    assert_eq!(response.body.data.unwrap().len(), 1);
    assert!(response
        .body
        .metadata
        .sql
        .unwrap()
        .contains("num_files"));
}

#[tokio::test]
async fn test_server_errors_map_to_statuses() {
    let cases = [
        (LookoutError::query("Code: 60. DB::Exception: Table system.x does not exist"), 404),
        (LookoutError::query("Code: 497. DB::Exception: Access denied"), 403),
        (LookoutError::connection("Connection timeout after 30000ms"), 503),
        (LookoutError::query("Code: 62. DB::Exception: Syntax error: failed at position 1"), 400),
        (LookoutError::query("Code: 241. DB::Exception: Memory limit exceeded"), 500),
    ];

    for (failure, status) in cases {
        let mock = MockTransport::new().with_failure("system.disks", failure.clone());
        let service = service(&mock, QueryCatalog::builtin());

        let response = service
            .execute(&InboundRequest::named(0, "disks"), ctx())
            .await
            .unwrap();
        assert_eq!(response.status, status, "{failure}");
        assert!(!response.is_success());
    }
}

#[tokio::test]
async fn test_respond_never_raises() {
    let service = service(&MockTransport::new(), QueryCatalog::builtin());

    let response = service
        .respond(&InboundRequest::named(f64::NAN, "disks"), ctx())
        .await;

    assert_eq!(response.status, 400);
    let error = response.body.error.unwrap();
    assert_eq!(error.kind, ErrorKind::ValidationError);
    assert!(error.message.contains("NaN"));
}

#[tokio::test]
async fn test_request_from_json() {
    let mock = MockTransport::new().with_table("system", "error_log");
    let service = service(&mock, QueryCatalog::builtin());

    let request: InboundRequest = serde_json::from_value(json!({
        "hostId": 0,
        "queryConfigName": "error-log",
        "params": {"hours": 6},
        "settings": {"max_execution_time": 5}
    }))
    .unwrap();

    let response = service.execute(&request, ctx()).await.unwrap();
    assert_eq!(response.status, 200);
}

#[tokio::test]
async fn test_every_outbound_query_carries_trace_comment() {
    let mock = MockTransport::new()
        .with_version("24.3")
        .with_table("system", "backup_log")
        .with_rows("monitoring_dashboard_queries", vec![row([("query", "SELECT 1")])]);
    let service = service(&mock, QueryCatalog::builtin());

    let backups = service
        .execute(&InboundRequest::named(0, "backups"), ctx())
        .await
        .unwrap();
    let ad_hoc = service
        .execute(&InboundRequest::ad_hoc(0, "SELECT 1"), ctx())
        .await
        .unwrap();
    assert_eq!(backups.status, 200);
    assert_eq!(ad_hoc.status, 200);

    let calls = mock.calls();
    assert_eq!(calls.len(), 5);
    for sql in &calls {
        assert!(sql.starts_with(TRACE_COMMENT), "untagged query: {sql}");
    }
    assert_eq!(mock.calls_matching("version()"), 1);
    assert_eq!(mock.calls_matching("FROM system.tables"), 1);
    assert_eq!(mock.calls_matching("monitoring_dashboard_queries"), 1);
}
