//! Allow-list gate tests through the full service.

use std::sync::Arc;
use std::time::Duration;

use db_lookout::classify::ErrorKind;
use db_lookout::clock::ManualClock;
use db_lookout::config::AllowListConfig;
use db_lookout::db::{row, MockTransport};
use db_lookout::error::LookoutError;
use db_lookout::hosts::{Credentials, HostConfig, StaticHostRegistry};
use db_lookout::response::ResponseContext;
use db_lookout::service::{DataService, InboundRequest};

const TABLE: &str = "monitoring_dashboard_queries";
const LISTED: &str = "SELECT count() FROM system.parts";

fn registry() -> Arc<StaticHostRegistry> {
    Arc::new(StaticHostRegistry::new(vec![HostConfig::new(
        0,
        "http://ch-0:8123",
        Credentials::default(),
    )]))
}

fn ctx() -> ResponseContext {
    ResponseContext::new("/api/v1/custom", "POST")
}

#[tokio::test]
async fn test_listed_query_runs_and_list_is_cached() {
    let mock = MockTransport::new()
        .with_rows(TABLE, vec![row([("query", LISTED)])])
        .with_rows("system.parts", vec![row([("count()", 42)])]);
    let service = DataService::builder(registry(), Arc::new(mock.clone())).build();

    for _ in 0..3 {
        let response = service
            .execute(&InboundRequest::ad_hoc(0, LISTED), ctx())
            .await
            .unwrap();
        assert_eq!(response.status, 200);
    }

    assert_eq!(mock.calls_matching(TABLE), 1);
    assert_eq!(mock.calls_matching("system.parts"), 3);
}

#[tokio::test]
async fn test_unlisted_query_is_permission_error() {
    let mock = MockTransport::new().with_rows(TABLE, vec![row([("query", LISTED)])]);
    let service = DataService::builder(registry(), Arc::new(mock.clone())).build();

    let response = service
        .execute(&InboundRequest::ad_hoc(0, "DROP TABLE system.parts"), ctx())
        .await
        .unwrap();

    assert_eq!(response.status, 403);
    assert_eq!(response.body.error.unwrap().kind, ErrorKind::PermissionError);
    assert_eq!(mock.calls_matching("DROP TABLE"), 0);
}

#[tokio::test]
async fn test_unreachable_list_denies() {
    let mock = MockTransport::new()
        .with_failure(TABLE, LookoutError::connection("Connection refused"));
    let service = DataService::builder(registry(), Arc::new(mock.clone())).build();

    let response = service
        .execute(&InboundRequest::ad_hoc(0, LISTED), ctx())
        .await
        .unwrap();

    assert_eq!(response.status, 403);
    assert_eq!(mock.calls_matching("system.parts"), 0);
}

#[tokio::test]
async fn test_list_refetched_after_ttl() {
    let mock = MockTransport::new().with_rows(TABLE, vec![row([("query", LISTED)])]);
    let clock = ManualClock::new();
    let service = DataService::builder(registry(), Arc::new(mock.clone()))
        .clock(Arc::new(clock.clone()))
        .allow_list_ttl(Duration::from_secs(60))
        .build();

    let request = InboundRequest::ad_hoc(0, LISTED);
    service.execute(&request, ctx()).await.unwrap();
    clock.advance(Duration::from_secs(59));
    service.execute(&request, ctx()).await.unwrap();
    assert_eq!(mock.calls_matching(TABLE), 1);

    clock.advance(Duration::from_secs(2));
    service.execute(&request, ctx()).await.unwrap();
    assert_eq!(mock.calls_matching(TABLE), 2);
}

#[tokio::test]
async fn test_custom_source_table() {
    let source = AllowListConfig {
        table: "dashboards.allowed".to_string(),
        column: "sql_text".to_string(),
    };
    let mock = MockTransport::new().with_rows("dashboards.allowed", vec![row([("query", LISTED)])]);
    let service = DataService::builder(registry(), Arc::new(mock.clone()))
        .allow_list_source(source)
        .build();

    let response = service
        .execute(&InboundRequest::ad_hoc(0, LISTED), ctx())
        .await
        .unwrap();

    assert_eq!(response.status, 200);
    assert_eq!(
        mock.calls_matching("SELECT sql_text AS query FROM dashboards.allowed"),
        1
    );
}

#[tokio::test]
async fn test_named_queries_bypass_the_gate() {
    let mock = MockTransport::new();
    let service = DataService::builder(registry(), Arc::new(mock.clone())).build();

    let response = service
        .execute(&InboundRequest::named(0, "disks"), ctx())
        .await
        .unwrap();

    assert_eq!(response.status, 200);
    assert_eq!(mock.calls_matching(TABLE), 0);
}
