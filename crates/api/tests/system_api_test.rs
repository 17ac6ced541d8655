mod common;

use std::sync::Arc;

use axum::http::StatusCode;
use metrics_exporter_prometheus::PrometheusBuilder;
use pollmaster_dispatcher::LeaderCoordinator;
use pollmaster_infrastructure::{DispatchMetrics, InMemoryLeaseService};

use common::{json, TestApp};

#[tokio::test]
async fn test_check_reports_master_when_standalone() {
    let app = TestApp::new().await;

    let (status, bytes) = app.get("/r/check").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json(&bytes), serde_json::json!({"state": "master"}));
}

#[tokio::test]
async fn test_check_reports_slave_before_lease() {
    let lease = Arc::new(InMemoryLeaseService::new());
    let leader = LeaderCoordinator::new(lease, 9, "127.0.0.1:8080", DispatchMetrics::new());
    let app = TestApp::with(leader, None).await;

    let (_, bytes) = app.get("/r/check").await;
    assert_eq!(json(&bytes)["state"], "slave");
}

#[tokio::test]
async fn test_debug_level_read_and_set() {
    let app = TestApp::new().await;

    let (status, bytes) = app.get("/-/debug").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(bytes, b"level=0");

    let (status, _) = app.post_form("/-/debug", "level=2").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(app.log_level.level(), 2);

    let (status, _) = app.get("/-/debug?level=1").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(app.log_level.level(), 1);

    let (_, bytes) = app.get("/-/debug").await;
    assert_eq!(bytes, b"level=1");
}

#[tokio::test]
async fn test_invalid_debug_level_is_rejected() {
    let app = TestApp::new().await;

    let (status, bytes) = app.get("/-/debug?level=7").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(bytes, b"invalid debug level 7");

    let (status, _) = app.post_form("/-/debug", "level=verbose").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(app.log_level.level(), 0);
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let app = TestApp::new().await;
    let (status, _) = app.get("/metrics").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let handle = PrometheusBuilder::new().build_recorder().handle();
    let leader = LeaderCoordinator::standalone("127.0.0.1:8080", DispatchMetrics::new());
    let app = TestApp::with(leader, Some(handle)).await;
    let (status, _) = app.get("/metrics").await;
    assert_eq!(status, StatusCode::OK);
}
