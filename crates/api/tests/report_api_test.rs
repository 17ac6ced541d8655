mod common;

use axum::http::StatusCode;
use pollmaster_domain::entities::DeviceInput;
use pollmaster_domain::repositories::DeviceRepository;
use serde_json::json;
use uuid::Uuid;

use common::TestApp;

#[tokio::test]
async fn test_report_releases_device_lock() {
    let app = TestApp::new().await;
    let device = app
        .store
        .create(&DeviceInput::new("core-sw-1", "10.1.0.1"))
        .await
        .unwrap();
    let token = Uuid::new_v4();
    app.locks.try_lock(device.id, token).await.unwrap();

    let report = json!({
        "dispatch_id": token,
        "agent_id": 1,
        "kind": "snmp",
        "load": 0.75,
        "results": [{"device_id": device.id, "success": true, "duration_ms": 40}]
    });
    let (status, body) = app.post_json("/r/report", report.clone()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["accepted"], 1);
    assert_eq!(body["data"]["released"], 1);
    assert_eq!(body["data"]["load_applied"], true);
    assert!(app.store.lock_of(device.id).await.is_none());
    assert_eq!(app.registry.snapshot().await[0].load, 0.75);

    // 重复上报返回成功但不重复计入
    let (status, body) = app.post_json("/r/report", report).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["duplicates"], 1);
    assert_eq!(body["data"]["load_applied"], false);
}

#[tokio::test]
async fn test_empty_report_is_bad_request() {
    let app = TestApp::new().await;

    let (status, body) = app
        .post_json(
            "/r/report",
            json!({
                "dispatch_id": Uuid::new_v4(),
                "agent_id": 1,
                "kind": "ping",
                "results": []
            }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["type"], "INVALID_REPORT");
}

#[tokio::test]
async fn test_malformed_report_is_rejected() {
    let app = TestApp::new().await;

    let (status, _) = app
        .post_json("/r/report", json!({"agent_id": "one"}))
        .await;
    assert!(status.is_client_error());
}
