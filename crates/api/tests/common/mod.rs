#![allow(dead_code)]

use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{header, Request, StatusCode},
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use pollmaster_api::{create_app, AppState};
use pollmaster_core::DispatchResult;
use pollmaster_domain::entities::{Agent, DispatchRequest};
use pollmaster_domain::ports::{AgentClient, AgentHealth};
use pollmaster_dispatcher::{
    AgentRegistry, DeviceLockManager, LeaderCoordinator, RegistrySettings, ReportIngress,
};
use pollmaster_infrastructure::{DispatchMetrics, InMemoryStore, LogLevelController};
use serde_json::Value;
use tower::ServiceExt;

/// HTTP测试不涉及出站请求
struct IdleAgentClient;

#[async_trait]
impl AgentClient for IdleAgentClient {
    async fn check(&self, _agent: &Agent) -> DispatchResult<AgentHealth> {
        Ok(AgentHealth { load: None })
    }

    async fn dispatch(&self, _request: &DispatchRequest) -> DispatchResult<()> {
        Ok(())
    }
}

pub struct TestApp {
    pub store: InMemoryStore,
    pub registry: Arc<AgentRegistry>,
    pub locks: Arc<DeviceLockManager>,
    pub log_level: LogLevelController,
    router: Router,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with(
            LeaderCoordinator::standalone("127.0.0.1:8080", DispatchMetrics::new()),
            None,
        )
        .await
    }

    pub async fn with(leader: LeaderCoordinator, metrics: Option<PrometheusHandle>) -> Self {
        let store = InMemoryStore::new();
        store.add_agent(Agent::new(1, "10.0.0.1", 8000)).await;

        let dispatch_metrics = DispatchMetrics::new();
        let registry = Arc::new(AgentRegistry::new(
            Arc::new(store.clone()),
            Arc::new(IdleAgentClient),
            RegistrySettings::default(),
            dispatch_metrics.clone(),
        ));
        registry.reload().await.unwrap();
        let locks = Arc::new(DeviceLockManager::new(
            Arc::new(store.clone()),
            dispatch_metrics.clone(),
        ));
        let ingress = Arc::new(ReportIngress::new(
            registry.clone(),
            locks.clone(),
            Arc::new(store.clone()),
            dispatch_metrics,
        ));

        let log_level = LogLevelController::detached(0);
        let state = AppState {
            devices: Arc::new(store.clone()),
            ingress,
            leader: Arc::new(leader),
            log_level: log_level.clone(),
            metrics,
        };

        Self {
            store,
            registry,
            locks,
            log_level,
            router: create_app(state),
        }
    }

    pub async fn send(&self, request: Request<Body>) -> (StatusCode, Vec<u8>) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, body.to_vec())
    }

    pub async fn get(&self, uri: &str) -> (StatusCode, Vec<u8>) {
        self.send(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
    }

    pub async fn post_json(&self, uri: &str, body: Value) -> (StatusCode, Value) {
        let request = Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        let (status, bytes) = self.send(request).await;
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    pub async fn post_form(&self, uri: &str, form: &str) -> (StatusCode, Vec<u8>) {
        let request = Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(form.to_string()))
            .unwrap();
        self.send(request).await
    }
}

pub fn json(bytes: &[u8]) -> Value {
    serde_json::from_slice(bytes).unwrap()
}
