use axum::{
    routing::{get, post},
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use pollmaster_dispatcher::{LeaderCoordinator, ReportIngress};
use pollmaster_domain::repositories::DeviceRepository;
use pollmaster_infrastructure::LogLevelController;
use std::sync::Arc;

use crate::handlers::{
    devices::{create_device, delete_device, list_devices, update_device, upsert_device},
    report::submit_report,
    system::{check_role, debug_level, render_metrics},
};

/// API应用状态
#[derive(Clone)]
pub struct AppState {
    pub devices: Arc<dyn DeviceRepository>,
    pub ingress: Arc<ReportIngress>,
    pub leader: Arc<LeaderCoordinator>,
    pub log_level: LogLevelController,
    /// 未启用指标时为空，`/metrics` 返回404
    pub metrics: Option<PrometheusHandle>,
}

/// 创建API路由
pub fn create_routes(state: AppState) -> Router {
    Router::new()
        // Agent上报
        .route("/r/report", post(submit_report))
        // 设备管理
        .route("/r/device/list", get(list_devices))
        .route("/r/device/create", post(create_device))
        .route("/r/device/update", post(update_device))
        .route("/r/device/upsert", post(upsert_device))
        .route("/r/device/delete", post(delete_device))
        // 运维
        .route("/r/check", get(check_role))
        .route("/-/debug", get(debug_level).post(debug_level))
        .route("/metrics", get(render_metrics))
        .with_state(state)
}
