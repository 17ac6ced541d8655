//! # Pollmaster API
//!
//! 分发器的HTTP接口，基于Axum构建。
//!
//! ## API 端点
//!
//! ### Agent上报
//! - `POST /r/report` - Agent提交轮询结果和当前负载
//!
//! ### 设备管理
//! - `GET /r/device/list` - 设备列表
//! - `POST /r/device/create` - 创建设备
//! - `POST /r/device/update` - 按id更新设备
//! - `POST /r/device/upsert` - 按hostname创建或更新
//! - `POST /r/device/delete?id=N` - 删除设备
//!
//! ### 运维
//! - `GET /r/check` - 当前角色 `{"state":"master"|"slave"}`
//! - `GET|POST /-/debug` - 读取或设置日志详细级别 (0-3)
//! - `GET /metrics` - Prometheus文本格式指标
//!
//! 上报接口在从节点上同样可用：设备锁保存在数据库中，主节点释放锁后即可继续调度。

pub mod error;
pub mod handlers;
pub mod middleware;
pub mod response;
pub mod routes;

use axum::Router;

pub use error::{ApiError, ApiResult};
pub use routes::{create_routes, AppState};

/// 创建带中间件的完整应用
pub fn create_app(state: AppState) -> Router {
    create_routes(state)
        .layer(axum::middleware::from_fn(middleware::request_logging))
        .layer(middleware::cors_layer())
        .layer(middleware::trace_layer())
}
