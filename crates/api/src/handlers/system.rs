use axum::{
    extract::{rejection::FormRejection, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Form, Json,
};
use pollmaster_core::config::models::MAX_LOG_LEVEL;
use pollmaster_dispatcher::Role;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::{
    error::{ApiError, ApiResult},
    routes::AppState,
};

/// `/r/check` 的响应，负载均衡器据此找到主节点
#[derive(Debug, Serialize)]
pub struct RoleState {
    pub state: Role,
}

#[derive(Debug, Default, Deserialize)]
pub struct DebugParams {
    pub level: Option<String>,
}

/// 当前节点角色
pub async fn check_role(State(state): State<AppState>) -> Json<RoleState> {
    Json(RoleState {
        state: state.leader.role(),
    })
}

/// 读取或设置日志详细级别
///
/// `level` 可以放在表单或查询参数中，表单优先。
pub async fn debug_level(
    State(state): State<AppState>,
    Query(query): Query<DebugParams>,
    form: Result<Form<DebugParams>, FormRejection>,
) -> ApiResult<Response> {
    let level = form
        .ok()
        .and_then(|Form(params)| params.level)
        .or(query.level)
        .filter(|level| !level.is_empty());

    let Some(level) = level else {
        return Ok(format!("level={}", state.log_level.level()).into_response());
    };

    let parsed = match level.parse::<u8>() {
        Ok(parsed) if parsed <= MAX_LOG_LEVEL => parsed,
        _ => {
            warn!(level = %level, "无效的日志级别");
            return Ok((
                StatusCode::BAD_REQUEST,
                format!("invalid debug level {level}"),
            )
                .into_response());
        }
    };

    state
        .log_level
        .set_level(parsed)
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    Ok(StatusCode::OK.into_response())
}

/// Prometheus文本格式指标
pub async fn render_metrics(State(state): State<AppState>) -> ApiResult<String> {
    state
        .metrics
        .as_ref()
        .map(|handle| handle.render())
        .ok_or(ApiError::NotFound)
}
