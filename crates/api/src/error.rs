use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use pollmaster_core::DispatchError;
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("分发器错误: {0}")]
    Dispatch(#[from] DispatchError),

    #[error("未找到资源")]
    NotFound,

    #[error("请求参数错误: {0}")]
    BadRequest(String),

    #[error("内部服务器错误: {0}")]
    Internal(String),
}

pub type ApiResult<T> = Result<T, ApiError>;

impl ApiError {
    fn parts(&self) -> (StatusCode, String, &'static str, Vec<String>) {
        match self {
            ApiError::Dispatch(DispatchError::DeviceNotFound { id }) => (
                StatusCode::NOT_FOUND,
                format!("设备 ID {} 不存在", id),
                "DEVICE_NOT_FOUND",
                vec!["使用 GET /r/device/list 查看所有设备".to_string()],
            ),
            ApiError::Dispatch(DispatchError::AgentNotFound { id }) => (
                StatusCode::NOT_FOUND,
                format!("Agent {} 不存在", id),
                "AGENT_NOT_FOUND",
                vec!["请检查设备绑定的agent_id是否已启用".to_string()],
            ),
            ApiError::Dispatch(DispatchError::InvalidReport(msg)) => (
                StatusCode::BAD_REQUEST,
                format!("上报内容无效: {}", msg),
                "INVALID_REPORT",
                vec!["上报必须包含至少一个设备结果，负载不能为负数".to_string()],
            ),
            ApiError::Dispatch(DispatchError::Configuration(msg)) => (
                StatusCode::BAD_REQUEST,
                format!("参数无效: {}", msg),
                "INVALID_PARAMS",
                Vec::new(),
            ),
            ApiError::Dispatch(DispatchError::Conflict(msg)) => (
                StatusCode::CONFLICT,
                format!("资源冲突: {}", msg),
                "CONFLICT",
                vec!["hostname必须唯一，已存在时请使用 POST /r/device/upsert".to_string()],
            ),
            ApiError::Dispatch(err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "系统内部错误".to_string(),
                "INTERNAL_ERROR",
                vec![format!("错误详情: {}", err)],
            ),
            ApiError::NotFound => (
                StatusCode::NOT_FOUND,
                "请求的资源不存在".to_string(),
                "NOT_FOUND",
                Vec::new(),
            ),
            ApiError::BadRequest(msg) => (
                StatusCode::BAD_REQUEST,
                format!("请求参数错误: {}", msg),
                "BAD_REQUEST",
                Vec::new(),
            ),
            ApiError::Internal(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "系统内部错误".to_string(),
                "INTERNAL_ERROR",
                vec![format!("错误详情: {}", msg)],
            ),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_message, error_type, suggestions) = self.parts();

        if status.is_server_error() {
            tracing::error!(error = %self, "请求处理失败");
        } else {
            tracing::debug!(error = %self, status = status.as_u16(), "请求被拒绝");
        }

        let body = Json(json!({
            "success": false,
            "error": {
                "message": error_message,
                "type": error_type,
                "code": status.as_u16(),
                "suggestions": suggestions,
                "timestamp": chrono::Utc::now().to_rfc3339(),
            }
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (
                ApiError::Dispatch(DispatchError::DeviceNotFound { id: 1 }),
                StatusCode::NOT_FOUND,
            ),
            (
                ApiError::Dispatch(DispatchError::InvalidReport("empty".to_string())),
                StatusCode::BAD_REQUEST,
            ),
            (
                ApiError::Dispatch(DispatchError::Conflict("hostname".to_string())),
                StatusCode::CONFLICT,
            ),
            (
                ApiError::Dispatch(DispatchError::DatabaseOperation("down".to_string())),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (ApiError::NotFound, StatusCode::NOT_FOUND),
            (ApiError::BadRequest("x".to_string()), StatusCode::BAD_REQUEST),
        ];

        for (error, expected) in cases {
            assert_eq!(error.into_response().status(), expected);
        }
    }
}
