use axum::{extract::State, Json};
use pollmaster_domain::entities::JobReport;

use crate::{error::ApiResult, response::success, routes::AppState};

/// Agent提交轮询结果
///
/// 重复或迟到的上报不会报错，结果中的计数说明了哪些被忽略。
pub async fn submit_report(
    State(state): State<AppState>,
    Json(report): Json<JobReport>,
) -> ApiResult<impl axum::response::IntoResponse> {
    let outcome = state.ingress.handle(report).await?;
    Ok(success(outcome))
}
