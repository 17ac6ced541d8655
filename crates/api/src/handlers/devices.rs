use axum::{
    extract::{Query, State},
    Json,
};
use pollmaster_domain::entities::DeviceInput;
use serde::Deserialize;
use tracing::info;

use crate::{
    error::{ApiError, ApiResult},
    response::{created, success},
    routes::AppState,
};

/// 更新设备的请求体，id与设备字段平铺在同一层
#[derive(Debug, Deserialize)]
pub struct UpdateDeviceRequest {
    pub id: i64,
    #[serde(flatten)]
    pub input: DeviceInput,
}

#[derive(Debug, Deserialize)]
pub struct DeviceIdParams {
    pub id: i64,
}

fn validated(input: &DeviceInput) -> ApiResult<()> {
    input.validate().map_err(ApiError::BadRequest)
}

/// 获取设备列表
pub async fn list_devices(
    State(state): State<AppState>,
) -> ApiResult<impl axum::response::IntoResponse> {
    let devices = state.devices.list().await?;
    Ok(success(devices))
}

/// 创建设备
pub async fn create_device(
    State(state): State<AppState>,
    Json(input): Json<DeviceInput>,
) -> ApiResult<impl axum::response::IntoResponse> {
    validated(&input)?;
    let device = state.devices.create(&input).await?;
    info!(device_id = device.id, hostname = %device.hostname, "设备已创建");
    Ok(created(device))
}

/// 按id更新设备
pub async fn update_device(
    State(state): State<AppState>,
    Json(request): Json<UpdateDeviceRequest>,
) -> ApiResult<impl axum::response::IntoResponse> {
    validated(&request.input)?;
    let device = state.devices.update(request.id, &request.input).await?;
    info!(device_id = device.id, "设备已更新");
    Ok(success(device))
}

/// 按hostname创建或更新设备
pub async fn upsert_device(
    State(state): State<AppState>,
    Json(input): Json<DeviceInput>,
) -> ApiResult<impl axum::response::IntoResponse> {
    validated(&input)?;
    let device = state.devices.upsert(&input).await?;
    Ok(success(device))
}

/// 删除设备
pub async fn delete_device(
    State(state): State<AppState>,
    Query(params): Query<DeviceIdParams>,
) -> ApiResult<impl axum::response::IntoResponse> {
    if !state.devices.delete(params.id).await? {
        return Err(ApiError::NotFound);
    }
    info!(device_id = params.id, "设备已删除");
    Ok(success(params.id))
}
