//! Device CRUD and per-device actions

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};

use crate::api::error::ApiResult;
use crate::api::state::ApiState;
use crate::api::types::{DevicesResponse, PollNowResponse};
use crate::device::{Device, DeviceUpdate, NewDevice};
use crate::poller::{DeviceStatus, TestResult};

/// GET /api/v1/devices
pub async fn list_devices(State(state): State<ApiState>) -> Json<DevicesResponse> {
    let devices = state.poller.list_devices().await;
    Json(DevicesResponse {
        count: devices.len(),
        devices,
    })
}

/// POST /api/v1/devices
///
/// The server assigns an id when the body has none.
pub async fn add_device(
    State(state): State<ApiState>,
    Json(body): Json<NewDevice>,
) -> ApiResult<(StatusCode, Json<Device>)> {
    let device = state.poller.add_device(body).await?;
    Ok((StatusCode::CREATED, Json(device)))
}

/// POST /api/v1/devices/test
///
/// Connectivity check; nothing is registered or recorded.
pub async fn test_device(
    State(state): State<ApiState>,
    Json(body): Json<NewDevice>,
) -> ApiResult<Json<TestResult>> {
    Ok(Json(state.poller.test_device(body).await?))
}

/// GET /api/v1/devices/:id
pub async fn get_device(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Device>> {
    Ok(Json(state.poller.get_device(&id).await?))
}

/// PUT /api/v1/devices/:id
///
/// Partial merge; absent fields keep their value.
pub async fn update_device(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    Json(update): Json<DeviceUpdate>,
) -> ApiResult<Json<Device>> {
    Ok(Json(state.poller.update_device(&id, update).await?))
}

/// DELETE /api/v1/devices/:id
pub async fn remove_device(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    state.poller.remove_device(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/v1/devices/:id/status
pub async fn device_status(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> ApiResult<Json<DeviceStatus>> {
    Ok(Json(state.poller.device_status(&id).await?))
}

/// POST /api/v1/devices/:id/poll
pub async fn poll_now(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> ApiResult<Json<PollNowResponse>> {
    let result = state.poller.poll_now(&id).await?;
    Ok(Json(PollNowResponse {
        polled: result.is_some(),
        result,
    }))
}
