//! Global poller switch

use axum::{Json, extract::State};

use crate::api::state::ApiState;
use crate::poller::PollerStatus;

/// POST /api/v1/poller/start
pub async fn start(State(state): State<ApiState>) -> Json<PollerStatus> {
    state.poller.start().await;
    Json(state.poller.status().await)
}

/// POST /api/v1/poller/stop
///
/// In-flight polls finish; no new ones are scheduled.
pub async fn stop(State(state): State<ApiState>) -> Json<PollerStatus> {
    state.poller.stop().await;
    Json(state.poller.status().await)
}

/// GET /api/v1/poller/status
pub async fn status(State(state): State<ApiState>) -> Json<PollerStatus> {
    Json(state.poller.status().await)
}
