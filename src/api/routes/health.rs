//! Liveness plus a one-line summary of the engine

use axum::{Json, extract::State};
use chrono::Utc;
use tracing::warn;

use crate::api::state::ApiState;
use crate::api::types::HealthResponse;

/// GET /api/v1/health
///
/// Never behind auth. Reports `degraded` when the metrics store fails its
/// check; polling itself keeps going regardless.
pub async fn health_check(State(state): State<ApiState>) -> Json<HealthResponse> {
    let poller = &state.poller;

    let store_healthy = match poller.store() {
        Some(store) => Some(match store.health_check().await {
            Ok(health) => health.healthy,
            Err(e) => {
                warn!("metrics store health check failed: {e}");
                false
            }
        }),
        None => None,
    };

    let status = if store_healthy == Some(false) {
        "degraded"
    } else {
        "ok"
    };

    Json(HealthResponse {
        status: status.to_string(),
        timestamp: Utc::now().to_rfc3339(),
        running: poller.is_running(),
        device_count: poller.list_devices().await.len(),
        store_healthy,
    })
}
