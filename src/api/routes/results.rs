//! In-memory poll results

use axum::{
    Json,
    extract::{Query, State},
    http::StatusCode,
};
use serde::Deserialize;

use crate::api::state::ApiState;
use crate::api::types::ResultsResponse;

const DEFAULT_LIMIT: usize = 100;

/// Query parameters for result listing
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultsQuery {
    device_id: Option<String>,

    /// Max results (default: 100)
    limit: Option<usize>,
}

/// GET /api/v1/results?deviceId=&limit=
///
/// Newest first.
pub async fn list_results(
    State(state): State<ApiState>,
    Query(query): Query<ResultsQuery>,
) -> Json<ResultsResponse> {
    let results = state
        .poller
        .query_results(
            query.device_id.as_deref(),
            query.limit.unwrap_or(DEFAULT_LIMIT),
        )
        .await;

    Json(ResultsResponse {
        count: results.len(),
        results,
    })
}

/// DELETE /api/v1/results
///
/// Empties the buffer only; stored metrics are kept.
pub async fn clear_results(State(state): State<ApiState>) -> StatusCode {
    state.poller.clear_results().await;
    StatusCode::NO_CONTENT
}
