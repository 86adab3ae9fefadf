//! Stored transmitter metrics

use axum::{
    Json,
    extract::{Path, Query, State},
};
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::api::error::{ApiError, ApiResult};
use crate::api::state::ApiState;
use crate::store::{QueryRange, TransmitterMetric};

/// Query parameters for metric time range
#[derive(Debug, Deserialize)]
pub struct MetricQuery {
    /// Start time (ISO 8601 format, default: 1 hour before end)
    start: Option<DateTime<Utc>>,

    /// End time (ISO 8601 format, default: now)
    end: Option<DateTime<Utc>>,

    /// Max results
    limit: Option<usize>,
}

/// GET /api/v1/metrics/latest
///
/// One row per transmitter with its most recent sample
pub async fn latest_all(State(state): State<ApiState>) -> ApiResult<Json<Value>> {
    let metrics = state.poller.latest_metrics().await?;

    Ok(Json(json!({
        "count": metrics.len(),
        "metrics": metrics,
    })))
}

/// GET /api/v1/metrics/:transmitter_id/latest
///
/// Most recent sample, or `null`
pub async fn latest(
    State(state): State<ApiState>,
    Path(transmitter_id): Path<String>,
) -> ApiResult<Json<Option<TransmitterMetric>>> {
    Ok(Json(state.poller.latest_metric(&transmitter_id).await?))
}

/// GET /api/v1/metrics/:transmitter_id?start=&end=
///
/// Inclusive range, newest first
pub async fn range(
    State(state): State<ApiState>,
    Path(transmitter_id): Path<String>,
    Query(query): Query<MetricQuery>,
) -> ApiResult<Json<Value>> {
    let end = query.end.unwrap_or_else(Utc::now);
    let start = query.start.unwrap_or_else(|| end - Duration::hours(1));

    if start > end {
        return Err(ApiError::InvalidRequest(
            "start must not be after end".to_string(),
        ));
    }

    let metrics = state
        .poller
        .metrics_range(QueryRange {
            transmitter_id: transmitter_id.clone(),
            start,
            end,
            limit: query.limit,
        })
        .await?;

    Ok(Json(json!({
        "transmitterId": transmitter_id,
        "start": start.to_rfc3339(),
        "end": end.to_rfc3339(),
        "count": metrics.len(),
        "metrics": metrics,
    })))
}
