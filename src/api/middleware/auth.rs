//! Bearer token gate for the operator API
//!
//! Browsers cannot set headers on a WebSocket upgrade, so `/stream` also
//! accepts the token as an `access_token` query parameter.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::{Request, State},
    http::{HeaderMap, header},
    middleware::Next,
    response::Response,
};
use tracing::debug;

use crate::api::error::ApiError;

const QUERY_TOKEN: &str = "access_token";

/// Reject requests that do not carry the configured token
pub async fn require_token(
    State(expected): State<Arc<str>>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let presented = match bearer_token(request.headers())? {
        Some(token) => Some(token.to_string()),
        None if is_stream(&request) => query_token(request.uri().query()),
        None => None,
    };

    match presented {
        None => Err(ApiError::Unauthorized(
            "missing bearer token".to_string(),
        )),
        Some(token) if token == *expected => Ok(next.run(request).await),
        Some(_) => {
            debug!(path = %request.uri().path(), "rejected request with wrong token");
            Err(ApiError::Forbidden("invalid token".to_string()))
        }
    }
}

/// `Ok(None)` when no Authorization header is present at all
fn bearer_token(headers: &HeaderMap) -> Result<Option<&str>, ApiError> {
    let Some(value) = headers.get(header::AUTHORIZATION) else {
        return Ok(None);
    };
    let value = value
        .to_str()
        .map_err(|_| ApiError::Unauthorized("malformed Authorization header".to_string()))?;

    let (scheme, token) = value.split_once(' ').unwrap_or((value, ""));
    if !scheme.eq_ignore_ascii_case("bearer") || token.trim().is_empty() {
        return Err(ApiError::Unauthorized(
            "expected Authorization: Bearer <token>".to_string(),
        ));
    }
    Ok(Some(token.trim()))
}

fn is_stream(request: &Request<Body>) -> bool {
    request.uri().path().ends_with("/stream")
}

fn query_token(query: Option<&str>) -> Option<String> {
    query?
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(key, _)| *key == QUERY_TOKEN)
        .map(|(_, value)| value.to_string())
        .filter(|value| !value.is_empty())
}
