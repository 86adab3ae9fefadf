//! REST API and WebSocket server for the transmitter poller
//!
//! Thin HTTP layer over [`Poller`](crate::poller::Poller); every handler maps
//! to one controller operation.
//!
//! ## Endpoints
//!
//! - `GET /api/v1/health` - Health check (never behind auth)
//! - `GET|POST /api/v1/devices` - List / add devices
//! - `POST /api/v1/devices/test` - One-shot connectivity test
//! - `GET|PUT|DELETE /api/v1/devices/:id` - Get / update / remove a device
//! - `GET /api/v1/devices/:id/status` - Online heuristic
//! - `POST /api/v1/devices/:id/poll` - Poll now
//! - `POST /api/v1/poller/start|stop`, `GET /api/v1/poller/status` - Global switch
//! - `GET|DELETE /api/v1/results` - In-memory results
//! - `GET /api/v1/metrics/latest`, `/api/v1/metrics/:id/latest`, `/api/v1/metrics/:id` - Stored metrics
//! - `WS /api/v1/stream` - Periodic live snapshot

#[cfg(feature = "api")]
pub mod error;
#[cfg(feature = "api")]
pub mod middleware;
#[cfg(feature = "api")]
pub mod routes;
#[cfg(feature = "api")]
pub mod state;
#[cfg(feature = "api")]
pub mod types;
#[cfg(feature = "api")]
pub mod websocket;

#[cfg(feature = "api")]
pub use error::{ApiError, ApiResult};
#[cfg(feature = "api")]
pub use state::ApiState;
#[cfg(feature = "api")]
pub use types::{DevicesResponse, HealthResponse, ResultsResponse, StreamSnapshot};

#[cfg(feature = "api")]
use axum::{
    Router,
    routing::{get, post},
};
use std::net::SocketAddr;
use std::sync::Arc;
#[cfg(feature = "api")]
use tracing::info;

use crate::config::ApiSection;

/// API server configuration
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Bind address (e.g., "0.0.0.0:8080")
    pub bind_addr: SocketAddr,

    /// Optional authentication token
    pub auth_token: Option<String>,

    /// Enable CORS for dashboard
    pub enable_cors: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 8080)),
            auth_token: None,
            enable_cors: true,
        }
    }
}

impl From<&ApiSection> for ApiConfig {
    fn from(section: &ApiSection) -> Self {
        Self {
            bind_addr: section.bind,
            auth_token: section.auth_token.clone(),
            enable_cors: section.enable_cors,
        }
    }
}

/// Build the full router
#[cfg(feature = "api")]
pub fn router(config: &ApiConfig, state: ApiState) -> Router {
    use tower_http::cors::{Any, CorsLayer};
    use tower_http::trace::TraceLayer;

    let health = Router::new()
        .route("/api/v1/health", get(routes::health::health_check))
        .with_state(state.clone());

    let mut app = Router::new()
        .route(
            "/api/v1/devices",
            get(routes::devices::list_devices).post(routes::devices::add_device),
        )
        .route("/api/v1/devices/test", post(routes::devices::test_device))
        .route(
            "/api/v1/devices/:id",
            get(routes::devices::get_device)
                .put(routes::devices::update_device)
                .delete(routes::devices::remove_device),
        )
        .route(
            "/api/v1/devices/:id/status",
            get(routes::devices::device_status),
        )
        .route("/api/v1/devices/:id/poll", post(routes::devices::poll_now))
        .route("/api/v1/poller/start", post(routes::poller::start))
        .route("/api/v1/poller/stop", post(routes::poller::stop))
        .route("/api/v1/poller/status", get(routes::poller::status))
        .route(
            "/api/v1/results",
            get(routes::results::list_results).delete(routes::results::clear_results),
        )
        .route("/api/v1/metrics/latest", get(routes::metrics::latest_all))
        .route(
            "/api/v1/metrics/:transmitter_id/latest",
            get(routes::metrics::latest),
        )
        .route(
            "/api/v1/metrics/:transmitter_id",
            get(routes::metrics::range),
        )
        .route("/api/v1/stream", get(websocket::websocket_handler))
        .with_state(state);

    // Add auth middleware if token provided; health stays reachable
    if let Some(token) = config.auth_token.clone() {
        app = app.layer(axum::middleware::from_fn_with_state(
            Arc::<str>::from(token),
            middleware::auth::require_token,
        ));
    }

    app = app.merge(health).layer(TraceLayer::new_for_http());

    if config.enable_cors {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
        app = app.layer(cors);
    }

    app
}

/// Spawn the API server
///
/// This starts an Axum HTTP server in a background task.
/// Returns the server's local address.
#[cfg(feature = "api")]
pub async fn spawn_api_server(config: ApiConfig, state: ApiState) -> anyhow::Result<SocketAddr> {
    info!("starting API server on {}", config.bind_addr);

    let app = router(&config, state);

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    let addr = listener.local_addr()?;

    info!("API server listening on {}", addr);

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!("API server error: {}", e);
        }
    });

    Ok(addr)
}
