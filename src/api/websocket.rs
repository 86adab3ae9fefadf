//! WebSocket handler for the live dashboard stream
//!
//! Every `stream_interval` the client receives a [`StreamSnapshot`] with the
//! ten most recent results and the latest stored metric per transmitter.

use axum::{
    extract::{
        State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::Response,
};
use futures::{SinkExt, stream::StreamExt};
use tokio::time::interval;
use tracing::{debug, info, warn};

use crate::api::state::ApiState;
use crate::api::types::StreamSnapshot;
use crate::poller::Poller;

const SNAPSHOT_RESULTS: usize = 10;

/// WebSocket upgrade handler
///
/// GET /api/v1/stream
pub async fn websocket_handler(ws: WebSocketUpgrade, State(state): State<ApiState>) -> Response {
    ws.on_upgrade(|socket| handle_websocket(socket, state))
}

pub async fn snapshot(poller: &Poller) -> StreamSnapshot {
    let latest_metrics = poller.latest_metrics().await.unwrap_or_else(|e| {
        warn!("latest metrics unavailable for stream: {e}");
        Vec::new()
    });

    StreamSnapshot {
        results: poller.query_results(None, SNAPSHOT_RESULTS).await,
        latest_metrics,
    }
}

async fn handle_websocket(socket: WebSocket, state: ApiState) {
    info!("WebSocket client connected");

    let (mut sender, mut receiver) = socket.split();

    let mut send_task = tokio::spawn(async move {
        let mut ticker = interval(state.stream_interval);

        loop {
            ticker.tick().await;

            let frame = snapshot(&state.poller).await;
            match serde_json::to_string(&frame) {
                Ok(text) => {
                    if sender.send(Message::Text(text)).await.is_err() {
                        debug!("WebSocket send failed, client disconnected");
                        break;
                    }
                }
                Err(e) => warn!("failed to encode snapshot: {e}"),
            }
        }
    });

    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            if let Message::Close(_) = msg {
                break;
            }
        }
    });

    // Wait for either task to finish
    tokio::select! {
        _ = (&mut send_task) => {
            recv_task.abort();
        }
        _ = (&mut recv_task) => {
            send_task.abort();
        }
    }

    info!("WebSocket client disconnected");
}
