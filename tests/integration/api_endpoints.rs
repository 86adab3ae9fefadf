//! Integration tests for API endpoints
//!
//! These tests verify that:
//! - Device CRUD maps onto the controller with the right status codes
//! - Poller switch and result endpoints behave as the dashboard expects
//! - Authentication middleware guards everything but health
//! - Errors come back as `{ "error": ... }`
//! - The live stream pushes snapshots at the configured interval

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::http::StatusCode;
use futures::{Stream, StreamExt};
use serde_json::{Value, json};
use tokio_tungstenite::tungstenite::{self, Message};
use transmitter_poller::{
    api::{ApiConfig, ApiState, spawn_api_server},
    directory::MemoryDirectory,
    store::{MemoryStore, MetricsStore},
};

use crate::helpers::*;

const TOKEN: &str = "test-token";

// Helper to create test API server
async fn spawn_test_api(auth_token: Option<&str>) -> (SocketAddr, Arc<MockTransport>) {
    let transport = MockTransport::new();
    let store: Arc<dyn MetricsStore> = Arc::new(MemoryStore::new());
    let poller = create_test_poller_with_store(
        transport.clone(),
        Arc::new(MemoryDirectory::new()),
        store,
    );

    let config = ApiConfig {
        bind_addr: "127.0.0.1:0".parse().unwrap(), // Random port
        auth_token: auth_token.map(String::from),
        enable_cors: true,
    };

    let addr = spawn_api_server(config, ApiState::new(poller, Duration::from_secs(1)))
        .await
        .unwrap();
    (addr, transport)
}

fn url(addr: SocketAddr, path: &str) -> String {
    format!("http://{addr}/api/v1{path}")
}

fn device_body(id: &str) -> Value {
    json!({
        "id": id,
        "host": "10.20.0.5",
        "oids": [FORWARD_POWER, REFLECTED_POWER],
    })
}

#[tokio::test]
async fn test_health_endpoint() {
    let (addr, _) = spawn_test_api(Some(TOKEN)).await;

    let response = reqwest::get(url(addr, "/health")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["storeHealthy"], true);
    assert_eq!(body["deviceCount"], 0);
}

#[tokio::test]
async fn test_auth_required() {
    let (addr, _) = spawn_test_api(Some(TOKEN)).await;
    let client = reqwest::Client::new();

    let response = client.get(url(addr, "/devices")).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = client
        .get(url(addr, "/devices"))
        .bearer_auth("wrong")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = client
        .get(url(addr, "/devices"))
        .bearer_auth(TOKEN)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_device_lifecycle() {
    let (addr, transport) = spawn_test_api(None).await;
    let client = reqwest::Client::new();

    // add with defaults
    let response = client
        .post(url(addr, "/devices"))
        .json(&device_body("tx-1"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let device: Value = response.json().await.unwrap();
    assert_eq!(device["pollInterval"], 30_000);
    assert_eq!(device["port"], 161);
    assert_eq!(device["community"], "public");
    assert_eq!(device["version"], "v2c");
    assert_eq!(device["enabled"], true);
    assert_eq!(device["lastPollTime"], Value::Null);

    // list
    let list: Value = client
        .get(url(addr, "/devices"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(list["count"], 1);
    assert_eq!(list["devices"][0]["id"], "tx-1");

    // partial update
    let updated: Value = client
        .put(url(addr, "/devices/tx-1"))
        .json(&json!({ "pollInterval": 10_000 }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(updated["pollInterval"], 10_000);
    assert_eq!(updated["host"], "10.20.0.5");
    assert_eq!(transport.opens(), 1);

    // poll now
    let poll: Value = client
        .post(url(addr, "/devices/tx-1/poll"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(poll["polled"], true);
    assert_eq!(poll["result"]["success"], true);
    assert_eq!(poll["result"]["deviceId"], "tx-1");

    // status
    let status: Value = client
        .get(url(addr, "/devices/tx-1/status"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(status["online"], true);
    assert_eq!(status["recentResults"], 1);
    assert!(status["lastPollTime"].is_string());

    // delete
    let response = client.delete(url(addr, "/devices/tx-1")).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = client.get(url(addr, "/devices/tx-1")).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body: Value = response.json().await.unwrap();
    assert!(body["error"].as_str().unwrap().contains("tx-1"));
}

#[tokio::test]
async fn test_server_assigns_id() {
    let (addr, _) = spawn_test_api(None).await;
    let client = reqwest::Client::new();

    let device: Value = client
        .post(url(addr, "/devices"))
        .json(&json!({ "host": "tx-north.example.net", "oids": [FORWARD_POWER] }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    let id = device["id"].as_str().unwrap();
    assert_eq!(id.len(), 36);
}

#[tokio::test]
async fn test_invalid_device_rejected() {
    let (addr, _) = spawn_test_api(None).await;
    let client = reqwest::Client::new();

    let response = client
        .post(url(addr, "/devices"))
        .json(&json!({ "host": "10.20.0.5", "oids": [FORWARD_POWER], "pollInterval": 0 }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = client
        .put(url(addr, "/devices/missing"))
        .json(&json!({ "enabled": false }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_test_device_endpoint() {
    let (addr, _) = spawn_test_api(None).await;
    let client = reqwest::Client::new();

    let outcome: Value = client
        .post(url(addr, "/devices/test"))
        .json(&device_body("trial"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(outcome["success"], true);
    assert_eq!(outcome["names"][FORWARD_POWER], "forwardPower");

    let status: Value = client
        .get(url(addr, "/poller/status"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(status["deviceCount"], 0);
    assert_eq!(status["resultCount"], 0);
}

#[tokio::test]
async fn test_poller_switch_and_results() {
    let (addr, _) = spawn_test_api(None).await;
    let client = reqwest::Client::new();

    let status: Value = client
        .post(url(addr, "/poller/start"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(status["running"], true);

    for id in ["tx-1", "tx-2"] {
        client
            .post(url(addr, "/devices"))
            .json(&device_body(id))
            .send()
            .await
            .unwrap();
        client
            .post(url(addr, &format!("/devices/{id}/poll")))
            .send()
            .await
            .unwrap();
    }

    let results: Value = client
        .get(url(addr, "/results?deviceId=tx-2&limit=5"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(results["count"], 1);
    assert_eq!(results["results"][0]["deviceId"], "tx-2");
    assert!(results["results"][0]["data"][FORWARD_POWER].is_object());

    let response = client.delete(url(addr, "/results")).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let results: Value = client
        .get(url(addr, "/results"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(results["count"], 0);

    let status: Value = client
        .post(url(addr, "/poller/stop"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(status["running"], false);
    assert_eq!(status["deviceCount"], 2);
}

#[tokio::test]
async fn test_metrics_endpoints() {
    let (addr, _) = spawn_test_api(None).await;
    let client = reqwest::Client::new();

    let latest: Value = client
        .get(url(addr, "/metrics/tx-1/latest"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(latest, Value::Null);

    client
        .post(url(addr, "/devices"))
        .json(&device_body("tx-1"))
        .send()
        .await
        .unwrap();
    client
        .post(url(addr, "/devices/tx-1/poll"))
        .send()
        .await
        .unwrap();

    // the store write happens in the background
    let persisted = eventually(|| {
        let client = client.clone();
        async move {
            let body: Value = client
                .get(url(addr, "/metrics/latest"))
                .send()
                .await
                .unwrap()
                .json()
                .await
                .unwrap();
            body["count"] == 1
        }
    })
    .await;
    assert!(persisted);

    let latest: Value = client
        .get(url(addr, "/metrics/tx-1/latest"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(latest["transmitterId"], "tx-1");
    assert_eq!(latest["status"], "active");
    assert_eq!(latest["forwardPower"], 42.0);

    let range: Value = client
        .get(url(addr, "/metrics/tx-1"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(range["count"], 1);

    let response = client
        .get(url(
            addr,
            "/metrics/tx-1?start=2025-01-02T00:00:00Z&end=2025-01-01T00:00:00Z",
        ))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

// Next JSON frame from the live stream
async fn next_frame<S>(stream: &mut S) -> Value
where
    S: Stream<Item = Result<Message, tungstenite::Error>> + Unpin,
{
    loop {
        let message = tokio::time::timeout(Duration::from_secs(5), stream.next())
            .await
            .expect("no frame within 5s")
            .unwrap()
            .unwrap();
        if let Message::Text(text) = message {
            return serde_json::from_str(&text).unwrap();
        }
    }
}

#[tokio::test]
async fn test_stream_pushes_snapshots() {
    let (addr, _) = spawn_test_api(None).await;
    let client = reqwest::Client::new();

    client
        .post(url(addr, "/devices"))
        .json(&device_body("tx-1"))
        .send()
        .await
        .unwrap();
    for _ in 0..12 {
        client
            .post(url(addr, "/devices/tx-1/poll"))
            .send()
            .await
            .unwrap();
    }

    let persisted = eventually(|| {
        let client = client.clone();
        async move {
            let body: Value = client
                .get(url(addr, "/metrics/latest"))
                .send()
                .await
                .unwrap()
                .json()
                .await
                .unwrap();
            body["count"] == 1
        }
    })
    .await;
    assert!(persisted);

    let (mut stream, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/api/v1/stream"))
        .await
        .unwrap();

    // the first snapshot goes out on connect
    let frame = next_frame(&mut stream).await;
    let results = frame["results"].as_array().unwrap();
    assert_eq!(results.len(), 10);
    assert!(results.iter().all(|r| r["deviceId"] == "tx-1"));
    let stamps: Vec<_> = results
        .iter()
        .map(|r| chrono::DateTime::parse_from_rfc3339(r["timestamp"].as_str().unwrap()).unwrap())
        .collect();
    for pair in stamps.windows(2) {
        assert!(pair[0] >= pair[1]);
    }
    assert_eq!(frame["latestMetrics"][0]["transmitterId"], "tx-1");

    let started = Instant::now();
    next_frame(&mut stream).await;
    assert!(started.elapsed() >= Duration::from_millis(900));
}
