//! End-to-end persistence: poll → normalize → SQLite
//!
//! These tests verify that:
//! - Every recorded result lands in the store as a normalized row
//! - VSWR is derived when the device does not report it
//! - Failed polls are stored as fault rows
//! - Latest/range queries see what the poller wrote

use std::sync::Arc;

use chrono::{Duration, Utc};
use tempfile::tempdir;
use transmitter_poller::{
    MetricStatus, MetricsStore, NewDevice,
    directory::MemoryDirectory,
    snmp::{SnmpError, SnmpValue},
    store::{QueryRange, sqlite::SqliteStore},
};

use crate::helpers::*;

fn telemetry_device(id: &str) -> NewDevice {
    NewDevice {
        id: Some(id.to_string()),
        host: "10.20.0.5".to_string(),
        oids: vec![FORWARD_POWER.to_string(), REFLECTED_POWER.to_string()],
        poll_interval_ms: Some(60_000),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_poll_results_persisted_and_normalized() {
    let dir = tempdir().unwrap();
    let store: Arc<dyn MetricsStore> =
        Arc::new(SqliteStore::new(dir.path().join("metrics.db")).await.unwrap());

    let transport = MockTransport::new();
    transport.set_value(FORWARD_POWER, SnmpValue::Integer(100));
    transport.set_value(REFLECTED_POWER, SnmpValue::Integer(25));

    let poller = create_test_poller_with_store(
        transport.clone(),
        Arc::new(MemoryDirectory::new()),
        store.clone(),
    );
    poller.add_device(telemetry_device("tx-1")).await.unwrap();
    poller.poll_now("tx-1").await.unwrap().unwrap();

    let stored = eventually(|| {
        let store = store.clone();
        async move { matches!(store.latest("tx-1").await, Ok(Some(_))) }
    })
    .await;
    assert!(stored);

    let metric = poller.latest_metric("tx-1").await.unwrap().unwrap();
    assert_eq!(metric.status, MetricStatus::Active);
    assert_eq!(metric.forward_power, Some(100.0));
    assert_eq!(metric.reflected_power, Some(25.0));
    assert!((metric.vswr.unwrap() - 3.0).abs() < 1e-9);
    assert_eq!(metric.raw_data.as_ref().map(|raw| raw.len()), Some(2));
}

#[tokio::test]
async fn test_failed_polls_stored_as_faults() {
    let dir = tempdir().unwrap();
    let store: Arc<dyn MetricsStore> =
        Arc::new(SqliteStore::new(dir.path().join("metrics.db")).await.unwrap());

    let transport = MockTransport::new();
    transport.fail_with(Some(SnmpError::Timeout { attempts: 2 }));

    let poller = create_test_poller_with_store(
        transport.clone(),
        Arc::new(MemoryDirectory::new()),
        store.clone(),
    );
    poller.add_device(telemetry_device("tx-1")).await.unwrap();
    poller.add_device(telemetry_device("tx-2")).await.unwrap();
    poller.poll_now("tx-1").await.unwrap();
    poller.poll_now("tx-2").await.unwrap();

    let stored = eventually(|| {
        let poller = poller.clone();
        async move { poller.latest_metrics().await.map(|m| m.len()).unwrap_or(0) == 2 }
    })
    .await;
    assert!(stored);

    let latest = poller.latest_metrics().await.unwrap();
    assert!(latest.iter().all(|m| m.status == MetricStatus::Fault));
    assert!(latest.iter().all(|m| m.forward_power.is_none()));
    assert_eq!(
        latest[0].error_message.as_deref(),
        Some("request timed out after 2 attempt(s)")
    );
}

#[tokio::test]
async fn test_range_returns_newest_first() {
    let dir = tempdir().unwrap();
    let store: Arc<dyn MetricsStore> =
        Arc::new(SqliteStore::new(dir.path().join("metrics.db")).await.unwrap());

    let transport = MockTransport::new();
    let poller = create_test_poller_with_store(
        transport.clone(),
        Arc::new(MemoryDirectory::new()),
        store.clone(),
    );
    poller.add_device(telemetry_device("tx-1")).await.unwrap();

    for power in [100, 200, 300] {
        transport.set_value(FORWARD_POWER, SnmpValue::Integer(power));
        poller.poll_now("tx-1").await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    }

    let query = || QueryRange {
        transmitter_id: "tx-1".to_string(),
        start: Utc::now() - Duration::minutes(5),
        end: Utc::now() + Duration::minutes(5),
        limit: None,
    };

    let complete = eventually(|| {
        let poller = poller.clone();
        let query = query();
        async move { poller.metrics_range(query).await.map(|m| m.len()).unwrap_or(0) == 3 }
    })
    .await;
    assert!(complete);

    let rows = poller.metrics_range(query()).await.unwrap();
    let powers: Vec<_> = rows.iter().map(|m| m.forward_power).collect();
    assert_eq!(powers, vec![Some(300.0), Some(200.0), Some(100.0)]);
}
