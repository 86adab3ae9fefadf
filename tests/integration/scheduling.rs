//! Scheduling and gating behaviour of the whole engine
//!
//! These tests verify that:
//! - Each device polls on its own cadence
//! - Disabled and gated devices never produce results
//! - Removed devices stop polling and release their session
//! - Polls of one device never overlap

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use transmitter_poller::{DeviceUpdate, directory::MemoryDirectory};

use crate::helpers::*;

#[tokio::test]
async fn test_device_polls_at_interval() {
    let transport = MockTransport::new();
    let poller = create_test_poller(transport.clone(), Arc::new(MemoryDirectory::new()));

    // an enabled device arms itself on add
    poller.add_device(create_test_device("d1", 100)).await.unwrap();

    tokio::time::sleep(Duration::from_millis(350)).await;

    let results = poller.query_results(Some("d1"), 100).await;
    assert!(
        (3..=4).contains(&results.len()),
        "expected 3-4 results, got {}",
        results.len()
    );
    assert!(results.iter().all(|r| r.success));

    // newest first, so timestamps strictly decrease
    for pair in results.windows(2) {
        assert!(pair[0].timestamp > pair[1].timestamp);
    }

    let data = results[0].data.as_ref().unwrap();
    let keys: Vec<_> = data.keys().map(String::as_str).collect();
    assert_eq!(keys, vec![SYS_UPTIME, SYS_NAME]);

    poller.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_devices_poll_independently() {
    let transport = MockTransport::new();
    let poller = create_test_poller(transport.clone(), Arc::new(MemoryDirectory::new()));

    poller.start().await;
    poller.add_device(create_test_device("fast", 100)).await.unwrap();
    poller.add_device(create_test_device("slow", 400)).await.unwrap();

    tokio::time::sleep(Duration::from_millis(850)).await;

    assert_eq!(poller.query_results(Some("fast"), 100).await.len(), 8);
    assert_eq!(poller.query_results(Some("slow"), 100).await.len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_disabled_device_never_recorded() {
    let transport = MockTransport::new();
    let poller = create_test_poller(transport.clone(), Arc::new(MemoryDirectory::new()));

    let mut config = create_test_device("d1", 100);
    config.enabled = Some(false);

    poller.start().await;
    poller.add_device(config).await.unwrap();
    tokio::time::sleep(Duration::from_millis(500)).await;

    assert!(poller.query_results(Some("d1"), 100).await.is_empty());
    assert_eq!(transport.gets(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_disable_then_enable_resumes() {
    let transport = MockTransport::new();
    let poller = create_test_poller(transport.clone(), Arc::new(MemoryDirectory::new()));

    poller.start().await;
    poller.add_device(create_test_device("d1", 100)).await.unwrap();
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(poller.query_results(Some("d1"), 100).await.len(), 1);

    let disable = DeviceUpdate {
        enabled: Some(false),
        ..Default::default()
    };
    poller.update_device("d1", disable).await.unwrap();
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(poller.query_results(Some("d1"), 100).await.len(), 1);

    let enable = DeviceUpdate {
        enabled: Some(true),
        ..Default::default()
    };
    poller.update_device("d1", enable).await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(poller.query_results(Some("d1"), 100).await.len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_inactive_site_gates_until_reactivated() {
    let transport = MockTransport::new();
    let directory = Arc::new(MemoryDirectory::with_records(
        vec![transmitter("d2", true, Some("site-1"))],
        vec![site("site-1", false)],
    ));
    let poller = create_test_poller(transport.clone(), directory.clone());

    poller.start().await;
    poller.add_device(create_test_device("d2", 100)).await.unwrap();

    tokio::time::sleep(Duration::from_millis(450)).await;
    assert!(poller.query_results(Some("d2"), 100).await.is_empty());
    assert_eq!(transport.gets(), 0);

    directory.upsert_site(site("site-1", true)).await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(poller.query_results(Some("d2"), 100).await.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_inactive_transmitter_gates() {
    let transport = MockTransport::new();
    let directory = Arc::new(MemoryDirectory::with_records(
        vec![transmitter("d3", false, None)],
        vec![],
    ));
    let poller = create_test_poller(transport.clone(), directory.clone());

    poller.start().await;
    poller.add_device(create_test_device("d3", 100)).await.unwrap();
    tokio::time::sleep(Duration::from_millis(350)).await;
    assert_eq!(transport.gets(), 0);

    // a missing record fails open
    directory.remove_transmitter("d3").await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(transport.gets(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_removed_device_stops_polling() {
    let transport = MockTransport::new();
    let poller = create_test_poller(transport.clone(), Arc::new(MemoryDirectory::new()));

    poller.start().await;
    poller.add_device(create_test_device("d1", 100)).await.unwrap();
    tokio::time::sleep(Duration::from_millis(250)).await;

    let before = poller.query_results(Some("d1"), 100).await.len();
    poller.remove_device("d1").await.unwrap();
    tokio::time::sleep(Duration::from_millis(300)).await;

    assert_eq!(poller.query_results(Some("d1"), 100).await.len(), before);
    assert_eq!(transport.closes.load(Ordering::SeqCst), 1);
    assert!(poller.list_devices().await.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_removal_mid_poll_still_records() {
    let transport = MockTransport::new();
    transport.set_delay(Duration::from_millis(80));
    let poller = create_test_poller(transport.clone(), Arc::new(MemoryDirectory::new()));

    poller.start().await;
    poller.add_device(create_test_device("d1", 100)).await.unwrap();

    // first GET is in flight between 100ms and 180ms
    tokio::time::sleep(Duration::from_millis(130)).await;
    poller.remove_device("d1").await.unwrap();
    tokio::time::sleep(Duration::from_millis(500)).await;

    assert_eq!(poller.query_results(Some("d1"), 100).await.len(), 1);
    assert_eq!(transport.gets(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_polls_of_one_device_are_sequential() {
    let transport = MockTransport::new();
    transport.set_delay(Duration::from_millis(250));
    let poller = create_test_poller(transport.clone(), Arc::new(MemoryDirectory::new()));

    // every GET must start only after the previous result was recorded
    let recorded = Arc::new(AtomicUsize::new(0));
    let counter = recorded.clone();
    poller
        .on_result(Arc::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        }))
        .await;

    poller.start().await;
    poller.add_device(create_test_device("d1", 100)).await.unwrap();

    let poll_now = {
        let poller = poller.clone();
        tokio::spawn(async move { poller.poll_now("d1").await })
    };

    tokio::time::sleep(Duration::from_millis(2_000)).await;
    poll_now.await.unwrap().unwrap();

    assert_eq!(transport.max_in_flight.load(Ordering::SeqCst), 1);
    let gets = transport.gets();
    let recorded = recorded.load(Ordering::SeqCst);
    assert!(gets >= 2);
    assert!(recorded + 1 >= gets, "gets={gets} recorded={recorded}");
}

#[tokio::test(start_paused = true)]
async fn test_stop_halts_and_start_resumes() {
    let transport = MockTransport::new();
    let poller = create_test_poller(transport.clone(), Arc::new(MemoryDirectory::new()));

    poller.add_device(create_test_device("d1", 100)).await.unwrap();
    tokio::time::sleep(Duration::from_millis(250)).await;
    assert_eq!(transport.gets(), 2, "devices added while stopped arm themselves");

    poller.stop().await;
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(transport.gets(), 2);

    poller.start().await;
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(transport.gets(), 3);
    assert_eq!(poller.status().await.result_count, 3);
}

#[tokio::test(start_paused = true)]
async fn test_restart_mid_poll_never_overlaps() {
    let transport = MockTransport::new();
    transport.set_delay(Duration::from_millis(250));
    let poller = create_test_poller(transport.clone(), Arc::new(MemoryDirectory::new()));

    poller.start().await;
    poller.add_device(create_test_device("d1", 100)).await.unwrap();

    // first GET is in flight between 100ms and 350ms
    tokio::time::sleep(Duration::from_millis(150)).await;
    poller.stop().await;
    poller.start().await;
    tokio::time::sleep(Duration::from_millis(1_000)).await;

    assert_eq!(transport.max_in_flight.load(Ordering::SeqCst), 1);
    assert!(transport.gets() >= 3);
}

#[tokio::test(start_paused = true)]
async fn test_readd_mid_poll_never_overlaps() {
    let transport = MockTransport::new();
    transport.set_delay(Duration::from_millis(250));
    let poller = create_test_poller(transport.clone(), Arc::new(MemoryDirectory::new()));

    poller.add_device(create_test_device("d1", 100)).await.unwrap();

    tokio::time::sleep(Duration::from_millis(150)).await;
    poller.remove_device("d1").await.unwrap();
    poller.add_device(create_test_device("d1", 100)).await.unwrap();
    tokio::time::sleep(Duration::from_millis(1_000)).await;

    assert_eq!(transport.max_in_flight.load(Ordering::SeqCst), 1);
    assert!(transport.gets() >= 3);
    // the GET that was in flight during removal is still recorded
    assert!(poller.query_results(Some("d1"), 100).await.len() >= 3);
}
