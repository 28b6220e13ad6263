//! Integration tests for restoring push delivery while polling.

use dodam_core::memory::InMemoryHub;
use dodam_core::{DeliveryMode, RealtimeConfig};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use crate::common::{Recorder, RecordingTransport, TestHarness, general, settle};

#[tokio::test(start_paused = true)]
async fn test_push_restored_after_first_backoff() {
    let harness = TestHarness::new();
    harness.hub.fail_next_opens(1);
    let recorder = Recorder::default();

    harness.client.subscribe(general(), recorder.subscriber());
    harness.wait_for_mode(&general(), DeliveryMode::Polling).await;
    let polling_since = Instant::now();

    let status = harness.wait_for_mode(&general(), DeliveryMode::Pushing).await;
    assert!(polling_since.elapsed() >= Duration::from_secs(30));
    assert!(polling_since.elapsed() < Duration::from_secs(31));
    assert_eq!(status.retry_count, 1);
    assert_eq!(harness.hub.open_attempts(), 2);
    settle().await;

    // The poll loop is gone: no queries while push is live.
    let queries = harness.hub.query_count();
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(harness.hub.query_count(), queries);
    assert_eq!(harness.hub.live_push_channels(&general()), 1);

    harness.client.send(&general(), "realtime").await.unwrap();
    settle().await;
    assert_eq!(recorder.contents(), vec!["realtime"]);
}

#[tokio::test(start_paused = true)]
async fn test_recovery_attempts_follow_backoff_and_stop() {
    let transport = Arc::new(RecordingTransport::rejecting());
    let harness = TestHarness::with_transport(transport.clone(), Arc::new(InMemoryHub::new()));
    let recorder = Recorder::default();

    let start = Instant::now();
    harness.client.subscribe(general(), recorder.subscriber());
    tokio::time::sleep(Duration::from_secs(600)).await;

    // Initial probe, then 30s, 60s and 120s apart.
    assert_eq!(transport.offsets_secs(start), vec![0, 30, 90, 210]);

    let status = harness.client.status(&general());
    assert_eq!(status.mode, DeliveryMode::Polling);
    assert_eq!(status.retry_count, 3);
    assert!(status.recovery_exhausted);
    assert_eq!(recorder.count_errors("transport_rejected"), 4);
    assert_eq!(recorder.count_errors("recovery_exhausted"), 1);

    // Still polling after giving up.
    harness.client.send(&general(), "late").await.unwrap();
    tokio::time::sleep(Duration::from_secs(4)).await;
    assert_eq!(recorder.contents(), vec!["late"]);
    assert_eq!(transport.offsets_secs(start).len(), 4);
}

#[tokio::test(start_paused = true)]
async fn test_backoff_is_capped() {
    let mut config = RealtimeConfig::default();
    config.recovery.max_delay_ms = 45_000;
    config.recovery.max_retries = 4;
    let harness = TestHarness::with_config(config);
    harness.hub.reject_all_opens(true);
    let recorder = Recorder::default();

    harness.client.subscribe(general(), recorder.subscriber());
    harness.wait_for_mode(&general(), DeliveryMode::Polling).await;
    let polling_since = Instant::now();

    let mut rx = harness.client.watch_status(&general()).unwrap();
    rx.wait_for(|s| s.recovery_exhausted).await.unwrap();

    // 30 + 45 + 45 + 45
    assert_eq!(polling_since.elapsed().as_secs(), 165);
    assert_eq!(harness.hub.open_attempts(), 5);
}

#[tokio::test(start_paused = true)]
async fn test_resubscribe_resets_exhausted_recovery() {
    let mut config = RealtimeConfig::default();
    config.recovery.max_retries = 1;
    let harness = TestHarness::with_config(config);
    harness.hub.reject_all_opens(true);

    harness.client.subscribe(general(), Recorder::default().subscriber());
    harness.wait_for_mode(&general(), DeliveryMode::Polling).await;
    tokio::time::sleep(Duration::from_secs(40)).await;
    assert!(harness.client.status(&general()).recovery_exhausted);

    harness.client.unsubscribe(&general());
    harness.hub.reject_all_opens(false);
    harness.client.subscribe(general(), Recorder::default().subscriber());

    let status = harness.wait_for_mode(&general(), DeliveryMode::Pushing).await;
    assert!(!status.recovery_exhausted);
    assert_eq!(status.retry_count, 0);
}
