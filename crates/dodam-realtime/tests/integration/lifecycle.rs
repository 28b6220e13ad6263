//! Integration tests for subscribe, unsubscribe, and shutdown.

use dodam_core::memory::{InMemoryHub, StaticIdentity};
use dodam_core::{DeliveryMode, RealtimeConfig, RoomId};
use dodam_realtime::RealtimeClient;
use std::sync::Arc;
use std::time::Duration;

use crate::common::{Recorder, TestHarness, alice, general, settle};

#[tokio::test(start_paused = true)]
async fn test_unsubscribe_while_polling_stops_everything() {
    let harness = TestHarness::new();
    harness.hub.reject_all_opens(true);
    let recorder = Recorder::default();

    harness.client.subscribe(general(), recorder.subscriber());
    harness.wait_for_mode(&general(), DeliveryMode::Polling).await;
    harness.client.unsubscribe(&general());

    let queries = harness.hub.query_count();
    let opens = harness.hub.open_attempts();
    harness.client.send(&general(), "unseen").await.unwrap();
    tokio::time::sleep(Duration::from_secs(300)).await;

    assert!(recorder.messages().is_empty());
    assert_eq!(recorder.errors(), vec!["transport_rejected"]);
    assert_eq!(harness.hub.query_count(), queries);
    assert_eq!(harness.hub.open_attempts(), opens);
    assert_eq!(harness.client.status(&general()).mode, DeliveryMode::Unsubscribed);
}

#[tokio::test(start_paused = true)]
async fn test_unsubscribe_while_pushing_releases_channel() {
    let harness = TestHarness::new();
    let recorder = Recorder::default();

    harness.client.subscribe(general(), recorder.subscriber());
    harness.wait_for_mode(&general(), DeliveryMode::Pushing).await;
    settle().await;
    assert_eq!(harness.hub.live_push_channels(&general()), 1);

    harness.client.unsubscribe(&general());
    harness.insert(&general(), "unseen").await;
    settle().await;

    assert!(recorder.messages().is_empty());
    assert_eq!(harness.hub.live_push_channels(&general()), 0);
}

#[tokio::test(start_paused = true)]
async fn test_unsubscribe_is_idempotent() {
    let harness = TestHarness::new();
    harness.client.subscribe(general(), Recorder::default().subscriber());
    harness.client.unsubscribe(&general());
    harness.client.unsubscribe(&general());
    assert!(harness.client.rooms().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_double_subscribe_keeps_one_mechanism() {
    let harness = TestHarness::new();
    let first = Recorder::default();
    let second = Recorder::default();

    harness.client.subscribe(general(), first.subscriber());
    harness.client.subscribe(general(), second.subscriber());
    harness.wait_for_mode(&general(), DeliveryMode::Pushing).await;
    settle().await;

    assert_eq!(harness.hub.open_attempts(), 1);
    assert_eq!(harness.hub.live_push_channels(&general()), 1);

    harness.client.send(&general(), "once").await.unwrap();
    settle().await;
    assert_eq!(first.contents(), vec!["once"]);
    assert!(second.messages().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_callbacks_never_run_inside_subscribe() {
    let harness = TestHarness::anonymous();
    let recorder = Recorder::default();

    harness.client.subscribe(general(), recorder.subscriber());
    assert!(recorder.errors().is_empty());

    settle().await;
    assert_eq!(recorder.errors(), vec!["auth_unavailable"]);
}

#[tokio::test(start_paused = true)]
async fn test_rooms_are_independent() {
    let harness = TestHarness::new();
    let random = RoomId::new("random");
    harness.hub.add_member(&random, &alice());
    let general_recorder = Recorder::default();
    let random_recorder = Recorder::default();

    harness.client.subscribe(general(), general_recorder.subscriber());
    harness.client.subscribe(random.clone(), random_recorder.subscriber());
    harness.wait_for_mode(&general(), DeliveryMode::Pushing).await;
    harness.wait_for_mode(&random, DeliveryMode::Pushing).await;
    settle().await;

    harness.hub.close_push_channels(&random);
    harness.wait_for_mode(&random, DeliveryMode::Polling).await;
    assert_eq!(harness.client.status(&general()).mode, DeliveryMode::Pushing);

    harness.client.send(&general(), "to general").await.unwrap();
    harness.client.send(&random, "to random").await.unwrap();
    tokio::time::sleep(Duration::from_secs(4)).await;

    assert_eq!(general_recorder.contents(), vec!["to general"]);
    assert_eq!(random_recorder.contents(), vec!["to random"]);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_unsubscribes_all_rooms() {
    let harness = TestHarness::new();
    let random = RoomId::new("random");
    let recorder = Recorder::default();

    harness.client.subscribe(general(), recorder.subscriber());
    harness.client.subscribe(random.clone(), recorder.subscriber());
    harness.wait_for_mode(&general(), DeliveryMode::Pushing).await;
    harness.wait_for_mode(&random, DeliveryMode::Pushing).await;

    harness.client.shutdown();
    settle().await;

    assert!(harness.client.rooms().is_empty());
    assert_eq!(harness.client.status(&random).mode, DeliveryMode::Unsubscribed);
    assert_eq!(harness.hub.live_push_channels(&general()), 0);
    assert_eq!(harness.hub.live_push_channels(&random), 0);
}

#[tokio::test(start_paused = true)]
async fn test_dropping_client_stops_workers() {
    let hub = Arc::new(InMemoryHub::new());
    let recorder = Recorder::default();
    let client = RealtimeClient::new(
        hub.clone(),
        hub.clone(),
        Arc::new(StaticIdentity::signed_in("alice")),
        RealtimeConfig::default(),
    );

    client.subscribe(general(), recorder.subscriber());
    settle().await;
    assert_eq!(hub.live_push_channels(&general()), 1);

    drop(client);
    settle().await;
    assert_eq!(hub.live_push_channels(&general()), 0);
}
