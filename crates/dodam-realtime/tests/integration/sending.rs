//! Integration tests for sending messages.

use dodam_core::{DeliveryMode, Error, MessageKind, OutgoingMessage, RoomId};
use std::time::Duration;

use crate::common::{Recorder, TestHarness, alice, general, settle};

#[tokio::test(start_paused = true)]
async fn test_send_while_polling_returns_message() {
    let harness = TestHarness::new();
    harness.hub.reject_all_opens(true);
    let recorder = Recorder::default();

    harness.client.subscribe(general(), recorder.subscriber());
    harness.wait_for_mode(&general(), DeliveryMode::Polling).await;

    let sent = harness.client.send(&general(), "hi").await.unwrap();
    assert_eq!(sent.content, "hi");
    assert_eq!(sent.room_id, general());
    assert_eq!(sent.sender_id, alice());
    assert!(!sent.edited);
    assert!(!sent.deleted);

    tokio::time::sleep(Duration::from_secs(4)).await;
    assert_eq!(recorder.messages()[0].id, sent.id);
}

#[tokio::test(start_paused = true)]
async fn test_send_without_subscription() {
    let harness = TestHarness::new();
    let sent = harness.client.send(&general(), "fire and forget").await.unwrap();
    assert_eq!(harness.hub.messages(&general())[0].id, sent.id);
    assert_eq!(harness.hub.open_attempts(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_send_reply_while_pushing() {
    let harness = TestHarness::new();
    let recorder = Recorder::default();

    harness.client.subscribe(general(), recorder.subscriber());
    harness.wait_for_mode(&general(), DeliveryMode::Pushing).await;
    settle().await;

    let question = harness.client.send(&general(), "lunch?").await.unwrap();
    let answer = harness
        .client
        .send_message(
            &general(),
            OutgoingMessage::text("cat.png")
                .with_kind(MessageKind::Image)
                .replying_to(question.id),
        )
        .await
        .unwrap();
    settle().await;

    let delivered = recorder.messages();
    assert_eq!(delivered.len(), 2);
    assert_eq!(delivered[1].id, answer.id);
    assert_eq!(delivered[1].kind, MessageKind::Image);
    assert_eq!(delivered[1].reply_to, Some(question.id));
}

#[tokio::test(start_paused = true)]
async fn test_send_errors_reach_the_caller() {
    let harness = TestHarness::new();

    let err = harness.client.send(&general(), "").await.unwrap_err();
    assert!(matches!(err, Error::Validation { .. }));

    let err = harness
        .client
        .send(&RoomId::new("private"), "let me in")
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NotMember { .. }));

    harness.identity.set_user(None);
    let err = harness.client.send(&general(), "who am i").await.unwrap_err();
    assert!(matches!(err, Error::AuthUnavailable));
    assert!(!err.is_retryable());

    assert!(harness.hub.messages(&general()).is_empty());
}
