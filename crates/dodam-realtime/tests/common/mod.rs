//! Common test utilities and harness for realtime integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use dodam_core::memory::{InMemoryHub, StaticIdentity};
use dodam_core::{
    DeliveryMode, Error, IdentityProvider, Message, PushStream, PushTransport, RealtimeConfig,
    Result, RoomId, SubscriptionStatus, UserId,
};
use dodam_realtime::{RealtimeClient, Subscriber};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

/// Room every harness member belongs to.
pub fn general() -> RoomId {
    RoomId::new("general")
}

/// The signed-in user of the default harness.
pub fn alice() -> UserId {
    UserId::new("alice")
}

/// Test harness wiring a client to an in-memory hub.
pub struct TestHarness {
    /// Message store and, unless replaced, push transport
    pub hub: Arc<InMemoryHub>,
    /// Identity the client sends as
    pub identity: Arc<StaticIdentity>,
    /// Client under test
    pub client: RealtimeClient,
}

impl TestHarness {
    /// Default config, hub as transport, alice signed in and a member of
    /// `general`.
    pub fn new() -> Self {
        Self::with_config(RealtimeConfig::default())
    }

    /// Like [`TestHarness::new`] with a custom config.
    pub fn with_config(config: RealtimeConfig) -> Self {
        let hub = Arc::new(InMemoryHub::new());
        Self::build(hub.clone(), hub, StaticIdentity::signed_in("alice"), config)
    }

    /// Uses `transport` for push instead of the hub.
    pub fn with_transport(transport: Arc<dyn PushTransport>, hub: Arc<InMemoryHub>) -> Self {
        Self::build(
            hub,
            transport,
            StaticIdentity::signed_in("alice"),
            RealtimeConfig::default(),
        )
    }

    /// Nobody is signed in.
    pub fn anonymous() -> Self {
        let hub = Arc::new(InMemoryHub::new());
        Self::build(
            hub.clone(),
            hub,
            StaticIdentity::anonymous(),
            RealtimeConfig::default(),
        )
    }

    fn build(
        hub: Arc<InMemoryHub>,
        transport: Arc<dyn PushTransport>,
        identity: StaticIdentity,
        config: RealtimeConfig,
    ) -> Self {
        hub.add_member(&general(), &alice());
        let identity = Arc::new(identity);
        let client = RealtimeClient::new(
            hub.clone(),
            transport,
            identity.clone() as Arc<dyn IdentityProvider>,
            config,
        );
        Self {
            hub,
            identity,
            client,
        }
    }

    /// Waits (in paused time) until `room` reaches `mode`.
    pub async fn wait_for_mode(&self, room: &RoomId, mode: DeliveryMode) -> SubscriptionStatus {
        let mut rx = self
            .client
            .watch_status(room)
            .expect("room should be subscribed");
        let status = tokio::time::timeout(Duration::from_secs(3600), rx.wait_for(|s| s.mode == mode))
            .await
            .expect("timed out waiting for mode")
            .expect("status channel closed");
        status.clone()
    }

    /// Inserts a message as alice straight into the store.
    pub async fn insert(&self, room: &RoomId, content: &str) -> Message {
        use dodam_core::{MessageStore, OutgoingMessage};
        self.hub
            .insert(OutgoingMessage::text(content).into_new(room.clone(), alice()))
            .await
            .unwrap()
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

/// Lets spawned workers run without moving time meaningfully.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(10)).await;
}

/// Short name of an error variant.
pub fn error_kind(err: &Error) -> &'static str {
    match err {
        Error::AuthUnavailable => "auth_unavailable",
        Error::NotMember { .. } => "not_member",
        Error::Validation { .. } => "validation",
        Error::TransportRejected { .. } => "transport_rejected",
        Error::TransportTimeout { .. } => "transport_timeout",
        Error::TransportClosed { .. } => "transport_closed",
        Error::QueryFailed { .. } => "query_failed",
        Error::Store { .. } => "store",
        Error::RecoveryExhausted { .. } => "recovery_exhausted",
        _ => "other",
    }
}

/// Collects everything a subscriber receives.
#[derive(Clone, Default)]
pub struct Recorder {
    messages: Arc<Mutex<Vec<Message>>>,
    errors: Arc<Mutex<Vec<&'static str>>>,
}

impl Recorder {
    /// A subscriber feeding this recorder.
    pub fn subscriber(&self) -> Subscriber {
        let messages = Arc::clone(&self.messages);
        let errors = Arc::clone(&self.errors);
        Subscriber::new(move |message| messages.lock().unwrap().push(message))
            .on_error(move |err| errors.lock().unwrap().push(error_kind(err)))
    }

    /// Delivered messages in delivery order.
    pub fn messages(&self) -> Vec<Message> {
        self.messages.lock().unwrap().clone()
    }

    /// Contents of delivered messages in delivery order.
    pub fn contents(&self) -> Vec<String> {
        self.messages()
            .into_iter()
            .map(|m| m.content)
            .collect()
    }

    /// Kinds of reported errors in order.
    pub fn errors(&self) -> Vec<&'static str> {
        self.errors.lock().unwrap().clone()
    }

    /// How many errors of `kind` were reported.
    pub fn count_errors(&self, kind: &str) -> usize {
        self.errors().into_iter().filter(|k| *k == kind).count()
    }
}

/// Push transport that records when each open happened and rejects all.
pub struct RecordingTransport {
    opened_at: Mutex<Vec<Instant>>,
}

impl RecordingTransport {
    /// A transport rejecting every open.
    pub fn rejecting() -> Self {
        Self {
            opened_at: Mutex::new(Vec::new()),
        }
    }

    /// Seconds from `start` to each open.
    pub fn offsets_secs(&self, start: Instant) -> Vec<u64> {
        self.opened_at
            .lock()
            .unwrap()
            .iter()
            .map(|at| at.duration_since(start).as_secs())
            .collect()
    }
}

#[async_trait]
impl PushTransport for RecordingTransport {
    async fn open(&self, room: &RoomId, _user: &UserId) -> Result<PushStream> {
        self.opened_at.lock().unwrap().push(Instant::now());
        Err(Error::transport_rejected(room.clone(), "realtime disabled"))
    }
}
