//! The realtime client facade.

use chrono::Utc;
use dodam_core::{
    Error, IdentityProvider, Message, MessageStore, OutgoingMessage, PushTransport,
    RealtimeConfig, Result, RoomId, SubscriptionStatus,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::delivery::{Delivery, DeliveryGate, RoomCursor, Subscriber};
use crate::polling::PollingLoop;
use crate::probe::{TransportProbe, resolve_user};
use crate::recovery::RecoveryScheduler;
use crate::worker::RoomWorker;

struct RoomEntry {
    gate: Arc<DeliveryGate>,
    status: watch::Receiver<SubscriptionStatus>,
    task: JoinHandle<()>,
}

impl RoomEntry {
    fn stop(self) {
        self.gate.close();
        self.task.abort();
    }
}

struct ClientInner {
    store: Arc<dyn MessageStore>,
    identity: Arc<dyn IdentityProvider>,
    probe: TransportProbe,
    poller: PollingLoop,
    recovery: RecoveryScheduler,
    config: RealtimeConfig,
    runtime: Option<Handle>,
    rooms: Mutex<HashMap<RoomId, RoomEntry>>,
}

impl ClientInner {
    fn rooms(&self) -> MutexGuard<'_, HashMap<RoomId, RoomEntry>> {
        self.rooms.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for ClientInner {
    fn drop(&mut self) {
        let rooms = self.rooms.get_mut().unwrap_or_else(PoisonError::into_inner);
        for (_, entry) in rooms.drain() {
            entry.stop();
        }
    }
}

/// Delivers chat messages per room, over push when possible and by
/// polling otherwise.
///
/// Cloning is cheap; clones share the same subscriptions. Dropping the last
/// clone stops every room.
///
/// # Example
///
/// ```no_run
/// use dodam_core::memory::{InMemoryHub, StaticIdentity};
/// use dodam_core::RealtimeConfig;
/// use dodam_realtime::{RealtimeClient, Subscriber};
/// use std::sync::Arc;
///
/// # async fn demo() -> dodam_core::Result<()> {
/// let hub = Arc::new(InMemoryHub::new());
/// let client = RealtimeClient::new(
///     hub.clone(),
///     hub.clone(),
///     Arc::new(StaticIdentity::signed_in("alice")),
///     RealtimeConfig::default(),
/// );
///
/// client.subscribe("general", Subscriber::new(|message| println!("{}", message.content)));
/// client.send(&"general".into(), "hello").await?;
/// client.shutdown();
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct RealtimeClient {
    inner: Arc<ClientInner>,
}

impl RealtimeClient {
    /// Creates a client over the given collaborators.
    ///
    /// Room workers run on the Tokio runtime this is called from. Outside a
    /// runtime, each `subscribe` uses the runtime it is called from instead.
    pub fn new(
        store: Arc<dyn MessageStore>,
        transport: Arc<dyn PushTransport>,
        identity: Arc<dyn IdentityProvider>,
        config: RealtimeConfig,
    ) -> Self {
        let probe = TransportProbe::from_config(transport, Arc::clone(&identity), &config);
        let poller = PollingLoop::from_config(Arc::clone(&store), &config);
        let recovery = RecoveryScheduler::new(config.recovery.clone());

        Self {
            inner: Arc::new(ClientInner {
                store,
                identity,
                probe,
                poller,
                recovery,
                config,
                runtime: Handle::try_current().ok(),
                rooms: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// The configuration this client runs with.
    pub fn config(&self) -> &RealtimeConfig {
        &self.inner.config
    }

    /// Starts delivering `room` to `subscriber`.
    ///
    /// Does nothing if the room is already subscribed. The room starts in
    /// `probing`; callbacks only ever run on the room's worker task, never
    /// inside this call. Messages created before this call are not
    /// delivered.
    ///
    /// With no Tokio runtime available the room is not subscribed and the
    /// subscriber's error callback receives [`Error::Config`].
    pub fn subscribe(&self, room: impl Into<RoomId>, subscriber: Subscriber) {
        let room = room.into();
        let mut rooms = self.inner.rooms();
        if rooms.contains_key(&room) {
            debug!(room = %room, "Already subscribed");
            return;
        }

        let delivery = Delivery::new(room.clone(), subscriber);
        let runtime = self
            .inner
            .runtime
            .clone()
            .or_else(|| Handle::try_current().ok());
        let Some(runtime) = runtime else {
            warn!(room = %room, "No Tokio runtime, subscription not started");
            delivery.report(&Error::config("subscribing requires a Tokio runtime"));
            return;
        };

        let gate = delivery.gate();
        let status = delivery.watch();
        let worker = RoomWorker {
            probe: self.inner.probe.clone(),
            poller: self.inner.poller.clone(),
            recovery: self.inner.recovery.clone(),
            delivery,
        };
        let cursor = RoomCursor::new(Utc::now(), self.inner.config.dedup_window);
        let task = runtime.spawn(worker.run(cursor));

        info!(room = %room, "Subscribed");
        rooms.insert(room, RoomEntry { gate, status, task });
    }

    /// Stops delivering `room`.
    ///
    /// Once this returns no callback for the room runs again. If a callback
    /// is running it waits for it to finish, so a callback must not
    /// unsubscribe its own room directly. Idempotent.
    pub fn unsubscribe(&self, room: &RoomId) {
        let entry = self.inner.rooms().remove(room);
        match entry {
            Some(entry) => {
                entry.stop();
                info!(room = %room, "Unsubscribed");
            }
            None => debug!(room = %room, "Not subscribed"),
        }
    }

    /// Unsubscribes every room.
    pub fn shutdown(&self) {
        let entries: Vec<_> = self.inner.rooms().drain().collect();
        let count = entries.len();
        for (_, entry) in entries {
            entry.stop();
        }
        info!(rooms = count, "Realtime client shut down");
    }

    /// Sends a plain text message to `room`.
    pub async fn send(&self, room: &RoomId, content: impl Into<String>) -> Result<Message> {
        self.send_message(room, OutgoingMessage::text(content)).await
    }

    /// Sends `message` to `room` as the current user.
    ///
    /// Works the same whether the room is pushing, polling, or not
    /// subscribed at all.
    ///
    /// # Errors
    ///
    /// - [`Error::Validation`] for blank or oversized content
    /// - [`Error::AuthUnavailable`] when nobody is signed in
    /// - [`Error::NotMember`] when the sender is not an active member
    /// - any error the store returns
    pub async fn send_message(&self, room: &RoomId, message: OutgoingMessage) -> Result<Message> {
        self.validate(&message)?;

        let sender = resolve_user(self.inner.identity.as_ref()).await?;
        if !self.inner.store.is_member(room, &sender).await? {
            return Err(Error::NotMember {
                room: room.clone(),
                user: sender,
            });
        }

        let stored = self.inner.store.insert(message.into_new(room.clone(), sender)).await?;
        debug!(room = %room, id = %stored.id, "Message sent");
        Ok(stored)
    }

    fn validate(&self, message: &OutgoingMessage) -> Result<()> {
        if message.content.trim().is_empty() {
            return Err(Error::validation_field("content", "message content is empty"));
        }
        let max = self.inner.config.max_content_len;
        if message.content.chars().count() > max {
            return Err(Error::validation_field(
                "content",
                format!("message content exceeds {max} characters"),
            ));
        }
        Ok(())
    }

    /// Current status of `room`; `unsubscribed` if there is no subscription.
    pub fn status(&self, room: &RoomId) -> SubscriptionStatus {
        self.inner
            .rooms()
            .get(room)
            .map(|entry| entry.status.borrow().clone())
            .unwrap_or_default()
    }

    /// A receiver that observes every status change of `room`.
    ///
    /// Returns `None` if the room is not subscribed. The sender side closes
    /// when the room is unsubscribed.
    pub fn watch_status(&self, room: &RoomId) -> Option<watch::Receiver<SubscriptionStatus>> {
        self.inner.rooms().get(room).map(|entry| entry.status.clone())
    }

    /// Subscribed rooms, sorted.
    pub fn rooms(&self) -> Vec<RoomId> {
        let mut rooms: Vec<_> = self.inner.rooms().keys().cloned().collect();
        rooms.sort();
        rooms
    }

    /// Returns `true` if `room` has a subscription.
    pub fn is_subscribed(&self, room: &RoomId) -> bool {
        self.inner.rooms().contains_key(room)
    }
}

impl std::fmt::Debug for RealtimeClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RealtimeClient")
            .field("rooms", &self.rooms())
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}
