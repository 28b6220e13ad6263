//! Handing messages to subscribers.
//!
//! Every message and error for a room passes through a [`Delivery`], which
//! owns the subscriber callbacks, the room's published status, and a
//! [`DeliveryGate`]. Closing the gate is how unsubscribe guarantees that no
//! callback runs after it returns.

use chrono::{DateTime, Utc};
use dodam_core::{Error, Message, MessageId, RoomId, SubscriptionStatus};
use std::cell::Cell;
use std::collections::{HashSet, VecDeque};
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::watch;

/// Callback receiving each delivered message.
pub type MessageCallback = Arc<dyn Fn(Message) + Send + Sync>;

/// Callback receiving non-fatal delivery problems.
pub type ErrorCallback = Arc<dyn Fn(&Error) + Send + Sync>;

/// The receiving end of a room subscription.
///
/// Callbacks run on the room's worker task. They must not block for long
/// and must not unsubscribe their own room synchronously: unsubscribe waits
/// for the running callback, so calling it from inside that callback never
/// returns (debug builds panic instead). Spawn a task for it:
///
/// ```no_run
/// use dodam_realtime::{RealtimeClient, Subscriber};
///
/// fn leave_on_command(client: &RealtimeClient) -> Subscriber {
///     let client = client.clone();
///     Subscriber::new(move |message| {
///         if message.content == "/leave" {
///             let client = client.clone();
///             tokio::spawn(async move { client.unsubscribe(&message.room_id) });
///         }
///     })
/// }
/// ```
#[derive(Clone)]
pub struct Subscriber {
    on_message: MessageCallback,
    on_error: Option<ErrorCallback>,
}

impl Subscriber {
    /// A subscriber that only receives messages.
    pub fn new<F>(on_message: F) -> Self
    where
        F: Fn(Message) + Send + Sync + 'static,
    {
        Self {
            on_message: Arc::new(on_message),
            on_error: None,
        }
    }

    /// Also receive errors (probe failures, query failures, fallbacks).
    pub fn on_error<F>(mut self, on_error: F) -> Self
    where
        F: Fn(&Error) + Send + Sync + 'static,
    {
        self.on_error = Some(Arc::new(on_error));
        self
    }
}

impl fmt::Debug for Subscriber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscriber")
            .field("on_error", &self.on_error.is_some())
            .finish_non_exhaustive()
    }
}

thread_local! {
    /// Address of the gate whose callback is running on this thread.
    static PASSING: Cell<usize> = const { Cell::new(0) };
}

/// Restores [`PASSING`] when a callback returns or unwinds.
struct PassingGuard(usize);

impl PassingGuard {
    fn enter(gate: usize) -> Self {
        Self(PASSING.with(|passing| passing.replace(gate)))
    }
}

impl Drop for PassingGuard {
    fn drop(&mut self) {
        PASSING.with(|passing| passing.set(self.0));
    }
}

/// Open/closed switch held for the duration of every callback.
#[derive(Debug)]
pub struct DeliveryGate {
    open: Mutex<bool>,
}

impl DeliveryGate {
    /// A new, open gate.
    pub fn new() -> Self {
        Self {
            open: Mutex::new(true),
        }
    }

    /// Runs `f` if the gate is open, holding the gate until it returns.
    pub fn pass<R>(&self, f: impl FnOnce() -> R) -> Option<R> {
        let open = self.open.lock().unwrap_or_else(PoisonError::into_inner);
        if !*open {
            return None;
        }
        let _passing = PassingGuard::enter(self.address());
        Some(f())
    }

    /// Closes the gate, waiting for an in-flight callback to finish.
    ///
    /// Must not be called from a callback running through this gate.
    pub fn close(&self) {
        debug_assert!(
            PASSING.with(Cell::get) != self.address(),
            "a subscriber callback unsubscribed its own room"
        );
        *self.open.lock().unwrap_or_else(PoisonError::into_inner) = false;
    }

    fn address(&self) -> usize {
        std::ptr::from_ref(self) as usize
    }

    /// Whether callbacks may still run.
    pub fn is_open(&self) -> bool {
        *self.open.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for DeliveryGate {
    fn default() -> Self {
        Self::new()
    }
}

/// Delivery endpoint of one room subscription.
pub struct Delivery {
    room: RoomId,
    subscriber: Subscriber,
    gate: Arc<DeliveryGate>,
    status: watch::Sender<SubscriptionStatus>,
}

impl Delivery {
    /// Creates the endpoint in `probing` state with an open gate.
    pub fn new(room: RoomId, subscriber: Subscriber) -> Self {
        let (status, _rx) = watch::channel(SubscriptionStatus::probing());
        Self {
            room,
            subscriber,
            gate: Arc::new(DeliveryGate::new()),
            status,
        }
    }

    /// The room this endpoint serves.
    pub fn room(&self) -> &RoomId {
        &self.room
    }

    /// Shared handle to the gate.
    pub fn gate(&self) -> Arc<DeliveryGate> {
        Arc::clone(&self.gate)
    }

    /// Current status snapshot.
    pub fn status(&self) -> SubscriptionStatus {
        self.status.borrow().clone()
    }

    /// Receiver notified on every status change.
    pub fn watch(&self) -> watch::Receiver<SubscriptionStatus> {
        self.status.subscribe()
    }

    /// Mutates the published status.
    pub fn update_status(&self, f: impl FnOnce(&mut SubscriptionStatus)) {
        self.status.send_modify(f);
    }

    /// Publishes the cursor position.
    pub fn record_progress(&self, cursor: &RoomCursor) {
        let observed = cursor.last_observed();
        self.status.send_if_modified(|status| {
            if status.last_observed == Some(observed) {
                false
            } else {
                status.last_observed = Some(observed);
                true
            }
        });
    }

    /// Hands `message` to the subscriber. Returns `false` if the gate is
    /// closed and nothing was delivered.
    pub fn deliver(&self, message: Message) -> bool {
        let delivered = self
            .gate
            .pass(|| (self.subscriber.on_message)(message))
            .is_some();
        if delivered {
            self.status.send_modify(|status| status.delivered += 1);
        }
        delivered
    }

    /// Reports a non-fatal problem to the subscriber, if it listens.
    pub fn report(&self, error: &Error) {
        if let Some(on_error) = &self.subscriber.on_error {
            self.gate.pass(|| on_error(error));
        }
    }
}

impl fmt::Debug for Delivery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Delivery")
            .field("room", &self.room)
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}

/// Read position of a room: newest observed timestamp plus a bounded
/// window of recently seen message IDs.
///
/// `last_observed` never moves backwards.
#[derive(Debug, Clone)]
pub struct RoomCursor {
    last_observed: DateTime<Utc>,
    seen: HashSet<MessageId>,
    order: VecDeque<MessageId>,
    window: usize,
}

impl RoomCursor {
    /// Starts reading after `since`, remembering up to `window` IDs.
    pub fn new(since: DateTime<Utc>, window: usize) -> Self {
        let window = window.max(1);
        Self {
            last_observed: since,
            seen: HashSet::with_capacity(window),
            order: VecDeque::with_capacity(window),
            window,
        }
    }

    /// Newest timestamp observed so far.
    pub fn last_observed(&self) -> DateTime<Utc> {
        self.last_observed
    }

    /// Records `id`; returns `false` if it was already seen.
    pub fn first_sighting(&mut self, id: MessageId) -> bool {
        if !self.seen.insert(id) {
            return false;
        }
        self.order.push_back(id);
        if self.order.len() > self.window {
            if let Some(evicted) = self.order.pop_front() {
                self.seen.remove(&evicted);
            }
        }
        true
    }

    /// Decides whether `message` is new to this cursor.
    ///
    /// Anything older than `last_observed` was already covered; a message
    /// at exactly `last_observed` is new only if its ID is not in the
    /// window. Admitted IDs are recorded.
    pub fn admit(&mut self, message: &Message) -> bool {
        if message.created_at < self.last_observed {
            return false;
        }
        self.first_sighting(message.id)
    }

    /// Moves the cursor forward to `timestamp`; older values are ignored.
    pub fn advance_to(&mut self, timestamp: DateTime<Utc>) {
        if timestamp > self.last_observed {
            self.last_observed = timestamp;
        }
    }
}
