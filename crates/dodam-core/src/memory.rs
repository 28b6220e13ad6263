//! In-memory collaborators for tests, demos, and local development.
//!
//! [`InMemoryHub`] is both a [`MessageStore`] and a [`PushTransport`]:
//! inserts are fanned out to every open push channel of the room, the same
//! way a hosted database with change feeds behaves. Faults can be injected
//! to exercise fallback and recovery paths.

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use futures::StreamExt;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError, RwLock};
use tokio::sync::broadcast;

use crate::store::{IdentityProvider, MessageStore, PushStream, PushTransport};
use crate::types::{Message, NewMessage, RoomId, UserId};
use crate::{Error, Result};

/// Buffered messages per push channel before a slow receiver lags.
const PUSH_CHANNEL_CAPACITY: usize = 256;

#[derive(Default)]
struct Faults {
    fail_opens: usize,
    reject_opens: bool,
    stall_opens: bool,
    fail_queries: usize,
    fail_inserts: usize,
}

#[derive(Default)]
struct HubState {
    messages: HashMap<RoomId, Vec<Message>>,
    members: HashMap<RoomId, HashSet<UserId>>,
    channels: HashMap<RoomId, broadcast::Sender<Message>>,
    last_created_at: Option<DateTime<Utc>>,
    faults: Faults,
}

/// Shared in-memory message store and push transport.
#[derive(Default)]
pub struct InMemoryHub {
    state: Mutex<HubState>,
    open_attempts: AtomicUsize,
    queries: AtomicUsize,
}

impl InMemoryHub {
    /// Creates an empty hub with no members and no faults.
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, HubState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers `user` as an active member of `room`.
    pub fn add_member(&self, room: &RoomId, user: &UserId) {
        self.state()
            .members
            .entry(room.clone())
            .or_default()
            .insert(user.clone());
    }

    /// Removes `user` from `room`.
    pub fn remove_member(&self, room: &RoomId, user: &UserId) {
        if let Some(members) = self.state().members.get_mut(room) {
            members.remove(user);
        }
    }

    /// All stored messages of `room`, oldest first.
    pub fn messages(&self, room: &RoomId) -> Vec<Message> {
        self.state().messages.get(room).cloned().unwrap_or_default()
    }

    /// The next `n` push opens fail with a rejection.
    pub fn fail_next_opens(&self, n: usize) {
        self.state().faults.fail_opens = n;
    }

    /// Every push open is rejected while `reject` is set.
    pub fn reject_all_opens(&self, reject: bool) {
        self.state().faults.reject_opens = reject;
    }

    /// Push opens register a channel and then never confirm.
    pub fn stall_opens(&self, stall: bool) {
        self.state().faults.stall_opens = stall;
    }

    /// The next `n` store queries fail.
    pub fn fail_next_queries(&self, n: usize) {
        self.state().faults.fail_queries = n;
    }

    /// The next `n` inserts fail.
    pub fn fail_next_inserts(&self, n: usize) {
        self.state().faults.fail_inserts = n;
    }

    /// Drops the push channel of `room`; open streams end once drained.
    pub fn close_push_channels(&self, room: &RoomId) {
        self.state().channels.remove(room);
    }

    /// Number of push streams currently registered for `room`.
    pub fn live_push_channels(&self, room: &RoomId) -> usize {
        self.state()
            .channels
            .get(room)
            .map(broadcast::Sender::receiver_count)
            .unwrap_or(0)
    }

    /// Push opens attempted so far, including failed ones.
    pub fn open_attempts(&self) -> usize {
        self.open_attempts.load(Ordering::SeqCst)
    }

    /// Store queries attempted so far, including failed ones.
    pub fn query_count(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }

    /// Strictly increasing store timestamps, even for same-instant inserts.
    fn next_timestamp(state: &mut HubState) -> DateTime<Utc> {
        let now = Utc::now();
        let stamp = match state.last_created_at {
            Some(last) if now <= last => last + ChronoDuration::microseconds(1),
            _ => now,
        };
        state.last_created_at = Some(stamp);
        stamp
    }
}

#[async_trait]
impl MessageStore for InMemoryHub {
    async fn insert(&self, message: NewMessage) -> Result<Message> {
        let mut state = self.state();
        if state.faults.fail_inserts > 0 {
            state.faults.fail_inserts -= 1;
            return Err(Error::store("injected insert failure"));
        }

        let created_at = Self::next_timestamp(&mut state);
        let stored = Message::from_new(message, created_at);
        state
            .messages
            .entry(stored.room_id.clone())
            .or_default()
            .push(stored.clone());

        if let Some(channel) = state.channels.get(&stored.room_id) {
            // No receivers is fine: nobody is pushing for this room.
            let _ = channel.send(stored.clone());
        }
        Ok(stored)
    }

    async fn query_after(
        &self,
        room: &RoomId,
        after: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Message>> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state();
        if state.faults.fail_queries > 0 {
            state.faults.fail_queries -= 1;
            return Err(Error::query("injected query failure"));
        }

        let mut found: Vec<Message> = state
            .messages
            .get(room)
            .map(|all| {
                all.iter()
                    .filter(|m| m.created_at > after)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        found.sort_by_key(|m| m.created_at);
        found.truncate(limit);
        Ok(found)
    }

    async fn is_member(&self, room: &RoomId, user: &UserId) -> Result<bool> {
        Ok(self
            .state()
            .members
            .get(room)
            .is_some_and(|members| members.contains(user)))
    }
}

#[async_trait]
impl PushTransport for InMemoryHub {
    async fn open(&self, room: &RoomId, _user: &UserId) -> Result<PushStream> {
        self.open_attempts.fetch_add(1, Ordering::SeqCst);

        let (rx, stall) = {
            let mut state = self.state();
            if state.faults.reject_opens {
                return Err(Error::transport_rejected(room.clone(), "transport disabled"));
            }
            if state.faults.fail_opens > 0 {
                state.faults.fail_opens -= 1;
                return Err(Error::transport_rejected(room.clone(), "injected open failure"));
            }
            let rx = state
                .channels
                .entry(room.clone())
                .or_insert_with(|| broadcast::channel(PUSH_CHANNEL_CAPACITY).0)
                .subscribe();
            (rx, state.faults.stall_opens)
        };

        if stall {
            // The channel is registered but confirmation never arrives.
            // Dropping this future drops `rx` and unregisters it.
            futures::future::pending::<()>().await;
        }

        let room = room.clone();
        let stream = futures::stream::unfold(rx, move |mut rx| {
            let room = room.clone();
            async move {
                match rx.recv().await {
                    Ok(message) => Some((Ok(message), rx)),
                    Err(broadcast::error::RecvError::Lagged(missed)) => Some((
                        Err(Error::transport_closed(
                            room,
                            format!("receiver lagged by {missed} messages"),
                        )),
                        rx,
                    )),
                    Err(broadcast::error::RecvError::Closed) => None,
                }
            }
        });
        Ok(stream.boxed())
    }
}

/// Identity provider with a settable current user.
#[derive(Debug, Default)]
pub struct StaticIdentity {
    user: RwLock<Option<UserId>>,
}

impl StaticIdentity {
    /// An identity provider with `user` signed in.
    pub fn signed_in(user: impl Into<UserId>) -> Self {
        Self {
            user: RwLock::new(Some(user.into())),
        }
    }

    /// An identity provider with no session.
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// Replaces the current user.
    pub fn set_user(&self, user: Option<UserId>) {
        *self.user.write().unwrap_or_else(PoisonError::into_inner) = user;
    }
}

#[async_trait]
impl IdentityProvider for StaticIdentity {
    async fn current_user(&self) -> Result<Option<UserId>> {
        Ok(self
            .user
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }
}
