//! Collaborator traits consumed by the realtime client.
//!
//! The client never talks to a database or a socket directly. It depends on
//! three capabilities, each behind a trait object so production backends and
//! the in-memory doubles in [`crate::memory`] are interchangeable:
//!
//! - [`MessageStore`]: durable, append-only messages keyed by room
//! - [`IdentityProvider`]: who the current caller is
//! - [`PushTransport`]: opens a push channel that yields new messages

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;

use crate::Result;
use crate::types::{Message, NewMessage, RoomId, UserId};

/// A live push channel for one room.
///
/// Yields messages in transport order. An `Err` item or the end of the
/// stream means the channel is gone; dropping the stream releases it.
pub type PushStream = BoxStream<'static, Result<Message>>;

/// Durable message storage.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Appends a message and returns the stored record.
    async fn insert(&self, message: NewMessage) -> Result<Message>;

    /// Messages in `room` created strictly after `after`, oldest first,
    /// at most `limit` of them.
    async fn query_after(
        &self,
        room: &RoomId,
        after: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Message>>;

    /// Whether `user` is an active member of `room`.
    async fn is_member(&self, room: &RoomId, user: &UserId) -> Result<bool>;
}

/// Source of the caller's identity.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// The signed-in user, or `None` when there is no session.
    async fn current_user(&self) -> Result<Option<UserId>>;
}

/// Push subscription transport.
#[async_trait]
pub trait PushTransport: Send + Sync {
    /// Opens a push channel for `room` on behalf of `user`.
    ///
    /// Resolves once the transport has confirmed the subscription. Callers
    /// bound the wait; if the future is dropped before it resolves, no
    /// channel may remain registered.
    async fn open(&self, room: &RoomId, user: &UserId) -> Result<PushStream>;
}
