//! Chat message records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::types::{MessageId, RoomId, UserId};

/// What a message carries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    /// Plain text.
    #[default]
    Text,
    /// Image attachment reference.
    Image,
    /// File attachment reference.
    File,
    /// Generated by the system (joins, leaves, notices).
    System,
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageKind::Text => write!(f, "text"),
            MessageKind::Image => write!(f, "image"),
            MessageKind::File => write!(f, "file"),
            MessageKind::System => write!(f, "system"),
        }
    }
}

/// A message as stored and delivered.
///
/// Once delivered to a subscriber only `edited` and `deleted` may change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Unique message ID
    pub id: MessageId,

    /// Room the message belongs to
    pub room_id: RoomId,

    /// Who sent it
    pub sender_id: UserId,

    /// Body text or attachment reference
    pub content: String,

    /// Message kind
    #[serde(rename = "type")]
    pub kind: MessageKind,

    /// Store-assigned creation time
    pub created_at: DateTime<Utc>,

    /// Message this one replies to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<MessageId>,

    /// Soft flag: content was edited after sending
    #[serde(default)]
    pub edited: bool,

    /// Soft flag: message was deleted after sending
    #[serde(default)]
    pub deleted: bool,
}

impl Message {
    /// Builds a stored message from an insert payload.
    pub fn from_new(new: NewMessage, created_at: DateTime<Utc>) -> Self {
        Self {
            id: MessageId::new(),
            room_id: new.room_id,
            sender_id: new.sender_id,
            content: new.content,
            kind: new.kind,
            created_at,
            reply_to: new.reply_to,
            edited: false,
            deleted: false,
        }
    }
}

/// Insert payload handed to a [`MessageStore`](crate::store::MessageStore).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewMessage {
    /// Target room
    pub room_id: RoomId,
    /// Sender identity
    pub sender_id: UserId,
    /// Body text or attachment reference
    pub content: String,
    /// Message kind
    pub kind: MessageKind,
    /// Message this one replies to
    pub reply_to: Option<MessageId>,
}

/// What a caller asks the client to send.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutgoingMessage {
    /// Body text or attachment reference
    pub content: String,
    /// Message kind
    pub kind: MessageKind,
    /// Message this one replies to
    pub reply_to: Option<MessageId>,
}

impl OutgoingMessage {
    /// A plain text message.
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            kind: MessageKind::Text,
            reply_to: None,
        }
    }

    /// Sets the message kind.
    pub fn with_kind(mut self, kind: MessageKind) -> Self {
        self.kind = kind;
        self
    }

    /// Marks this message as a reply.
    pub fn replying_to(mut self, id: MessageId) -> Self {
        self.reply_to = Some(id);
        self
    }

    /// Attaches room and sender to produce a store insert payload.
    pub fn into_new(self, room_id: RoomId, sender_id: UserId) -> NewMessage {
        NewMessage {
            room_id,
            sender_id,
            content: self.content,
            kind: self.kind,
            reply_to: self.reply_to,
        }
    }
}
