#![doc = include_str!("../README.md")]
#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! Dodam Core Library
//!
//! Domain types, collaborator traits, errors, and configuration shared by
//! the realtime chat client.

pub mod config;
pub mod error;
pub mod memory;
pub mod store;
pub mod types;

// Re-exports for convenience
pub use config::{RealtimeConfig, RecoveryConfig};
pub use error::{Error, Result};
pub use store::{IdentityProvider, MessageStore, PushStream, PushTransport};
pub use types::{
    DeliveryMode, Message, MessageId, MessageKind, NewMessage, OutgoingMessage, RoomId,
    SubscriptionStatus, UserId,
};
