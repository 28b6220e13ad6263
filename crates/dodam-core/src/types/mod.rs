//! Core types for realtime chat delivery.

mod ids;
mod message;
mod proptests;
mod status;

pub use ids::{MessageId, RoomId, UserId};
pub use message::{Message, MessageKind, NewMessage, OutgoingMessage};
pub use status::{DeliveryMode, SubscriptionStatus};
