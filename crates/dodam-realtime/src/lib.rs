#![doc = include_str!("../README.md")]
#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! Dodam Realtime
//!
//! Push/poll hybrid delivery of chat messages with backoff recovery.

pub mod client;
pub mod delivery;
pub mod polling;
pub mod probe;
pub mod recovery;
mod worker;

// Re-exports for convenience
pub use client::RealtimeClient;
pub use delivery::{
    Delivery, DeliveryGate, ErrorCallback, MessageCallback, RoomCursor, Subscriber,
};
pub use polling::PollingLoop;
pub use probe::TransportProbe;
pub use recovery::RecoveryScheduler;
