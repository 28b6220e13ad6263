//! Per-room delivery status.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Which delivery mechanism a room is using.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[non_exhaustive]
pub enum DeliveryMode {
    /// No subscription exists for the room.
    #[default]
    Unsubscribed,

    /// Waiting for the push transport to confirm.
    Probing,

    /// Messages arrive through the push transport.
    Pushing,

    /// Messages are fetched on an interval from the store.
    Polling,
}

impl DeliveryMode {
    /// Returns `true` if messages are currently being delivered.
    pub fn is_delivering(&self) -> bool {
        matches!(self, DeliveryMode::Pushing | DeliveryMode::Polling)
    }

    /// Returns `true` if the room has a live subscription in any state.
    pub fn is_subscribed(&self) -> bool {
        !matches!(self, DeliveryMode::Unsubscribed)
    }
}

impl std::fmt::Display for DeliveryMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeliveryMode::Unsubscribed => write!(f, "unsubscribed"),
            DeliveryMode::Probing => write!(f, "probing"),
            DeliveryMode::Pushing => write!(f, "pushing"),
            DeliveryMode::Polling => write!(f, "polling"),
        }
    }
}

/// Snapshot of a room subscription, for diagnostics and tests.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionStatus {
    /// Current delivery mode
    pub mode: DeliveryMode,

    /// Recovery attempts made since the room last fell back to polling
    pub retry_count: u32,

    /// Automatic recovery gave up; the room polls until re-subscribed
    pub recovery_exhausted: bool,

    /// Creation time of the newest message observed for the room
    pub last_observed: Option<DateTime<Utc>>,

    /// Messages handed to the subscriber so far
    pub delivered: u64,
}

impl SubscriptionStatus {
    /// Status of a room nobody is subscribed to.
    pub fn unsubscribed() -> Self {
        Self::default()
    }

    /// Initial status of a fresh subscription.
    pub fn probing() -> Self {
        Self {
            mode: DeliveryMode::Probing,
            ..Self::default()
        }
    }

    /// Returns `true` when the caller may want to show a
    /// "realtime unavailable, refreshing periodically" indicator.
    pub fn is_degraded(&self) -> bool {
        self.mode == DeliveryMode::Polling && self.recovery_exhausted
    }
}
