//! Error types for Dodam realtime chat.

use crate::types::{RoomId, UserId};

/// Errors that can occur while sending or delivering chat messages.
///
/// All error variants are marked with `#[non_exhaustive]` to allow
/// adding new error types without breaking changes.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// No identity context is available for the caller.
    #[error("Authentication unavailable: no current user")]
    AuthUnavailable,

    /// The caller is not an active member of the room.
    #[error("User {user} is not a member of room {room}")]
    NotMember {
        /// Room the caller tried to use
        room: RoomId,
        /// Caller identity
        user: UserId,
    },

    /// Outgoing message failed validation
    #[error("Validation error: {message}")]
    Validation {
        /// Field or aspect that failed validation
        field: Option<String>,
        /// What went wrong
        message: String,
    },

    /// The push transport refused the subscription.
    #[error("Push transport rejected for room {room}: {reason}")]
    TransportRejected {
        /// Room being subscribed
        room: RoomId,
        /// Transport-provided reason
        reason: String,
    },

    /// The push transport did not confirm the subscription in time.
    #[error("Push transport for room {room} not confirmed after {millis}ms")]
    TransportTimeout {
        /// Room being subscribed
        room: RoomId,
        /// Timeout that elapsed, in milliseconds
        millis: u64,
    },

    /// A live push stream ended or errored.
    #[error("Push transport for room {room} closed: {reason}")]
    TransportClosed {
        /// Room whose stream closed
        room: RoomId,
        /// Why the stream ended
        reason: String,
    },

    /// Polling query against the message store failed
    #[error("Query failed: {message}")]
    QueryFailed {
        /// Human-readable error message
        message: String,
        /// Source error if available
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Message store write or membership lookup failed
    #[error("Store error: {message}")]
    Store {
        /// Human-readable error message
        message: String,
        /// Source error if available
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Automatic push recovery gave up; the room keeps polling.
    #[error("Push recovery for room {room} exhausted after {attempts} attempts")]
    RecoveryExhausted {
        /// Room that stays in polling mode
        room: RoomId,
        /// Number of recovery attempts made
        attempts: u32,
    },

    /// Configuration error
    #[error("Configuration error: {message}")]
    Config {
        /// What configuration is problematic
        message: String,
    },
}

/// Convenience `Result` type alias for Dodam operations.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Returns whether this error is retryable.
    ///
    /// Transport and store failures are transient; identity, membership,
    /// validation and configuration problems are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::TransportRejected { .. } => true,
            Error::TransportTimeout { .. } => true,
            Error::TransportClosed { .. } => true,
            Error::QueryFailed { .. } => true,
            Error::Store { .. } => true,
            Error::AuthUnavailable => false,
            Error::NotMember { .. } => false,
            Error::Validation { .. } => false,
            Error::RecoveryExhausted { .. } => false,
            Error::Config { .. } => false,
        }
    }

    /// Returns `true` for push transport failures, which only ever cause a
    /// fallback to polling.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Error::TransportRejected { .. }
                | Error::TransportTimeout { .. }
                | Error::TransportClosed { .. }
        )
    }

    /// Creates a transport rejection error.
    pub fn transport_rejected<S: Into<String>>(room: RoomId, reason: S) -> Self {
        Error::TransportRejected {
            room,
            reason: reason.into(),
        }
    }

    /// Creates a transport closed error.
    pub fn transport_closed<S: Into<String>>(room: RoomId, reason: S) -> Self {
        Error::TransportClosed {
            room,
            reason: reason.into(),
        }
    }

    /// Creates a new query error with a message.
    pub fn query<S: Into<String>>(message: S) -> Self {
        Error::QueryFailed {
            message: message.into(),
            source: None,
        }
    }

    /// Creates a new query error with a message and source error.
    pub fn query_with_source<S, E>(message: S, source: E) -> Self
    where
        S: Into<String>,
        E: std::error::Error + Send + Sync + 'static,
    {
        Error::QueryFailed {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Creates a new store error with a message.
    pub fn store<S: Into<String>>(message: S) -> Self {
        Error::Store {
            message: message.into(),
            source: None,
        }
    }

    /// Creates a new store error with a message and source error.
    pub fn store_with_source<S, E>(message: S, source: E) -> Self
    where
        S: Into<String>,
        E: std::error::Error + Send + Sync + 'static,
    {
        Error::Store {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Creates a new validation error.
    pub fn validation<S: Into<String>>(message: S) -> Self {
        Error::Validation {
            field: None,
            message: message.into(),
        }
    }

    /// Creates a new validation error with a field name.
    pub fn validation_field<F, M>(field: F, message: M) -> Self
    where
        F: Into<String>,
        M: Into<String>,
    {
        Error::Validation {
            field: Some(field.into()),
            message: message.into(),
        }
    }

    /// Creates a new configuration error.
    pub fn config<S: Into<String>>(message: S) -> Self {
        Error::Config {
            message: message.into(),
        }
    }
}
