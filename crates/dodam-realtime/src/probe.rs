//! Bounded attempts to establish push delivery.

use dodam_core::{
    Error, IdentityProvider, PushStream, PushTransport, RealtimeConfig, Result, RoomId, UserId,
};
use std::sync::Arc;
use std::time::Duration;

/// Resolves the signed-in user; any failure is [`Error::AuthUnavailable`].
pub(crate) async fn resolve_user(identity: &dyn IdentityProvider) -> Result<UserId> {
    match identity.current_user().await {
        Ok(Some(user)) => Ok(user),
        Ok(None) => Err(Error::AuthUnavailable),
        Err(err) => {
            tracing::warn!(error = %err, "Identity lookup failed");
            Err(Error::AuthUnavailable)
        }
    }
}

/// Opens push channels under a timeout.
///
/// A failed attempt never leaves a channel behind: on timeout the pending
/// open is dropped before the error is returned.
#[derive(Clone)]
pub struct TransportProbe {
    transport: Arc<dyn PushTransport>,
    identity: Arc<dyn IdentityProvider>,
    timeout: Duration,
}

impl TransportProbe {
    /// Creates a probe that waits at most `timeout` for confirmation.
    pub fn new(
        transport: Arc<dyn PushTransport>,
        identity: Arc<dyn IdentityProvider>,
        timeout: Duration,
    ) -> Self {
        Self {
            transport,
            identity,
            timeout,
        }
    }

    /// Creates a probe using `config.probe_timeout`.
    pub fn from_config(
        transport: Arc<dyn PushTransport>,
        identity: Arc<dyn IdentityProvider>,
        config: &RealtimeConfig,
    ) -> Self {
        Self::new(transport, identity, config.probe_timeout())
    }

    /// The confirmation timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Tries to open a push channel for `room`.
    ///
    /// Errors are [`Error::AuthUnavailable`], [`Error::TransportRejected`] or
    /// [`Error::TransportTimeout`]. They describe why push is unavailable;
    /// callers fall back to polling for all of them.
    pub async fn attempt(&self, room: &RoomId) -> Result<PushStream> {
        let user = resolve_user(self.identity.as_ref()).await?;

        match tokio::time::timeout(self.timeout, self.transport.open(room, &user)).await {
            Ok(Ok(stream)) => {
                tracing::debug!(room = %room, "Push subscription confirmed");
                Ok(stream)
            }
            Ok(Err(err)) if err.is_transport() => Err(err),
            Ok(Err(err)) => Err(Error::transport_rejected(room.clone(), err.to_string())),
            Err(_elapsed) => Err(Error::TransportTimeout {
                room: room.clone(),
                millis: u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX),
            }),
        }
    }
}

impl std::fmt::Debug for TransportProbe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportProbe")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}
