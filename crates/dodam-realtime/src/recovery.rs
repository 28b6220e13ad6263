//! Backoff-scheduled attempts to restore push delivery.

use dodam_core::{RecoveryConfig, Result, RoomId};
use std::future::Future;
use tokio::time::sleep;
use tracing::{debug, info, warn};

/// Schedules push re-probes on an exponential backoff.
///
/// With the default config the attempts happen 30s, 60s and 120s after
/// entering polling, measured between attempts.
#[derive(Debug, Clone)]
pub struct RecoveryScheduler {
    config: RecoveryConfig,
}

impl RecoveryScheduler {
    /// Creates a scheduler for `config`.
    pub fn new(config: RecoveryConfig) -> Self {
        Self { config }
    }

    /// Maximum number of attempts before giving up.
    pub fn max_retries(&self) -> u32 {
        self.config.max_retries
    }

    /// Runs `attempt` after each backoff delay until it succeeds.
    ///
    /// `attempt` receives the 1-based attempt number. Returns the first
    /// successful value, or `None` once every attempt has failed. Dropping
    /// the returned future cancels any pending attempt.
    pub async fn run<T, F, Fut>(&self, room: &RoomId, mut attempt: F) -> Option<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let max_retries = self.max_retries();

        for (index, delay) in self.config.backoff().enumerate() {
            let number = u32::try_from(index + 1).unwrap_or(u32::MAX);
            debug!(
                room = %room,
                attempt = number,
                max_retries,
                delay_secs = delay.as_secs_f64(),
                "Scheduling push recovery attempt"
            );
            sleep(delay).await;

            match attempt(number).await {
                Ok(value) => {
                    info!(room = %room, attempt = number, "Push recovery succeeded");
                    return Some(value);
                }
                Err(err) => {
                    warn!(
                        room = %room,
                        attempt = number,
                        max_retries,
                        error = %err,
                        "Push recovery attempt failed"
                    );
                }
            }
        }

        warn!(room = %room, max_retries, "Push recovery exhausted");
        None
    }
}
