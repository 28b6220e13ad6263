//! Interval polling of the message store.

use dodam_core::{Error, MessageStore, RealtimeConfig, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;

use crate::delivery::{Delivery, RoomCursor};

/// Shortest interval the loop will tick at.
const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// Fetches new messages for a room on a fixed interval.
///
/// [`PollingLoop::run`] never returns; dropping its future stops polling.
#[derive(Clone)]
pub struct PollingLoop {
    store: Arc<dyn MessageStore>,
    interval: Duration,
    batch_limit: usize,
}

impl PollingLoop {
    /// Creates a loop querying `store` every `interval`, at most
    /// `batch_limit` messages per query.
    ///
    /// A zero interval is raised to one millisecond and a zero limit to one.
    pub fn new(store: Arc<dyn MessageStore>, interval: Duration, batch_limit: usize) -> Self {
        if interval < MIN_INTERVAL {
            tracing::warn!(?interval, min = ?MIN_INTERVAL, "Poll interval too small, clamping");
        }
        Self {
            store,
            interval: interval.max(MIN_INTERVAL),
            batch_limit: batch_limit.max(1),
        }
    }

    /// Creates a loop from `poll_interval` and `poll_batch_limit`.
    pub fn from_config(store: Arc<dyn MessageStore>, config: &RealtimeConfig) -> Self {
        Self::new(store, config.poll_interval(), config.poll_batch_limit)
    }

    /// The polling interval.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Polls immediately and then once per interval, forever.
    ///
    /// Query failures are reported through `delivery` and the loop keeps
    /// going; the cursor is left where it was.
    pub async fn run(&self, cursor: &mut RoomCursor, delivery: &Delivery) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut consecutive_failures = 0u32;

        loop {
            ticker.tick().await;
            match self.poll_once(cursor, delivery).await {
                Ok(delivered) => {
                    if consecutive_failures > 0 {
                        tracing::info!(
                            room = %delivery.room(),
                            consecutive_failures,
                            "Polling recovered"
                        );
                    }
                    consecutive_failures = 0;
                    if delivered > 0 {
                        tracing::debug!(room = %delivery.room(), delivered, "Polled new messages");
                    }
                }
                Err(err) => {
                    consecutive_failures += 1;
                    tracing::warn!(
                        room = %delivery.room(),
                        consecutive_failures,
                        error = %err,
                        "Polling query failed"
                    );
                    delivery.report(&err);
                }
            }
        }
    }

    /// Fetches and delivers everything after the cursor once.
    ///
    /// Each batch is sorted by `created_at` before delivery and the cursor
    /// advances only after the whole batch went out. Full batches are
    /// followed up immediately. Returns how many messages were delivered.
    pub async fn poll_once(&self, cursor: &mut RoomCursor, delivery: &Delivery) -> Result<usize> {
        let mut delivered = 0;

        loop {
            let before = cursor.last_observed();
            let mut batch = self
                .store
                .query_after(delivery.room(), before, self.batch_limit)
                .await
                .map_err(|err| match err {
                    err @ Error::QueryFailed { .. } => err,
                    other => Error::query_with_source("polling query failed", other),
                })?;

            let full = batch.len() >= self.batch_limit;
            batch.sort_by_key(|m| m.created_at);
            let Some(newest) = batch.last().map(|m| m.created_at) else {
                break;
            };

            for message in batch {
                if cursor.admit(&message) && delivery.deliver(message) {
                    delivered += 1;
                }
            }
            cursor.advance_to(newest);
            delivery.record_progress(cursor);

            if !full || cursor.last_observed() <= before {
                break;
            }
        }

        Ok(delivered)
    }
}

impl std::fmt::Debug for PollingLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PollingLoop")
            .field("interval", &self.interval)
            .field("batch_limit", &self.batch_limit)
            .finish_non_exhaustive()
    }
}
