//! Per-room delivery task.
//!
//! A [`RoomWorker`] owns every delivery mechanism of one room. It moves
//! between push and polling, and only one of the two is alive at a time:
//! the poll loop is a future raced against recovery and is dropped the
//! moment push comes back.

use dodam_core::{DeliveryMode, Error, PushStream};
use futures::StreamExt;
use tracing::{debug, info, warn};

use crate::delivery::{Delivery, RoomCursor};
use crate::polling::PollingLoop;
use crate::probe::TransportProbe;
use crate::recovery::RecoveryScheduler;

pub(crate) struct RoomWorker {
    pub(crate) probe: TransportProbe,
    pub(crate) poller: PollingLoop,
    pub(crate) recovery: RecoveryScheduler,
    pub(crate) delivery: Delivery,
}

impl RoomWorker {
    /// Drives the room until the task is aborted.
    pub(crate) async fn run(self, mut cursor: RoomCursor) {
        let room = self.delivery.room();
        debug!(room = %room, "Probing push transport");

        let mut next_push = match self.probe.attempt(room).await {
            Ok(stream) => Some(stream),
            Err(err) => {
                info!(room = %room, error = %err, "Push unavailable, polling instead");
                self.delivery.report(&err);
                None
            }
        };

        loop {
            let stream = match next_push.take() {
                Some(stream) => stream,
                None => self.poll_until_recovered(&mut cursor).await,
            };
            self.push(stream, &mut cursor).await;
        }
    }

    /// Polls while recovery runs. Returns the restored push stream; if
    /// recovery is exhausted this polls forever.
    async fn poll_until_recovered(&self, cursor: &mut RoomCursor) -> PushStream {
        let room = self.delivery.room();
        self.delivery.update_status(|status| {
            status.mode = DeliveryMode::Polling;
            status.retry_count = 0;
            status.recovery_exhausted = false;
        });
        info!(room = %room, interval = ?self.poller.interval(), "Polling started");

        let recovery = self.recovery.run(room, |attempt| {
            self.delivery.update_status(|status| status.retry_count = attempt);
            async move {
                let result = self.probe.attempt(room).await;
                if let Err(err) = &result {
                    self.delivery.report(err);
                }
                result
            }
        });

        let recovered = tokio::select! {
            () = self.poller.run(cursor, &self.delivery) => None,
            recovered = recovery => recovered,
        };

        if let Some(stream) = recovered {
            debug!(room = %room, "Poll loop stopped");
            return stream;
        }

        let attempts = self.recovery.max_retries();
        self.delivery
            .update_status(|status| status.recovery_exhausted = true);
        self.delivery.report(&Error::RecoveryExhausted {
            room: room.clone(),
            attempts,
        });

        loop {
            self.poller.run(cursor, &self.delivery).await;
        }
    }

    /// Forwards push messages until the stream ends, then reports why.
    async fn push(&self, mut stream: PushStream, cursor: &mut RoomCursor) {
        let room = self.delivery.room();
        self.delivery.update_status(|status| {
            status.mode = DeliveryMode::Pushing;
            status.recovery_exhausted = false;
        });
        info!(room = %room, "Push delivery active");

        // Messages that landed while push was down.
        if let Err(err) = self.poller.poll_once(cursor, &self.delivery).await {
            warn!(room = %room, error = %err, "Catch-up query failed");
            self.delivery.report(&err);
        }

        let reason = loop {
            match stream.next().await {
                Some(Ok(message)) => {
                    let created_at = message.created_at;
                    // The catch-up query may already have delivered it.
                    if cursor.admit(&message) {
                        self.delivery.deliver(message);
                    }
                    cursor.advance_to(created_at);
                    self.delivery.record_progress(cursor);
                }
                Some(Err(err)) => break err.to_string(),
                None => break "push stream ended".to_string(),
            }
        };
        drop(stream);

        let err = Error::transport_closed(room.clone(), reason);
        warn!(room = %room, error = %err, "Push delivery lost, falling back to polling");
        self.delivery.report(&err);
    }
}
