//! `simulate`: run the client against an in-memory hub.

use anyhow::{Context, Result};
use dodam_core::memory::{InMemoryHub, StaticIdentity};
use dodam_core::{Message, RealtimeConfig, RoomId, SubscriptionStatus, UserId};
use dodam_realtime::{RealtimeClient, Subscriber};
use serde::Serialize;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use crate::cli::SimulateArgs;

const SIMULATED_USER: &str = "demo";
const SEND_SPACING: Duration = Duration::from_millis(200);

/// What a simulation observed.
#[derive(Debug, Serialize)]
pub struct SimulationReport {
    pub room: RoomId,
    /// Messages the subscriber received, in delivery order.
    pub delivered: Vec<Message>,
    /// Everything reported through `on_error`.
    pub errors: Vec<String>,
    pub status: SubscriptionStatus,
}

/// Subscribes, sends `args.messages` messages, waits one poll interval,
/// and reports.
pub async fn run(config: RealtimeConfig, args: &SimulateArgs) -> Result<SimulationReport> {
    let room = RoomId::new(args.room.as_str());
    let user = UserId::new(SIMULATED_USER);

    let hub = Arc::new(InMemoryHub::new());
    hub.add_member(&room, &user);
    hub.fail_next_opens(args.push_failures);
    hub.stall_opens(args.stall_push);

    let poll_interval = config.poll_interval();
    let client = RealtimeClient::new(
        hub.clone(),
        hub.clone(),
        Arc::new(StaticIdentity::signed_in(user)),
        config,
    );

    let delivered = Arc::new(Mutex::new(Vec::new()));
    let errors = Arc::new(Mutex::new(Vec::new()));
    let subscriber = {
        let delivered = Arc::clone(&delivered);
        let errors = Arc::clone(&errors);
        Subscriber::new(move |message| {
            delivered
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(message);
        })
        .on_error(move |err| {
            errors
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(err.to_string());
        })
    };

    client.subscribe(room.clone(), subscriber);
    let mut status = client
        .watch_status(&room)
        .context("subscription vanished")?;
    status
        .wait_for(|s| s.mode.is_delivering())
        .await
        .context("room worker stopped")?;
    tracing::info!(room = %room, mode = %status.borrow().mode, "Room is delivering");

    for n in 1..=args.messages {
        client.send(&room, format!("message {n}")).await?;
        tokio::time::sleep(SEND_SPACING).await;
    }
    tokio::time::sleep(poll_interval + SEND_SPACING).await;

    let report = SimulationReport {
        status: client.status(&room),
        room,
        delivered: std::mem::take(&mut *delivered.lock().unwrap_or_else(PoisonError::into_inner)),
        errors: std::mem::take(&mut *errors.lock().unwrap_or_else(PoisonError::into_inner)),
    };
    client.shutdown();
    Ok(report)
}

/// Prints `report` as text or pretty JSON.
pub fn print_report(report: &SimulationReport, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }

    for message in &report.delivered {
        println!(
            "[{}] {}: {}",
            message.created_at.format("%H:%M:%S%.3f"),
            message.sender_id,
            message.content
        );
    }
    for error in &report.errors {
        println!("! {error}");
    }
    let status = &report.status;
    println!(
        "room={} mode={} retries={} exhausted={} delivered={}",
        report.room, status.mode, status.retry_count, status.recovery_exhausted, status.delivered
    );
    Ok(())
}
