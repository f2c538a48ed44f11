//! Server-side liveness monitoring.
//!
//! The writer pings every interval and the reader marks the connection alive
//! on any inbound frame. A connection that stays silent for too many
//! intervals is moved to `Closing`, which is what the reaper looks for.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{self, MissedTickBehavior};

use super::connection::Connection;

/// Outcome of the heartbeat loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatResult {
    /// The peer stayed silent for `max_missed` intervals.
    TimedOut,
    /// The connection left `Open` for some other reason.
    Closed,
}

/// Watch `connection` until it times out or stops being open.
///
/// At each tick the alive flag is checked and cleared. `max_missed`
/// consecutive ticks without a frame from the peer mark the connection
/// closing. Values below 1 are treated as 1.
pub async fn run_heartbeat(
    connection: Arc<Connection>,
    interval: Duration,
    max_missed: u32,
) -> HeartbeatResult {
    let mut ticker = time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker.tick().await;

    let max_missed = max_missed.max(1);
    let mut missed: u32 = 0;

    loop {
        ticker.tick().await;

        if !connection.is_open() {
            return HeartbeatResult::Closed;
        }

        if connection.check_alive() {
            missed = 0;
            continue;
        }

        missed += 1;
        if missed >= max_missed {
            connection.mark_closing();
            tracing::info!(
                channel = %connection.channel,
                client_id = %connection.client_id,
                connection_id = %connection.id,
                missed,
                "relay connection stopped answering heartbeats"
            );
            return HeartbeatResult::TimedOut;
        }
    }
}
