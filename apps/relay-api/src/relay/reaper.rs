//! Background sweep that reclaims connections whose transport died without a
//! clean close (network drops, crashed clients, proxies dropping idle sockets).

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};

use super::registry::ChannelRegistry;

/// Spawn the reaper. It runs for the life of the process.
///
/// Each sweep runs in its own task, so a panic inside one sweep is logged and
/// the schedule carries on.
pub fn spawn(registry: Arc<ChannelRegistry>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await; // First tick fires immediately; skip it.

        loop {
            ticker.tick().await;

            let sweeper = Arc::clone(&registry);
            match tokio::spawn(async move { sweeper.sweep_dead_connections() }).await {
                Ok(reaped) if !reaped.is_empty() => {
                    for conn in &reaped {
                        tracing::debug!(
                            channel = %conn.channel,
                            client_id = %conn.client_id,
                            connection_id = %conn.id,
                            state = ?conn.state(),
                            "reaped stale connection"
                        );
                    }
                    tracing::info!(
                        reaped = reaped.len(),
                        remaining = registry.connection_count(),
                        "reaper sweep removed stale connections"
                    );
                }
                Ok(_) => {}
                Err(err) => {
                    tracing::error!(?err, "reaper sweep failed");
                }
            }
        }
    })
}
