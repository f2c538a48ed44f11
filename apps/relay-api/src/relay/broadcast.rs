//! Publish path: fan a message out to every member of a channel.
//!
//! The member list is snapshotted first and the registry lock is released
//! before any I/O, so slow recipients never block connects or disconnects.
//! Pushes start in snapshot order and are awaited together, so a stuck
//! recipient costs the whole broadcast at most one push timeout.
//! Delivery is best-effort: each recipient's push succeeds or fails on its
//! own and only successes are counted.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;

use super::connection::DeliveryFailure;
use super::events::PushEvent;
use super::registry::ChannelRegistry;

/// Reasons a publish is rejected before any delivery is attempted.
#[derive(Debug)]
pub enum PublishError {
    MissingChannel,
    MissingMessage,
    Encode(serde_json::Error),
}

impl fmt::Display for PublishError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingChannel => f.write_str("Missing channel"),
            Self::MissingMessage => f.write_str("Missing message"),
            Self::Encode(err) => write!(f, "Failed to encode push: {err}"),
        }
    }
}

impl std::error::Error for PublishError {}

/// Per-broadcast tally.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastOutcome {
    /// Pushes that reached a recipient's queue.
    pub sent: usize,
    /// Pushes that failed (recipient closed mid-broadcast, queue stuck).
    pub failed: usize,
    /// Recipients skipped because they originated the message.
    pub skipped: usize,
}

/// Fans messages out to channel members and keeps the cumulative push count.
pub struct Broadcaster {
    registry: Arc<ChannelRegistry>,
    push_timeout: Duration,
    messages_sent: AtomicU64,
}

impl Broadcaster {
    pub fn new(registry: Arc<ChannelRegistry>, push_timeout: Duration) -> Self {
        Self {
            registry,
            push_timeout,
            messages_sent: AtomicU64::new(0),
        }
    }

    /// Deliver `message` to every member of `channel`, except a member whose
    /// client id equals a non-empty `origin_client_id`.
    pub async fn broadcast(
        &self,
        channel: &str,
        message: &str,
        origin_client_id: Option<&str>,
    ) -> Result<BroadcastOutcome, PublishError> {
        if channel.is_empty() {
            return Err(PublishError::MissingChannel);
        }
        if message.is_empty() {
            return Err(PublishError::MissingMessage);
        }

        let frame: Arc<str> = serde_json::to_string(&PushEvent { channel, message })
            .map_err(PublishError::Encode)?
            .into();
        let origin = origin_client_id.filter(|id| !id.is_empty());

        let members = self.registry.snapshot(channel);
        let mut outcome = BroadcastOutcome::default();

        let mut recipients = Vec::with_capacity(members.len());
        for member in &members {
            if origin == Some(member.client_id.as_str()) {
                outcome.skipped += 1;
            } else {
                recipients.push(member);
            }
        }

        let results: Vec<Result<(), DeliveryFailure>> = join_all(
            recipients
                .iter()
                .map(|member| member.push(Arc::clone(&frame), self.push_timeout)),
        )
        .await;

        for (member, result) in recipients.iter().zip(results) {
            match result {
                Ok(()) => outcome.sent += 1,
                Err(err) => {
                    outcome.failed += 1;
                    tracing::debug!(
                        channel,
                        connection_id = %member.id,
                        client_id = %member.client_id,
                        error = %err,
                        "push failed"
                    );
                }
            }
        }

        self.messages_sent
            .fetch_add(outcome.sent as u64, Ordering::Relaxed);

        tracing::debug!(
            channel,
            recipients = members.len(),
            sent = outcome.sent,
            failed = outcome.failed,
            skipped = outcome.skipped,
            "broadcast complete"
        );

        Ok(outcome)
    }

    /// Successful pushes since startup.
    pub fn messages_sent(&self) -> u64 {
        self.messages_sent.load(Ordering::Relaxed)
    }
}
