//! Per-connection state: identity, lifecycle, and the outbound frame queue.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use relay_common::id::prefix;
use relay_common::PrefixedId;
use tokio::sync::{mpsc, Notify};

/// Lifecycle of a connection. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum ConnectionState {
    Open = 0,
    Closing = 1,
    Closed = 2,
}

impl ConnectionState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Self::Open,
            1 => Self::Closing,
            _ => Self::Closed,
        }
    }
}

/// Close frame sent to the client when the server tears a connection down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CloseReason {
    pub code: u16,
    pub reason: &'static str,
}

impl CloseReason {
    /// Client disconnected on its own, or the server is shutting the socket.
    pub const NORMAL: Self = Self {
        code: 1000,
        reason: "Closed",
    };
    /// Removed by the reaper.
    pub const GOING_AWAY: Self = Self {
        code: 1001,
        reason: "Connection no longer open",
    };
    /// A newer connection with the same client id joined the channel.
    pub const REPLACED: Self = Self {
        code: 4000,
        reason: "Replaced by newer connection",
    };
}

/// Why a single push to one connection did not go through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryFailure {
    /// The connection is closing or closed.
    NotOpen,
    /// The writer task is gone, so the transport is dead.
    TransportClosed,
    /// The outbound queue stayed full for the whole push timeout.
    TimedOut,
}

impl fmt::Display for DeliveryFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotOpen => f.write_str("connection is not open"),
            Self::TransportClosed => f.write_str("transport closed"),
            Self::TimedOut => f.write_str("outbound queue full"),
        }
    }
}

impl std::error::Error for DeliveryFailure {}

/// One accepted WebSocket bound to a channel and a client id.
///
/// The socket's write half lives in a dedicated writer task; everything else
/// talks to it through the bounded queue behind [`Connection::push`].
pub struct Connection {
    /// Process-unique identity (`conn_` prefixed ULID).
    pub id: String,
    /// Channel this connection joined. Never changes.
    pub channel: String,
    /// Client-supplied identifier, used for dedup and echo suppression.
    pub client_id: String,
    pub connected_at: Instant,
    state: AtomicU8,
    /// Set by the reader on every inbound frame, cleared by the heartbeat.
    is_alive: AtomicBool,
    tx: mpsc::Sender<Arc<str>>,
    close_reason: Mutex<Option<CloseReason>>,
    close_signal: Notify,
}

impl Connection {
    /// Create an open connection and the receiving end of its outbound queue.
    /// The receiver belongs to the writer task.
    pub fn open(
        channel: impl Into<String>,
        client_id: impl Into<String>,
        queue_capacity: usize,
    ) -> (Self, mpsc::Receiver<Arc<str>>) {
        let (tx, rx) = mpsc::channel(queue_capacity.max(1));
        let connection = Self {
            id: Self::generate(),
            channel: channel.into(),
            client_id: client_id.into(),
            connected_at: Instant::now(),
            state: AtomicU8::new(ConnectionState::Open as u8),
            is_alive: AtomicBool::new(true),
            tx,
            close_reason: Mutex::new(None),
            close_signal: Notify::new(),
        };
        (connection, rx)
    }

    pub fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn is_open(&self) -> bool {
        self.state() == ConnectionState::Open
    }

    /// Whether the transport behind this connection is unusable: either a
    /// close has started or the writer task has exited.
    pub fn is_dead(&self) -> bool {
        !self.is_open() || self.tx.is_closed()
    }

    /// Record that the peer sent something.
    pub fn mark_alive(&self) {
        self.is_alive.store(true, Ordering::Relaxed);
    }

    /// Whether the peer was heard from since the previous check. Resets the flag.
    pub fn check_alive(&self) -> bool {
        self.is_alive.swap(false, Ordering::AcqRel)
    }

    /// Queue a text frame for the client, waiting at most `timeout` for room.
    pub async fn push(&self, frame: Arc<str>, timeout: Duration) -> Result<(), DeliveryFailure> {
        if !self.is_open() {
            return Err(DeliveryFailure::NotOpen);
        }
        self.tx.send_timeout(frame, timeout).await.map_err(|err| match err {
            mpsc::error::SendTimeoutError::Timeout(_) => DeliveryFailure::TimedOut,
            mpsc::error::SendTimeoutError::Closed(_) => DeliveryFailure::TransportClosed,
        })
    }

    /// Start closing the connection: the writer task sends `reason` as a
    /// close frame and exits. Only the first reason is kept.
    pub fn close(&self, reason: CloseReason) {
        self.advance(ConnectionState::Closing);
        {
            let mut slot = self.close_reason.lock();
            if slot.is_none() {
                *slot = Some(reason);
            }
        }
        self.close_signal.notify_one();
    }

    /// Record that the transport failed underneath us. No close frame is sent.
    pub fn mark_closing(&self) {
        self.advance(ConnectionState::Closing);
    }

    /// Final teardown has run.
    pub fn mark_closed(&self) {
        self.advance(ConnectionState::Closed);
    }

    /// Resolves once [`Connection::close`] has been called.
    pub async fn close_requested(&self) -> CloseReason {
        self.close_signal.notified().await;
        let reason = *self.close_reason.lock();
        reason.unwrap_or(CloseReason::NORMAL)
    }

    fn advance(&self, to: ConnectionState) {
        self.state.fetch_max(to as u8, Ordering::AcqRel);
    }
}

impl PrefixedId for Connection {
    const PREFIX: &'static str = prefix::CONNECTION;
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("channel", &self.channel)
            .field("client_id", &self.client_id)
            .field("state", &self.state())
            .finish()
    }
}
