//! Wire-format frames exchanged over the relay WebSocket.

use serde::Serialize;

/// Reply sent for a client keepalive.
pub const PONG: &str = "pong";

/// A notification pushed from the server to every member of a channel.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct PushEvent<'a> {
    pub channel: &'a str,
    pub message: &'a str,
}

/// Whether a client text frame is a keepalive `ping` (any case, surrounding
/// whitespace ignored).
pub fn is_ping(payload: &str) -> bool {
    payload.trim().eq_ignore_ascii_case("ping")
}
