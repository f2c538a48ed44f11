//! WebSocket upgrade handler and per-connection read/write loops.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{CloseFrame, Message, WebSocket};
use axum::extract::{Path, Query, State, WebSocketUpgrade};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio::time::{self, MissedTickBehavior};

use crate::error::ApiError;
use crate::AppState;

use super::connection::{CloseReason, Connection};
use super::events::{is_ping, PONG};
use super::heartbeat::run_heartbeat;

/// Client id used when the `clientId` query parameter is absent.
pub const DEFAULT_CLIENT_ID: &str = "unknown";

/// How long the writer gets to flush a close frame after the reader ends.
const WRITER_SHUTDOWN_GRACE: Duration = Duration::from_secs(1);

pub fn router() -> Router<AppState> {
    Router::new().route("/ws/{channel}", get(ws_upgrade))
}

#[derive(Debug, Default, Deserialize)]
pub struct ConnectParams {
    #[serde(rename = "clientId", alias = "client_id")]
    pub client_id: Option<String>,
}

/// `Path` has already percent-decoded the segment; all that is left is to
/// reject names that decode to nothing.
fn normalize_channel(raw: String) -> Option<String> {
    (!raw.is_empty()).then_some(raw)
}

async fn ws_upgrade(
    ws: WebSocketUpgrade,
    Path(channel): Path<String>,
    Query(params): Query<ConnectParams>,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, ApiError> {
    let channel = normalize_channel(channel)
        .ok_or_else(|| ApiError::bad_request("Channel name must not be empty"))?;
    let client_id = params
        .client_id
        .unwrap_or_else(|| DEFAULT_CLIENT_ID.to_string());

    Ok(ws.on_upgrade(move |socket| handle_connection(socket, state, channel, client_id)))
}

async fn handle_connection(socket: WebSocket, state: AppState, channel: String, client_id: String) {
    let (ws_tx, ws_rx) = socket.split();

    let (connection, outbound_rx) =
        Connection::open(channel, client_id, state.config.outbound_queue_capacity);
    let connection = Arc::new(connection);

    let evicted = state.channels.register(connection.clone());

    tracing::info!(
        channel = %connection.channel,
        client_id = %connection.client_id,
        connection_id = %connection.id,
        replaced = evicted.len(),
        "relay connection opened"
    );

    let heartbeat_interval = state.config.heartbeat_interval;
    let mut writer = tokio::spawn(write_loop(
        connection.clone(),
        ws_tx,
        outbound_rx,
        heartbeat_interval,
    ));
    let mut reader = tokio::spawn(read_loop(
        connection.clone(),
        ws_rx,
        state.config.push_timeout,
    ));
    let heartbeat = tokio::spawn(run_heartbeat(
        connection.clone(),
        heartbeat_interval,
        state.config.heartbeat_max_missed,
    ));

    // Whichever half finishes first takes the other down with it.
    tokio::select! {
        _ = &mut writer => reader.abort(),
        _ = &mut reader => {
            connection.close(CloseReason::NORMAL);
            if time::timeout(WRITER_SHUTDOWN_GRACE, &mut writer).await.is_err() {
                writer.abort();
            }
        }
    }

    heartbeat.abort();
    let was_member = state.channels.unregister(&connection);
    connection.mark_closed();

    tracing::info!(
        channel = %connection.channel,
        client_id = %connection.client_id,
        connection_id = %connection.id,
        was_member,
        lifetime_ms = connection.connected_at.elapsed().as_millis() as u64,
        "relay connection closed"
    );
}

/// Drain the outbound queue into the socket and ping the peer every
/// `heartbeat_interval`, until the connection is told to close or the socket
/// stops accepting writes.
///
/// Every write is bounded by `heartbeat_interval` so a peer that stopped
/// reading cannot park the writer forever.
async fn write_loop(
    connection: Arc<Connection>,
    mut ws_tx: SplitSink<WebSocket, Message>,
    mut outbound_rx: mpsc::Receiver<Arc<str>>,
    heartbeat_interval: Duration,
) {
    let mut ping_ticker = time::interval(heartbeat_interval);
    ping_ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ping_ticker.tick().await;

    loop {
        tokio::select! {
            biased;

            reason = connection.close_requested() => {
                let _ = time::timeout(heartbeat_interval, send_close(&mut ws_tx, reason)).await;
                break;
            }

            frame = outbound_rx.recv() => {
                let Some(frame) = frame else { break };
                let msg = Message::Text(frame.to_string().into());
                if !send_bounded(&connection, &mut ws_tx, msg, heartbeat_interval).await {
                    break;
                }
            }

            _ = ping_ticker.tick(), if connection.is_open() => {
                let ping = Message::Ping(Default::default());
                if !send_bounded(&connection, &mut ws_tx, ping, heartbeat_interval).await {
                    break;
                }
            }
        }
    }
}

/// Write one frame, giving up after `limit`. A failed or stalled write marks
/// the connection closing and returns `false`.
async fn send_bounded(
    connection: &Connection,
    ws_tx: &mut SplitSink<WebSocket, Message>,
    msg: Message,
    limit: Duration,
) -> bool {
    match time::timeout(limit, ws_tx.send(msg)).await {
        Ok(Ok(())) => true,
        Ok(Err(e)) => {
            tracing::debug!(?e, connection_id = %connection.id, "ws write error");
            connection.mark_closing();
            false
        }
        Err(_) => {
            tracing::debug!(connection_id = %connection.id, "ws write stalled");
            connection.mark_closing();
            false
        }
    }
}

/// Keep the read side drained so close frames arrive, answering `ping` with
/// `pong` and discarding everything else. Any frame counts as a sign of life.
async fn read_loop(
    connection: Arc<Connection>,
    mut ws_rx: SplitStream<WebSocket>,
    push_timeout: Duration,
) {
    while let Some(msg) = ws_rx.next().await {
        if msg.is_ok() {
            connection.mark_alive();
        }
        let payload = match msg {
            Ok(Message::Text(text)) => text.as_str().to_owned(),
            Ok(Message::Binary(bytes)) => match std::str::from_utf8(&bytes) {
                Ok(text) => text.to_owned(),
                Err(_) => continue,
            },
            Ok(Message::Close(_)) => break,
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => continue,
            Err(e) => {
                tracing::debug!(?e, connection_id = %connection.id, "ws read error");
                connection.mark_closing();
                break;
            }
        };

        if is_ping(&payload) {
            if let Err(err) = connection.push(Arc::from(PONG), push_timeout).await {
                tracing::debug!(error = %err, connection_id = %connection.id, "pong not sent");
                break;
            }
        }
    }
}

/// Send a WebSocket close frame with a code and reason.
async fn send_close(
    ws_tx: &mut SplitSink<WebSocket, Message>,
    reason: CloseReason,
) -> Result<(), axum::Error> {
    let close_msg = Message::Close(Some(CloseFrame {
        code: reason.code,
        reason: reason.reason.to_string().into(),
    }));
    ws_tx.send(close_msg).await
}
