mod common;

use std::net::SocketAddr;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::time;
use tokio_tungstenite::tungstenite;

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// Helper: open a relay WebSocket on `channel_path` (already percent-encoded).
async fn connect(addr: SocketAddr, channel_path: &str, client_id: Option<&str>) -> WsStream {
    let url = match client_id {
        Some(id) => format!("ws://{addr}/ws/{channel_path}?clientId={id}"),
        None => format!("ws://{addr}/ws/{channel_path}"),
    };
    let (ws_stream, _) = tokio_tungstenite::connect_async(&url)
        .await
        .expect("ws connect");
    ws_stream
}

/// Helper: publish through the HTTP endpoint and return the response body.
async fn publish(addr: SocketAddr, body: serde_json::Value) -> serde_json::Value {
    let client = reqwest::Client::new();
    let resp = client
        .post(format!("http://{addr}/notify"))
        .header("Authorization", common::publisher_auth())
        .json(&body)
        .send()
        .await
        .expect("notify request");
    assert!(resp.status().is_success(), "notify failed: {}", resp.status());
    resp.json().await.expect("parse notify response")
}

/// Helper: read the next text frame within a timeout.
async fn next_text(ws: &mut WsStream) -> String {
    loop {
        let msg = time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("timeout waiting for frame")
            .expect("stream ended")
            .expect("ws read error");
        match msg {
            tungstenite::Message::Text(text) => return text.to_string(),
            tungstenite::Message::Ping(_) | tungstenite::Message::Pong(_) => continue,
            other => panic!("Expected text frame, got: {other:?}"),
        }
    }
}

/// Helper: assert nothing arrives for a short while.
async fn assert_silent(ws: &mut WsStream) {
    let result = time::timeout(Duration::from_millis(200), ws.next()).await;
    assert!(result.is_err(), "unexpected frame: {result:?}");
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn publish_reaches_connected_client() {
    let (addr, state) = common::start_server().await;
    let mut ws = connect(addr, "room1", Some("a")).await;
    common::wait_for_members(&state, "room1", 1).await;

    let body = publish(addr, serde_json::json!({ "channel": "room1", "message": "hi" })).await;
    assert_eq!(body, serde_json::json!({ "status": "ok", "sent": 1 }));

    let text = next_text(&mut ws).await;
    let pushed: serde_json::Value = serde_json::from_str(&text).expect("parse push");
    assert_eq!(pushed, serde_json::json!({ "channel": "room1", "message": "hi" }));
}

#[tokio::test]
async fn reconnect_with_same_client_id_closes_prior_connection() {
    let (addr, state) = common::start_server().await;

    let mut first = connect(addr, "room1", Some("a")).await;
    common::wait_for_members(&state, "room1", 1).await;
    let first_id = state.channels.snapshot("room1")[0].id.clone();

    let mut second = connect(addr, "room1", Some("a")).await;

    // The first connection is told to go away.
    let msg = time::timeout(Duration::from_secs(5), first.next())
        .await
        .expect("timeout")
        .expect("stream ended")
        .expect("read error");
    match msg {
        tungstenite::Message::Close(Some(frame)) => {
            assert_eq!(
                frame.code,
                tungstenite::protocol::frame::coding::CloseCode::from(4000)
            );
        }
        other => panic!("Expected Close frame, got: {other:?}"),
    }

    let members = state.channels.snapshot("room1");
    assert_eq!(members.len(), 1);
    assert_ne!(members[0].id, first_id);

    let body = publish(addr, serde_json::json!({ "channel": "room1", "message": "hi" })).await;
    assert_eq!(body["sent"], 1);
    let text = next_text(&mut second).await;
    assert!(text.contains("\"hi\""));
}

#[tokio::test]
async fn publisher_does_not_receive_its_own_message() {
    let (addr, state) = common::start_server().await;
    let mut a = connect(addr, "room1", Some("a")).await;
    let mut b = connect(addr, "room1", Some("b")).await;
    common::wait_for_members(&state, "room1", 2).await;

    let body = publish(
        addr,
        serde_json::json!({ "channel": "room1", "message": "hi", "originClientId": "a" }),
    )
    .await;
    assert_eq!(body["sent"], 1);

    let text = next_text(&mut b).await;
    assert!(text.contains("\"room1\""));
    assert_silent(&mut a).await;
}

#[tokio::test]
async fn ping_gets_pong_in_any_case() {
    let (addr, state) = common::start_server().await;
    let mut ws = connect(addr, "room1", Some("a")).await;
    common::wait_for_members(&state, "room1", 1).await;

    for ping in ["ping", "PING", "  PiNg \n"] {
        ws.send(tungstenite::Message::Text(ping.to_string().into()))
            .await
            .expect("send ping");
        assert_eq!(next_text(&mut ws).await, "pong");
    }

    // Anything else is read and discarded.
    ws.send(tungstenite::Message::Text("hello".to_string().into()))
        .await
        .expect("send chatter");
    assert_silent(&mut ws).await;
}

#[tokio::test]
async fn missing_client_id_defaults_to_unknown() {
    let (addr, state) = common::start_server().await;
    let _ws = connect(addr, "room1", None).await;
    common::wait_for_members(&state, "room1", 1).await;

    assert_eq!(state.channels.snapshot("room1")[0].client_id, "unknown");
}

#[tokio::test]
async fn channel_name_is_percent_decoded() {
    let (addr, state) = common::start_server().await;
    let mut ws = connect(addr, "team%20alpha", Some("a")).await;
    common::wait_for_members(&state, "team alpha", 1).await;

    let body = publish(
        addr,
        serde_json::json!({ "channel": "team alpha", "message": "hi" }),
    )
    .await;
    assert_eq!(body["sent"], 1);
    let text = next_text(&mut ws).await;
    assert!(text.contains("team alpha"));
}

#[tokio::test]
async fn clean_disconnect_unregisters_connection() {
    let (addr, state) = common::start_server().await;
    let mut ws = connect(addr, "room1", Some("a")).await;
    common::wait_for_members(&state, "room1", 1).await;

    ws.close(None).await.expect("close");
    common::wait_for_members(&state, "room1", 0).await;
    assert!(state.channels.occupancy().is_empty());

    let body = publish(addr, serde_json::json!({ "channel": "room1", "message": "hi" })).await;
    assert_eq!(body["sent"], 0);
}

#[tokio::test]
async fn dropped_transport_is_torn_down_by_reader() {
    let (addr, state) = common::start_server().await;
    let ws = connect(addr, "room1", Some("a")).await;
    let _other = connect(addr, "room1", Some("b")).await;
    common::wait_for_members(&state, "room1", 2).await;

    // Vanish without a close handshake; the server's read loop sees EOF.
    drop(ws);
    common::wait_for_members(&state, "room1", 1).await;

    assert_eq!(state.channels.snapshot("room1")[0].client_id, "b");
}

#[tokio::test]
async fn unresponsive_client_is_reaped_after_missed_heartbeats() {
    let mut config = common::test_config();
    config.heartbeat_interval = Duration::from_millis(50);
    config.heartbeat_max_missed = 2;
    let (addr, state) = common::start_server_with(config).await;

    // Handshake completes, then the stream is never polled again, so the
    // server's pings go unanswered while the TCP connection stays up.
    let _silent = connect(addr, "room1", Some("silent")).await;
    common::wait_for_members(&state, "room1", 1).await;
    let silent = state.channels.snapshot("room1")[0].clone();
    assert!(silent.is_open());

    common::wait_for_members(&state, "room1", 0).await;
    assert!(!silent.is_open());
    assert!(state.channels.occupancy().is_empty());
}

#[tokio::test]
async fn responsive_client_survives_heartbeats() {
    let mut config = common::test_config();
    config.heartbeat_interval = Duration::from_millis(50);
    config.heartbeat_max_missed = 2;
    let (addr, state) = common::start_server_with(config).await;

    let mut ws = connect(addr, "room1", Some("a")).await;
    common::wait_for_members(&state, "room1", 1).await;

    // Polling the stream lets tungstenite answer the server's pings.
    let deadline = time::Instant::now() + Duration::from_millis(500);
    while time::Instant::now() < deadline {
        let _ = time::timeout(Duration::from_millis(20), ws.next()).await;
    }

    let members = state.channels.snapshot("room1");
    assert_eq!(members.len(), 1);
    assert!(members[0].is_open());
}
