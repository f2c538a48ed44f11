#![allow(dead_code)]

use std::net::SocketAddr;
use std::time::Duration;

use axum::Router;
use base64::{engine::general_purpose::STANDARD, Engine};
use tokio::time;

use relay_api::config::Config;
use relay_api::AppState;

pub const USERNAME: &str = "relay_test";
pub const PASSWORD: &str = "relay_test_password";

/// Config with known credentials and short timeouts.
pub fn test_config() -> Config {
    Config {
        port: 0,
        auth_username: USERNAME.to_string(),
        auth_password: PASSWORD.to_string(),
        reaper_interval: Duration::from_millis(50),
        push_timeout: Duration::from_millis(500),
        ..Config::default()
    }
}

/// `Authorization` header value for the given credentials.
pub fn basic_auth(username: &str, password: &str) -> String {
    format!("Basic {}", STANDARD.encode(format!("{username}:{password}")))
}

/// `Authorization` header value for the test publisher.
pub fn publisher_auth() -> String {
    basic_auth(USERNAME, PASSWORD)
}

/// Build the full application router wired to a fresh state.
pub fn test_app_with(config: Config) -> (Router, AppState) {
    let state = AppState::new(config);
    let app = relay_api::routes::router().with_state(state.clone());
    (app, state)
}

pub fn test_app() -> (Router, AppState) {
    test_app_with(test_config())
}

/// Start a real TCP server for WebSocket testing, with the reaper running.
/// The server runs in the background.
pub async fn start_server() -> (SocketAddr, AppState) {
    start_server_with(test_config()).await
}

pub async fn start_server_with(config: Config) -> (SocketAddr, AppState) {
    let (app, state) = test_app_with(config);
    relay_api::relay::reaper::spawn(state.channels.clone(), state.config.reaper_interval);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (addr, state)
}

/// Wait until `channel` has exactly `count` registered members.
pub async fn wait_for_members(state: &AppState, channel: &str, count: usize) {
    time::timeout(Duration::from_secs(5), async {
        while state.channels.snapshot(channel).len() != count {
            time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap_or_else(|_| {
        panic!(
            "channel {channel} never reached {count} members (has {})",
            state.channels.snapshot(channel).len()
        )
    });
}
