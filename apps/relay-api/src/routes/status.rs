//! Operational snapshot of channel occupancy and delivery totals.

use std::collections::BTreeMap;

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use utoipa::ToSchema;

use crate::auth::middleware::BasicAuth;
use crate::error::ApiErrorBody;
use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/status", get(status))
}

#[derive(Debug, Serialize, ToSchema)]
pub struct StatusResponse {
    /// Live connections per channel.
    pub channels: BTreeMap<String, usize>,
    pub connections: usize,
    /// Successful pushes since startup.
    pub messages_sent: u64,
}

#[utoipa::path(
    get,
    path = "/status",
    tag = "Relay",
    responses(
        (status = 200, description = "Current occupancy", body = StatusResponse),
        (status = 401, description = "Missing or invalid credentials", body = ApiErrorBody),
    ),
    security(("basic" = [])),
)]
pub async fn status(_auth: BasicAuth, State(state): State<AppState>) -> Json<StatusResponse> {
    let channels = state.channels.occupancy();
    let connections = channels.values().sum();
    Json(StatusResponse {
        channels,
        connections,
        messages_sent: state.broadcaster.messages_sent(),
    })
}
