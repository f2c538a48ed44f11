//! Publish endpoint: push a message to every connection on a channel.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::auth::middleware::BasicAuth;
use crate::error::{ApiError, ApiErrorBody};
use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/notify", post(notify))
}

// ---------------------------------------------------------------------------
// POST /notify
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, ToSchema)]
pub struct NotifyRequest {
    #[serde(default)]
    pub channel: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    /// Client id of the publisher's own connection; it will not receive the push.
    #[serde(default, rename = "originClientId", alias = "origin_client_id")]
    pub origin_client_id: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct NotifyResponse {
    pub status: String,
    /// Connections the message was handed to.
    pub sent: usize,
}

#[utoipa::path(
    post,
    path = "/notify",
    tag = "Relay",
    request_body = NotifyRequest,
    responses(
        (status = 200, description = "Message fanned out", body = NotifyResponse),
        (status = 400, description = "Missing channel or message", body = ApiErrorBody),
        (status = 401, description = "Missing or invalid credentials", body = ApiErrorBody),
        (status = 429, description = "Rate limited", body = ApiErrorBody),
    ),
    security(("basic" = [])),
)]
pub async fn notify(
    BasicAuth { username }: BasicAuth,
    State(state): State<AppState>,
    body: Result<Json<NotifyRequest>, JsonRejection>,
) -> Result<Json<NotifyResponse>, ApiError> {
    if !state.rate_limiter.check(&username) {
        tracing::debug!(%username, "publish rate limited");
        return Err(ApiError::too_many_requests("Too many publish requests"));
    }

    let Json(body) = body?;
    let channel = body.channel.unwrap_or_default();
    let message = body.message.unwrap_or_default();

    let outcome = state
        .broadcaster
        .broadcast(&channel, &message, body.origin_client_id.as_deref())
        .await?;

    Ok(Json(NotifyResponse {
        status: "ok".to_string(),
        sent: outcome.sent,
    }))
}
