//! HTTP Basic extraction for publisher-only endpoints.

use axum::extract::FromRequestParts;
use axum::http::header::{AUTHORIZATION, WWW_AUTHENTICATE};
use axum::http::request::Parts;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use crate::auth::basic::{self, Credentials};
use crate::AppState;

/// Authenticated publisher extracted from the `Authorization: Basic` header.
#[derive(Debug, Clone)]
pub struct BasicAuth {
    pub username: String,
}

/// Rejection returned when credentials are missing or wrong.
pub struct AuthError {
    message: &'static str,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({
            "error": {
                "code": "UNAUTHORIZED",
                "message": self.message
            }
        });
        (
            StatusCode::UNAUTHORIZED,
            [(WWW_AUTHENTICATE, "Basic realm=\"relay\"")],
            Json(body),
        )
            .into_response()
    }
}

impl FromRequestParts<AppState> for BasicAuth {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or(AuthError {
                message: "Missing Authorization header",
            })?;

        let credentials = Credentials::from_header(header).ok_or(AuthError {
            message: "Invalid Authorization header format",
        })?;

        if !basic::authenticate(&state.config, &credentials) {
            return Err(AuthError {
                message: "Invalid credentials",
            });
        }

        Ok(BasicAuth {
            username: credentials.username,
        })
    }
}
