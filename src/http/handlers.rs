//! Public route handlers.

use axum::{
    extract::{rejection::JsonRejection, State},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::auth::LoginOutcome;
use crate::http::error::ApiError;
use crate::http::server::AppState;

pub const VERSION_BANNER: &str = "Auth API, written in Rust\n";

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    #[serde(rename = "accessToken")]
    pub access_token: String,

    /// Set when the token was issued for a fallback identity.
    #[serde(skip_serializing_if = "is_false")]
    pub degraded: bool,
}

fn is_false(value: &bool) -> bool {
    !*value
}

/// `POST /login`
pub async fn login(
    State(state): State<AppState>,
    body: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<LoginResponse>, ApiError> {
    let Json(request) = body.map_err(|rejection| {
        tracing::warn!(error = %rejection, "Malformed login request");
        ApiError::Internal
    })?;

    match state.login.login(&request.username, &request.password).await {
        LoginOutcome::Authenticated { user, credential } => Ok(Json(LoginResponse {
            access_token: credential.access_token,
            degraded: user.is_degraded(),
        })),
        LoginOutcome::InvalidCredentials => Err(ApiError::InvalidCredentials),
        LoginOutcome::ServiceUnavailable => Err(ApiError::ServiceUnavailable),
        LoginOutcome::InternalFailure(error) => {
            tracing::error!(username = %request.username, error = %error, "Login failed");
            Err(ApiError::Internal)
        }
    }
}

/// `GET /version`
pub async fn version() -> &'static str {
    VERSION_BANNER
}
