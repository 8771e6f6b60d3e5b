//! User identity and directory error types.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::auth::token::TokenError;
use crate::resilience::CircuitState;

/// User record as served by the directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub username: String,
    #[serde(rename = "firstname")]
    pub first_name: String,
    #[serde(rename = "lastname")]
    pub last_name: String,
    pub role: String,
}

impl User {
    /// Placeholder identity served while the directory is unavailable.
    pub fn fallback(username: &str) -> Self {
        Self {
            username: username.to_string(),
            first_name: "Default".to_string(),
            last_name: "User".to_string(),
            role: "user".to_string(),
        }
    }
}

/// Where a resolved user came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UserSource {
    Directory,
    /// Synthesized locally; fields other than `username` are not authoritative.
    Fallback,
}

/// A user plus the provenance of its fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedUser {
    pub user: User,
    pub source: UserSource,
}

impl ResolvedUser {
    pub fn from_directory(user: User) -> Self {
        Self {
            user,
            source: UserSource::Directory,
        }
    }

    pub fn fallback(username: &str) -> Self {
        Self {
            user: User::fallback(username),
            source: UserSource::Fallback,
        }
    }

    pub fn is_degraded(&self) -> bool {
        self.source == UserSource::Fallback
    }
}

/// Errors that can occur during a directory lookup.
#[derive(Debug, Error)]
pub enum DirectoryError {
    /// Connection-level failure. Counts against the breaker.
    #[error("user directory unreachable: {0}")]
    Transport(#[source] reqwest::Error),

    /// Directory answered with a 5xx. Counts against the breaker.
    #[error("user directory returned server error {status}")]
    Server { status: u16 },

    /// Call exceeded the breaker deadline. Counts against the breaker.
    #[error("user directory call timed out after {0:?}")]
    Timeout(Duration),

    /// Directory rejected the request (3xx/4xx). Does not trip the breaker.
    #[error("could not get user data (status {status}): {body}")]
    Client { status: u16, body: String },

    /// 2xx with a body that is not a user record.
    #[error("could not decode user payload: {0}")]
    Decode(#[source] serde_json::Error),

    /// Breaker denied the call and fallback is disabled.
    #[error("user directory circuit is {0}")]
    Unavailable(CircuitState),

    #[error("could not mint service token: {0}")]
    ServiceToken(#[source] TokenError),

    #[error("invalid user directory URL: {0}")]
    InvalidUrl(String),
}

impl DirectoryError {
    /// True for failures that indicate the directory itself is unhealthy.
    pub fn trips_breaker(&self) -> bool {
        matches!(
            self,
            DirectoryError::Transport(_) | DirectoryError::Server { .. } | DirectoryError::Timeout(_)
        )
    }

    /// Short label for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            DirectoryError::Transport(_) => "transport",
            DirectoryError::Server { .. } => "server_error",
            DirectoryError::Timeout(_) => "timeout",
            DirectoryError::Client { .. } => "client_error",
            DirectoryError::Decode(_) => "decode",
            DirectoryError::Unavailable(_) => "unavailable",
            DirectoryError::ServiceToken(_) => "service_token",
            DirectoryError::InvalidUrl(_) => "invalid_url",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_wire_format() {
        let user: User = serde_json::from_str(
            r#"{"username":"johnd","firstname":"John","lastname":"Doe","role":"user"}"#,
        )
        .unwrap();
        assert_eq!(user.first_name, "John");
        assert_eq!(user.last_name, "Doe");

        let json = serde_json::to_value(&user).unwrap();
        assert_eq!(json["firstname"], "John");
    }

    #[test]
    fn test_fallback_is_degraded() {
        let resolved = ResolvedUser::fallback("admin");
        assert!(resolved.is_degraded());
        assert_eq!(resolved.user.username, "admin");
        assert_eq!(resolved.user.role, "user");
        assert!(!ResolvedUser::from_directory(resolved.user.clone()).is_degraded());
    }

    #[test]
    fn test_breaker_classification() {
        assert!(DirectoryError::Server { status: 503 }.trips_breaker());
        assert!(DirectoryError::Timeout(Duration::from_secs(1)).trips_breaker());
        assert!(!DirectoryError::Client { status: 404, body: String::new() }.trips_breaker());
        assert!(!DirectoryError::Unavailable(CircuitState::Open).trips_breaker());
    }
}
