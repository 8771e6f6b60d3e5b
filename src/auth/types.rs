//! Login outcome and error types.

use thiserror::Error;

use crate::auth::token::{Credential, TokenError};
use crate::directory::types::{DirectoryError, ResolvedUser};

/// Result of one login attempt.
#[derive(Debug)]
pub enum LoginOutcome {
    Authenticated {
        user: ResolvedUser,
        credential: Credential,
    },
    InvalidCredentials,
    /// The directory is unavailable and no fallback was served.
    ServiceUnavailable,
    InternalFailure(AuthError),
}

impl LoginOutcome {
    /// Short label for logs and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            LoginOutcome::Authenticated { .. } => "authenticated",
            LoginOutcome::InvalidCredentials => "invalid_credentials",
            LoginOutcome::ServiceUnavailable => "service_unavailable",
            LoginOutcome::InternalFailure(_) => "internal_failure",
        }
    }
}

/// Internal failures behind [`LoginOutcome::InternalFailure`].
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("user lookup failed: {0}")]
    Directory(#[from] DirectoryError),

    #[error("could not generate a token: {0}")]
    Signing(#[from] TokenError),
}
