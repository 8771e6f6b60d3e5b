//! Login orchestration.

use std::sync::Arc;
use std::time::Instant;

use crate::auth::credentials::AllowedCredentials;
use crate::auth::token::TokenIssuer;
use crate::auth::types::{AuthError, LoginOutcome};
use crate::directory::{DirectoryError, UserDirectory};
use crate::observability::metrics;

/// Authenticates username/password pairs and issues access tokens.
#[derive(Clone)]
pub struct LoginService {
    directory: Arc<dyn UserDirectory>,
    credentials: AllowedCredentials,
    tokens: Arc<TokenIssuer>,
}

impl LoginService {
    pub fn new(
        directory: Arc<dyn UserDirectory>,
        credentials: AllowedCredentials,
        tokens: Arc<TokenIssuer>,
    ) -> Self {
        Self {
            directory,
            credentials,
            tokens,
        }
    }

    pub async fn login(&self, username: &str, password: &str) -> LoginOutcome {
        let start = Instant::now();
        let outcome = self.authenticate(username, password).await;
        metrics::record_login(outcome.as_str(), start);
        outcome
    }

    async fn authenticate(&self, username: &str, password: &str) -> LoginOutcome {
        let lookup = self.directory.lookup(username).await;

        if !self.credentials.verify(username, password) {
            if let Err(e) = &lookup {
                tracing::debug!(username = %username, error = %e, "Lookup failed for rejected credentials");
            }
            tracing::info!(username = %username, "Login rejected: invalid credentials");
            return LoginOutcome::InvalidCredentials;
        }

        let resolved = match lookup {
            Ok(resolved) => resolved,
            Err(DirectoryError::Unavailable(state)) => {
                tracing::warn!(username = %username, state = %state, "Login refused: user directory unavailable");
                return LoginOutcome::ServiceUnavailable;
            }
            Err(e) => return LoginOutcome::InternalFailure(AuthError::Directory(e)),
        };

        if resolved.is_degraded() {
            tracing::warn!(
                username = %username,
                role = %resolved.user.role,
                "Issuing token for fallback identity"
            );
        }

        match self.tokens.issue_access_token(&resolved.user) {
            Ok(credential) => {
                tracing::info!(username = %username, degraded = resolved.is_degraded(), "Login succeeded");
                LoginOutcome::Authenticated {
                    user: resolved,
                    credential,
                }
            }
            Err(e) => LoginOutcome::InternalFailure(AuthError::Signing(e)),
        }
    }
}

impl std::fmt::Debug for LoginService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoginService")
            .field("credentials", &self.credentials)
            .field("tokens", &self.tokens)
            .finish_non_exhaustive()
    }
}
