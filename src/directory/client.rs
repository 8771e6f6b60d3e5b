//! HTTP client for the user directory, guarded by a circuit breaker.
//!
//! # Responsibilities
//! - Build `GET {base}/users/{username}` with a read-scoped service token
//! - Run the round trip through the breaker and classify the response
//! - Substitute a fallback user according to [`FallbackPolicy`]

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::RequestBuilder;
use url::Url;

use crate::auth::token::TokenIssuer;
use crate::config::schema::DirectoryConfig;
use crate::directory::types::{DirectoryError, ResolvedUser, User};
use crate::directory::UserDirectory;
use crate::observability::metrics;
use crate::resilience::{BreakerError, CircuitBreaker, CircuitState};

/// When to answer with a placeholder user instead of an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FallbackPolicy {
    /// Breaker denials surface as [`DirectoryError::Unavailable`].
    Disabled,
    /// Fallback only when the breaker refuses the call.
    #[default]
    BreakerDenied,
    /// Fallback on breaker denials and on any failure that trips the breaker.
    AnyUpstreamFailure,
}

impl FallbackPolicy {
    pub fn from_config(config: &DirectoryConfig) -> Self {
        match (config.fallback_enabled, config.fallback_on_upstream_failure) {
            (false, _) => FallbackPolicy::Disabled,
            (true, false) => FallbackPolicy::BreakerDenied,
            (true, true) => FallbackPolicy::AnyUpstreamFailure,
        }
    }
}

/// User directory client.
#[derive(Debug, Clone)]
pub struct DirectoryClient {
    http: reqwest::Client,
    base_url: Url,
    breaker: Arc<CircuitBreaker>,
    tokens: Arc<TokenIssuer>,
    policy: FallbackPolicy,
}

impl DirectoryClient {
    pub fn new(
        base_url: &str,
        breaker: Arc<CircuitBreaker>,
        tokens: Arc<TokenIssuer>,
        policy: FallbackPolicy,
    ) -> Result<Self, DirectoryError> {
        let base_url = Url::parse(base_url)
            .map_err(|e| DirectoryError::InvalidUrl(format!("{}: {}", base_url, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(DirectoryError::InvalidUrl(base_url.to_string()));
        }

        // Internal service: never routed through an egress proxy.
        let http = reqwest::Client::builder()
            .user_agent(concat!("auth-gateway/", env!("CARGO_PKG_VERSION")))
            .no_proxy()
            .build()
            .map_err(DirectoryError::Transport)?;

        Ok(Self {
            http,
            base_url,
            breaker,
            tokens,
            policy,
        })
    }

    pub fn from_config(
        config: &DirectoryConfig,
        breaker: Arc<CircuitBreaker>,
        tokens: Arc<TokenIssuer>,
    ) -> Result<Self, DirectoryError> {
        Self::new(&config.base_url, breaker, tokens, FallbackPolicy::from_config(config))
    }

    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    pub fn policy(&self) -> FallbackPolicy {
        self.policy
    }

    /// `{base}/users/{username}` with the username percent-encoded as one segment.
    fn user_url(&self, username: &str) -> Result<Url, DirectoryError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| DirectoryError::InvalidUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .push("users")
            .push(username);
        Ok(url)
    }

    fn fallback(&self, username: &str, reason: &str) -> ResolvedUser {
        tracing::warn!(
            breaker = %self.breaker.name(),
            username = %username,
            reason = %reason,
            "User directory unavailable, serving fallback user"
        );
        metrics::record_directory_fallback();
        ResolvedUser::fallback(username)
    }

    fn denied(&self, username: &str, state: CircuitState) -> Result<ResolvedUser, DirectoryError> {
        metrics::record_directory_request("rejected");
        if self.policy == FallbackPolicy::Disabled {
            tracing::warn!(username = %username, state = %state, "User directory call rejected by circuit breaker");
            return Err(DirectoryError::Unavailable(state));
        }
        Ok(self.fallback(username, &format!("circuit {}", state)))
    }

    fn upstream_failure(&self, username: &str, error: DirectoryError) -> Result<ResolvedUser, DirectoryError> {
        if self.policy == FallbackPolicy::AnyUpstreamFailure {
            return Ok(self.fallback(username, &error.to_string()));
        }
        Err(error)
    }
}

#[async_trait]
impl UserDirectory for DirectoryClient {
    async fn lookup(&self, username: &str) -> Result<ResolvedUser, DirectoryError> {
        let token = self
            .tokens
            .mint_service_token(username)
            .map_err(DirectoryError::ServiceToken)?;
        let request = self.http.get(self.user_url(username)?).bearer_auth(token);

        let result = self
            .breaker
            .execute_with(
                || fetch_user(request),
                |outcome| !matches!(outcome, Err(e) if e.trips_breaker()),
            )
            .await;

        match result {
            Ok(user) => {
                metrics::record_directory_request("ok");
                Ok(ResolvedUser::from_directory(user))
            }
            Err(BreakerError::Open) => self.denied(username, CircuitState::Open),
            Err(BreakerError::TooManyRequests) => self.denied(username, CircuitState::HalfOpen),
            Err(BreakerError::Timeout(deadline)) => {
                metrics::record_directory_request("timeout");
                self.upstream_failure(username, DirectoryError::Timeout(deadline))
            }
            Err(BreakerError::Operation(error)) => {
                metrics::record_directory_request(error.kind());
                tracing::debug!(username = %username, error = %error, "User directory lookup failed");
                if error.trips_breaker() {
                    self.upstream_failure(username, error)
                } else {
                    Err(error)
                }
            }
        }
    }
}

/// One round trip: send, read the body, classify, decode.
async fn fetch_user(request: RequestBuilder) -> Result<User, DirectoryError> {
    let response = request.send().await.map_err(DirectoryError::Transport)?;
    let status = response.status().as_u16();
    if status >= 500 {
        return Err(DirectoryError::Server { status });
    }

    let body = response.bytes().await.map_err(DirectoryError::Transport)?;
    if !(200..300).contains(&status) {
        return Err(DirectoryError::Client {
            status,
            body: String::from_utf8_lossy(&body).into_owned(),
        });
    }

    serde_json::from_slice(&body).map_err(DirectoryError::Decode)
}
