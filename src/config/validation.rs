//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, ratios in (0, 1])
//! - Check addresses and URLs parse
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: AppConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use thiserror::Error;
use url::Url;

use crate::config::schema::{AppConfig, TripPolicy};

/// Longest accepted access token lifetime (one year).
pub const MAX_TOKEN_TTL_HOURS: u64 = 24 * 365;
/// Longest accepted directory service token lifetime (one hour).
pub const MAX_SERVICE_TOKEN_TTL_SECS: u64 = 3600;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("listener.bind_address {0:?} is not a socket address")]
    InvalidBindAddress(String),

    #[error("listener.request_timeout_secs must be greater than zero")]
    ZeroRequestTimeout,

    #[error("directory.base_url {0:?} is not an absolute http(s) URL")]
    InvalidDirectoryUrl(String),

    #[error("breaker.max_requests must be greater than zero")]
    ZeroMaxRequests,

    #[error("breaker.timeout_secs must be greater than zero")]
    ZeroBreakerTimeout,

    #[error("breaker.trip.ratio {0} must be within (0, 1]")]
    InvalidFailureRatio(f64),

    #[error("auth.jwt_secret must not be empty")]
    EmptyJwtSecret,

    #[error("auth.token_ttl_hours and auth.service_token_ttl_secs must be greater than zero")]
    ZeroTokenTtl,

    #[error(
        "auth.token_ttl_hours must be at most {} and auth.service_token_ttl_secs at most {}",
        MAX_TOKEN_TTL_HOURS,
        MAX_SERVICE_TOKEN_TTL_SECS
    )]
    TokenTtlTooLong,

    #[error("observability.metrics_address {0:?} is not a socket address")]
    InvalidMetricsAddress(String),

    #[error("admin.api_key must not be empty when admin is enabled")]
    EmptyAdminKey,
}

/// Check every semantic constraint, collecting all violations.
pub fn validate_config(config: &AppConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidBindAddress(config.listener.bind_address.clone()));
    }
    if config.listener.request_timeout_secs == 0 {
        errors.push(ValidationError::ZeroRequestTimeout);
    }

    let url_ok = Url::parse(&config.directory.base_url)
        .map(|url| matches!(url.scheme(), "http" | "https") && !url.cannot_be_a_base())
        .unwrap_or(false);
    if !url_ok {
        errors.push(ValidationError::InvalidDirectoryUrl(config.directory.base_url.clone()));
    }

    if config.breaker.max_requests == 0 {
        errors.push(ValidationError::ZeroMaxRequests);
    }
    if config.breaker.timeout_secs == 0 {
        errors.push(ValidationError::ZeroBreakerTimeout);
    }
    if let TripPolicy::FailureRatio { ratio, .. } = config.breaker.trip {
        if !(ratio > 0.0 && ratio <= 1.0) {
            errors.push(ValidationError::InvalidFailureRatio(ratio));
        }
    }

    if config.auth.jwt_secret.is_empty() {
        errors.push(ValidationError::EmptyJwtSecret);
    }
    if config.auth.token_ttl_hours == 0 || config.auth.service_token_ttl_secs == 0 {
        errors.push(ValidationError::ZeroTokenTtl);
    }
    if config.auth.token_ttl_hours > MAX_TOKEN_TTL_HOURS
        || config.auth.service_token_ttl_secs > MAX_SERVICE_TOKEN_TTL_SECS
    {
        errors.push(ValidationError::TokenTtlTooLong);
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::InvalidMetricsAddress(
            config.observability.metrics_address.clone(),
        ));
    }

    if config.admin.enabled && config.admin.api_key.is_empty() {
        errors.push(ValidationError::EmptyAdminKey);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
