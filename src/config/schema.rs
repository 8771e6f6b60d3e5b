//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the authentication gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// Listener configuration (bind address, request deadline).
    pub listener: ListenerConfig,

    /// User directory client settings.
    pub directory: DirectoryConfig,

    /// Circuit breaker guarding the user directory.
    pub breaker: BreakerSettings,

    /// Credential verification and token issuance.
    pub auth: AuthConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    pub admin: AdminConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8000").
    pub bind_address: String,

    /// Deadline for a whole inbound request in seconds.
    pub request_timeout_secs: u64,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8000".to_string(),
            request_timeout_secs: 30,
        }
    }
}

/// User directory client configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DirectoryConfig {
    /// Base URL of the user directory (e.g., "http://users-api:8083").
    pub base_url: String,

    /// Serve a placeholder user when the breaker denies the call.
    pub fallback_enabled: bool,

    /// Also serve the placeholder on 5xx, transport errors and timeouts.
    pub fallback_on_upstream_failure: bool,
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8083".to_string(),
            fallback_enabled: true,
            fallback_on_upstream_failure: false,
        }
    }
}

/// Circuit breaker settings as they appear in the config file.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BreakerSettings {
    /// Breaker name used in logs and metrics.
    pub name: String,

    /// Trial requests admitted while half-open.
    pub max_requests: u32,

    /// Closed-state counting window in seconds (0 = never roll over).
    pub interval_secs: u64,

    /// Open-state duration and per-call deadline in seconds.
    pub timeout_secs: u64,

    /// Condition that trips a closed breaker.
    pub trip: TripPolicy,
}

impl Default for BreakerSettings {
    fn default() -> Self {
        Self {
            name: "users-api".to_string(),
            max_requests: 3,
            interval_secs: 10,
            timeout_secs: 3,
            trip: TripPolicy::default(),
        }
    }
}

/// Trip predicate selection.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TripPolicy {
    /// Trip when `requests >= min_requests` and `failures / requests >= ratio`.
    FailureRatio { min_requests: u32, ratio: f64 },

    /// Trip when consecutive failures exceed `threshold`.
    ConsecutiveFailures { threshold: u32 },
}

impl Default for TripPolicy {
    fn default() -> Self {
        TripPolicy::FailureRatio {
            min_requests: 3,
            ratio: 0.6,
        }
    }
}

/// Credential verification and token issuance.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AuthConfig {
    /// HMAC secret for issued tokens.
    pub jwt_secret: String,

    /// Lifetime of access tokens in hours.
    pub token_ttl_hours: u64,

    /// Lifetime of service tokens sent to the user directory, in seconds.
    pub service_token_ttl_secs: u64,

    /// Allowed `username_password` keys.
    pub allowed_credentials: Vec<String>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            // WARNING: This is a placeholder! Override with JWT_SECRET.
            jwt_secret: "myfancysecret".to_string(),
            token_ttl_hours: 72,
            service_token_ttl_secs: 60,
            allowed_credentials: vec![
                "admin_admin".to_string(),
                "johnd_foo".to_string(),
                "janed_ddd".to_string(),
            ],
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,

    /// Trace collector address, if any.
    pub tracing_collector: Option<String>,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
            tracing_collector: None,
        }
    }
}

/// Admin endpoints configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Mount `/admin/*` routes.
    pub enabled: bool,

    /// API key for authentication (Bearer token).
    pub api_key: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            // WARNING: This is a placeholder! Change this in production.
            api_key: "CHANGE_ME_IN_PRODUCTION".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config: AppConfig = toml::from_str(
            r#"
            [directory]
            base_url = "http://users-api:8083"

            [breaker]
            max_requests = 1
            trip = { kind = "consecutive_failures", threshold = 3 }
            "#,
        )
        .unwrap();

        assert_eq!(config.directory.base_url, "http://users-api:8083");
        assert!(config.directory.fallback_enabled);
        assert_eq!(config.breaker.max_requests, 1);
        assert_eq!(config.breaker.timeout_secs, 3);
        assert_eq!(config.breaker.trip, TripPolicy::ConsecutiveFailures { threshold: 3 });
        assert_eq!(config.auth.token_ttl_hours, 72);
    }

    #[test]
    fn test_default_trip_policy() {
        assert_eq!(
            BreakerSettings::default().trip,
            TripPolicy::FailureRatio { min_requests: 3, ratio: 0.6 }
        );
    }
}
