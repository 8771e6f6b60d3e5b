//! Configuration loading from disk and environment.

use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::config::schema::AppConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Port the login API listens on.
pub const PORT_ENV_VAR: &str = "AUTH_API_PORT";
/// Base address of the user directory.
pub const USERS_API_ENV_VAR: &str = "USERS_API_ADDRESS";
/// HMAC secret for issued tokens.
pub const JWT_SECRET_ENV_VAR: &str = "JWT_SECRET";
/// Trace collector address.
pub const TRACING_COLLECTOR_ENV_VAR: &str = "ZIPKIN_URL";

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid value {value:?} for {name}")]
    InvalidEnv { name: &'static str, value: String },

    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Parse a TOML file. Missing sections and fields take their defaults.
pub fn load_config(path: &Path) -> Result<AppConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    Ok(toml::from_str(&content)?)
}

/// Build the runtime configuration: file (or defaults), then environment, then validation.
pub fn load(path: Option<&Path>) -> Result<AppConfig, ConfigError> {
    let mut config = match path {
        Some(path) => load_config(path)?,
        None => AppConfig::default(),
    };

    apply_env_overrides(&mut config)?;
    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

/// Override config fields from the process environment.
pub fn apply_env_overrides(config: &mut AppConfig) -> Result<(), ConfigError> {
    apply_overrides(config, |name| std::env::var(name).ok())
}

/// Override config fields from `lookup`. Empty values are ignored.
pub fn apply_overrides<F>(config: &mut AppConfig, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let get = |name: &str| lookup(name).filter(|value| !value.is_empty());

    if let Some(port) = get(PORT_ENV_VAR) {
        let port: u16 = port.parse().map_err(|_| ConfigError::InvalidEnv {
            name: PORT_ENV_VAR,
            value: port.clone(),
        })?;
        config.listener.bind_address = format!("0.0.0.0:{}", port);
    }

    if let Some(address) = get(USERS_API_ENV_VAR) {
        config.directory.base_url = address;
    }

    if let Some(secret) = get(JWT_SECRET_ENV_VAR) {
        config.auth.jwt_secret = secret;
    }

    if let Some(collector) = get(TRACING_COLLECTOR_ENV_VAR) {
        config.observability.tracing_collector = Some(collector);
    }

    Ok(())
}
