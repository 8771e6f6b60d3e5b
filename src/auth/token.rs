//! Signed credential issuance (HS256 JWT).
//!
//! # Security
//! - The signing secret is never logged or serialized
//! - Service tokens are read-scoped and short-lived

use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use jsonwebtoken::{encode, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::schema::AuthConfig;
use crate::directory::types::User;

/// Scope carried by tokens minted for the user directory.
pub const SERVICE_TOKEN_SCOPE: &str = "read";

/// Claims of an access token handed to the end user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessClaims {
    pub username: String,
    pub firstname: String,
    pub lastname: String,
    pub role: String,
    pub exp: u64,
}

/// Claims of a service token sent to the user directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceClaims {
    pub username: String,
    pub scope: String,
    pub exp: u64,
}

/// An issued access token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    pub access_token: String,
    /// Expiry as seconds since the unix epoch.
    pub expires_at: u64,
}

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("could not sign token: {0}")]
    Signing(#[from] jsonwebtoken::errors::Error),

    #[error("system clock is before the unix epoch")]
    Clock,

    #[error("token lifetime {0:?} overflows the expiry timestamp")]
    ExpiryOverflow(Duration),
}

/// Issues access tokens and directory service tokens from one secret.
#[derive(Clone)]
pub struct TokenIssuer {
    key: EncodingKey,
    access_ttl: Duration,
    service_ttl: Duration,
}

impl TokenIssuer {
    pub fn new(secret: &str, access_ttl: Duration, service_ttl: Duration) -> Self {
        Self {
            key: EncodingKey::from_secret(secret.as_bytes()),
            access_ttl,
            service_ttl,
        }
    }

    pub fn from_config(config: &AuthConfig) -> Self {
        Self::new(
            &config.jwt_secret,
            Duration::from_secs(config.token_ttl_hours.saturating_mul(3600)),
            Duration::from_secs(config.service_token_ttl_secs),
        )
    }

    pub fn access_ttl(&self) -> Duration {
        self.access_ttl
    }

    /// Sign an access token for `user`.
    pub fn issue_access_token(&self, user: &User) -> Result<Credential, TokenError> {
        let exp = expires_in(self.access_ttl)?;
        let claims = AccessClaims {
            username: user.username.clone(),
            firstname: user.first_name.clone(),
            lastname: user.last_name.clone(),
            role: user.role.clone(),
            exp,
        };
        let access_token = encode(&Header::default(), &claims, &self.key)?;
        Ok(Credential {
            access_token,
            expires_at: exp,
        })
    }

    /// Sign a read-scoped token the user directory accepts for `username`.
    pub fn mint_service_token(&self, username: &str) -> Result<String, TokenError> {
        let claims = ServiceClaims {
            username: username.to_string(),
            scope: SERVICE_TOKEN_SCOPE.to_string(),
            exp: expires_in(self.service_ttl)?,
        };
        Ok(encode(&Header::default(), &claims, &self.key)?)
    }
}

impl fmt::Debug for TokenIssuer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenIssuer")
            .field("key", &"<redacted>")
            .field("access_ttl", &self.access_ttl)
            .field("service_ttl", &self.service_ttl)
            .finish()
    }
}

fn expires_in(ttl: Duration) -> Result<u64, TokenError> {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|_| TokenError::Clock)?;
    now.checked_add(ttl)
        .map(|exp| exp.as_secs())
        .ok_or(TokenError::ExpiryOverflow(ttl))
}
