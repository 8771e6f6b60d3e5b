//! User directory subsystem.
//!
//! # Data Flow
//! ```text
//! lookup(username)
//!     → auth::token (mint read-scoped service token)
//!     → client.rs (GET {base}/users/{username}, Bearer token)
//!     → resilience::CircuitBreaker (admit, deadline, classify)
//!     → User from directory, or fallback User when the breaker denies the call
//! ```
//!
//! # Design Decisions
//! - Only transport errors, timeouts and 5xx count against the breaker
//! - 3xx/4xx are request failures; they propagate but never trip the breaker
//! - Fallback users are always flagged as degraded

use async_trait::async_trait;

pub mod client;
pub mod types;

pub use client::{DirectoryClient, FallbackPolicy};
pub use types::{DirectoryError, ResolvedUser, User, UserSource};

/// Source of user identities for the login flow.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn lookup(&self, username: &str) -> Result<ResolvedUser, DirectoryError>;
}
