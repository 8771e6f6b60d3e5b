//! Authentication gateway.
//!
//! Issues signed access tokens for a fixed set of credentials, enriching each
//! token with the caller's profile from a remote user directory. Calls to the
//! directory go through a circuit breaker; while it is open, logins proceed
//! with a placeholder profile instead of failing.
//!
//! # Architecture Overview
//!
//! ```text
//!   POST /login
//!       │
//!       ▼
//!   ┌────────┐    ┌──────────────┐    ┌───────────────────┐
//!   │  http  │───▶│ auth::Login  │───▶│ directory::Client │──▶ users API
//!   │ server │    │   Service    │    └─────────┬─────────┘
//!   └────────┘    └──────┬───────┘              │
//!                        │              ┌───────▼────────┐
//!                        ▼              │   resilience   │
//!                  token issuer         │ CircuitBreaker │
//!                                       └────────────────┘
//!
//!   Cross-cutting: config, observability, lifecycle, admin
//! ```

pub mod admin;
pub mod auth;
pub mod config;
pub mod directory;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod resilience;

pub use config::AppConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
