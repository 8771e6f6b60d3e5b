//! Login subsystem.
//!
//! # Data Flow
//! ```text
//! POST /login {username, password}
//!     → login.rs (LoginService::login)
//!         → directory::UserDirectory::lookup (breaker-guarded, may fall back)
//!         → credentials.rs (username_password membership)
//!         → token.rs (sign access token, 72h)
//!     → LoginOutcome → HTTP status
//! ```
//!
//! # Design Decisions
//! - The service holds no per-request state; every login is independent
//! - Fallback identities are accepted for token issuance (availability over
//!   consistency) and flagged as degraded
//! - Internal error detail is logged, never returned to the caller

pub mod credentials;
pub mod login;
pub mod token;
pub mod types;

pub use credentials::AllowedCredentials;
pub use login::LoginService;
pub use token::{Credential, TokenError, TokenIssuer};
pub use types::{AuthError, LoginOutcome};
