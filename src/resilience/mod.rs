//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Call to the user directory:
//!     → circuit_breaker.rs (admit or reject, enforce per-call timeout)
//!     → wrapped operation (network round trip)
//!     → caller-supplied classifier (success / failure)
//!     → counts.rs (update rolling window, evaluate trip predicate)
//! ```
//!
//! # Design Decisions
//! - Every external call has a deadline
//! - No internal retries; retry policy belongs to the caller
//! - Failure classification is supplied by the caller, never inferred
//! - One breaker instance per dependency, shared via `Arc`

pub mod circuit_breaker;
pub mod counts;

pub use circuit_breaker::{BreakerConfig, BreakerError, BreakerStatus, CircuitBreaker, CircuitState};
pub use counts::RollingCounts;
