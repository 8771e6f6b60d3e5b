//! Rolling outcome counters for a circuit breaker window.

use serde::Serialize;

/// Outcome statistics for the current breaker generation.
///
/// `requests` is incremented when a call is admitted, the other counters when
/// its outcome is recorded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RollingCounts {
    pub requests: u32,
    pub total_successes: u32,
    pub total_failures: u32,
    pub consecutive_successes: u32,
    pub consecutive_failures: u32,
}

impl RollingCounts {
    pub(crate) fn on_request(&mut self) {
        self.requests = self.requests.saturating_add(1);
    }

    pub(crate) fn on_success(&mut self) {
        self.total_successes = self.total_successes.saturating_add(1);
        self.consecutive_successes = self.consecutive_successes.saturating_add(1);
        self.consecutive_failures = 0;
    }

    pub(crate) fn on_failure(&mut self) {
        self.total_failures = self.total_failures.saturating_add(1);
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        self.consecutive_successes = 0;
    }

    pub(crate) fn clear(&mut self) {
        *self = Self::default();
    }

    /// Failures over admitted requests; 0.0 for an empty window.
    pub fn failure_ratio(&self) -> f64 {
        if self.requests == 0 {
            return 0.0;
        }
        f64::from(self.total_failures) / f64::from(self.requests)
    }
}

/// Trip once at least `min_requests` were seen and the failure ratio reaches `ratio`.
pub fn failure_ratio_trip(min_requests: u32, ratio: f64) -> impl Fn(&RollingCounts) -> bool + Send + Sync + 'static {
    move |counts| counts.requests >= min_requests && counts.failure_ratio() >= ratio
}

/// Trip once consecutive failures exceed `threshold`.
pub fn consecutive_failures_trip(threshold: u32) -> impl Fn(&RollingCounts) -> bool + Send + Sync + 'static {
    move |counts| counts.consecutive_failures > threshold
}
