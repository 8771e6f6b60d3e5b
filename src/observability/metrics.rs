//! Metrics collection and exposition.
//!
//! # Metrics
//! - `auth_login_total` (counter): login attempts by outcome
//! - `auth_login_duration_seconds` (histogram): login latency
//! - `auth_breaker_state` (gauge): 0=closed, 1=half-open, 2=open
//! - `auth_breaker_transitions_total` (counter): transitions by from/to
//! - `auth_breaker_rejections_total` (counter): denied calls by reason
//! - `auth_directory_requests_total` (counter): directory calls by result
//! - `auth_directory_fallback_total` (counter): fallback users served

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

use crate::resilience::CircuitState;

/// Install the Prometheus recorder and its scrape listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_login(outcome: &'static str, start: Instant) {
    counter!("auth_login_total", "outcome" => outcome).increment(1);
    histogram!("auth_login_duration_seconds").record(start.elapsed().as_secs_f64());
}

pub fn record_breaker_state(breaker: &str, state: CircuitState) {
    let value = match state {
        CircuitState::Closed => 0.0,
        CircuitState::HalfOpen => 1.0,
        CircuitState::Open => 2.0,
    };
    gauge!("auth_breaker_state", "breaker" => breaker.to_string()).set(value);
}

pub fn record_breaker_transition(breaker: &str, from: CircuitState, to: CircuitState) {
    counter!(
        "auth_breaker_transitions_total",
        "breaker" => breaker.to_string(),
        "from" => from.as_str(),
        "to" => to.as_str()
    )
    .increment(1);
    record_breaker_state(breaker, to);
}

pub fn record_breaker_rejection(breaker: &str, reason: &'static str) {
    counter!(
        "auth_breaker_rejections_total",
        "breaker" => breaker.to_string(),
        "reason" => reason
    )
    .increment(1);
}

pub fn record_directory_request(result: &'static str) {
    counter!("auth_directory_requests_total", "result" => result).increment(1);
}

pub fn record_directory_fallback() {
    counter!("auth_directory_fallback_total").increment(1);
}
