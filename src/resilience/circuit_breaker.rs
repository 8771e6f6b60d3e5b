//! Circuit breaker guarding calls to a downstream dependency.
//!
//! # States
//! - Closed: calls pass through, outcomes are counted
//! - Open: dependency assumed down, calls fail fast
//! - Half-Open: a bounded number of trial calls probe recovery
//!
//! # State Transitions
//! ```text
//! Closed → Open: trip predicate true for the current counts
//! Open → Half-Open: open timeout elapsed (evaluated on the next call)
//! Half-Open → Closed: max_requests consecutive successes
//! Half-Open → Open: any failure
//! ```
//!
//! # Design Decisions
//! - One mutex guards state, counts and generation; admission and outcome
//!   recording are each a single critical section
//! - Every transition (and every Closed interval rollover) starts a new
//!   generation with zeroed counts; outcomes from an older generation are dropped
//! - A call whose future is dropped mid-flight is recorded as a failure
//! - State-change hooks run after the lock is released

use std::fmt;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tokio::time::Instant;

use crate::config::schema::{BreakerSettings, TripPolicy};
use crate::observability::metrics;
use crate::resilience::counts::{self, RollingCounts};

/// Breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    HalfOpen,
    Open,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::HalfOpen => "half-open",
            CircuitState::Open => "open",
        }
    }
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Decides whether a Closed breaker should trip.
pub type TripPredicate = Arc<dyn Fn(&RollingCounts) -> bool + Send + Sync>;

/// Observes transitions: `(breaker name, from, to)`.
pub type StateChangeHook = Arc<dyn Fn(&str, CircuitState, CircuitState) + Send + Sync>;

/// Immutable breaker configuration.
#[derive(Clone)]
pub struct BreakerConfig {
    /// Trial calls admitted per Half-Open window, and successes needed to close.
    pub max_requests: u32,
    /// Closed-state window length. Zero disables rollover.
    pub interval: Duration,
    /// Time spent Open before probing. Also bounds each wrapped call.
    pub timeout: Duration,
    pub ready_to_trip: TripPredicate,
    pub on_state_change: Option<StateChangeHook>,
}

impl BreakerConfig {
    /// Build from the file/env configuration section.
    pub fn from_settings(settings: &BreakerSettings) -> Self {
        let ready_to_trip: TripPredicate = match settings.trip {
            TripPolicy::FailureRatio { min_requests, ratio } => {
                Arc::new(counts::failure_ratio_trip(min_requests, ratio))
            }
            TripPolicy::ConsecutiveFailures { threshold } => {
                Arc::new(counts::consecutive_failures_trip(threshold))
            }
        };

        Self {
            max_requests: settings.max_requests,
            interval: Duration::from_secs(settings.interval_secs),
            timeout: Duration::from_secs(settings.timeout_secs),
            ready_to_trip,
            on_state_change: None,
        }
    }

    pub fn with_trip_predicate<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&RollingCounts) -> bool + Send + Sync + 'static,
    {
        self.ready_to_trip = Arc::new(predicate);
        self
    }

    pub fn with_state_change_hook<F>(mut self, hook: F) -> Self
    where
        F: Fn(&str, CircuitState, CircuitState) + Send + Sync + 'static,
    {
        self.on_state_change = Some(Arc::new(hook));
        self
    }
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self::from_settings(&BreakerSettings::default())
    }
}

impl fmt::Debug for BreakerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BreakerConfig")
            .field("max_requests", &self.max_requests)
            .field("interval", &self.interval)
            .field("timeout", &self.timeout)
            .field("on_state_change", &self.on_state_change.is_some())
            .finish_non_exhaustive()
    }
}

/// Errors returned by [`CircuitBreaker::execute`].
///
/// `Open` and `TooManyRequests` are breaker denials: the wrapped operation was
/// never invoked.
#[derive(Debug, Error)]
pub enum BreakerError<E> {
    #[error("circuit breaker is open")]
    Open,

    #[error("too many requests while circuit breaker is half-open")]
    TooManyRequests,

    #[error("call timed out after {0:?}")]
    Timeout(Duration),

    #[error("{0}")]
    Operation(E),
}

impl<E> BreakerError<E> {
    /// True when the breaker refused to run the operation.
    pub fn is_rejection(&self) -> bool {
        matches!(self, BreakerError::Open | BreakerError::TooManyRequests)
    }
}

/// Serializable snapshot for status endpoints.
#[derive(Debug, Clone, Serialize)]
pub struct BreakerStatus {
    pub name: String,
    pub state: CircuitState,
    #[serde(flatten)]
    pub counts: RollingCounts,
    pub is_open: bool,
    pub is_half_open: bool,
    pub is_closed: bool,
}

#[derive(Debug)]
struct Inner {
    state: CircuitState,
    generation: u64,
    counts: RollingCounts,
    /// End of the Closed window, or end of the Open period.
    expiry: Option<Instant>,
}

type Transition = (CircuitState, CircuitState);

impl Inner {
    fn new_generation(&mut self, now: Instant, config: &BreakerConfig) {
        self.generation = self.generation.wrapping_add(1);
        self.counts.clear();
        self.expiry = match self.state {
            CircuitState::Closed if config.interval.is_zero() => None,
            CircuitState::Closed => Some(now + config.interval),
            CircuitState::Open => Some(now + config.timeout),
            CircuitState::HalfOpen => None,
        };
    }

    fn set_state(
        &mut self,
        to: CircuitState,
        now: Instant,
        config: &BreakerConfig,
        transitions: &mut Vec<Transition>,
    ) {
        if self.state == to {
            return;
        }
        let from = self.state;
        self.state = to;
        self.new_generation(now, config);
        transitions.push((from, to));
    }

    /// Apply time-driven changes: Closed window rollover, Open → Half-Open.
    fn refresh(&mut self, now: Instant, config: &BreakerConfig, transitions: &mut Vec<Transition>) {
        let expired = self.expiry.is_some_and(|expiry| expiry <= now);
        match self.state {
            CircuitState::Closed if expired => self.new_generation(now, config),
            CircuitState::Open if expired => {
                self.set_state(CircuitState::HalfOpen, now, config, transitions)
            }
            _ => {}
        }
    }

    fn on_success(&mut self, now: Instant, config: &BreakerConfig, transitions: &mut Vec<Transition>) {
        match self.state {
            CircuitState::Closed => {
                self.counts.on_success();
                // A ratio predicate can still be met by a window that ends in a success.
                if (config.ready_to_trip)(&self.counts) {
                    self.set_state(CircuitState::Open, now, config, transitions);
                }
            }
            CircuitState::HalfOpen => {
                self.counts.on_success();
                if self.counts.consecutive_successes >= config.max_requests {
                    self.set_state(CircuitState::Closed, now, config, transitions);
                }
            }
            CircuitState::Open => {}
        }
    }

    fn on_failure(&mut self, now: Instant, config: &BreakerConfig, transitions: &mut Vec<Transition>) {
        match self.state {
            CircuitState::Closed => {
                self.counts.on_failure();
                if (config.ready_to_trip)(&self.counts) {
                    self.set_state(CircuitState::Open, now, config, transitions);
                }
            }
            CircuitState::HalfOpen => {
                self.set_state(CircuitState::Open, now, config, transitions);
            }
            CircuitState::Open => {}
        }
    }
}

/// Three-state circuit breaker.
///
/// Safe to share across tasks; wrap in an `Arc` and hand it to every
/// collaborator that calls the protected dependency.
pub struct CircuitBreaker {
    name: String,
    config: BreakerConfig,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: BreakerConfig) -> Self {
        let mut inner = Inner {
            state: CircuitState::Closed,
            generation: 0,
            counts: RollingCounts::default(),
            expiry: None,
        };
        inner.new_generation(Instant::now(), &config);

        let breaker = Self {
            name: name.into(),
            config,
            inner: Mutex::new(inner),
        };
        metrics::record_breaker_state(&breaker.name, CircuitState::Closed);
        breaker
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &BreakerConfig {
        &self.config
    }

    /// Current state, after applying any elapsed timeout or rollover.
    pub fn state(&self) -> CircuitState {
        self.snapshot().0
    }

    /// Counts of the current generation.
    pub fn counts(&self) -> RollingCounts {
        self.snapshot().1
    }

    pub fn status(&self) -> BreakerStatus {
        let (state, counts) = self.snapshot();
        BreakerStatus {
            name: self.name.clone(),
            state,
            counts,
            is_open: state == CircuitState::Open,
            is_half_open: state == CircuitState::HalfOpen,
            is_closed: state == CircuitState::Closed,
        }
    }

    /// Run `operation` through the breaker; `Err` outcomes count as failures.
    pub async fn execute<T, E, F, Fut>(&self, operation: F) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.execute_with(operation, |result: &Result<T, E>| result.is_ok()).await
    }

    /// Run `operation` through the breaker, classifying its outcome with
    /// `is_successful`.
    ///
    /// The operation is bounded by the configured timeout; expiry counts as a
    /// failure. Dropping the returned future while the operation is in flight
    /// also counts as a failure.
    pub async fn execute_with<T, E, F, Fut, P>(
        &self,
        operation: F,
        is_successful: P,
    ) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        P: FnOnce(&Result<T, E>) -> bool,
    {
        let generation = self.before_request::<E>()?;
        let call = InFlightCall {
            breaker: self,
            generation,
            settled: false,
        };

        match tokio::time::timeout(self.config.timeout, operation()).await {
            Ok(result) => {
                call.settle(is_successful(&result));
                result.map_err(BreakerError::Operation)
            }
            Err(_) => {
                tracing::warn!(
                    breaker = %self.name,
                    timeout = ?self.config.timeout,
                    "Protected call timed out"
                );
                call.settle(false);
                Err(BreakerError::Timeout(self.config.timeout))
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn snapshot(&self) -> (CircuitState, RollingCounts) {
        let mut transitions = Vec::new();
        let snapshot = {
            let mut inner = self.lock();
            inner.refresh(Instant::now(), &self.config, &mut transitions);
            (inner.state, inner.counts)
        };
        self.notify(&transitions);
        snapshot
    }

    /// Admit a call and return its generation, or reject it.
    fn before_request<E>(&self) -> Result<u64, BreakerError<E>> {
        let mut transitions = Vec::new();
        let admitted = {
            let mut inner = self.lock();
            inner.refresh(Instant::now(), &self.config, &mut transitions);
            match inner.state {
                CircuitState::Open => Err(BreakerError::Open),
                CircuitState::HalfOpen if inner.counts.requests >= self.config.max_requests => {
                    Err(BreakerError::TooManyRequests)
                }
                _ => {
                    inner.counts.on_request();
                    Ok(inner.generation)
                }
            }
        };
        self.notify(&transitions);

        if let Err(rejection) = &admitted {
            let reason = match rejection {
                BreakerError::Open => "open",
                _ => "too_many_requests",
            };
            tracing::debug!(breaker = %self.name, reason, "Call rejected by circuit breaker");
            metrics::record_breaker_rejection(&self.name, reason);
        }
        admitted
    }

    fn after_request(&self, generation: u64, success: bool) {
        let mut transitions = Vec::new();
        {
            let now = Instant::now();
            let mut inner = self.lock();
            inner.refresh(now, &self.config, &mut transitions);
            if inner.generation == generation {
                if success {
                    inner.on_success(now, &self.config, &mut transitions);
                } else {
                    inner.on_failure(now, &self.config, &mut transitions);
                }
            } else {
                tracing::trace!(breaker = %self.name, generation, "Dropping outcome from a stale generation");
            }
        }
        self.notify(&transitions);
    }

    fn notify(&self, transitions: &[Transition]) {
        for &(from, to) in transitions {
            tracing::info!(breaker = %self.name, from = %from, to = %to, "Circuit breaker changed state");
            metrics::record_breaker_transition(&self.name, from, to);

            if let Some(hook) = &self.config.on_state_change {
                let outcome = panic::catch_unwind(AssertUnwindSafe(|| hook(&self.name, from, to)));
                if outcome.is_err() {
                    tracing::error!(breaker = %self.name, "State change hook panicked");
                }
            }
        }
    }
}

impl fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.lock();
        f.debug_struct("CircuitBreaker")
            .field("name", &self.name)
            .field("state", &inner.state)
            .field("counts", &inner.counts)
            .finish()
    }
}

/// Records a failure if dropped before [`InFlightCall::settle`].
struct InFlightCall<'a> {
    breaker: &'a CircuitBreaker,
    generation: u64,
    settled: bool,
}

impl InFlightCall<'_> {
    fn settle(mut self, success: bool) {
        self.settled = true;
        self.breaker.after_request(self.generation, success);
    }
}

impl Drop for InFlightCall<'_> {
    fn drop(&mut self) {
        if !self.settled {
            tracing::debug!(breaker = %self.breaker.name, "Protected call cancelled");
            self.breaker.after_request(self.generation, false);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::future::join_all;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn config(max_requests: u32) -> BreakerConfig {
        BreakerConfig {
            max_requests,
            interval: Duration::from_secs(60),
            timeout: Duration::from_secs(5),
            ..BreakerConfig::default()
        }
    }

    async fn succeed(cb: &CircuitBreaker) -> Result<(), BreakerError<&'static str>> {
        cb.execute(|| async { Ok(()) }).await
    }

    async fn fail(cb: &CircuitBreaker) -> Result<(), BreakerError<&'static str>> {
        cb.execute(|| async { Err("boom") }).await
    }

    async fn trip(cb: &CircuitBreaker) {
        for _ in 0..3 {
            let _ = fail(cb).await;
        }
        assert_eq!(cb.state(), CircuitState::Open);
    }

    #[tokio::test(start_paused = true)]
    async fn test_trips_on_failure_ratio() {
        let cb = CircuitBreaker::new("users-api", config(1));

        succeed(&cb).await.unwrap();
        assert!(matches!(fail(&cb).await, Err(BreakerError::Operation("boom"))));
        assert_eq!(cb.state(), CircuitState::Closed, "two requests are below the volume floor");

        fail(&cb).await.unwrap_err();
        assert_eq!(cb.state(), CircuitState::Open);
        assert_eq!(cb.counts(), RollingCounts::default(), "entering Open starts a fresh window");
    }

    #[tokio::test(start_paused = true)]
    async fn test_trips_when_window_ends_with_success() {
        let cb = CircuitBreaker::new("users-api", config(1));

        fail(&cb).await.unwrap_err();
        fail(&cb).await.unwrap_err();
        assert_eq!(cb.state(), CircuitState::Closed);

        // 2 failures out of 3 requests is over the 0.6 ratio.
        succeed(&cb).await.unwrap();
        assert_eq!(cb.state(), CircuitState::Open);
        assert!(matches!(succeed(&cb).await, Err(BreakerError::Open)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_never_invokes_operation() {
        let cb = CircuitBreaker::new("users-api", config(1));
        trip(&cb).await;

        let calls = AtomicU32::new(0);
        let calls = &calls;
        for _ in 0..5 {
            let result = cb
                .execute(move || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, &str>(())
                })
                .await;
            assert!(matches!(result, Err(BreakerError::Open)));
            assert!(result.unwrap_err().is_rejection());
        }
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        tokio::time::advance(Duration::from_secs(4)).await;
        assert!(matches!(succeed(&cb).await, Err(BreakerError::Open)));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_admits_single_trial_under_concurrency() {
        let cb = CircuitBreaker::new("users-api", config(1));
        trip(&cb).await;
        tokio::time::advance(Duration::from_secs(5)).await;

        let calls = AtomicU32::new(0);
        let calls = &calls;
        let cb = &cb;
        let attempts = (0..8).map(|_| {
            cb.execute(move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(200)).await;
                Ok::<_, &str>(())
            })
        });
        let results = join_all(attempts).await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert_eq!(
            results
                .iter()
                .filter(|r| matches!(r, Err(BreakerError::TooManyRequests)))
                .count(),
            7
        );
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_failure_reopens_and_restarts_clock() {
        let cb = CircuitBreaker::new("users-api", config(2));
        trip(&cb).await;
        tokio::time::advance(Duration::from_secs(5)).await;
        assert_eq!(cb.state(), CircuitState::HalfOpen);

        fail(&cb).await.unwrap_err();
        assert_eq!(cb.state(), CircuitState::Open);

        tokio::time::advance(Duration::from_secs(4)).await;
        assert!(matches!(succeed(&cb).await, Err(BreakerError::Open)));

        tokio::time::advance(Duration::from_secs(1)).await;
        succeed(&cb).await.unwrap();
        assert_eq!(cb.state(), CircuitState::HalfOpen);
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_closes_after_max_requests_successes() {
        let cb = CircuitBreaker::new("users-api", config(3));
        trip(&cb).await;
        tokio::time::advance(Duration::from_secs(5)).await;

        succeed(&cb).await.unwrap();
        succeed(&cb).await.unwrap();
        assert_eq!(cb.state(), CircuitState::HalfOpen);
        assert_eq!(cb.counts().consecutive_successes, 2);

        succeed(&cb).await.unwrap();
        assert_eq!(cb.state(), CircuitState::Closed);
        assert_eq!(cb.counts(), RollingCounts::default());
    }

    #[tokio::test(start_paused = true)]
    async fn test_closed_window_rolls_over_on_interval() {
        let cb = CircuitBreaker::new("users-api", config(1));
        fail(&cb).await.unwrap_err();
        fail(&cb).await.unwrap_err();
        assert_eq!(cb.counts().total_failures, 2);

        tokio::time::advance(Duration::from_secs(61)).await;
        assert_eq!(cb.counts(), RollingCounts::default());

        fail(&cb).await.unwrap_err();
        assert_eq!(cb.state(), CircuitState::Closed, "old failures must not count");
    }

    #[tokio::test(start_paused = true)]
    async fn test_one_execute_counts_once() {
        let cb = CircuitBreaker::new("users-api", config(1));
        fail(&cb).await.unwrap_err();
        fail(&cb).await.unwrap_err();

        let counts = cb.counts();
        assert_eq!(counts.requests, 2);
        assert_eq!(counts.total_failures, 2);
        assert_eq!(counts.consecutive_failures, 2);
        assert_eq!(counts.total_successes, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_counts_as_failure() {
        let cb = CircuitBreaker::new("users-api", config(1));
        let result = cb
            .execute(|| async {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok::<_, &str>(())
            })
            .await;

        assert!(matches!(result, Err(BreakerError::Timeout(d)) if d == Duration::from_secs(5)));
        assert_eq!(cb.counts().total_failures, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_call_counts_as_failure() {
        let cb = CircuitBreaker::new("users-api", config(1));
        let call = cb.execute(|| async {
            tokio::time::sleep(Duration::from_secs(3)).await;
            Ok::<_, &str>(())
        });

        let outcome = tokio::time::timeout(Duration::from_secs(1), call).await;
        assert!(outcome.is_err());

        let counts = cb.counts();
        assert_eq!(counts.requests, 1);
        assert_eq!(counts.total_failures, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_classifier_decides_failure() {
        let cb = CircuitBreaker::new("users-api", config(1));
        for _ in 0..5 {
            let result = cb
                .execute_with(|| async { Err::<(), _>(404u16) }, |r| !matches!(r, Err(s) if *s >= 500))
                .await;
            assert!(matches!(result, Err(BreakerError::Operation(404))));
        }
        assert_eq!(cb.state(), CircuitState::Closed);
        assert_eq!(cb.counts().total_successes, 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_outcome_is_dropped() {
        let cb = CircuitBreaker::new("users-api", config(1));

        let slow = cb.execute(|| async {
            tokio::time::sleep(Duration::from_secs(1)).await;
            Ok::<_, &str>(())
        });
        let failing = async {
            for _ in 0..3 {
                let _ = fail(&cb).await;
            }
        };
        let (slow_result, _) = tokio::join!(slow, failing);

        assert!(slow_result.is_ok());
        assert_eq!(cb.state(), CircuitState::Open);
        assert_eq!(cb.counts(), RollingCounts::default());
    }

    #[tokio::test(start_paused = true)]
    async fn test_state_change_hook_sees_every_transition() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let cfg = config(1).with_state_change_hook(move |name, from, to| {
            sink.lock().unwrap().push((name.to_string(), from, to));
        });
        let cb = CircuitBreaker::new("users-api", cfg);

        trip(&cb).await;
        tokio::time::advance(Duration::from_secs(5)).await;
        succeed(&cb).await.unwrap();

        let seen = seen.lock().unwrap();
        let transitions: Vec<_> = seen.iter().map(|(_, from, to)| (*from, *to)).collect();
        assert_eq!(
            transitions,
            vec![
                (CircuitState::Closed, CircuitState::Open),
                (CircuitState::Open, CircuitState::HalfOpen),
                (CircuitState::HalfOpen, CircuitState::Closed),
            ]
        );
        assert!(seen.iter().all(|(name, _, _)| name == "users-api"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_panicking_hook_does_not_abort_transition() {
        let cfg = config(1).with_state_change_hook(|_, _, _| panic!("observer bug"));
        let cb = CircuitBreaker::new("users-api", cfg);

        trip(&cb).await;
        assert_eq!(cb.state(), CircuitState::Open);
    }

    #[tokio::test(start_paused = true)]
    async fn test_custom_trip_predicate() {
        let cfg = config(1).with_trip_predicate(|c| c.consecutive_failures >= 1);
        let cb = CircuitBreaker::new("users-api", cfg);

        fail(&cb).await.unwrap_err();
        assert_eq!(cb.state(), CircuitState::Open);

        let status = cb.status();
        assert_eq!(status.name, "users-api");
        assert!(status.is_open);
        assert!(!status.is_closed);
    }
}
