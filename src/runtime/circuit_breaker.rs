// SPDX-License-Identifier: MIT OR Apache-2.0

//! Sliding-window circuit breaker for calls to the RBMC service.
//!
//! The breaker keeps the outcomes of the last `sliding_window_size` calls
//! and opens once the window holds at least `minimum_calls` outcomes with a
//! failure rate at or above `failure_rate_threshold` percent.
//!
//! # States
//!
//! - **Closed**: Normal operation, calls pass through and are recorded
//! - **Open**: Calls fail immediately with [`GatewayError::CircuitOpen`]
//! - **Half-Open**: A limited number of trial calls test the upstream
//! - **Disabled**: Always permits, records nothing
//! - **Forced-Open**: Always rejects
//! - **Metrics-Only**: Always permits, records outcomes, never transitions
//!
//! Every state change is published synchronously to the listeners
//! registered through [`CircuitBreaker::on_state_transition`].
//!
//! # Example
//!
//! ```
//! use geosat_gateway::runtime::{CircuitBreaker, CircuitBreakerConfig};
//! use std::time::Duration;
//!
//! let config = CircuitBreakerConfig::default()
//!     .with_sliding_window_size(4)
//!     .with_minimum_calls(4)
//!     .with_failure_rate_threshold(50.0)
//!     .with_wait_in_open(Duration::from_secs(5));
//!
//! let breaker = CircuitBreaker::new(config);
//! breaker.on_state_transition(|t| println!("{} -> {}", t.from, t.to));
//! ```

use crate::error::{GatewayError, Result};
use parking_lot::{Mutex, RwLock};
use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Circuit breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CircuitState {
    /// Circuit is closed, requests pass through normally.
    Closed,
    /// Circuit is open, requests fail immediately.
    Open,
    /// Circuit is half-open, testing if service has recovered.
    HalfOpen,
    /// Breaker switched off; every call is permitted and nothing is recorded.
    Disabled,
    /// Breaker held open by an operator.
    ForcedOpen,
    /// Outcomes are recorded but the breaker never changes state.
    MetricsOnly,
}

impl CircuitState {
    /// Numeric encoding used by the state gauge.
    #[must_use]
    pub fn gauge_value(self) -> u64 {
        match self {
            CircuitState::Closed => 0,
            CircuitState::Open => 1,
            CircuitState::HalfOpen => 2,
            CircuitState::Disabled => 3,
            CircuitState::ForcedOpen => 4,
            CircuitState::MetricsOnly => 5,
        }
    }

    /// Whether calls are admitted without consulting the window.
    fn always_permits(self) -> bool {
        matches!(
            self,
            CircuitState::Closed | CircuitState::Disabled | CircuitState::MetricsOnly
        )
    }
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CircuitState::Closed => "CLOSED",
            CircuitState::Open => "OPEN",
            CircuitState::HalfOpen => "HALF_OPEN",
            CircuitState::Disabled => "DISABLED",
            CircuitState::ForcedOpen => "FORCED_OPEN",
            CircuitState::MetricsOnly => "METRICS_ONLY",
        };
        f.write_str(name)
    }
}

/// A single state change published to listeners.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateTransition {
    /// State before the change.
    pub from: CircuitState,
    /// State after the change.
    pub to: CircuitState,
}

/// Callback invoked on every state change.
///
/// Listeners run while the breaker holds its state lock, so they see
/// transitions in order. They must not call back into the breaker.
pub type TransitionListener = Arc<dyn Fn(StateTransition) + Send + Sync>;

/// Configuration for the circuit breaker.
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Number of most recent outcomes kept in the window.
    pub sliding_window_size: usize,
    /// Outcomes required before the failure rate is evaluated.
    pub minimum_calls: usize,
    /// Failure rate, in percent, at which the breaker opens.
    pub failure_rate_threshold: f64,
    /// Duration to wait before transitioning from open to half-open.
    pub wait_in_open: Duration,
    /// Trial calls admitted in half-open state.
    pub permitted_calls_in_half_open: usize,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            sliding_window_size: 10,
            minimum_calls: 5,
            failure_rate_threshold: 50.0,
            wait_in_open: Duration::from_secs(30),
            permitted_calls_in_half_open: 3,
        }
    }
}

impl CircuitBreakerConfig {
    /// Create a new circuit breaker configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the sliding window size.
    #[must_use]
    pub fn with_sliding_window_size(mut self, size: usize) -> Self {
        self.sliding_window_size = size;
        self
    }

    /// Set the minimum number of calls before the rate is evaluated.
    #[must_use]
    pub fn with_minimum_calls(mut self, calls: usize) -> Self {
        self.minimum_calls = calls;
        self
    }

    /// Set the failure rate threshold in percent.
    #[must_use]
    pub fn with_failure_rate_threshold(mut self, percent: f64) -> Self {
        self.failure_rate_threshold = percent;
        self
    }

    /// Set the wait duration in open state.
    #[must_use]
    pub fn with_wait_in_open(mut self, wait: Duration) -> Self {
        self.wait_in_open = wait;
        self
    }

    /// Set the number of trial calls in half-open state.
    #[must_use]
    pub fn with_permitted_calls_in_half_open(mut self, calls: usize) -> Self {
        self.permitted_calls_in_half_open = calls;
        self
    }

    fn effective_minimum_calls(&self) -> usize {
        self.minimum_calls.clamp(1, self.sliding_window_size.max(1))
    }
}

/// Count-based ring of call outcomes.
#[derive(Debug)]
struct SlidingWindow {
    outcomes: VecDeque<bool>,
    capacity: usize,
    failures: usize,
}

impl SlidingWindow {
    fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            outcomes: VecDeque::with_capacity(capacity),
            capacity,
            failures: 0,
        }
    }

    fn record(&mut self, failed: bool) {
        if self.outcomes.len() == self.capacity {
            if let Some(true) = self.outcomes.pop_front() {
                self.failures -= 1;
            }
        }
        self.outcomes.push_back(failed);
        if failed {
            self.failures += 1;
        }
    }

    fn len(&self) -> usize {
        self.outcomes.len()
    }

    fn failure_rate(&self) -> f64 {
        if self.outcomes.is_empty() {
            return 0.0;
        }
        self.failures as f64 * 100.0 / self.outcomes.len() as f64
    }

    fn clear(&mut self) {
        self.outcomes.clear();
        self.failures = 0;
    }
}

#[derive(Debug)]
struct BreakerInner {
    state: CircuitState,
    window: SlidingWindow,
    opened_at: Option<Instant>,
    half_open_admitted: usize,
    half_open_successes: usize,
    /// Bumped on every transition; permits from an older generation are stale.
    generation: u64,
}

/// Permission for one call, handed out by
/// [`CircuitBreaker::try_acquire_permission`].
///
/// Report the outcome through [`on_success`](Self::on_success) or
/// [`on_failure`](Self::on_failure). A permit dropped without an outcome,
/// as when the caller's future is cancelled, gives its half-open trial
/// slot back. Outcomes are ignored once the breaker has changed state
/// since the permit was issued.
#[derive(Debug)]
#[must_use = "report the call outcome through the permit"]
pub struct CallPermit<'a> {
    breaker: &'a CircuitBreaker,
    generation: u64,
    trial: bool,
    settled: bool,
}

impl CallPermit<'_> {
    /// Record a successful call.
    pub fn on_success(mut self) {
        self.settled = true;
        self.breaker.record(Some(self.generation), false);
    }

    /// Record a failed call.
    pub fn on_failure(mut self) {
        self.settled = true;
        self.breaker.record(Some(self.generation), true);
    }
}

impl Drop for CallPermit<'_> {
    fn drop(&mut self) {
        if !self.settled && self.trial {
            self.breaker.release_trial(self.generation);
        }
    }
}

/// Circuit breaker guarding a single upstream target.
///
/// All bookkeeping for one call happens under a single short-held mutex;
/// the lifetime counters are plain atomics.
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    inner: Mutex<BreakerInner>,
    listeners: RwLock<Vec<TransitionListener>>,
    total_calls: AtomicU64,
    total_failures: AtomicU64,
    total_rejections: AtomicU64,
}

impl fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("config", &self.config)
            .field("state", &self.inner.lock().state)
            .field("listeners", &self.listeners.read().len())
            .finish()
    }
}

impl CircuitBreaker {
    /// Create a new circuit breaker with the given configuration.
    #[must_use]
    pub fn new(config: CircuitBreakerConfig) -> Self {
        let window = SlidingWindow::new(config.sliding_window_size);
        Self {
            config,
            inner: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                window,
                opened_at: None,
                half_open_admitted: 0,
                half_open_successes: 0,
                generation: 0,
            }),
            listeners: RwLock::new(Vec::new()),
            total_calls: AtomicU64::new(0),
            total_failures: AtomicU64::new(0),
            total_rejections: AtomicU64::new(0),
        }
    }

    /// Create a circuit breaker with default configuration.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }

    /// Register a listener for state transitions.
    pub fn on_state_transition<F>(&self, listener: F)
    where
        F: Fn(StateTransition) + Send + Sync + 'static,
    {
        self.listeners.write().push(Arc::new(listener));
    }

    /// Get the current circuit state.
    ///
    /// An open breaker whose wait has elapsed moves to half-open here.
    pub fn state(&self) -> CircuitState {
        let mut inner = self.inner.lock();
        self.expire_open(&mut inner);
        inner.state
    }

    /// Check if the circuit allows requests, without reserving a trial slot.
    pub fn can_execute(&self) -> bool {
        let mut inner = self.inner.lock();
        self.expire_open(&mut inner);
        match inner.state {
            CircuitState::HalfOpen => {
                inner.half_open_admitted < self.config.permitted_calls_in_half_open
            }
            state => state.always_permits(),
        }
    }

    /// Reserve permission for one call.
    ///
    /// In half-open state the permit holds one of the trial slots until it
    /// is settled or dropped.
    ///
    /// # Errors
    ///
    /// Returns `GatewayError::CircuitOpen` if the breaker rejects the call.
    pub fn try_acquire_permission(&self) -> Result<CallPermit<'_>> {
        let mut inner = self.inner.lock();
        self.expire_open(&mut inner);

        let trial = inner.state == CircuitState::HalfOpen;
        let permitted = match inner.state {
            CircuitState::HalfOpen => {
                if inner.half_open_admitted < self.config.permitted_calls_in_half_open {
                    inner.half_open_admitted += 1;
                    true
                } else {
                    false
                }
            }
            state => state.always_permits(),
        };

        if permitted {
            return Ok(CallPermit {
                breaker: self,
                generation: inner.generation,
                trial,
                settled: false,
            });
        }

        self.total_rejections.fetch_add(1, Ordering::Relaxed);
        let state = inner.state;
        let remaining = self.remaining_wait(&inner);
        Err(GatewayError::CircuitOpen(match remaining {
            Some(wait) => format!("{state}, call not permitted, retry after {wait:?}"),
            None => format!("{state}, call not permitted"),
        }))
    }

    /// Execute an async operation with circuit breaker protection.
    ///
    /// # Errors
    ///
    /// Returns `GatewayError::CircuitOpen` if the circuit rejects the call.
    /// Returns the operation's error if it fails.
    pub async fn call<F, Fut, T>(&self, operation: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.total_calls.fetch_add(1, Ordering::Relaxed);
        let permit = self.try_acquire_permission()?;

        // Dropping this future mid-call drops the permit unsettled
        match operation().await {
            Ok(result) => {
                permit.on_success();
                Ok(result)
            }
            Err(e) => {
                permit.on_failure();
                Err(e)
            }
        }
    }

    /// Record a successful call against the current state.
    pub fn on_success(&self) {
        self.record(None, false);
    }

    /// Record a failed call against the current state.
    pub fn on_failure(&self) {
        self.record(None, true);
    }

    fn record(&self, generation: Option<u64>, failed: bool) {
        if failed {
            self.total_failures.fetch_add(1, Ordering::Relaxed);
        }

        let mut inner = self.inner.lock();
        if generation.is_some_and(|g| g != inner.generation) {
            debug!(
                target: "geosat_gateway::circuit_breaker",
                state = %inner.state,
                failed,
                "ignoring outcome admitted before the last transition"
            );
            return;
        }

        match inner.state {
            CircuitState::Closed => {
                inner.window.record(failed);
                self.evaluate_window(&mut inner);
            }
            CircuitState::MetricsOnly => inner.window.record(failed),
            // Any trial failure reopens the circuit
            CircuitState::HalfOpen if failed => self.transition(&mut inner, CircuitState::Open),
            CircuitState::HalfOpen => {
                inner.half_open_successes += 1;
                if inner.half_open_successes >= self.config.permitted_calls_in_half_open {
                    self.transition(&mut inner, CircuitState::Closed);
                }
            }
            CircuitState::Open | CircuitState::ForcedOpen | CircuitState::Disabled => {}
        }
    }

    fn release_trial(&self, generation: u64) {
        let mut inner = self.inner.lock();
        if inner.generation == generation && inner.state == CircuitState::HalfOpen {
            inner.half_open_admitted = inner.half_open_admitted.saturating_sub(1);
            debug!(
                target: "geosat_gateway::circuit_breaker",
                admitted = inner.half_open_admitted,
                "half-open trial abandoned, slot released"
            );
        }
    }

    /// Manually reset the circuit breaker to closed state.
    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        self.transition(&mut inner, CircuitState::Closed);
        inner.window.clear();
    }

    /// Switch the breaker off; every call is permitted.
    pub fn disable(&self) {
        let mut inner = self.inner.lock();
        self.transition(&mut inner, CircuitState::Disabled);
    }

    /// Hold the breaker open until [`reset`](Self::reset).
    pub fn force_open(&self) {
        let mut inner = self.inner.lock();
        self.transition(&mut inner, CircuitState::ForcedOpen);
    }

    /// Record outcomes without ever changing state.
    pub fn metrics_only(&self) {
        let mut inner = self.inner.lock();
        self.transition(&mut inner, CircuitState::MetricsOnly);
    }

    /// Get the time until the circuit can retry (if open).
    pub fn time_until_retry(&self) -> Option<Duration> {
        let inner = self.inner.lock();
        self.remaining_wait(&inner)
    }

    /// Failure rate of the current window, in percent.
    #[must_use]
    pub fn failure_rate(&self) -> f64 {
        self.inner.lock().window.failure_rate()
    }

    /// Number of outcomes currently held in the window.
    #[must_use]
    pub fn buffered_calls(&self) -> usize {
        self.inner.lock().window.len()
    }

    /// Get total number of calls.
    #[must_use]
    pub fn total_calls(&self) -> u64 {
        self.total_calls.load(Ordering::Relaxed)
    }

    /// Get total number of failures.
    #[must_use]
    pub fn total_failures(&self) -> u64 {
        self.total_failures.load(Ordering::Relaxed)
    }

    /// Get total number of rejections (circuit open).
    #[must_use]
    pub fn total_rejections(&self) -> u64 {
        self.total_rejections.load(Ordering::Relaxed)
    }

    /// Get the circuit breaker configuration.
    #[must_use]
    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    fn remaining_wait(&self, inner: &BreakerInner) -> Option<Duration> {
        if inner.state != CircuitState::Open {
            return None;
        }
        inner
            .opened_at
            .map(|opened| self.config.wait_in_open.saturating_sub(opened.elapsed()))
    }

    fn expire_open(&self, inner: &mut BreakerInner) {
        if inner.state != CircuitState::Open {
            return;
        }
        let elapsed = inner
            .opened_at
            .map_or(true, |opened| opened.elapsed() >= self.config.wait_in_open);
        if elapsed {
            self.transition(inner, CircuitState::HalfOpen);
        }
    }

    fn evaluate_window(&self, inner: &mut BreakerInner) {
        if inner.window.len() < self.config.effective_minimum_calls() {
            return;
        }
        if inner.window.failure_rate() >= self.config.failure_rate_threshold {
            self.transition(inner, CircuitState::Open);
        }
    }

    fn transition(&self, inner: &mut BreakerInner, to: CircuitState) {
        let from = inner.state;
        if from == to {
            return;
        }

        inner.state = to;
        inner.generation = inner.generation.wrapping_add(1);
        inner.half_open_admitted = 0;
        inner.half_open_successes = 0;
        inner.opened_at = (to == CircuitState::Open).then(Instant::now);
        if matches!(to, CircuitState::Closed | CircuitState::HalfOpen) {
            inner.window.clear();
        }

        info!(
            target: "geosat_gateway::circuit_breaker",
            from = %from,
            to = %to,
            failure_rate = inner.window.failure_rate(),
            "circuit breaker state transition"
        );

        let transition = StateTransition { from, to };
        for listener in self.listeners.read().iter() {
            listener(transition);
        }
    }
}
