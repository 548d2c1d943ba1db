// SPDX-License-Identifier: MIT OR Apache-2.0

//! Tracks when the circuit breaker last opened.
//!
//! The tracker registers a transition listener on the breaker. Entering
//! `OPEN` stamps the Open-Since instant, leaving `OPEN` clears it. Readers
//! derive the `Retry-After` hint from that instant without touching the
//! breaker's lock beyond a state query.

use super::circuit_breaker::{CircuitBreaker, CircuitState, StateTransition};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Lock-free optional instant.
///
/// Stored as nanoseconds since `epoch` plus one; zero means absent.
#[derive(Debug)]
struct OpenSince {
    epoch: Instant,
    offset: AtomicU64,
}

impl OpenSince {
    fn new() -> Self {
        Self {
            epoch: Instant::now(),
            offset: AtomicU64::new(0),
        }
    }

    fn mark(&self, at: Instant) {
        let nanos = at.saturating_duration_since(self.epoch).as_nanos();
        let encoded = u64::try_from(nanos).unwrap_or(u64::MAX - 1) + 1;
        self.offset.store(encoded, Ordering::Release);
    }

    fn clear(&self) {
        self.offset.store(0, Ordering::Release);
    }

    fn get(&self) -> Option<Instant> {
        match self.offset.load(Ordering::Acquire) {
            0 => None,
            encoded => Some(self.epoch + Duration::from_nanos(encoded - 1)),
        }
    }

    fn observe(&self, transition: StateTransition) {
        if transition.to == CircuitState::Open {
            self.mark(Instant::now());
        } else if transition.from == CircuitState::Open {
            self.clear();
        }
    }
}

/// Derives the remaining open time of a circuit breaker.
#[derive(Debug, Clone)]
pub struct CircuitBreakerStateTracker {
    breaker: Arc<CircuitBreaker>,
    open_since: Arc<OpenSince>,
}

impl CircuitBreakerStateTracker {
    /// Create a tracker and subscribe it to the breaker's transitions.
    ///
    /// Transitions that happened before this call are not seen; an
    /// already open breaker reports the full configured wait.
    #[must_use]
    pub fn attach(breaker: Arc<CircuitBreaker>) -> Self {
        let open_since = Arc::new(OpenSince::new());
        let hook = Arc::clone(&open_since);
        breaker.on_state_transition(move |transition| hook.observe(transition));
        Self {
            breaker,
            open_since,
        }
    }

    /// Current breaker state.
    pub fn current_state(&self) -> CircuitState {
        self.breaker.state()
    }

    /// Instant of the last transition into `OPEN`, if still open.
    #[must_use]
    pub fn open_since(&self) -> Option<Instant> {
        self.open_since.get()
    }

    /// Whole seconds until the breaker leaves `OPEN`.
    ///
    /// `None` unless the breaker is `OPEN`. Never returns zero.
    pub fn remaining_open_seconds(&self) -> Option<u64> {
        if self.current_state() != CircuitState::Open {
            return None;
        }

        let wait = self.breaker.config().wait_in_open;
        let remaining = match self.open_since.get() {
            Some(since) => wait.saturating_sub(since.elapsed()),
            None => wait,
        };
        Some(remaining.as_secs().max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GatewayError;
    use crate::runtime::CircuitBreakerConfig;

    fn breaker(wait: Duration) -> Arc<CircuitBreaker> {
        Arc::new(CircuitBreaker::new(
            CircuitBreakerConfig::new()
                .with_sliding_window_size(2)
                .with_minimum_calls(2)
                .with_failure_rate_threshold(50.0)
                .with_wait_in_open(wait),
        ))
    }

    fn trip(breaker: &CircuitBreaker) {
        breaker.on_failure();
        breaker.on_failure();
    }

    #[test]
    fn test_closed_has_no_remaining_time() {
        let breaker = breaker(Duration::from_secs(30));
        let tracker = CircuitBreakerStateTracker::attach(breaker);

        assert_eq!(tracker.current_state(), CircuitState::Closed);
        assert_eq!(tracker.remaining_open_seconds(), None);
        assert!(tracker.open_since().is_none());
    }

    #[test]
    fn test_open_reports_remaining_wait() {
        let breaker = breaker(Duration::from_secs(30));
        let tracker = CircuitBreakerStateTracker::attach(breaker.clone());
        trip(&breaker);

        let remaining = tracker.remaining_open_seconds().unwrap();
        assert!((29..=30).contains(&remaining), "remaining = {remaining}");
        assert!(tracker.open_since().is_some());
    }

    #[test]
    fn test_remaining_is_non_increasing() {
        let breaker = breaker(Duration::from_secs(3));
        let tracker = CircuitBreakerStateTracker::attach(breaker.clone());
        trip(&breaker);

        let first = tracker.remaining_open_seconds().unwrap();
        std::thread::sleep(Duration::from_millis(1100));
        let second = tracker.remaining_open_seconds().unwrap();

        assert!(second <= first);
        assert!(second >= 1);
    }

    #[test]
    fn test_sub_second_wait_clamps_to_one() {
        let breaker = breaker(Duration::from_millis(500));
        let tracker = CircuitBreakerStateTracker::attach(breaker.clone());
        trip(&breaker);

        assert_eq!(tracker.remaining_open_seconds(), Some(1));
    }

    #[test]
    fn test_missed_transition_falls_back_to_full_wait() {
        let breaker = breaker(Duration::from_secs(30));
        trip(&breaker);

        let tracker = CircuitBreakerStateTracker::attach(breaker);
        assert!(tracker.open_since().is_none());
        assert_eq!(tracker.remaining_open_seconds(), Some(30));
    }

    #[test]
    fn test_leaving_open_clears_timestamp() {
        let breaker = breaker(Duration::from_millis(10));
        let tracker = CircuitBreakerStateTracker::attach(breaker.clone());
        trip(&breaker);
        assert!(tracker.open_since().is_some());

        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(tracker.current_state(), CircuitState::HalfOpen);
        assert!(tracker.open_since().is_none());
        assert_eq!(tracker.remaining_open_seconds(), None);
    }

    #[test]
    fn test_forced_open_is_not_open() {
        let breaker = breaker(Duration::from_secs(30));
        let tracker = CircuitBreakerStateTracker::attach(breaker.clone());
        trip(&breaker);
        breaker.force_open();

        assert!(tracker.open_since().is_none());
        assert_eq!(tracker.remaining_open_seconds(), None);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_readers_race_transitions() {
        let breaker = Arc::new(CircuitBreaker::new(
            CircuitBreakerConfig::new()
                .with_sliding_window_size(8)
                .with_minimum_calls(4)
                .with_failure_rate_threshold(50.0)
                .with_wait_in_open(Duration::from_millis(5))
                .with_permitted_calls_in_half_open(2),
        ));
        let tracker = CircuitBreakerStateTracker::attach(breaker.clone());
        let transitions = Arc::new(AtomicU64::new(0));
        {
            let transitions = transitions.clone();
            breaker.on_state_transition(move |_| {
                transitions.fetch_add(1, Ordering::SeqCst);
            });
        }

        let mut callers = Vec::new();
        for task in 0..4u64 {
            let breaker = breaker.clone();
            callers.push(tokio::spawn(async move {
                for i in 0..500u64 {
                    let fail = (i + task) % 3 != 0;
                    let _ = breaker
                        .call(|| async move {
                            tokio::task::yield_now().await;
                            if fail {
                                Err(GatewayError::Transport("connection reset".to_string()))
                            } else {
                                Ok(())
                            }
                        })
                        .await;
                }
            }));
        }

        let mut readers = Vec::new();
        for _ in 0..4 {
            let tracker = tracker.clone();
            readers.push(tokio::spawn(async move {
                for _ in 0..2000 {
                    // A sub-second wait always rounds up to one second
                    if let Some(secs) = tracker.remaining_open_seconds() {
                        assert_eq!(secs, 1);
                    }
                    tokio::task::yield_now().await;
                }
            }));
        }

        for caller in callers {
            caller.await.unwrap();
        }
        for reader in readers {
            reader.await.unwrap();
        }

        assert_eq!(breaker.total_calls(), 2000);
        assert!(breaker.buffered_calls() <= 8);
        assert!(transitions.load(Ordering::SeqCst) > 0);

        let state = tracker.current_state();
        assert_eq!(state == CircuitState::Open, tracker.open_since().is_some());
    }
}
