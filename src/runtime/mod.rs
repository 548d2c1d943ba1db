// SPDX-License-Identifier: MIT OR Apache-2.0

//! Runtime utilities for resilience and observability.
//!
//! Retry policies, the sliding-window circuit breaker and its open-time
//! tracker, fetch logging and Prometheus metrics for the RBMC gateway.

mod circuit_breaker;
mod logging;
pub mod metrics;
mod retry;
mod state_tracker;

pub use circuit_breaker::{
    CallPermit, CircuitBreaker, CircuitBreakerConfig, CircuitState, StateTransition,
    TransitionListener,
};
pub use logging::{LogLevel, LoggingConfig, RequestLogger, RequestSpan};
pub use metrics::{MetricsCollector, MetricsConfig, MetricsSnapshot};
pub use retry::{
    Backoff, BackoffStrategy, DefaultRetryPolicy, ExponentialBackoff, FixedBackoff, NoBackoff,
    NoRetryPolicy, RetryConfig, RetryConfigBuilder, RetryPolicy,
};
pub use state_tracker::CircuitBreakerStateTracker;
