// SPDX-License-Identifier: MIT OR Apache-2.0

//! Retry policies and backoff strategies for upstream fetches.
//!
//! Retry wraps the circuit breaker: every attempt asks the breaker for
//! permission again, so an open breaker fails the remaining attempts
//! without network contact.
//!
//! # Example
//!
//! ```
//! use geosat_gateway::runtime::{RetryConfig, FixedBackoff};
//! use std::time::Duration;
//!
//! let retry = RetryConfig::builder()
//!     .max_attempts(4)
//!     .backoff(FixedBackoff::from_millis(500))
//!     .build();
//! ```

use crate::error::{GatewayError, Result};
use std::time::{Duration, Instant};

/// Defines a backoff strategy for retry delays.
pub trait BackoffStrategy: Clone + Send + Sync + 'static {
    /// Calculate the delay before the next retry attempt.
    ///
    /// # Arguments
    /// * `attempt` - The current attempt number (0-indexed)
    fn delay(&self, attempt: u32) -> Duration;
}

// =============================================================================
// No Backoff
// =============================================================================

/// No delay between retries.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoBackoff;

impl NoBackoff {
    /// Create a new no-backoff strategy.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl BackoffStrategy for NoBackoff {
    fn delay(&self, _attempt: u32) -> Duration {
        Duration::ZERO
    }
}

// =============================================================================
// Fixed Backoff
// =============================================================================

/// Fixed delay between retries.
#[derive(Debug, Clone, Copy)]
pub struct FixedBackoff {
    delay: Duration,
}

impl FixedBackoff {
    /// Create a new fixed backoff strategy.
    #[must_use]
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }

    /// Create a fixed backoff with delay in milliseconds.
    #[must_use]
    pub fn from_millis(millis: u64) -> Self {
        Self::new(Duration::from_millis(millis))
    }
}

impl Default for FixedBackoff {
    fn default() -> Self {
        Self::new(Duration::from_millis(500))
    }
}

impl BackoffStrategy for FixedBackoff {
    fn delay(&self, _attempt: u32) -> Duration {
        self.delay
    }
}

// =============================================================================
// Exponential Backoff
// =============================================================================

/// Exponential backoff - delay grows by `multiplier` with each attempt.
///
/// Optionally includes jitter to prevent thundering herd.
#[derive(Debug, Clone, Copy)]
pub struct ExponentialBackoff {
    initial_delay: Duration,
    max_delay: Duration,
    multiplier: f64,
    jitter: bool,
}

impl ExponentialBackoff {
    /// Create a new exponential backoff strategy.
    #[must_use]
    pub fn new(initial_delay: Duration) -> Self {
        Self {
            initial_delay,
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
            jitter: true,
        }
    }

    /// Set the maximum delay cap.
    #[must_use]
    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    /// Set the multiplier for exponential growth.
    #[must_use]
    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    /// Enable or disable jitter.
    #[must_use]
    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self::new(Duration::from_millis(500))
    }
}

impl BackoffStrategy for ExponentialBackoff {
    fn delay(&self, attempt: u32) -> Duration {
        let base_delay =
            self.initial_delay.as_millis() as f64 * self.multiplier.powi(attempt as i32);
        let capped_delay = base_delay.min(self.max_delay.as_millis() as f64);

        let final_delay = if self.jitter {
            // Up to 25%, deterministic in the attempt number
            let jitter_range = capped_delay * 0.25;
            let jitter = (attempt as f64 * 0.1).sin().abs() * jitter_range;
            capped_delay + jitter
        } else {
            capped_delay
        };

        Duration::from_millis(final_delay as u64)
    }
}

// =============================================================================
// Configured Backoff
// =============================================================================

/// Backoff selected at runtime from configuration.
#[derive(Debug, Clone, Copy)]
pub enum Backoff {
    /// No delay.
    None(NoBackoff),
    /// Constant delay.
    Fixed(FixedBackoff),
    /// Growing delay.
    Exponential(ExponentialBackoff),
}

impl Default for Backoff {
    fn default() -> Self {
        Backoff::Fixed(FixedBackoff::default())
    }
}

impl BackoffStrategy for Backoff {
    fn delay(&self, attempt: u32) -> Duration {
        match self {
            Backoff::None(b) => b.delay(attempt),
            Backoff::Fixed(b) => b.delay(attempt),
            Backoff::Exponential(b) => b.delay(attempt),
        }
    }
}

impl From<NoBackoff> for Backoff {
    fn from(b: NoBackoff) -> Self {
        Backoff::None(b)
    }
}

impl From<FixedBackoff> for Backoff {
    fn from(b: FixedBackoff) -> Self {
        Backoff::Fixed(b)
    }
}

impl From<ExponentialBackoff> for Backoff {
    fn from(b: ExponentialBackoff) -> Self {
        Backoff::Exponential(b)
    }
}

// =============================================================================
// Retry Policy
// =============================================================================

/// Determines whether a failed attempt should be retried.
pub trait RetryPolicy: Clone + Send + Sync + 'static {
    /// Returns `true` if the operation should be retried for this error.
    fn should_retry(&self, error: &GatewayError) -> bool;
}

/// Default retry policy - retries transient upstream failures.
///
/// Circuit-open rejections are retried too unless switched off; each such
/// attempt is rejected again without network contact.
#[derive(Debug, Clone, Copy)]
pub struct DefaultRetryPolicy {
    retry_on_circuit_open: bool,
}

impl DefaultRetryPolicy {
    /// Create the default policy.
    #[must_use]
    pub fn new() -> Self {
        Self {
            retry_on_circuit_open: true,
        }
    }

    /// Choose whether circuit-open rejections consume further attempts.
    #[must_use]
    pub fn with_retry_on_circuit_open(mut self, retry: bool) -> Self {
        self.retry_on_circuit_open = retry;
        self
    }
}

impl Default for DefaultRetryPolicy {
    fn default() -> Self {
        Self::new()
    }
}

impl RetryPolicy for DefaultRetryPolicy {
    fn should_retry(&self, error: &GatewayError) -> bool {
        error.is_transient() || (self.retry_on_circuit_open && error.is_circuit_open())
    }
}

/// Never retry - fail immediately.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoRetryPolicy;

impl RetryPolicy for NoRetryPolicy {
    fn should_retry(&self, _error: &GatewayError) -> bool {
        false
    }
}

// =============================================================================
// Retry Configuration
// =============================================================================

/// Complete retry configuration combining policy and backoff.
#[derive(Debug, Clone)]
pub struct RetryConfig<P: RetryPolicy = DefaultRetryPolicy, B: BackoffStrategy = Backoff> {
    /// Maximum number of attempts, the first call included.
    pub max_attempts: u32,
    /// Policy determining which errors to retry.
    pub policy: P,
    /// Backoff strategy for calculating delays.
    pub backoff: B,
    /// Maximum total time for all attempts.
    pub total_timeout: Option<Duration>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            policy: DefaultRetryPolicy::default(),
            backoff: Backoff::default(),
            total_timeout: None,
        }
    }
}

impl RetryConfig {
    /// Create a new retry configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a configuration builder.
    #[must_use]
    pub fn builder() -> RetryConfigBuilder<DefaultRetryPolicy, Backoff> {
        RetryConfigBuilder::new()
    }

    /// A single attempt, no retries.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            max_attempts: 1,
            policy: DefaultRetryPolicy::default(),
            backoff: Backoff::None(NoBackoff),
            total_timeout: None,
        }
    }
}

impl<P: RetryPolicy, B: BackoffStrategy> RetryConfig<P, B> {
    /// Execute an async operation with retry logic.
    ///
    /// # Errors
    ///
    /// Returns the error of the last attempt once the policy declines a
    /// retry or the attempts are exhausted.
    pub async fn execute<T, F, Fut>(&self, operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        self.execute_with_notify(operation, |_, _, _| {}).await
    }

    /// Execute with a hook called before each retry.
    ///
    /// The hook receives the number of the attempt that just failed
    /// (1-indexed), its error and the delay before the next attempt.
    ///
    /// # Errors
    ///
    /// Same as [`execute`](Self::execute).
    pub async fn execute_with_notify<T, F, Fut, N>(
        &self,
        mut operation: F,
        mut on_retry: N,
    ) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
        N: FnMut(u32, &GatewayError, Duration),
    {
        let start = Instant::now();
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            match operation().await {
                Ok(result) => return Ok(result),
                Err(e) => {
                    if !self.policy.should_retry(&e) || attempt >= max_attempts {
                        return Err(e);
                    }

                    if let Some(timeout) = self.total_timeout {
                        if start.elapsed() >= timeout {
                            return Err(e);
                        }
                    }

                    let delay = self.backoff.delay(attempt - 1);
                    on_retry(attempt, &e, delay);
                    tokio::time::sleep(delay).await;

                    attempt += 1;
                }
            }
        }
    }
}

/// Builder for `RetryConfig`.
#[derive(Debug, Clone)]
pub struct RetryConfigBuilder<P: RetryPolicy, B: BackoffStrategy> {
    max_attempts: u32,
    policy: P,
    backoff: B,
    total_timeout: Option<Duration>,
}

impl RetryConfigBuilder<DefaultRetryPolicy, Backoff> {
    /// Create a new builder with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self {
            max_attempts: 4,
            policy: DefaultRetryPolicy::default(),
            backoff: Backoff::default(),
            total_timeout: None,
        }
    }
}

impl Default for RetryConfigBuilder<DefaultRetryPolicy, Backoff> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: RetryPolicy> RetryConfigBuilder<P, Backoff> {
    /// Set the backoff strategy.
    #[must_use]
    pub fn backoff(mut self, backoff: impl Into<Backoff>) -> Self {
        self.backoff = backoff.into();
        self
    }
}

impl<P: RetryPolicy, B: BackoffStrategy> RetryConfigBuilder<P, B> {
    /// Set maximum attempts, the first call included.
    #[must_use]
    pub fn max_attempts(mut self, max: u32) -> Self {
        self.max_attempts = max;
        self
    }

    /// Set the retry policy.
    #[must_use]
    pub fn policy<P2: RetryPolicy>(self, policy: P2) -> RetryConfigBuilder<P2, B> {
        RetryConfigBuilder {
            max_attempts: self.max_attempts,
            policy,
            backoff: self.backoff,
            total_timeout: self.total_timeout,
        }
    }

    /// Use a backoff strategy outside the configurable set.
    #[must_use]
    pub fn custom_backoff<B2: BackoffStrategy>(self, backoff: B2) -> RetryConfigBuilder<P, B2> {
        RetryConfigBuilder {
            max_attempts: self.max_attempts,
            policy: self.policy,
            backoff,
            total_timeout: self.total_timeout,
        }
    }

    /// Set the total timeout for all attempts.
    #[must_use]
    pub fn total_timeout(mut self, timeout: Duration) -> Self {
        self.total_timeout = Some(timeout);
        self
    }

    /// Build the configuration.
    #[must_use]
    pub fn build(self) -> RetryConfig<P, B> {
        RetryConfig {
            max_attempts: self.max_attempts,
            policy: self.policy,
            backoff: self.backoff,
            total_timeout: self.total_timeout,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn transient() -> GatewayError {
        GatewayError::Status {
            status: 503,
            url: "https://rbmc.local/relatorio/alar".to_string(),
        }
    }

    #[test]
    fn test_no_backoff() {
        let backoff = NoBackoff::new();
        assert_eq!(backoff.delay(0), Duration::ZERO);
        assert_eq!(backoff.delay(100), Duration::ZERO);
    }

    #[test]
    fn test_fixed_backoff() {
        let backoff = FixedBackoff::default();
        assert_eq!(backoff.delay(0), Duration::from_millis(500));
        assert_eq!(backoff.delay(5), Duration::from_millis(500));
    }

    #[test]
    fn test_exponential_backoff() {
        let backoff = ExponentialBackoff::new(Duration::from_millis(100))
            .with_max_delay(Duration::from_secs(10))
            .with_jitter(false);

        assert_eq!(backoff.delay(0), Duration::from_millis(100));
        assert_eq!(backoff.delay(1), Duration::from_millis(200));
        assert_eq!(backoff.delay(2), Duration::from_millis(400));
        assert_eq!(backoff.delay(3), Duration::from_millis(800));
    }

    #[test]
    fn test_exponential_backoff_cap() {
        let backoff = ExponentialBackoff::new(Duration::from_millis(100))
            .with_max_delay(Duration::from_millis(500))
            .with_jitter(false);

        assert_eq!(backoff.delay(5), Duration::from_millis(500));
    }

    #[test]
    fn test_exponential_jitter_stays_within_quarter() {
        let backoff = ExponentialBackoff::new(Duration::from_millis(1000));
        for attempt in 0..4 {
            let base = 1000.0 * 2f64.powi(attempt as i32);
            let delay = backoff.delay(attempt).as_millis() as f64;
            assert!(delay >= base && delay <= base * 1.25);
        }
    }

    #[test]
    fn test_configured_backoff_dispatch() {
        let fixed: Backoff = FixedBackoff::from_millis(250).into();
        assert_eq!(fixed.delay(3), Duration::from_millis(250));

        let none: Backoff = NoBackoff.into();
        assert_eq!(none.delay(3), Duration::ZERO);
    }

    #[test]
    fn test_default_retry_policy() {
        let policy = DefaultRetryPolicy::default();

        assert!(policy.should_retry(&transient()));
        assert!(policy.should_retry(&GatewayError::Timeout("10s".into())));
        assert!(policy.should_retry(&GatewayError::CircuitOpen("open".into())));

        assert!(!policy.should_retry(&GatewayError::Validation("bad".into())));
        assert!(!policy.should_retry(&GatewayError::Config("bad".into())));
    }

    #[test]
    fn test_policy_can_skip_circuit_open() {
        let policy = DefaultRetryPolicy::new().with_retry_on_circuit_open(false);

        assert!(!policy.should_retry(&GatewayError::CircuitOpen("open".into())));
        assert!(policy.should_retry(&transient()));
    }

    #[test]
    fn test_no_retry_policy() {
        assert!(!NoRetryPolicy.should_retry(&transient()));
    }

    #[test]
    fn test_retry_config_defaults() {
        let config = RetryConfig::default();
        assert_eq!(config.max_attempts, 4);
        assert_eq!(config.backoff.delay(0), Duration::from_millis(500));
        assert_eq!(config.total_timeout, None);

        assert_eq!(RetryConfig::disabled().max_attempts, 1);
    }

    #[test]
    fn test_retry_config_builder() {
        let config = RetryConfig::builder()
            .max_attempts(5)
            .backoff(FixedBackoff::from_millis(200))
            .total_timeout(Duration::from_secs(60))
            .build();

        assert_eq!(config.max_attempts, 5);
        assert_eq!(config.backoff.delay(0), Duration::from_millis(200));
        assert_eq!(config.total_timeout, Some(Duration::from_secs(60)));
    }

    #[tokio::test]
    async fn test_retry_execute_success() {
        let config = RetryConfig::default();
        let result = config.execute(|| async { Ok(42) }).await;
        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_retry_execute_transient_failure() {
        let config = RetryConfig::builder().backoff(NoBackoff).build();
        let call_count = Arc::new(AtomicU32::new(0));
        let counter = call_count.clone();

        let result = config
            .execute(|| {
                let count = counter.clone();
                async move {
                    if count.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(transient())
                    } else {
                        Ok(42)
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(call_count.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_exhaustion_returns_last_error() {
        let config = RetryConfig::builder().backoff(NoBackoff).build();
        let call_count = AtomicU32::new(0);
        let mut retries = Vec::new();

        let result: Result<()> = config
            .execute_with_notify(
                || {
                    let n = call_count.fetch_add(1, Ordering::SeqCst);
                    async move {
                        Err(GatewayError::Status {
                            status: 500 + n as u16,
                            url: "u".into(),
                        })
                    }
                },
                |attempt, _, _| retries.push(attempt),
            )
            .await;

        assert_eq!(call_count.load(Ordering::SeqCst), 4);
        assert_eq!(retries, vec![1, 2, 3]);
        assert!(matches!(
            result,
            Err(GatewayError::Status { status: 503, .. })
        ));
    }

    #[tokio::test]
    async fn test_permanent_failure_not_retried() {
        let config = RetryConfig::builder().backoff(NoBackoff).build();
        let call_count = AtomicU32::new(0);

        let result: Result<()> = config
            .execute(|| {
                call_count.fetch_add(1, Ordering::SeqCst);
                async { Err(GatewayError::Validation("bad input".into())) }
            })
            .await;

        assert!(matches!(result, Err(GatewayError::Validation(_))));
        assert_eq!(call_count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fixed_backoff_sleeps_between_attempts() {
        let config = RetryConfig::builder().max_attempts(3).build();
        let start = tokio::time::Instant::now();

        let result: Result<()> = config.execute(|| async { Err(transient()) }).await;

        assert!(result.is_err());
        assert_eq!(start.elapsed(), Duration::from_millis(1000));
    }
}
