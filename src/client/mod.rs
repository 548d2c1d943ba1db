// SPDX-License-Identifier: MIT OR Apache-2.0

//! Resilient HTTP client for the RBMC service.
//!
//! Every fetch runs retry (outer) around the circuit breaker (inner)
//! around a single GET on the [`Transport`]. Each attempt asks the breaker
//! for permission, so an open breaker fails the remaining attempts
//! without network contact.

mod transport;

pub use transport::{ReqwestTransport, Transport};

use crate::error::{GatewayError, Result};
use crate::resources::Resource;
use crate::runtime::{CircuitBreaker, LoggingConfig, MetricsCollector, RequestLogger, RetryConfig};
use bytes::Bytes;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, Instrument};
use url::Url;

/// Default RBMC service root.
pub const DEFAULT_BASE_URL: &str = "https://servicodados.ibge.gov.br/api/v1/rbmc";

/// Default `User-Agent` header.
pub const DEFAULT_USER_AGENT: &str = "GeoSatGateway/0.1";

#[derive(Clone, Debug)]
pub struct ResilientClientConfig {
    /// Service root, always ending in `/`.
    pub base_url: Url,
    pub user_agent: String,
    pub connect_timeout: Duration,
    /// Whole-request timeout, body included.
    pub response_timeout: Duration,
}

impl ResilientClientConfig {
    /// Create a configuration builder for `base_url`.
    pub fn builder(base_url: impl Into<String>) -> ResilientClientConfigBuilder {
        ResilientClientConfigBuilder::new(base_url)
    }

    /// Absolute URL of `relative_path` under the service root.
    ///
    /// # Errors
    ///
    /// Returns `GatewayError::Config` if the path does not form a valid URL.
    pub fn url_for(&self, relative_path: &str) -> Result<Url> {
        Ok(self.base_url.join(relative_path.trim_start_matches('/'))?)
    }
}

/// Parse a service root, making sure relative joins append to its path.
fn parse_base_url(raw: &str) -> Result<Url> {
    let url = Url::parse(&format!("{}/", raw.trim_end_matches('/')))?;
    if !matches!(url.scheme(), "http" | "https") || url.cannot_be_a_base() {
        return Err(GatewayError::Config(format!(
            "base URL must be an http(s) URL, got {raw:?}"
        )));
    }
    Ok(url)
}

/// Builder for [`ResilientClientConfig`].
#[derive(Debug, Clone)]
pub struct ResilientClientConfigBuilder {
    base_url: String,
    user_agent: String,
    connect_timeout: Duration,
    response_timeout: Duration,
}

impl ResilientClientConfigBuilder {
    fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            connect_timeout: Duration::from_secs(3),
            response_timeout: Duration::from_secs(10),
        }
    }

    #[must_use]
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    #[must_use]
    pub fn response_timeout(mut self, timeout: Duration) -> Self {
        self.response_timeout = timeout;
        self
    }

    /// Build the configuration.
    ///
    /// # Errors
    ///
    /// Returns `GatewayError::Config` for a malformed base URL.
    pub fn build(self) -> Result<ResilientClientConfig> {
        Ok(ResilientClientConfig {
            base_url: parse_base_url(&self.base_url)?,
            user_agent: self.user_agent,
            connect_timeout: self.connect_timeout,
            response_timeout: self.response_timeout,
        })
    }
}

/// Fetches RBMC resources through retry and circuit breaker.
pub struct ResilientClient {
    config: ResilientClientConfig,
    transport: Arc<dyn Transport>,
    breaker: Arc<CircuitBreaker>,
    retry: RetryConfig,
    metrics: Arc<MetricsCollector>,
    logger: RequestLogger,
}

impl ResilientClient {
    /// Create a client with default retry and logging.
    pub fn new(
        config: ResilientClientConfig,
        transport: Arc<dyn Transport>,
        breaker: Arc<CircuitBreaker>,
        metrics: Arc<MetricsCollector>,
    ) -> Self {
        Self {
            config,
            transport,
            breaker,
            retry: RetryConfig::default(),
            metrics,
            logger: RequestLogger::new(),
        }
    }

    #[must_use]
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    #[must_use]
    pub fn with_logging(mut self, logging: LoggingConfig) -> Self {
        self.logger = RequestLogger::with_config(logging);
        self
    }

    pub fn config(&self) -> &ResilientClientConfig {
        &self.config
    }

    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    /// Public link of a resource.
    ///
    /// # Errors
    ///
    /// Returns `GatewayError::Config` if the URL cannot be formed.
    pub fn link_for(&self, resource: &Resource) -> Result<Url> {
        self.config.url_for(&resource.relative_path())
    }

    /// Fetch a resource.
    ///
    /// # Errors
    ///
    /// Returns the last attempt's error once retries are exhausted.
    /// A `GatewayError::CircuitOpen` means the breaker rejected the call.
    ///
    /// Latency is accounted per station (or `ORBITAS`), not per file.
    pub async fn fetch(&self, resource: &Resource) -> Result<Bytes> {
        self.fetch_path(&resource.relative_path(), &resource.fallback_key())
            .await
    }

    /// Fetch `relative_path`, accounting latency under `resource_key`.
    ///
    /// Keep `resource_key` to a bounded set; every distinct key gets its
    /// own latency histogram.
    ///
    /// # Errors
    ///
    /// Same as [`fetch`](Self::fetch).
    pub async fn fetch_path(&self, relative_path: &str, resource_key: &str) -> Result<Bytes> {
        let url = self.config.url_for(relative_path)?;
        let start = Instant::now();

        let result = self
            .retry
            .execute_with_notify(
                || self.attempt(resource_key, &url),
                |attempt, error, delay| {
                    self.metrics.record_retry();
                    debug!(
                        resource = resource_key,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "retrying rbmc fetch"
                    );
                },
            )
            .await;

        self.metrics.record_latency(resource_key, start.elapsed());
        result
    }

    async fn attempt(&self, resource_key: &str, url: &Url) -> Result<Bytes> {
        let result = self.breaker.call(|| self.send(resource_key, url)).await;
        if let Err(e) = &result {
            if e.is_circuit_open() {
                self.metrics.record_circuit_breaker_rejection();
                debug!(resource = resource_key, error = %e, "rbmc call not permitted");
            }
        }
        result
    }

    async fn send(&self, resource_key: &str, url: &Url) -> Result<Bytes> {
        let span = self.logger.start(resource_key, url);
        let result = self
            .transport
            .get(url)
            .instrument(span.span().clone())
            .await;

        self.metrics.record_attempt(result.is_ok());
        match &result {
            Ok(body) => self.logger.finish_success(span, body.len()),
            Err(e) => self.logger.finish_error(span, e),
        }
        result
    }
}
