// SPDX-License-Identifier: MIT OR Apache-2.0

//! Assembly of the gateway components.
//!
//! # Example
//!
//! ```no_run
//! use geosat_gateway::{Gateway, GatewayConfig};
//!
//! # async fn example() -> Result<(), geosat_gateway::GatewayError> {
//! let gateway = Gateway::from_config(&GatewayConfig::load_with_env()?)?;
//!
//! let outcome = gateway.service().report("ALAR").await?;
//! println!("{} {:?}", outcome.status_code(), outcome.retry_after_header());
//! # Ok(())
//! # }
//! ```

use crate::cache::{MemoryMetadataCache, MetadataCache};
use crate::client::{ReqwestTransport, ResilientClient, Transport};
use crate::config::GatewayConfig;
use crate::error::Result;
use crate::runtime::{CircuitBreaker, CircuitBreakerStateTracker, MetricsCollector};
use crate::series::{SeriesDecimator, SeriesLimits};
use crate::service::RbmcService;
use std::sync::Arc;
use tracing::info;

/// The wired gateway: client, breaker, cache, service and decimator.
pub struct Gateway {
    service: RbmcService,
    client: Arc<ResilientClient>,
    breaker: Arc<CircuitBreaker>,
    tracker: CircuitBreakerStateTracker,
    metrics: Arc<MetricsCollector>,
    decimator: SeriesDecimator,
    series_limits: SeriesLimits,
}

impl Gateway {
    /// Build the gateway against the real upstream.
    ///
    /// # Errors
    ///
    /// Returns `GatewayError::Config` for an invalid configuration or if
    /// the HTTP client cannot be built.
    pub fn from_config(config: &GatewayConfig) -> Result<Self> {
        config.validate()?;
        let metrics = Arc::new(MetricsCollector::new(config.metrics_config()));
        let cache: Arc<dyn MetadataCache> = Arc::new(
            MemoryMetadataCache::new(config.cache.max_entries).with_metrics(metrics.clone()),
        );
        let transport = Arc::new(ReqwestTransport::new(&config.client_config()?)?);
        Self::with_parts(config, transport, cache, metrics)
    }

    /// Build the gateway with a caller-supplied transport and cache.
    ///
    /// # Errors
    ///
    /// Returns `GatewayError::Config` for an invalid configuration.
    pub fn with_parts(
        config: &GatewayConfig,
        transport: Arc<dyn Transport>,
        cache: Arc<dyn MetadataCache>,
        metrics: Arc<MetricsCollector>,
    ) -> Result<Self> {
        config.validate()?;
        let client_config = config.client_config()?;

        let breaker = Arc::new(CircuitBreaker::new(config.breaker_config()));
        let tracker = CircuitBreakerStateTracker::attach(breaker.clone());
        {
            let metrics = metrics.clone();
            breaker.on_state_transition(move |transition| metrics.set_circuit_state(transition.to));
        }
        metrics.set_circuit_state(breaker.state());

        info!(
            base_url = %client_config.base_url,
            max_attempts = config.retry.max_attempts,
            window = config.circuit_breaker.sliding_window_size,
            "rbmc gateway configured"
        );

        let client = Arc::new(
            ResilientClient::new(client_config, transport, breaker.clone(), metrics.clone())
                .with_retry(config.retry_config())
                .with_logging(config.logging_config()),
        );
        let service = RbmcService::new(
            client.clone(),
            cache,
            tracker.clone(),
            metrics.clone(),
            config.cache_ttls(),
        );

        Ok(Self {
            service,
            client,
            breaker,
            tracker,
            decimator: SeriesDecimator::new(metrics.clone()),
            metrics,
            series_limits: config.series_limits(),
        })
    }

    pub fn service(&self) -> &RbmcService {
        &self.service
    }

    pub fn client(&self) -> &Arc<ResilientClient> {
        &self.client
    }

    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    pub fn tracker(&self) -> &CircuitBreakerStateTracker {
        &self.tracker
    }

    pub fn metrics(&self) -> &Arc<MetricsCollector> {
        &self.metrics
    }

    pub fn decimator(&self) -> &SeriesDecimator {
        &self.decimator
    }

    /// Limits to validate series requests against.
    pub fn series_limits(&self) -> &SeriesLimits {
        &self.series_limits
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::CircuitState;
    use crate::series::SeriesRequest;
    use crate::testkit::ScriptedTransport;

    fn test_config() -> GatewayConfig {
        GatewayConfig::from_yaml(
            r#"
rbmc:
  base_url: https://rbmc.local/api/v1/rbmc
retry:
  backoff: none
circuit_breaker:
  sliding_window_size: 4
  minimum_calls: 4
"#,
        )
        .unwrap()
    }

    #[test]
    fn test_from_config_builds() {
        let gateway = Gateway::from_config(&GatewayConfig::default()).unwrap();
        assert_eq!(gateway.breaker().state(), CircuitState::Closed);
        assert_eq!(gateway.series_limits().default_max, 300);
    }

    #[test]
    fn test_from_config_rejects_invalid() {
        let mut config = GatewayConfig::default();
        config.retry.max_attempts = 0;
        assert!(Gateway::from_config(&config).is_err());
    }

    #[tokio::test]
    async fn test_state_gauge_follows_breaker() {
        let metrics = Arc::new(MetricsCollector::with_defaults());
        let gateway = Gateway::with_parts(
            &test_config(),
            Arc::new(ScriptedTransport::failing(500)),
            Arc::new(MemoryMetadataCache::default()),
            metrics.clone(),
        )
        .unwrap();

        // One fetch makes four attempts, filling the window
        let outcome = gateway.service().report("ALAR").await.unwrap();
        assert!(outcome.is_fallback());
        assert_eq!(gateway.breaker().state(), CircuitState::Open);
        assert_eq!(metrics.snapshot().circuit_breaker_state, 1);
        assert!(gateway.tracker().remaining_open_seconds().is_some());
    }

    #[test]
    fn test_decimator_uses_shared_metrics() {
        let gateway = Gateway::from_config(&GatewayConfig::default()).unwrap();
        let request =
            SeriesRequest::new("POAL", 2024, 5, None, gateway.series_limits()).unwrap();

        let samples: Vec<u32> = (0..2880).collect();
        let reduced = gateway.decimator().decimate("positions", &samples, request.max);

        assert_eq!(reduced.len(), 300);
        assert_eq!(gateway.metrics().snapshot().decimations, 1);
    }
}
