// SPDX-License-Identifier: MIT OR Apache-2.0

//! Gateway configuration file parser
//!
//! Parses the YAML gateway configuration (typically
//! `~/.geosat/gateway.yaml`). Every field has a default, so an empty file
//! is a valid configuration.
//!
//! # Example
//!
//! ```no_run
//! use geosat_gateway::config::GatewayConfig;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = GatewayConfig::load_from_path("/etc/geosat/gateway.yaml")?;
//! println!("RBMC base URL: {}", config.rbmc.base_url);
//! # Ok(())
//! # }
//! ```

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::cache::CacheTtls;
use crate::client::{ResilientClientConfig, DEFAULT_BASE_URL, DEFAULT_USER_AGENT};
use crate::error::{GatewayError, Result};
use crate::runtime::{
    Backoff, CircuitBreakerConfig, DefaultRetryPolicy, ExponentialBackoff, FixedBackoff,
    LoggingConfig, MetricsConfig, NoBackoff, RetryConfig,
};
use crate::series::SeriesLimits;

/// Environment variable naming the configuration file.
pub const ENV_GEOSAT_CONFIG: &str = "GEOSAT_CONFIG";

/// Environment variable overriding `rbmc.base_url`.
pub const ENV_RBMC_BASE_URL: &str = "RBMC_BASE_URL";

/// Environment variable overriding `rbmc.user_agent`.
pub const ENV_RBMC_USER_AGENT: &str = "RBMC_USER_AGENT";

/// The entire gateway configuration file.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GatewayConfig {
    /// Upstream RBMC service.
    pub rbmc: RbmcSection,
    /// Retry of upstream attempts.
    pub retry: RetrySection,
    /// Circuit breaker guarding the upstream.
    pub circuit_breaker: CircuitBreakerSection,
    /// Metadata cache.
    pub cache: CacheSection,
    /// Series decimation limits.
    pub series: SeriesSection,
    /// Metrics naming.
    pub metrics: MetricsSection,
    /// Fetch logging.
    pub logging: LoggingSection,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RbmcSection {
    pub base_url: String,
    pub user_agent: String,
    pub timeouts: TimeoutSection,
}

impl Default for RbmcSection {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            timeouts: TimeoutSection::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TimeoutSection {
    pub connect_ms: u64,
    pub response_ms: u64,
}

impl Default for TimeoutSection {
    fn default() -> Self {
        Self {
            connect_ms: 3_000,
            response_ms: 10_000,
        }
    }
}

/// Wait strategy between retry attempts.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BackoffKind {
    #[default]
    Fixed,
    Exponential,
    None,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RetrySection {
    /// Total attempts, first one included.
    pub max_attempts: u32,
    /// Wait before the first retry.
    pub wait_ms: u64,
    pub backoff: BackoffKind,
    /// Exponential backoff only.
    pub multiplier: f64,
    /// Exponential backoff only.
    pub max_wait_ms: u64,
    /// Keep retrying when the breaker rejects an attempt.
    pub retry_on_circuit_open: bool,
}

impl Default for RetrySection {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            wait_ms: 500,
            backoff: BackoffKind::Fixed,
            multiplier: 2.0,
            max_wait_ms: 10_000,
            retry_on_circuit_open: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CircuitBreakerSection {
    pub sliding_window_size: usize,
    pub minimum_calls: usize,
    /// Percent, within (0, 100].
    pub failure_rate_threshold: f64,
    pub wait_open_seconds: u64,
    pub permitted_calls_in_half_open: usize,
}

impl Default for CircuitBreakerSection {
    fn default() -> Self {
        Self {
            sliding_window_size: 10,
            minimum_calls: 5,
            failure_rate_threshold: 50.0,
            wait_open_seconds: 30,
            permitted_calls_in_half_open: 3,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CacheSection {
    pub max_entries: u64,
    pub report_ttl_secs: u64,
    pub file_ttl_secs: u64,
    pub orbit_ttl_secs: u64,
}

impl Default for CacheSection {
    fn default() -> Self {
        Self {
            max_entries: 10_000,
            report_ttl_secs: 12 * 3600,
            file_ttl_secs: 6 * 3600,
            orbit_ttl_secs: 12 * 3600,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SeriesSection {
    pub default_max: usize,
    pub max_limit: usize,
}

impl Default for SeriesSection {
    fn default() -> Self {
        let limits = SeriesLimits::default();
        Self {
            default_max: limits.default_max,
            max_limit: limits.max_limit,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MetricsSection {
    pub namespace: String,
}

impl Default for MetricsSection {
    fn default() -> Self {
        Self {
            namespace: MetricsConfig::default().namespace,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LoggingSection {
    /// Log successful fetches at INFO instead of DEBUG.
    pub verbose: bool,
    pub log_query_strings: bool,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            verbose: false,
            log_query_strings: true,
        }
    }
}

impl GatewayConfig {
    /// Load configuration from the default location (~/.geosat/gateway.yaml)
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The home directory cannot be determined
    /// - The config file cannot be read
    /// - The config file is malformed
    pub fn load_default() -> Result<Self> {
        let config_path = Self::default_path()?;
        Self::load_from_path(&config_path)
    }

    /// Load configuration from a specific path
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The file cannot be read
    /// - The file is malformed YAML
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref()).map_err(|e| {
            GatewayError::Config(format!(
                "Failed to read config file {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;

        Self::from_yaml(&content)
    }

    /// Parse configuration from YAML string
    ///
    /// # Errors
    ///
    /// Returns an error if the YAML is malformed
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml)
            .map_err(|e| GatewayError::Config(format!("Failed to parse config YAML: {}", e)))
    }

    /// Get the default config file path (~/.geosat/gateway.yaml)
    ///
    /// # Errors
    ///
    /// Returns an error if the home directory cannot be determined
    pub fn default_path() -> Result<PathBuf> {
        let home = dirs::home_dir()
            .ok_or_else(|| GatewayError::Config("Could not determine home directory".to_string()))?;

        Ok(home.join(".geosat").join("gateway.yaml"))
    }

    /// Get the path to the config file, respecting GEOSAT_CONFIG
    ///
    /// # Errors
    ///
    /// Returns an error if the home directory cannot be determined when
    /// GEOSAT_CONFIG is not set
    pub fn config_path() -> Result<PathBuf> {
        if let Ok(env_path) = std::env::var(ENV_GEOSAT_CONFIG) {
            Ok(PathBuf::from(env_path))
        } else {
            Self::default_path()
        }
    }

    /// Load the config file if present, then apply environment overrides.
    ///
    /// A missing file yields the defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be parsed, or if the
    /// result fails [`validate`](Self::validate).
    pub fn load_with_env() -> Result<Self> {
        let path = Self::config_path()?;
        let mut config = if path.exists() {
            Self::load_from_path(&path)?
        } else {
            Self::default()
        };
        config.apply_env(|name| std::env::var(name).ok());
        config.validate()?;
        Ok(config)
    }

    /// Apply `RBMC_*` overrides looked up through `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(base_url) = lookup(ENV_RBMC_BASE_URL).filter(|v| !v.is_empty()) {
            self.rbmc.base_url = base_url;
        }
        if let Some(user_agent) = lookup(ENV_RBMC_USER_AGENT).filter(|v| !v.is_empty()) {
            self.rbmc.user_agent = user_agent;
        }
    }

    /// Check the configuration for values the runtime cannot work with.
    ///
    /// # Errors
    ///
    /// Returns `GatewayError::Config` naming the first offending field.
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(GatewayError::Config(msg));

        self.client_config()?;

        if self.retry.max_attempts == 0 {
            return invalid("retry.max_attempts must be at least 1".to_string());
        }
        let cb = &self.circuit_breaker;
        if cb.sliding_window_size == 0 {
            return invalid("circuit_breaker.sliding_window_size must be at least 1".to_string());
        }
        if cb.minimum_calls == 0 {
            return invalid("circuit_breaker.minimum_calls must be at least 1".to_string());
        }
        if !(cb.failure_rate_threshold > 0.0 && cb.failure_rate_threshold <= 100.0) {
            return invalid(format!(
                "circuit_breaker.failure_rate_threshold must be within (0, 100], got {}",
                cb.failure_rate_threshold
            ));
        }
        if cb.permitted_calls_in_half_open == 0 {
            return invalid(
                "circuit_breaker.permitted_calls_in_half_open must be at least 1".to_string(),
            );
        }
        if self.cache.max_entries == 0 {
            return invalid("cache.max_entries must be at least 1".to_string());
        }
        let series = &self.series;
        if series.max_limit == 0 || series.default_max == 0 || series.default_max > series.max_limit
        {
            return invalid(format!(
                "series.default_max must be within 1..={}, got {}",
                series.max_limit, series.default_max
            ));
        }
        Ok(())
    }

    /// HTTP client settings.
    ///
    /// # Errors
    ///
    /// Returns `GatewayError::Config` for a malformed base URL.
    pub fn client_config(&self) -> Result<ResilientClientConfig> {
        ResilientClientConfig::builder(self.rbmc.base_url.as_str())
            .user_agent(self.rbmc.user_agent.as_str())
            .connect_timeout(Duration::from_millis(self.rbmc.timeouts.connect_ms))
            .response_timeout(Duration::from_millis(self.rbmc.timeouts.response_ms))
            .build()
    }

    /// Retry settings.
    pub fn retry_config(&self) -> RetryConfig {
        let wait = Duration::from_millis(self.retry.wait_ms);
        let backoff: Backoff = match self.retry.backoff {
            BackoffKind::Fixed => FixedBackoff::new(wait).into(),
            BackoffKind::Exponential => ExponentialBackoff::new(wait)
                .with_multiplier(self.retry.multiplier)
                .with_max_delay(Duration::from_millis(self.retry.max_wait_ms))
                .into(),
            BackoffKind::None => NoBackoff::new().into(),
        };

        RetryConfig::builder()
            .max_attempts(self.retry.max_attempts)
            .backoff(backoff)
            .policy(
                DefaultRetryPolicy::new()
                    .with_retry_on_circuit_open(self.retry.retry_on_circuit_open),
            )
            .build()
    }

    /// Circuit breaker settings.
    pub fn breaker_config(&self) -> CircuitBreakerConfig {
        let cb = &self.circuit_breaker;
        CircuitBreakerConfig::new()
            .with_sliding_window_size(cb.sliding_window_size)
            .with_minimum_calls(cb.minimum_calls)
            .with_failure_rate_threshold(cb.failure_rate_threshold)
            .with_wait_in_open(Duration::from_secs(cb.wait_open_seconds))
            .with_permitted_calls_in_half_open(cb.permitted_calls_in_half_open)
    }

    /// Cache TTLs per category.
    pub fn cache_ttls(&self) -> CacheTtls {
        CacheTtls {
            report: Duration::from_secs(self.cache.report_ttl_secs),
            file: Duration::from_secs(self.cache.file_ttl_secs),
            orbit: Duration::from_secs(self.cache.orbit_ttl_secs),
        }
    }

    pub fn series_limits(&self) -> SeriesLimits {
        SeriesLimits {
            default_max: self.series.default_max,
            max_limit: self.series.max_limit,
        }
    }

    pub fn logging_config(&self) -> LoggingConfig {
        let base = if self.logging.verbose {
            LoggingConfig::verbose()
        } else {
            LoggingConfig::default()
        };
        base.with_query_strings(self.logging.log_query_strings)
    }

    pub fn metrics_config(&self) -> MetricsConfig {
        MetricsConfig::builder()
            .namespace(self.metrics.namespace.as_str())
            .build()
    }
}
