// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration management for the gateway
//!
//! This module loads the YAML gateway configuration and converts it into
//! the runtime settings of the client, retry, circuit breaker, cache and
//! series decimation.
//!
//! # Environment Variables
//!
//! The following environment variables are supported:
//!
//! - `GEOSAT_CONFIG` - Path to the config file (default: `~/.geosat/gateway.yaml`)
//! - `RBMC_BASE_URL` - Override the RBMC service root
//! - `RBMC_USER_AGENT` - Override the `User-Agent` header
//!
//! # Example
//!
//! ```no_run
//! use geosat_gateway::config::GatewayConfig;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Load with environment variable overrides
//! let config = GatewayConfig::load_with_env()?;
//!
//! println!("Retrying up to {} times", config.retry.max_attempts);
//! # Ok(())
//! # }
//! ```

mod gatewayconfig;

pub use gatewayconfig::{
    BackoffKind, CacheSection, CircuitBreakerSection, GatewayConfig, LoggingSection,
    MetricsSection, RbmcSection, RetrySection, SeriesSection, TimeoutSection, ENV_GEOSAT_CONFIG,
    ENV_RBMC_BASE_URL, ENV_RBMC_USER_AGENT,
};
