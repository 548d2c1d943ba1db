// SPDX-License-Identifier: MIT OR Apache-2.0

//! Structured logging of upstream fetches.
//!
//! Each network attempt gets an `rbmc.fetch` span carrying the resource
//! key and URL. Completion is logged with timing at the configured level:
//! successes at DEBUG and failures at WARN by default.
//!
//! # Example
//!
//! ```
//! use geosat_gateway::runtime::{LogLevel, LoggingConfig, RequestLogger};
//!
//! let logger = RequestLogger::with_config(
//!     LoggingConfig::new()
//!         .with_success_level(LogLevel::Info)
//!         .with_query_strings(false),
//! );
//! ```

use crate::error::GatewayError;
use std::fmt;
use std::time::{Duration, Instant};
use tracing::Span;
use url::Url;

const TARGET: &str = "geosat_gateway::rbmc";

/// Log level for fetch logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogLevel {
    /// Trace level - most verbose.
    Trace,
    /// Debug level.
    #[default]
    Debug,
    /// Info level.
    Info,
    /// Warn level.
    Warn,
    /// Error level - only errors.
    Error,
    /// Disabled - no logging.
    Off,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogLevel::Trace => write!(f, "TRACE"),
            LogLevel::Debug => write!(f, "DEBUG"),
            LogLevel::Info => write!(f, "INFO"),
            LogLevel::Warn => write!(f, "WARN"),
            LogLevel::Error => write!(f, "ERROR"),
            LogLevel::Off => write!(f, "OFF"),
        }
    }
}

macro_rules! log_at {
    ($level:expr, $($arg:tt)+) => {
        match $level {
            LogLevel::Trace => tracing::trace!(target: TARGET, $($arg)+),
            LogLevel::Debug => tracing::debug!(target: TARGET, $($arg)+),
            LogLevel::Info => tracing::info!(target: TARGET, $($arg)+),
            LogLevel::Warn => tracing::warn!(target: TARGET, $($arg)+),
            LogLevel::Error => tracing::error!(target: TARGET, $($arg)+),
            LogLevel::Off => {}
        }
    };
}

/// Configuration for fetch logging.
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Log level for successful fetches.
    pub success_level: LogLevel,
    /// Log level for failed fetches.
    pub error_level: LogLevel,
    /// Whether to include query strings in logged URLs.
    pub log_query_strings: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            success_level: LogLevel::Debug,
            error_level: LogLevel::Warn,
            log_query_strings: true,
        }
    }
}

impl LoggingConfig {
    /// Create a new logging configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the success log level.
    #[must_use]
    pub fn with_success_level(mut self, level: LogLevel) -> Self {
        self.success_level = level;
        self
    }

    /// Set the error log level.
    #[must_use]
    pub fn with_error_level(mut self, level: LogLevel) -> Self {
        self.error_level = level;
        self
    }

    /// Include or hide query strings in logged URLs.
    #[must_use]
    pub fn with_query_strings(mut self, enabled: bool) -> Self {
        self.log_query_strings = enabled;
        self
    }

    /// Create a verbose configuration for debugging.
    #[must_use]
    pub fn verbose() -> Self {
        Self {
            success_level: LogLevel::Info,
            error_level: LogLevel::Error,
            log_query_strings: true,
        }
    }

    /// Create a quiet configuration for production.
    #[must_use]
    pub fn quiet() -> Self {
        Self {
            success_level: LogLevel::Off,
            error_level: LogLevel::Warn,
            log_query_strings: false,
        }
    }
}

/// A request logger that tracks timing and logs outcomes.
#[derive(Debug, Clone, Default)]
pub struct RequestLogger {
    config: LoggingConfig,
}

impl RequestLogger {
    /// Create a new request logger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a request logger with custom configuration.
    #[must_use]
    pub fn with_config(config: LoggingConfig) -> Self {
        Self { config }
    }

    /// Get the configuration.
    #[must_use]
    pub fn config(&self) -> &LoggingConfig {
        &self.config
    }

    /// Start tracking a fetch of `resource` from `url`.
    #[must_use]
    pub fn start(&self, resource: &str, url: &Url) -> RequestSpan {
        let url = self.display_url(url);
        let span = tracing::info_span!("rbmc.fetch", resource = %resource, url = %url);
        RequestSpan {
            resource: resource.to_string(),
            url,
            start: Instant::now(),
            span,
        }
    }

    /// Finish tracking a fetch (success).
    pub fn finish_success(&self, span: RequestSpan, bytes: usize) {
        let elapsed_ms = span.elapsed().as_millis() as u64;
        let _entered = span.span.enter();
        log_at!(
            self.config.success_level,
            url = %span.url,
            elapsed_ms,
            bytes,
            "rbmc fetch succeeded"
        );
    }

    /// Finish tracking a fetch (failure).
    pub fn finish_error(&self, span: RequestSpan, error: &GatewayError) {
        let elapsed_ms = span.elapsed().as_millis() as u64;
        let _entered = span.span.enter();
        log_at!(
            self.config.error_level,
            url = %span.url,
            elapsed_ms,
            error = %error,
            "rbmc fetch failed"
        );
    }

    fn display_url(&self, url: &Url) -> String {
        if self.config.log_query_strings || url.query().is_none() {
            return url.to_string();
        }
        let mut stripped = url.clone();
        stripped.set_query(None);
        stripped.to_string()
    }
}

/// A span representing an in-flight fetch.
#[derive(Debug)]
pub struct RequestSpan {
    resource: String,
    url: String,
    start: Instant,
    span: Span,
}

impl RequestSpan {
    /// Resource key being fetched.
    #[must_use]
    pub fn resource(&self) -> &str {
        &self.resource
    }

    /// URL as it appears in logs.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// The tracing span to instrument the fetch future with.
    #[must_use]
    pub fn span(&self) -> &Span {
        &self.span
    }

    /// Get the elapsed time since the fetch started.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}
