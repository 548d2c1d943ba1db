// SPDX-License-Identifier: MIT OR Apache-2.0

//! RBMC use cases: fetch, cache on success, fall back on failure.
//!
//! Every operation validates its input, fetches through the
//! [`ResilientClient`] and returns a [`FetchOutcome`]. Upstream failures
//! never escape as errors; they become fallback responses carrying the
//! last cached metadata and, while the breaker is open, a retry hint.

mod fallback;

pub use fallback::{FallbackComposer, FallbackResponse, UNAVAILABLE};

use crate::cache::{CacheTtls, MetadataCache};
use crate::client::ResilientClient;
use crate::error::{GatewayError, Result};
use crate::resources::{CachedMetadata, FileMetadata, ReportMetadata, Resource};
use crate::runtime::{CircuitBreakerStateTracker, MetricsCollector};
use http::{HeaderValue, StatusCode};
use std::sync::Arc;
use tracing::warn;

/// Result of a service operation.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome<T> {
    /// Upstream answered; metadata of the fetched resource.
    Fresh(T),
    /// Upstream unavailable.
    Fallback {
        /// Degraded response body.
        response: FallbackResponse,
        /// Seconds until the breaker may admit calls again.
        retry_after: Option<u64>,
    },
}

impl<T> FetchOutcome<T> {
    /// HTTP status for this outcome.
    pub fn status_code(&self) -> StatusCode {
        match self {
            FetchOutcome::Fresh(_) => StatusCode::OK,
            FetchOutcome::Fallback { .. } => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    /// `Retry-After` header value, if any.
    pub fn retry_after_header(&self) -> Option<HeaderValue> {
        match self {
            FetchOutcome::Fallback {
                retry_after: Some(secs),
                ..
            } => Some(HeaderValue::from(*secs)),
            _ => None,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, FetchOutcome::Fallback { .. })
    }

    pub fn fresh(&self) -> Option<&T> {
        match self {
            FetchOutcome::Fresh(value) => Some(value),
            FetchOutcome::Fallback { .. } => None,
        }
    }

    pub fn fallback(&self) -> Option<&FallbackResponse> {
        match self {
            FetchOutcome::Fallback { response, .. } => Some(response),
            FetchOutcome::Fresh(_) => None,
        }
    }
}

/// Why a fallback was served.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FallbackReason {
    CircuitOpen,
    Transient,
}

impl FallbackReason {
    fn of(error: &GatewayError) -> Self {
        if error.is_circuit_open() {
            FallbackReason::CircuitOpen
        } else {
            FallbackReason::Transient
        }
    }

    fn label(self) -> &'static str {
        match self {
            FallbackReason::CircuitOpen => "circuit_open",
            FallbackReason::Transient => "transient",
        }
    }

    fn message(self, resource: &Resource) -> String {
        let what = match resource {
            Resource::Report { .. } => "station report",
            Resource::Rinex2 { .. } => "RINEX2 file",
            Resource::Rinex3OneSecond { .. } => "RINEX3 1s file",
            Resource::Rinex3FifteenSecond { .. } => "RINEX3 15s file",
            Resource::Orbits { .. } => "orbits",
        };
        match self {
            FallbackReason::CircuitOpen => {
                format!("Circuit breaker open: could not fetch {what}, RBMC temporarily unavailable")
            }
            FallbackReason::Transient => format!("Temporary failure while fetching {what}"),
        }
    }
}

/// RBMC operations with caching and fallback.
pub struct RbmcService {
    client: Arc<ResilientClient>,
    cache: Arc<dyn MetadataCache>,
    composer: FallbackComposer,
    tracker: CircuitBreakerStateTracker,
    metrics: Arc<MetricsCollector>,
    ttls: CacheTtls,
}

impl RbmcService {
    pub fn new(
        client: Arc<ResilientClient>,
        cache: Arc<dyn MetadataCache>,
        tracker: CircuitBreakerStateTracker,
        metrics: Arc<MetricsCollector>,
        ttls: CacheTtls,
    ) -> Self {
        Self {
            composer: FallbackComposer::new(cache.clone()),
            client,
            cache,
            tracker,
            metrics,
            ttls,
        }
    }

    /// Station technical report.
    ///
    /// # Errors
    ///
    /// Returns `GatewayError::Validation` for an invalid station code.
    pub async fn report(&self, station: &str) -> Result<FetchOutcome<ReportMetadata>> {
        let resource = Resource::report(station)?;
        Ok(self
            .fetch(resource, |resource, link, body_len| {
                ReportMetadata::new(resource, link, body_len)
            })
            .await)
    }

    /// Daily RINEX 2 file.
    ///
    /// # Errors
    ///
    /// Returns `GatewayError::Validation` for invalid input.
    pub async fn rinex2(
        &self,
        station: &str,
        year: u16,
        day: u16,
    ) -> Result<FetchOutcome<FileMetadata>> {
        let resource = Resource::rinex2(station, year, day)?;
        Ok(self.fetch_file(resource).await)
    }

    /// One-second RINEX 3 file.
    ///
    /// # Errors
    ///
    /// Returns `GatewayError::Validation` for invalid input.
    pub async fn rinex3_1s(
        &self,
        station: &str,
        year: u16,
        day: u16,
        hour: u8,
        minute: u8,
        kind: &str,
    ) -> Result<FetchOutcome<FileMetadata>> {
        let resource = Resource::rinex3_1s(station, year, day, hour, minute, kind)?;
        Ok(self.fetch_file(resource).await)
    }

    /// Daily fifteen-second RINEX 3 file.
    ///
    /// # Errors
    ///
    /// Returns `GatewayError::Validation` for invalid input.
    pub async fn rinex3_15s(
        &self,
        station: &str,
        year: u16,
        day: u16,
    ) -> Result<FetchOutcome<FileMetadata>> {
        let resource = Resource::rinex3_15s(station, year, day)?;
        Ok(self.fetch_file(resource).await)
    }

    /// Multi-constellation orbit file.
    ///
    /// # Errors
    ///
    /// Returns `GatewayError::Validation` for an invalid date.
    pub async fn orbits(&self, year: u16, day: u16) -> Result<FetchOutcome<FileMetadata>> {
        let resource = Resource::orbits(year, day)?;
        Ok(self.fetch_file(resource).await)
    }

    async fn fetch_file(&self, resource: Resource) -> FetchOutcome<FileMetadata> {
        self.fetch(resource, |resource, link, _| FileMetadata::new(resource, link))
            .await
    }

    async fn fetch<T, F>(&self, resource: Resource, build: F) -> FetchOutcome<T>
    where
        T: CachedMetadata,
        F: FnOnce(&Resource, String, Option<u64>) -> T,
    {
        let operation = resource.operation();
        let fetched = match self.client.fetch(&resource).await {
            Ok(body) => self
                .client
                .link_for(&resource)
                .map(|link| build(&resource, link.to_string(), Some(body.len() as u64))),
            Err(e) => Err(e),
        };

        match fetched {
            Ok(metadata) => {
                let ttl = resource.cache_category().ttl(&self.ttls);
                if let Err(e) = self
                    .cache
                    .put(&resource.cache_key(), metadata.cache_fields(), ttl)
                    .await
                {
                    warn!(
                        resource = %resource,
                        error = %e,
                        "failed to cache rbmc metadata"
                    );
                }
                self.metrics.record_operation(operation, true);
                FetchOutcome::Fresh(metadata)
            }
            Err(e) => self.fall_back(&resource, &e).await,
        }
    }

    async fn fall_back<T>(&self, resource: &Resource, error: &GatewayError) -> FetchOutcome<T> {
        let reason = FallbackReason::of(error);
        self.metrics.record_operation(resource.operation(), false);
        self.metrics.record_fallback(reason.label());

        let response = self
            .composer
            .compose(&resource.fallback_key(), reason.message(resource))
            .await;
        let retry_after = self.tracker.remaining_open_seconds();

        warn!(
            resource = %resource,
            reason = reason.label(),
            retry_after,
            error = %error,
            "serving rbmc fallback"
        );

        FetchOutcome::Fallback {
            response,
            retry_after,
        }
    }
}
