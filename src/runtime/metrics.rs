// SPDX-License-Identifier: MIT OR Apache-2.0

//! Prometheus-compatible metrics for the RBMC gateway.
//!
//! # Features
//!
//! - Upstream attempt counters by status, retries and fallbacks by reason
//! - Cache hit/miss counters and hit rate
//! - Response time histograms, overall and per resource key
//! - Circuit breaker state gauge and rejection counter
//! - Series decimation counters and before/after sizes
//!
//! # Example
//!
//! ```rust
//! use geosat_gateway::runtime::metrics::{MetricsCollector, MetricsConfig};
//!
//! let config = MetricsConfig::builder()
//!     .namespace("rbmc")
//!     .resource_label(true)
//!     .build();
//!
//! let metrics = MetricsCollector::new(config);
//!
//! metrics.record_attempt(true);
//! metrics.record_latency("ALAR", std::time::Duration::from_millis(42));
//!
//! println!("{}", metrics.to_prometheus_text());
//! ```

use crate::runtime::CircuitState;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Configuration for the metrics collector.
#[derive(Debug, Clone)]
pub struct MetricsConfig {
    /// Metric namespace prefix (e.g., "rbmc" -> "rbmc_requests_total")
    pub namespace: String,
    /// Keep a latency histogram per resource key
    pub resource_label: bool,
    /// Histogram buckets for response time (in seconds)
    pub histogram_buckets: Vec<f64>,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            namespace: "rbmc".to_string(),
            resource_label: true,
            histogram_buckets: vec![
                0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0,
            ],
        }
    }
}

impl MetricsConfig {
    /// Create a new builder for `MetricsConfig`.
    pub fn builder() -> MetricsConfigBuilder {
        MetricsConfigBuilder::default()
    }
}

/// Builder for `MetricsConfig`.
#[derive(Debug, Default)]
pub struct MetricsConfigBuilder {
    namespace: Option<String>,
    resource_label: Option<bool>,
    histogram_buckets: Option<Vec<f64>>,
}

impl MetricsConfigBuilder {
    /// Set the metric namespace prefix.
    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    /// Enable or disable per-resource latency histograms.
    pub fn resource_label(mut self, enabled: bool) -> Self {
        self.resource_label = Some(enabled);
        self
    }

    /// Set histogram buckets for response time (in seconds).
    pub fn histogram_buckets(mut self, buckets: Vec<f64>) -> Self {
        self.histogram_buckets = Some(buckets);
        self
    }

    /// Build the `MetricsConfig`.
    pub fn build(self) -> MetricsConfig {
        let default = MetricsConfig::default();
        MetricsConfig {
            namespace: self.namespace.unwrap_or(default.namespace),
            resource_label: self.resource_label.unwrap_or(default.resource_label),
            histogram_buckets: self.histogram_buckets.unwrap_or(default.histogram_buckets),
        }
    }
}

/// A single histogram with bucket counters.
#[derive(Debug)]
struct Histogram {
    buckets: Vec<f64>,
    counts: Vec<AtomicU64>,
    sum: AtomicU64, // Store as nanoseconds
    count: AtomicU64,
}

impl Histogram {
    fn new(buckets: Vec<f64>) -> Self {
        let counts = buckets.iter().map(|_| AtomicU64::new(0)).collect();
        Self {
            buckets,
            counts,
            sum: AtomicU64::new(0),
            count: AtomicU64::new(0),
        }
    }

    fn observe(&self, value_secs: f64) {
        // Cumulative buckets; values above the last bucket only count toward +Inf
        if let Some(first) = self.buckets.iter().position(|b| value_secs <= *b) {
            for count in &self.counts[first..] {
                count.fetch_add(1, Ordering::Relaxed);
            }
        }

        self.sum
            .fetch_add((value_secs * 1_000_000_000.0) as u64, Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::Relaxed);
    }

    fn sum_secs(&self) -> f64 {
        self.sum.load(Ordering::Relaxed) as f64 / 1_000_000_000.0
    }

    fn total_count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    fn write_prometheus(&self, output: &mut String, name: &str, base_labels: &str) {
        let sep = if base_labels.is_empty() { "" } else { "," };
        for (bucket, count) in self.buckets.iter().zip(&self.counts) {
            output.push_str(&format!(
                "{name}_bucket{{{base_labels}{sep}le=\"{bucket}\"}} {}\n",
                count.load(Ordering::Relaxed)
            ));
        }
        let total = self.total_count();
        output.push_str(&format!(
            "{name}_bucket{{{base_labels}{sep}le=\"+Inf\"}} {total}\n"
        ));

        let labels = if base_labels.is_empty() {
            String::new()
        } else {
            format!("{{{base_labels}}}")
        };
        output.push_str(&format!("{name}_sum{labels} {}\n", self.sum_secs()));
        output.push_str(&format!("{name}_count{labels} {total}\n"));
    }
}

/// Decimation counters for one named series.
#[derive(Debug, Default)]
struct SeriesStats {
    decimations: AtomicU64,
    size_before: AtomicU64,
    size_after: AtomicU64,
}

/// Increment a labelled counter, taking the write lock only for new labels.
fn bump<K: Eq + Hash>(counters: &RwLock<HashMap<K, AtomicU64>>, key: K) {
    {
        let read = counters.read();
        if let Some(counter) = read.get(&key) {
            counter.fetch_add(1, Ordering::Relaxed);
            return;
        }
    }
    counters
        .write()
        .entry(key)
        .or_insert_with(|| AtomicU64::new(0))
        .fetch_add(1, Ordering::Relaxed);
}

fn sorted<K: Ord + Clone>(counters: &HashMap<K, AtomicU64>) -> Vec<(K, u64)> {
    let mut values: Vec<_> = counters
        .iter()
        .map(|(k, v)| (k.clone(), v.load(Ordering::Relaxed)))
        .collect();
    values.sort_by(|a, b| a.0.cmp(&b.0));
    values
}

/// Thread-safe metrics collector for the gateway.
#[derive(Debug)]
pub struct MetricsCollector {
    config: MetricsConfig,
    /// Counter: requests_total{status}, one per upstream attempt
    requests_total: RwLock<HashMap<&'static str, AtomicU64>>,
    /// Counter: retries_total
    retries_total: AtomicU64,
    /// Counter: fallback_total{reason}
    fallback_total: RwLock<HashMap<String, AtomicU64>>,
    /// Counter: operations_total{operation,outcome}
    operations_total: RwLock<HashMap<(String, &'static str), AtomicU64>>,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    /// Histogram: request_duration_seconds
    request_duration: Histogram,
    /// Histogram: request_duration_by_resource_seconds{resource}
    duration_by_resource: RwLock<HashMap<String, Histogram>>,
    /// Gauge: circuit_breaker_state (see [`CircuitState::gauge_value`])
    circuit_breaker_state: AtomicU64,
    /// Counter: circuit_breaker_rejections_total
    circuit_breaker_rejections: AtomicU64,
    series: RwLock<HashMap<String, SeriesStats>>,
    /// Start time for uptime metric
    start_time: Instant,
}

impl MetricsCollector {
    /// Create a new metrics collector with the given configuration.
    pub fn new(config: MetricsConfig) -> Self {
        let request_duration = Histogram::new(config.histogram_buckets.clone());
        Self {
            config,
            requests_total: RwLock::new(HashMap::new()),
            retries_total: AtomicU64::new(0),
            fallback_total: RwLock::new(HashMap::new()),
            operations_total: RwLock::new(HashMap::new()),
            cache_hits: AtomicU64::new(0),
            cache_misses: AtomicU64::new(0),
            request_duration,
            duration_by_resource: RwLock::new(HashMap::new()),
            circuit_breaker_state: AtomicU64::new(CircuitState::Closed.gauge_value()),
            circuit_breaker_rejections: AtomicU64::new(0),
            series: RwLock::new(HashMap::new()),
            start_time: Instant::now(),
        }
    }

    /// Create a new metrics collector with default configuration.
    pub fn with_defaults() -> Self {
        Self::new(MetricsConfig::default())
    }

    /// Record one upstream attempt.
    pub fn record_attempt(&self, success: bool) {
        bump(&self.requests_total, if success { "success" } else { "error" });
    }

    /// Record a retry scheduled after a failed attempt.
    pub fn record_retry(&self) {
        self.retries_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a fallback response served for `reason`.
    pub fn record_fallback(&self, reason: &str) {
        bump(&self.fallback_total, reason.to_string());
    }

    /// Record the outcome of a service operation.
    pub fn record_operation(&self, operation: &str, fresh: bool) {
        let outcome = if fresh { "fresh" } else { "fallback" };
        bump(&self.operations_total, (operation.to_string(), outcome));
    }

    /// Record a cache hit.
    pub fn record_cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a cache miss.
    pub fn record_cache_miss(&self) {
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    /// Record the latency of a complete fetch, retries included.
    pub fn record_latency(&self, resource: &str, duration: Duration) {
        let secs = duration.as_secs_f64();
        self.request_duration.observe(secs);

        if !self.config.resource_label {
            return;
        }
        {
            let histograms = self.duration_by_resource.read();
            if let Some(hist) = histograms.get(resource) {
                hist.observe(secs);
                return;
            }
        }
        self.duration_by_resource
            .write()
            .entry(resource.to_string())
            .or_insert_with(|| Histogram::new(self.config.histogram_buckets.clone()))
            .observe(secs);
    }

    /// Update the circuit breaker state gauge.
    pub fn set_circuit_state(&self, state: CircuitState) {
        self.circuit_breaker_state
            .store(state.gauge_value(), Ordering::Relaxed);
    }

    /// Record a circuit breaker rejection.
    pub fn record_circuit_breaker_rejection(&self) {
        self.circuit_breaker_rejections
            .fetch_add(1, Ordering::Relaxed);
    }

    /// Record a decimation of `series` from `before` to `after` samples.
    pub fn record_decimation(&self, series: &str, before: usize, after: usize) {
        let update = |stats: &SeriesStats| {
            stats.decimations.fetch_add(1, Ordering::Relaxed);
            stats.size_before.store(before as u64, Ordering::Relaxed);
            stats.size_after.store(after as u64, Ordering::Relaxed);
        };
        {
            let series_map = self.series.read();
            if let Some(stats) = series_map.get(series) {
                update(stats);
                return;
            }
        }
        update(self.series.write().entry(series.to_string()).or_default());
    }

    /// Get the total number of upstream attempts.
    pub fn total_requests(&self) -> u64 {
        self.requests_total
            .read()
            .values()
            .map(|c| c.load(Ordering::Relaxed))
            .sum()
    }

    /// Get the number of failed upstream attempts.
    pub fn failed_requests(&self) -> u64 {
        self.requests_total
            .read()
            .get("error")
            .map_or(0, |c| c.load(Ordering::Relaxed))
    }

    /// Get the number of retries.
    pub fn retries(&self) -> u64 {
        self.retries_total.load(Ordering::Relaxed)
    }

    /// Get the number of fallbacks served, all reasons.
    pub fn fallbacks(&self) -> u64 {
        self.fallback_total
            .read()
            .values()
            .map(|c| c.load(Ordering::Relaxed))
            .sum()
    }

    /// Get the number of fallbacks served for `reason`.
    pub fn fallbacks_for(&self, reason: &str) -> u64 {
        self.fallback_total
            .read()
            .get(reason)
            .map_or(0, |c| c.load(Ordering::Relaxed))
    }

    /// Cache hit rate in percent, zero before the first lookup.
    pub fn cache_hit_rate(&self) -> f64 {
        let hits = self.cache_hits.load(Ordering::Relaxed);
        let total = hits + self.cache_misses.load(Ordering::Relaxed);
        if total == 0 {
            0.0
        } else {
            hits as f64 * 100.0 / total as f64
        }
    }

    /// Number of latency samples recorded for `resource`.
    pub fn latency_samples(&self, resource: &str) -> u64 {
        self.duration_by_resource
            .read()
            .get(resource)
            .map_or(0, Histogram::total_count)
    }

    /// Number of resources with their own latency histogram.
    pub fn latency_resources(&self) -> usize {
        self.duration_by_resource.read().len()
    }

    /// Get gateway uptime.
    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Export metrics in Prometheus text format.
    pub fn to_prometheus_text(&self) -> String {
        let mut output = String::new();
        let ns = &self.config.namespace;

        output.push_str(&format!(
            "# HELP {ns}_requests_total Upstream attempts by status\n"
        ));
        output.push_str(&format!("# TYPE {ns}_requests_total counter\n"));
        for (status, count) in sorted(&self.requests_total.read()) {
            output.push_str(&format!(
                "{ns}_requests_total{{status=\"{status}\"}} {count}\n"
            ));
        }
        output.push('\n');

        output.push_str(&format!("# HELP {ns}_retries_total Retries scheduled\n"));
        output.push_str(&format!("# TYPE {ns}_retries_total counter\n"));
        output.push_str(&format!("{ns}_retries_total {}\n\n", self.retries()));

        output.push_str(&format!(
            "# HELP {ns}_fallback_total Fallback responses by reason\n"
        ));
        output.push_str(&format!("# TYPE {ns}_fallback_total counter\n"));
        for (reason, count) in sorted(&self.fallback_total.read()) {
            output.push_str(&format!(
                "{ns}_fallback_total{{reason=\"{reason}\"}} {count}\n"
            ));
        }
        output.push('\n');

        output.push_str(&format!(
            "# HELP {ns}_operations_total Service operations by outcome\n"
        ));
        output.push_str(&format!("# TYPE {ns}_operations_total counter\n"));
        for ((operation, outcome), count) in sorted(&self.operations_total.read()) {
            output.push_str(&format!(
                "{ns}_operations_total{{operation=\"{operation}\",outcome=\"{outcome}\"}} {count}\n"
            ));
        }
        output.push('\n');

        // Cache
        output.push_str(&format!("# HELP {ns}_cache_hits_total Metadata cache hits\n"));
        output.push_str(&format!("# TYPE {ns}_cache_hits_total counter\n"));
        output.push_str(&format!(
            "{ns}_cache_hits_total {}\n\n",
            self.cache_hits.load(Ordering::Relaxed)
        ));
        output.push_str(&format!(
            "# HELP {ns}_cache_misses_total Metadata cache misses\n"
        ));
        output.push_str(&format!("# TYPE {ns}_cache_misses_total counter\n"));
        output.push_str(&format!(
            "{ns}_cache_misses_total {}\n\n",
            self.cache_misses.load(Ordering::Relaxed)
        ));
        output.push_str(&format!(
            "# HELP {ns}_cache_hit_rate Metadata cache hit rate in percent\n"
        ));
        output.push_str(&format!("# TYPE {ns}_cache_hit_rate gauge\n"));
        output.push_str(&format!("{ns}_cache_hit_rate {}\n\n", self.cache_hit_rate()));

        // Latency
        output.push_str(&format!(
            "# HELP {ns}_request_duration_seconds Fetch duration in seconds\n"
        ));
        output.push_str(&format!("# TYPE {ns}_request_duration_seconds histogram\n"));
        self.request_duration.write_prometheus(
            &mut output,
            &format!("{ns}_request_duration_seconds"),
            "",
        );
        output.push('\n');

        if self.config.resource_label {
            output.push_str(&format!(
                "# HELP {ns}_request_duration_by_resource_seconds Fetch duration per resource key\n"
            ));
            output.push_str(&format!(
                "# TYPE {ns}_request_duration_by_resource_seconds histogram\n"
            ));
            let histograms = self.duration_by_resource.read();
            let mut resources: Vec<_> = histograms.keys().collect();
            resources.sort();
            for resource in resources {
                histograms[resource].write_prometheus(
                    &mut output,
                    &format!("{ns}_request_duration_by_resource_seconds"),
                    &format!("resource=\"{resource}\""),
                );
            }
            output.push('\n');
        }

        // Circuit breaker
        output.push_str(&format!(
            "# HELP {ns}_circuit_breaker_state Circuit breaker state (0=closed, 1=open, 2=half-open, 3=disabled, 4=forced-open, 5=metrics-only)\n"
        ));
        output.push_str(&format!("# TYPE {ns}_circuit_breaker_state gauge\n"));
        output.push_str(&format!(
            "{ns}_circuit_breaker_state {}\n\n",
            self.circuit_breaker_state.load(Ordering::Relaxed)
        ));

        output.push_str(&format!(
            "# HELP {ns}_circuit_breaker_rejections_total Requests rejected by circuit breaker\n"
        ));
        output.push_str(&format!(
            "# TYPE {ns}_circuit_breaker_rejections_total counter\n"
        ));
        output.push_str(&format!(
            "{ns}_circuit_breaker_rejections_total {}\n\n",
            self.circuit_breaker_rejections.load(Ordering::Relaxed)
        ));

        // Series decimation
        {
            let series = self.series.read();
            let mut names: Vec<_> = series.keys().collect();
            names.sort();

            output.push_str(&format!(
                "# HELP {ns}_decimations_total Series decimations performed\n"
            ));
            output.push_str(&format!("# TYPE {ns}_decimations_total counter\n"));
            for name in &names {
                output.push_str(&format!(
                    "{ns}_decimations_total{{series=\"{name}\"}} {}\n",
                    series[*name].decimations.load(Ordering::Relaxed)
                ));
            }
            output.push('\n');

            for (metric, help) in [
                ("series_size_before", "Series length before decimation"),
                ("series_size_after", "Series length after decimation"),
            ] {
                output.push_str(&format!("# HELP {ns}_{metric} {help}\n"));
                output.push_str(&format!("# TYPE {ns}_{metric} gauge\n"));
                for name in &names {
                    let stats = &series[*name];
                    let value = if metric == "series_size_before" {
                        &stats.size_before
                    } else {
                        &stats.size_after
                    };
                    output.push_str(&format!(
                        "{ns}_{metric}{{series=\"{name}\"}} {}\n",
                        value.load(Ordering::Relaxed)
                    ));
                }
                output.push('\n');
            }
        }

        // Uptime
        output.push_str(&format!(
            "# HELP {ns}_uptime_seconds Gateway uptime in seconds\n"
        ));
        output.push_str(&format!("# TYPE {ns}_uptime_seconds gauge\n"));
        output.push_str(&format!(
            "{ns}_uptime_seconds {}\n",
            self.uptime().as_secs_f64()
        ));

        output
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::with_defaults()
    }
}

/// Snapshot of current metrics for programmatic access.
#[derive(Debug, Clone)]
pub struct MetricsSnapshot {
    /// Upstream attempts
    pub total_requests: u64,
    /// Failed upstream attempts
    pub failed_requests: u64,
    /// Retries scheduled
    pub retries: u64,
    /// Fallbacks served
    pub fallbacks: u64,
    /// Cache hits
    pub cache_hits: u64,
    /// Cache misses
    pub cache_misses: u64,
    /// Circuit breaker state gauge value
    pub circuit_breaker_state: u64,
    /// Circuit breaker rejection count
    pub circuit_breaker_rejections: u64,
    /// Decimations performed, all series
    pub decimations: u64,
    /// Gateway uptime
    pub uptime: Duration,
}

impl MetricsCollector {
    /// Get a snapshot of current metrics.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            total_requests: self.total_requests(),
            failed_requests: self.failed_requests(),
            retries: self.retries(),
            fallbacks: self.fallbacks(),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
            circuit_breaker_state: self.circuit_breaker_state.load(Ordering::Relaxed),
            circuit_breaker_rejections: self.circuit_breaker_rejections.load(Ordering::Relaxed),
            decimations: self
                .series
                .read()
                .values()
                .map(|s| s.decimations.load(Ordering::Relaxed))
                .sum(),
            uptime: self.uptime(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_config_default() {
        let config = MetricsConfig::default();
        assert_eq!(config.namespace, "rbmc");
        assert!(config.resource_label);
        assert!(!config.histogram_buckets.is_empty());
    }

    #[test]
    fn test_metrics_config_builder() {
        let config = MetricsConfig::builder()
            .namespace("geosat")
            .resource_label(false)
            .histogram_buckets(vec![0.1, 0.5, 1.0])
            .build();

        assert_eq!(config.namespace, "geosat");
        assert!(!config.resource_label);
        assert_eq!(config.histogram_buckets, vec![0.1, 0.5, 1.0]);
    }

    #[test]
    fn test_attempt_counters() {
        let metrics = MetricsCollector::with_defaults();
        metrics.record_attempt(true);
        metrics.record_attempt(false);
        metrics.record_attempt(false);

        assert_eq!(metrics.total_requests(), 3);
        assert_eq!(metrics.failed_requests(), 2);
    }

    #[test]
    fn test_fallbacks_by_reason() {
        let metrics = MetricsCollector::with_defaults();
        metrics.record_fallback("circuit_open");
        metrics.record_fallback("transient");
        metrics.record_fallback("transient");

        assert_eq!(metrics.fallbacks(), 3);
        assert_eq!(metrics.fallbacks_for("transient"), 2);
        assert_eq!(metrics.fallbacks_for("unknown"), 0);
    }

    #[test]
    fn test_cache_hit_rate() {
        let metrics = MetricsCollector::with_defaults();
        assert_eq!(metrics.cache_hit_rate(), 0.0);

        metrics.record_cache_hit();
        metrics.record_cache_hit();
        metrics.record_cache_hit();
        metrics.record_cache_miss();
        assert_eq!(metrics.cache_hit_rate(), 75.0);
    }

    #[test]
    fn test_circuit_breaker_metrics() {
        let metrics = MetricsCollector::with_defaults();
        assert_eq!(metrics.snapshot().circuit_breaker_state, 0);

        metrics.set_circuit_state(CircuitState::HalfOpen);
        assert_eq!(metrics.snapshot().circuit_breaker_state, 2);

        metrics.record_circuit_breaker_rejection();
        metrics.record_circuit_breaker_rejection();
        assert_eq!(metrics.snapshot().circuit_breaker_rejections, 2);
    }

    #[test]
    fn test_latency_per_resource() {
        let metrics = MetricsCollector::with_defaults();
        metrics.record_latency("ALAR", Duration::from_millis(10));
        metrics.record_latency("ALAR", Duration::from_millis(20));
        metrics.record_latency("BRAZ", Duration::from_millis(30));

        assert_eq!(metrics.latency_samples("ALAR"), 2);
        assert_eq!(metrics.latency_samples("BRAZ"), 1);
        assert_eq!(metrics.request_duration.total_count(), 3);
    }

    #[test]
    fn test_latency_without_resource_label() {
        let metrics = MetricsCollector::new(MetricsConfig::builder().resource_label(false).build());
        metrics.record_latency("ALAR", Duration::from_millis(10));

        assert_eq!(metrics.latency_samples("ALAR"), 0);
        assert!(!metrics
            .to_prometheus_text()
            .contains("request_duration_by_resource_seconds"));
    }

    #[test]
    fn test_decimation_stats() {
        let metrics = MetricsCollector::with_defaults();
        metrics.record_decimation("snr", 1440, 300);
        metrics.record_decimation("snr", 2880, 300);

        assert_eq!(metrics.snapshot().decimations, 2);
        let output = metrics.to_prometheus_text();
        assert!(output.contains("rbmc_decimations_total{series=\"snr\"} 2"));
        assert!(output.contains("rbmc_series_size_before{series=\"snr\"} 2880"));
        assert!(output.contains("rbmc_series_size_after{series=\"snr\"} 300"));
    }

    #[test]
    fn test_snapshot() {
        let metrics = MetricsCollector::with_defaults();
        metrics.record_attempt(false);
        metrics.record_retry();
        metrics.record_fallback("transient");
        metrics.record_cache_miss();
        metrics.set_circuit_state(CircuitState::Open);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.total_requests, 1);
        assert_eq!(snapshot.failed_requests, 1);
        assert_eq!(snapshot.retries, 1);
        assert_eq!(snapshot.fallbacks, 1);
        assert_eq!(snapshot.cache_misses, 1);
        assert_eq!(snapshot.circuit_breaker_state, 1);
    }

    #[test]
    fn test_prometheus_text_format() {
        let metrics = MetricsCollector::new(MetricsConfig {
            namespace: "test".to_string(),
            resource_label: true,
            histogram_buckets: vec![0.1, 1.0],
        });

        metrics.record_attempt(true);
        metrics.record_operation("report", true);
        metrics.record_latency("ALAR", Duration::from_millis(50));

        let output = metrics.to_prometheus_text();

        assert!(output.contains("# TYPE test_requests_total counter"));
        assert!(output.contains("test_requests_total{status=\"success\"} 1"));
        assert!(output.contains("test_operations_total{operation=\"report\",outcome=\"fresh\"} 1"));
        assert!(output.contains("test_request_duration_seconds_bucket{le=\"0.1\"} 1"));
        assert!(output.contains("test_request_duration_seconds_count 1"));
        assert!(output.contains(
            "test_request_duration_by_resource_seconds_bucket{resource=\"ALAR\",le=\"+Inf\"} 1"
        ));
        assert!(output.contains("test_circuit_breaker_state 0"));
        assert!(output.contains("test_cache_hit_rate 0"));
        assert!(output.contains("test_uptime_seconds"));
    }

    #[test]
    fn test_histogram_buckets() {
        let hist = Histogram::new(vec![0.01, 0.1, 1.0]);

        // 0.05 lands in the 0.1 and 1.0 buckets
        hist.observe(0.05);
        hist.observe(5.0);

        assert_eq!(hist.counts[0].load(Ordering::Relaxed), 0);
        assert_eq!(hist.counts[1].load(Ordering::Relaxed), 1);
        assert_eq!(hist.counts[2].load(Ordering::Relaxed), 1);
        assert_eq!(hist.total_count(), 2);
    }
}
