// SPDX-License-Identifier: MIT OR Apache-2.0

//! Time-series decimation.
//!
//! [`decimate`] bounds an ordered series to at most `max` samples by
//! picking evenly spaced indices. It never interpolates, so every output
//! sample is one of the input samples and the order is preserved.
//!
//! # Example
//!
//! ```
//! use geosat_gateway::series::decimate;
//!
//! let samples: Vec<u32> = (0..1440).collect();
//! let reduced = decimate(&samples, 300);
//!
//! assert_eq!(reduced.len(), 300);
//! assert_eq!(reduced[0], 0);
//! assert_eq!(reduced[299], 1435);
//! ```

use crate::error::{GatewayError, Result};
use crate::resources::StationCode;
use crate::runtime::MetricsCollector;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::sync::Arc;
use tracing::debug;

/// Series name used in metrics for SNR series.
pub const SNR_SERIES: &str = "snr";

/// Series name used in metrics for position series.
pub const POSITION_SERIES: &str = "positions";

/// Reference frame of position series.
pub const POSITION_DATUM: &str = "WGS84";

/// Indices picked when reducing `len` samples to `max`.
///
/// Index `i` is `floor(i * len / max)`, computed exactly in integers.
/// Returns `0..len` when no reduction is needed.
#[must_use]
pub fn decimate_indices(len: usize, max: usize) -> Vec<usize> {
    if len <= max {
        return (0..len).collect();
    }
    let (len_wide, max_wide) = (len as u128, max as u128);
    (0..max_wide)
        .map(|i| ((i * len_wide) / max_wide) as usize)
        .collect()
}

/// Reduce `samples` to at most `max` evenly spaced samples.
///
/// The input is returned borrowed when it already fits. A `max` of zero
/// yields an empty series; callers validate `max` beforehand.
#[must_use]
pub fn decimate<T: Clone>(samples: &[T], max: usize) -> Cow<'_, [T]> {
    if samples.len() <= max {
        return Cow::Borrowed(samples);
    }
    Cow::Owned(
        decimate_indices(samples.len(), max)
            .into_iter()
            .map(|i| samples[i].clone())
            .collect(),
    )
}

/// Bounds applied to series requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeriesLimits {
    /// `max` used when the request names none.
    pub default_max: usize,
    /// Largest accepted `max`.
    pub max_limit: usize,
}

impl Default for SeriesLimits {
    fn default() -> Self {
        Self {
            default_max: 300,
            max_limit: 10_000,
        }
    }
}

/// A validated series request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeriesRequest {
    pub station: StationCode,
    /// Year, 2000..=2100.
    pub year: u16,
    /// Day of year, 1..=366.
    pub day: u16,
    /// Maximum number of samples returned.
    pub max: usize,
}

impl SeriesRequest {
    /// Validate a series request.
    ///
    /// # Errors
    ///
    /// Returns `GatewayError::Validation` for an invalid station, a year
    /// outside 2000..=2100, a day outside 1..=366 or a `max` outside
    /// `1..=limits.max_limit`.
    pub fn new(
        station: &str,
        year: u16,
        day: u16,
        max: Option<usize>,
        limits: &SeriesLimits,
    ) -> Result<Self> {
        let station = StationCode::new(station)?;
        if !(2000..=2100).contains(&year) {
            return Err(GatewayError::Validation(format!(
                "year must be within 2000..=2100, got {year}"
            )));
        }
        if !(1..=366).contains(&day) {
            return Err(GatewayError::Validation(format!(
                "day of year must be within 1..=366, got {day}"
            )));
        }
        let max = max.unwrap_or(limits.default_max);
        if max < 1 || max > limits.max_limit {
            return Err(GatewayError::Validation(format!(
                "max must be within 1..={}, got {max}",
                limits.max_limit
            )));
        }
        Ok(Self {
            station,
            year,
            day,
            max,
        })
    }
}

/// Signal-to-noise sample of one satellite.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnrSample {
    pub timestamp: DateTime<Utc>,
    /// Satellite id, e.g. `G07`.
    #[serde(rename = "satelite")]
    pub satellite: String,
    /// dB-Hz.
    pub snr: f64,
}

/// Station position sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionSample {
    pub timestamp: DateTime<Utc>,
    pub latitude: f64,
    pub longitude: f64,
    /// Ellipsoidal height in meters.
    #[serde(rename = "altura")]
    pub height: f64,
}

/// Decimated SNR series of a station day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnrSeries {
    #[serde(rename = "codigo")]
    pub station: String,
    #[serde(rename = "ano")]
    pub year: u16,
    #[serde(rename = "dia")]
    pub day: u16,
    #[serde(rename = "amostras")]
    pub samples: Vec<SnrSample>,
}

/// Decimated position series of a station day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionSeries {
    #[serde(rename = "codigo")]
    pub station: String,
    #[serde(rename = "ano")]
    pub year: u16,
    #[serde(rename = "dia")]
    pub day: u16,
    pub datum: String,
    #[serde(rename = "amostras")]
    pub samples: Vec<PositionSample>,
}

/// Decimates series and records before/after sizes.
#[derive(Clone)]
pub struct SeriesDecimator {
    metrics: Arc<MetricsCollector>,
}

impl SeriesDecimator {
    pub fn new(metrics: Arc<MetricsCollector>) -> Self {
        Self { metrics }
    }

    /// Decimate `samples` of the named series.
    pub fn decimate<T: Clone>(&self, series: &str, samples: &[T], max: usize) -> Vec<T> {
        let reduced = decimate(samples, max).into_owned();
        self.metrics
            .record_decimation(series, samples.len(), reduced.len());
        debug!(
            series,
            before = samples.len(),
            after = reduced.len(),
            max,
            "decimated series"
        );
        reduced
    }

    /// SNR series for `request`.
    pub fn snr(&self, request: &SeriesRequest, samples: &[SnrSample]) -> SnrSeries {
        SnrSeries {
            station: request.station.to_string(),
            year: request.year,
            day: request.day,
            samples: self.decimate(SNR_SERIES, samples, request.max),
        }
    }

    /// Position series for `request`.
    pub fn positions(&self, request: &SeriesRequest, samples: &[PositionSample]) -> PositionSeries {
        PositionSeries {
            station: request.station.to_string(),
            year: request.year,
            day: request.day,
            datum: POSITION_DATUM.to_string(),
            samples: self.decimate(POSITION_SERIES, samples, request.max),
        }
    }
}
