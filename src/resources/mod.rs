// SPDX-License-Identifier: MIT OR Apache-2.0

//! RBMC resources: what can be fetched and how it is addressed.
//!
//! A [`Resource`] is built from caller input through validating
//! constructors and knows its upstream path, cache key, fallback key and
//! cache category.

mod metadata;

pub use metadata::{CachedMetadata, FileMetadata, ReportMetadata};

use crate::cache::CacheTtls;
use crate::error::{GatewayError, Result};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Fallback key used for orbit files, which have no station.
pub const ORBITS_KEY: &str = "ORBITAS";

/// A validated four-letter station code, stored upper case.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StationCode(String);

impl StationCode {
    /// Validate and normalize a station code.
    ///
    /// # Errors
    ///
    /// Returns `GatewayError::Validation` unless `code` is four ASCII letters.
    pub fn new(code: &str) -> Result<Self> {
        if code.len() != 4 || !code.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(GatewayError::Validation(format!(
                "station code must have 4 letters, got {code:?}"
            )));
        }
        Ok(Self(code.to_ascii_uppercase()))
    }

    /// Upper-case form used in keys.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Lower-case form used in upstream paths.
    #[must_use]
    pub fn lower(&self) -> String {
        self.0.to_ascii_lowercase()
    }
}

impl fmt::Display for StationCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for StationCode {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

/// Observation file kind of RINEX 3 one-second files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObservationKind {
    /// Mixed observations.
    Mo,
    /// Navigation messages.
    Mn,
}

impl ObservationKind {
    /// Upper-case code.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ObservationKind::Mo => "MO",
            ObservationKind::Mn => "MN",
        }
    }
}

impl FromStr for ObservationKind {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "MO" => Ok(ObservationKind::Mo),
            "MN" => Ok(ObservationKind::Mn),
            _ => Err(GatewayError::Validation(format!(
                "observation kind must be MO or MN, got {s:?}"
            ))),
        }
    }
}

/// Calendar position of a daily file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DayOfYear {
    /// Four-digit year.
    pub year: u16,
    /// Day of year, 1-based.
    pub day: u16,
}

impl DayOfYear {
    /// Validate a year and day of year.
    ///
    /// # Errors
    ///
    /// Returns `GatewayError::Validation` for a year above 9999 or a day
    /// outside 1..=366.
    pub fn new(year: u16, day: u16) -> Result<Self> {
        if year > 9999 {
            return Err(GatewayError::Validation(format!(
                "year must have 4 digits, got {year}"
            )));
        }
        if !(1..=366).contains(&day) {
            return Err(GatewayError::Validation(format!(
                "day of year must be within 1..=366, got {day}"
            )));
        }
        Ok(Self { year, day })
    }
}

/// Start of a one-second RINEX 3 file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HourMinute {
    /// Hour of day, 0..=23.
    pub hour: u8,
    /// Quarter-hour minute: 0, 15, 30 or 45.
    pub minute: u8,
}

impl HourMinute {
    /// Validate an hour and quarter-hour minute.
    ///
    /// # Errors
    ///
    /// Returns `GatewayError::Validation` for values outside the ranges.
    pub fn new(hour: u8, minute: u8) -> Result<Self> {
        if hour > 23 {
            return Err(GatewayError::Validation(format!(
                "hour must be within 0..=23, got {hour}"
            )));
        }
        if !matches!(minute, 0 | 15 | 30 | 45) {
            return Err(GatewayError::Validation(format!(
                "minute must be 0, 15, 30 or 45, got {minute}"
            )));
        }
        Ok(Self { hour, minute })
    }
}

/// Cache category of a resource, selecting its TTL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheCategory {
    /// Station reports.
    Report,
    /// Observation files.
    File,
    /// Orbit files.
    Orbit,
}

impl CacheCategory {
    /// TTL for this category.
    #[must_use]
    pub fn ttl(self, ttls: &CacheTtls) -> Duration {
        match self {
            CacheCategory::Report => ttls.report,
            CacheCategory::File => ttls.file,
            CacheCategory::Orbit => ttls.orbit,
        }
    }
}

/// A fetchable unit of the RBMC service.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Resource {
    /// Station technical report.
    Report {
        /// Station.
        station: StationCode,
    },
    /// Daily RINEX 2 file, 15 s interval.
    Rinex2 {
        /// Station.
        station: StationCode,
        /// Day.
        date: DayOfYear,
    },
    /// RINEX 3 file, 1 s interval, 15 minutes long.
    Rinex3OneSecond {
        /// Station.
        station: StationCode,
        /// Day.
        date: DayOfYear,
        /// Start of the file.
        start: HourMinute,
        /// Observation kind.
        kind: ObservationKind,
    },
    /// Daily RINEX 3 file, 15 s interval.
    Rinex3FifteenSecond {
        /// Station.
        station: StationCode,
        /// Day.
        date: DayOfYear,
    },
    /// Multi-constellation orbit file.
    Orbits {
        /// Day.
        date: DayOfYear,
    },
}

impl Resource {
    /// Station report of `station`.
    ///
    /// # Errors
    ///
    /// Returns `GatewayError::Validation` for an invalid station code.
    pub fn report(station: &str) -> Result<Self> {
        Ok(Resource::Report {
            station: station.parse()?,
        })
    }

    /// Daily RINEX 2 file.
    ///
    /// # Errors
    ///
    /// Returns `GatewayError::Validation` for invalid input.
    pub fn rinex2(station: &str, year: u16, day: u16) -> Result<Self> {
        Ok(Resource::Rinex2 {
            station: station.parse()?,
            date: DayOfYear::new(year, day)?,
        })
    }

    /// One-second RINEX 3 file.
    ///
    /// # Errors
    ///
    /// Returns `GatewayError::Validation` for invalid input.
    pub fn rinex3_1s(
        station: &str,
        year: u16,
        day: u16,
        hour: u8,
        minute: u8,
        kind: &str,
    ) -> Result<Self> {
        Ok(Resource::Rinex3OneSecond {
            station: station.parse()?,
            date: DayOfYear::new(year, day)?,
            start: HourMinute::new(hour, minute)?,
            kind: kind.parse()?,
        })
    }

    /// Daily fifteen-second RINEX 3 file.
    ///
    /// # Errors
    ///
    /// Returns `GatewayError::Validation` for invalid input.
    pub fn rinex3_15s(station: &str, year: u16, day: u16) -> Result<Self> {
        Ok(Resource::Rinex3FifteenSecond {
            station: station.parse()?,
            date: DayOfYear::new(year, day)?,
        })
    }

    /// Orbit file of a day.
    ///
    /// # Errors
    ///
    /// Returns `GatewayError::Validation` for an invalid date.
    pub fn orbits(year: u16, day: u16) -> Result<Self> {
        Ok(Resource::Orbits {
            date: DayOfYear::new(year, day)?,
        })
    }

    /// Station the resource belongs to, if any.
    #[must_use]
    pub fn station(&self) -> Option<&StationCode> {
        match self {
            Resource::Report { station }
            | Resource::Rinex2 { station, .. }
            | Resource::Rinex3OneSecond { station, .. }
            | Resource::Rinex3FifteenSecond { station, .. } => Some(station),
            Resource::Orbits { .. } => None,
        }
    }

    /// Path relative to the RBMC base URL.
    #[must_use]
    pub fn relative_path(&self) -> String {
        match self {
            Resource::Report { station } => format!("relatorio/{}", station.lower()),
            Resource::Rinex2 { station, date } => {
                format!("rinex2/{}/{}/{}", station.lower(), date.year, date.day)
            }
            Resource::Rinex3OneSecond {
                station,
                date,
                start,
                kind,
            } => format!(
                "rinex3/1s/{}/{}/{}/{}/{}/{}",
                station.lower(),
                date.year,
                date.day,
                start.hour,
                start.minute,
                kind.as_str().to_ascii_lowercase()
            ),
            Resource::Rinex3FifteenSecond { station, date } => {
                format!("rinex3/{}/{}/{}", station.lower(), date.year, date.day)
            }
            Resource::Orbits { date } => format!("rinex3/orbitas/{}/{}", date.year, date.day),
        }
    }

    /// Key the resource metadata is cached under.
    #[must_use]
    pub fn cache_key(&self) -> String {
        match self {
            Resource::Report { station } => station.to_string(),
            Resource::Rinex2 { station, date } => {
                format!("RINEX2_{station}_{}_{}", date.year, date.day)
            }
            Resource::Rinex3OneSecond {
                station,
                date,
                start,
                kind,
            } => format!(
                "RINEX3_1S_{station}_{}_{}_{}_{}_{}",
                date.year,
                date.day,
                start.hour,
                start.minute,
                kind.as_str()
            ),
            Resource::Rinex3FifteenSecond { station, date } => {
                format!("RINEX3_15S_{station}_{}_{}", date.year, date.day)
            }
            Resource::Orbits { date } => format!("ORBITAS_{}_{}", date.year, date.day),
        }
    }

    /// Key whose cached fields back a fallback response.
    ///
    /// File fallbacks report the station's cached metadata.
    #[must_use]
    pub fn fallback_key(&self) -> String {
        match self.station() {
            Some(station) => station.to_string(),
            None => ORBITS_KEY.to_string(),
        }
    }

    /// Category name reported in file metadata.
    #[must_use]
    pub fn category(&self) -> &'static str {
        match self {
            Resource::Report { .. } => "relatorio",
            Resource::Rinex2 { .. } => "rinex2",
            Resource::Rinex3OneSecond { .. } => "rinex3_1s",
            Resource::Rinex3FifteenSecond { .. } => "rinex3_15s",
            Resource::Orbits { .. } => "orbitas",
        }
    }

    /// Sampling interval of observation files.
    #[must_use]
    pub fn interval(&self) -> Option<&'static str> {
        match self {
            Resource::Rinex2 { .. } | Resource::Rinex3FifteenSecond { .. } => Some("15s"),
            Resource::Rinex3OneSecond { .. } => Some("1s"),
            Resource::Report { .. } | Resource::Orbits { .. } => None,
        }
    }

    /// Cache category selecting the TTL.
    #[must_use]
    pub fn cache_category(&self) -> CacheCategory {
        match self {
            Resource::Report { .. } => CacheCategory::Report,
            Resource::Orbits { .. } => CacheCategory::Orbit,
            _ => CacheCategory::File,
        }
    }

    /// Human description of the resource.
    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            Resource::Report { .. } => "Station technical report",
            Resource::Rinex2 { .. } => "Daily RINEX 2 observation file (15s)",
            Resource::Rinex3OneSecond { .. } => "RINEX 3 observation file (1s)",
            Resource::Rinex3FifteenSecond { .. } => "Daily RINEX 3 observation file (15s)",
            Resource::Orbits { .. } => "Multi-constellation orbits",
        }
    }

    /// Short label used for metrics and logs.
    #[must_use]
    pub fn operation(&self) -> &'static str {
        match self {
            Resource::Report { .. } => "report",
            Resource::Rinex2 { .. } => "rinex2",
            Resource::Rinex3OneSecond { .. } => "rinex3_1s",
            Resource::Rinex3FifteenSecond { .. } => "rinex3_15s",
            Resource::Orbits { .. } => "orbits",
        }
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.cache_key())
    }
}
