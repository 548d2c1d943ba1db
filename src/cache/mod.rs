// SPDX-License-Identifier: MIT OR Apache-2.0

//! Metadata cache for RBMC resources.
//!
//! Successful fetches store a small map of named fields under the
//! resource key. Fallback responses read it back when the upstream is
//! unavailable. Entries carry their own TTL and are never deleted
//! explicitly.

mod memory;

pub use memory::MemoryMetadataCache;

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

/// Prefix applied to every stored key.
pub const KEY_PREFIX: &str = "rbmc:meta:";

/// Cached attribute map.
pub type Fields = BTreeMap<String, FieldValue>;

/// A single cached attribute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    /// Text value.
    Text(String),
    /// Numeric value.
    Number(f64),
}

impl FieldValue {
    /// The text value, if this is text.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            FieldValue::Number(_) => None,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Text(s) => f.write_str(s),
            FieldValue::Number(n) => write!(f, "{n}"),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Text(value)
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        FieldValue::Number(value)
    }
}

impl From<u64> for FieldValue {
    fn from(value: u64) -> Self {
        FieldValue::Number(value as f64)
    }
}

/// Result of a cache read.
#[derive(Debug, Clone, PartialEq)]
pub enum CacheLookup {
    /// A live entry exists.
    Found(Fields),
    /// No entry, or the entry expired.
    NotFound,
}

impl CacheLookup {
    /// Whether an entry was found.
    #[must_use]
    pub fn is_found(&self) -> bool {
        matches!(self, CacheLookup::Found(_))
    }

    /// The cached fields, or an empty map.
    #[must_use]
    pub fn into_fields(self) -> Fields {
        match self {
            CacheLookup::Found(fields) => fields,
            CacheLookup::NotFound => Fields::new(),
        }
    }
}

/// Key-value store of resource metadata with per-entry TTL.
///
/// Implementations normalize keys with [`storage_key`].
#[async_trait]
pub trait MetadataCache: Send + Sync {
    /// Store `fields` under `key`, replacing any previous entry.
    ///
    /// # Errors
    ///
    /// Returns `GatewayError::Cache` if the store is unreachable.
    async fn put(&self, key: &str, fields: Fields, ttl: Duration) -> Result<()>;

    /// Read the live entry for `key`.
    ///
    /// # Errors
    ///
    /// Returns `GatewayError::Cache` if the store is unreachable.
    async fn get(&self, key: &str) -> Result<CacheLookup>;
}

/// Storage key for a resource key: prefixed and upper-cased.
#[must_use]
pub fn storage_key(key: &str) -> String {
    format!("{KEY_PREFIX}{}", key.to_uppercase())
}

/// TTLs per resource category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheTtls {
    /// Station reports.
    pub report: Duration,
    /// RINEX 2 and RINEX 3 observation files.
    pub file: Duration,
    /// Orbit files.
    pub orbit: Duration,
}

impl Default for CacheTtls {
    fn default() -> Self {
        Self {
            report: Duration::from_secs(12 * 3600),
            file: Duration::from_secs(6 * 3600),
            orbit: Duration::from_secs(12 * 3600),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_key_normalizes() {
        assert_eq!(storage_key("alar"), "rbmc:meta:ALAR");
        assert_eq!(storage_key("Rinex2_alar_2024_1"), "rbmc:meta:RINEX2_ALAR_2024_1");
    }

    #[test]
    fn test_lookup_into_fields() {
        let mut fields = Fields::new();
        fields.insert("link".into(), "https://x/relatorio/alar".into());

        assert!(CacheLookup::Found(fields.clone()).is_found());
        assert_eq!(CacheLookup::Found(fields.clone()).into_fields(), fields);
        assert!(CacheLookup::NotFound.into_fields().is_empty());
    }

    #[test]
    fn test_field_value_serializes_untagged() {
        let mut fields = Fields::new();
        fields.insert("link".into(), "https://x".into());
        fields.insert("tamanhoBytes".into(), 2048u64.into());

        let json = serde_json::to_string(&fields).unwrap();
        assert_eq!(json, r#"{"link":"https://x","tamanhoBytes":2048.0}"#);
        assert_eq!(fields["link"].as_str(), Some("https://x"));
        assert_eq!(fields["tamanhoBytes"].as_str(), None);
    }

    #[test]
    fn test_default_ttls() {
        let ttls = CacheTtls::default();
        assert_eq!(ttls.report, Duration::from_secs(43_200));
        assert_eq!(ttls.file, Duration::from_secs(21_600));
        assert_eq!(ttls.orbit, Duration::from_secs(43_200));
    }
}
