// SPDX-License-Identifier: MIT OR Apache-2.0

//! Metadata returned for successfully fetched resources.

use super::Resource;
use crate::cache::Fields;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Metadata that is cached after a successful fetch.
pub trait CachedMetadata {
    /// Fields stored in the metadata cache.
    fn cache_fields(&self) -> Fields;
}

/// Station report metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportMetadata {
    /// Station code, upper case.
    #[serde(rename = "estacao")]
    pub station: String,
    /// Document type.
    #[serde(rename = "tipo")]
    pub kind: String,
    /// Public link to the report.
    pub link: String,
    /// Description.
    #[serde(rename = "descricao")]
    pub description: String,
    /// Size in bytes, when known.
    #[serde(rename = "tamanhoBytes", skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<u64>,
    /// Time the metadata was produced.
    #[serde(rename = "ultimaAtualizacao")]
    pub last_updated: DateTime<Utc>,
}

impl ReportMetadata {
    /// Metadata of a report fetched from `link`.
    #[must_use]
    pub fn new(resource: &Resource, link: String, size_bytes: Option<u64>) -> Self {
        Self {
            station: resource.fallback_key(),
            kind: "pdf".to_string(),
            link,
            description: resource.description().to_string(),
            size_bytes,
            last_updated: Utc::now(),
        }
    }
}

impl CachedMetadata for ReportMetadata {
    fn cache_fields(&self) -> Fields {
        let mut fields = Fields::new();
        fields.insert("link".into(), self.link.clone().into());
        fields.insert("tipo".into(), self.kind.clone().into());
        fields.insert(
            "ultimaAtualizacao".into(),
            self.last_updated
                .to_rfc3339_opts(SecondsFormat::Millis, true)
                .into(),
        );
        fields
    }
}

/// RINEX or orbit file metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileMetadata {
    /// Station code, absent for orbits.
    #[serde(rename = "estacao")]
    pub station: Option<String>,
    /// File category, e.g. `rinex2`.
    #[serde(rename = "categoria")]
    pub category: String,
    /// Sampling interval, absent for orbits.
    #[serde(rename = "intervalo")]
    pub interval: Option<String>,
    /// Public link to the file.
    pub link: String,
    /// Description.
    #[serde(rename = "descricao")]
    pub description: String,
    /// Time the metadata was produced.
    #[serde(rename = "ultimaAtualizacao")]
    pub last_updated: DateTime<Utc>,
}

impl FileMetadata {
    /// Metadata of a file fetched from `link`.
    #[must_use]
    pub fn new(resource: &Resource, link: String) -> Self {
        Self {
            station: resource.station().map(ToString::to_string),
            category: resource.category().to_string(),
            interval: resource.interval().map(str::to_string),
            link,
            description: resource.description().to_string(),
            last_updated: Utc::now(),
        }
    }
}

impl CachedMetadata for FileMetadata {
    fn cache_fields(&self) -> Fields {
        let mut fields = Fields::new();
        fields.insert("link".into(), self.link.clone().into());
        if let Some(interval) = &self.interval {
            fields.insert("intervalo".into(), interval.clone().into());
        }
        fields
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_fields() {
        let resource = Resource::report("alar").unwrap();
        let report = ReportMetadata::new(&resource, "https://x/relatorio/alar".into(), None);

        assert_eq!(report.station, "ALAR");
        let fields = report.cache_fields();
        assert_eq!(fields.len(), 3);
        assert_eq!(fields["link"].as_str(), Some("https://x/relatorio/alar"));
        assert_eq!(fields["tipo"].as_str(), Some("pdf"));
        assert!(fields["ultimaAtualizacao"].as_str().unwrap().ends_with('Z'));
    }

    #[test]
    fn test_report_json_names() {
        let resource = Resource::report("alar").unwrap();
        let report = ReportMetadata::new(&resource, "l".into(), Some(10));
        let json = serde_json::to_value(&report).unwrap();

        assert_eq!(json["estacao"], "ALAR");
        assert_eq!(json["tipo"], "pdf");
        assert_eq!(json["tamanhoBytes"], 10);
        assert!(json.get("ultimaAtualizacao").is_some());
    }

    #[test]
    fn test_file_fields() {
        let rinex = Resource::rinex2("alar", 2024, 3).unwrap();
        let file = FileMetadata::new(&rinex, "https://x/rinex2/alar/2024/3".into());
        assert_eq!(file.station.as_deref(), Some("ALAR"));
        assert_eq!(file.cache_fields()["intervalo"].as_str(), Some("15s"));

        let orbits = Resource::orbits(2024, 3).unwrap();
        let file = FileMetadata::new(&orbits, "https://x/rinex3/orbitas/2024/3".into());
        assert!(file.station.is_none());
        assert_eq!(file.category, "orbitas");
        assert_eq!(file.cache_fields().len(), 1);
    }
}
