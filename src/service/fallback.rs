// SPDX-License-Identifier: MIT OR Apache-2.0

//! Degraded responses built from cached metadata.

use crate::cache::{Fields, MetadataCache};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::warn;

/// Status tag carried by every fallback response.
pub const UNAVAILABLE: &str = "unavailable";

/// Response served when the upstream cannot be reached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FallbackResponse {
    /// Resource key the fallback was composed for.
    #[serde(rename = "estacao")]
    pub key: String,
    /// Always [`UNAVAILABLE`].
    pub status: String,
    /// Human readable reason.
    #[serde(rename = "mensagem")]
    pub message: String,
    /// Time the fallback was composed.
    pub timestamp: DateTime<Utc>,
    /// Last cached fields for the key, possibly empty.
    #[serde(rename = "dadosCacheados")]
    pub cached: Fields,
}

/// Builds fallback responses from the metadata cache.
#[derive(Clone)]
pub struct FallbackComposer {
    cache: Arc<dyn MetadataCache>,
}

impl FallbackComposer {
    /// Create a composer reading from `cache`.
    pub fn new(cache: Arc<dyn MetadataCache>) -> Self {
        Self { cache }
    }

    /// Compose a fallback for `key`. Never fails; an unreachable cache
    /// yields an empty field map.
    pub async fn compose(&self, key: &str, message: impl Into<String>) -> FallbackResponse {
        let cached = match self.cache.get(key).await {
            Ok(lookup) => lookup.into_fields(),
            Err(e) => {
                warn!(key, error = %e, "metadata cache unavailable while composing fallback");
                Fields::new()
            }
        };

        FallbackResponse {
            key: key.to_string(),
            status: UNAVAILABLE.to_string(),
            message: message.into(),
            timestamp: Utc::now(),
            cached,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryMetadataCache;
    use crate::testkit::UnreachableCache;
    use std::time::Duration;

    #[tokio::test]
    async fn test_compose_with_cached_fields() {
        let cache = Arc::new(MemoryMetadataCache::default());
        let mut fields = Fields::new();
        fields.insert("link".into(), "https://x/relatorio/alar".into());
        cache
            .put("ALAR", fields.clone(), Duration::from_secs(60))
            .await
            .unwrap();

        let composer = FallbackComposer::new(cache);
        let before = Utc::now();
        let response = composer.compose("ALAR", "circuit open").await;

        assert_eq!(response.key, "ALAR");
        assert_eq!(response.status, UNAVAILABLE);
        assert_eq!(response.message, "circuit open");
        assert_eq!(response.cached, fields);
        assert!(response.timestamp >= before);
    }

    #[tokio::test]
    async fn test_compose_without_entry() {
        let composer = FallbackComposer::new(Arc::new(MemoryMetadataCache::default()));
        let response = composer.compose("BRAZ", "transient failure").await;

        assert!(response.cached.is_empty());
        assert_eq!(response.status, UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_compose_survives_cache_outage() {
        let composer = FallbackComposer::new(Arc::new(UnreachableCache));
        let response = composer.compose("ALAR", "transient failure").await;

        assert!(response.cached.is_empty());
        assert_eq!(response.key, "ALAR");
    }

    #[tokio::test]
    async fn test_json_shape() {
        let composer = FallbackComposer::new(Arc::new(MemoryMetadataCache::default()));
        let response = composer.compose("ALAR", "m").await;
        let json = serde_json::to_value(&response).unwrap();

        assert_eq!(json["estacao"], "ALAR");
        assert_eq!(json["status"], "unavailable");
        assert_eq!(json["mensagem"], "m");
        assert!(json["timestamp"].is_string());
        assert!(json["dadosCacheados"].as_object().unwrap().is_empty());
    }
}
