// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-process metadata cache using moka.

use super::{storage_key, CacheLookup, Fields, MetadataCache};
use crate::error::Result;
use crate::runtime::MetricsCollector;
use async_trait::async_trait;
use moka::future::Cache;
use moka::policy::EvictionPolicy;
use moka::Expiry;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
struct CachedEntry {
    fields: Fields,
    ttl: Duration,
}

/// Expires each entry after the TTL it was stored with.
struct PerEntryTtl;

impl Expiry<String, CachedEntry> for PerEntryTtl {
    fn expire_after_create(
        &self,
        _key: &String,
        value: &CachedEntry,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(value.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &CachedEntry,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(value.ttl)
    }
}

/// Metadata cache held in process memory.
pub struct MemoryMetadataCache {
    cache: Cache<String, CachedEntry>,
    metrics: Option<Arc<MetricsCollector>>,
}

impl MemoryMetadataCache {
    /// Create a cache bounded to `max_entries`.
    ///
    /// Entries normally leave by TTL. `max_entries` is a memory ceiling;
    /// once it is reached the least recently used entry is evicted, so the
    /// last write for a key is always admitted and readable.
    pub fn new(max_entries: u64) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_entries)
            .eviction_policy(EvictionPolicy::lru())
            .expire_after(PerEntryTtl)
            .build();

        Self {
            cache,
            metrics: None,
        }
    }

    /// Count hits and misses in `metrics`.
    #[must_use]
    pub fn with_metrics(mut self, metrics: Arc<MetricsCollector>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Approximate number of live entries.
    pub fn entry_count(&self) -> u64 {
        self.cache.entry_count()
    }
}

impl Default for MemoryMetadataCache {
    fn default() -> Self {
        Self::new(10_000)
    }
}

#[async_trait]
impl MetadataCache for MemoryMetadataCache {
    async fn put(&self, key: &str, fields: Fields, ttl: Duration) -> Result<()> {
        self.cache
            .insert(storage_key(key), CachedEntry { fields, ttl })
            .await;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<CacheLookup> {
        let entry = self.cache.get(&storage_key(key)).await;

        if let Some(metrics) = &self.metrics {
            if entry.is_some() {
                metrics.record_cache_hit();
            } else {
                metrics.record_cache_miss();
            }
        }

        Ok(match entry {
            Some(entry) => CacheLookup::Found(entry.fields),
            None => CacheLookup::NotFound,
        })
    }
}
