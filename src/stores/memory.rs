//! In-memory store implementation using moka

use std::time::Duration;

use async_trait::async_trait;
use moka::future::Cache as MokaCache;

use crate::error::CacheError;
use crate::store::{CacheRecord, CacheStore};
use crate::time::now_millis;

/// Configuration for the in-memory store
#[derive(Debug, Clone)]
pub struct MemoryStoreConfig {
    /// Maximum number of entries
    pub max_capacity: u64,
    /// TTL applied to writes without an explicit TTL. Per-write TTLs take
    /// precedence in either direction.
    pub default_ttl: Duration,
}

impl Default for MemoryStoreConfig {
    fn default() -> Self {
        Self {
            max_capacity: 10_000,
            default_ttl: Duration::from_secs(3600), // 1 hour
        }
    }
}

impl MemoryStoreConfig {
    pub fn with_max_capacity(mut self, capacity: u64) -> Self {
        self.max_capacity = capacity;
        self
    }

    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = ttl;
        self
    }
}

/// Entry stored in moka
#[derive(Debug, Clone)]
struct StoredEntry {
    record: CacheRecord,
    /// Expiration timestamp (millis since epoch)
    expires_at: u64,
}

/// Thread-safe in-memory store backed by moka
///
/// Features:
/// - TTL support per entry
/// - LRU-like eviction when capacity is reached
/// - Concurrent access with good performance
#[derive(Debug)]
pub struct MemoryStore {
    cache: MokaCache<String, StoredEntry>,
    config: MemoryStoreConfig,
}

impl MemoryStore {
    /// Creates an in-memory store with default configuration
    pub fn new() -> Self {
        Self::with_config(MemoryStoreConfig::default())
    }

    /// Creates an in-memory store with the given configuration
    pub fn with_config(config: MemoryStoreConfig) -> Self {
        // per-write TTLs may exceed `default_ttl`, so expiry runs through the
        // per-entry `expires_at` check rather than a builder-level TTL
        let cache = MokaCache::builder().max_capacity(config.max_capacity).build();

        Self { cache, config }
    }

    fn is_expired(entry: &StoredEntry) -> bool {
        now_millis() > entry.expires_at
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn get(&self, key: &str) -> Result<Option<CacheRecord>, CacheError> {
        match self.cache.get(key).await {
            Some(entry) => {
                if Self::is_expired(&entry) {
                    self.cache.invalidate(key).await;
                    return Ok(None);
                }
                Ok(Some(entry.record))
            }
            None => Ok(None),
        }
    }

    async fn set(
        &self,
        key: &str,
        record: &CacheRecord,
        ttl: Option<Duration>,
    ) -> Result<(), CacheError> {
        let ttl = ttl.unwrap_or(self.config.default_ttl);
        let ttl_millis = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX);
        let entry = StoredEntry {
            record: record.clone(),
            expires_at: now_millis().saturating_add(ttl_millis),
        };

        self.cache.insert(key.to_string(), entry).await;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.cache.invalidate(key).await;
        Ok(())
    }

    async fn clear(&self) -> Result<(), CacheError> {
        self.cache.invalidate_all();
        Ok(())
    }

    async fn dispose(&self) -> Result<(), CacheError> {
        self.cache.invalidate_all();
        Ok(())
    }
}
