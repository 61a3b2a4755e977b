//! Metrics decorator store
//!
//! Wraps any store and emits read/write/delete counters and latency
//! histograms through the `metrics` facade, labelled with the inner
//! store's name.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use metrics::{counter, histogram};

use crate::error::CacheError;
use crate::store::{CacheRecord, CacheStore};

/// Store decorator that instruments every operation.
#[derive(Debug, Clone)]
pub struct MetricsStore {
    store: Arc<dyn CacheStore>,
}

impl MetricsStore {
    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl CacheStore for MetricsStore {
    fn name(&self) -> &str {
        self.store.name()
    }

    async fn get(&self, key: &str) -> Result<Option<CacheRecord>, CacheError> {
        let start = Instant::now();
        let result = self.store.get(key).await;
        let latency = start.elapsed();

        let hit = matches!(&result, Ok(Some(_)));
        counter!(
            "cache.read",
            "store" => self.store.name().to_string(),
            "hit" => if hit { "true" } else { "false" }
        )
        .increment(1);
        histogram!("cache.read.duration", "store" => self.store.name().to_string())
            .record(latency.as_secs_f64());

        result
    }

    async fn set(
        &self,
        key: &str,
        record: &CacheRecord,
        ttl: Option<Duration>,
    ) -> Result<(), CacheError> {
        let start = Instant::now();
        let result = self.store.set(key, record, ttl).await;
        let latency = start.elapsed();

        counter!("cache.write", "store" => self.store.name().to_string()).increment(1);
        histogram!("cache.write.duration", "store" => self.store.name().to_string())
            .record(latency.as_secs_f64());

        result
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        let start = Instant::now();
        let result = self.store.delete(key).await;
        let latency = start.elapsed();

        counter!("cache.delete", "store" => self.store.name().to_string()).increment(1);
        histogram!("cache.delete.duration", "store" => self.store.name().to_string())
            .record(latency.as_secs_f64());

        result
    }

    async fn clear(&self) -> Result<(), CacheError> {
        self.store.clear().await
    }

    async fn dispose(&self) -> Result<(), CacheError> {
        self.store.dispose().await
    }
}
