//! Redis store implementation

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};

use crate::error::CacheError;
use crate::store::{CacheRecord, CacheStore};

/// Configuration for the Redis store
#[derive(Debug, Clone)]
pub struct RedisStoreConfig {
    /// Redis connection URL (e.g., "redis://127.0.0.1:6379")
    pub url: String,
    /// Key prefix for namespacing
    pub key_prefix: Option<String>,
}

impl Default for RedisStoreConfig {
    fn default() -> Self {
        Self {
            url: "redis://127.0.0.1:6379".to_string(),
            key_prefix: None,
        }
    }
}

impl RedisStoreConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = Some(prefix.into());
        self
    }
}

/// Redis-backed store
///
/// Records are stored as JSON strings; expiry is enforced by Redis via
/// `PX`. Writes without a TTL persist until overwritten or deleted.
#[derive(Clone)]
pub struct RedisStore {
    connection: ConnectionManager,
    config: RedisStoreConfig,
}

impl fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisStore")
            .field("config", &self.config)
            .field("connection", &"<ConnectionManager>")
            .finish()
    }
}

impl RedisStore {
    /// Connects to Redis with the given configuration
    pub async fn new(config: RedisStoreConfig) -> Result<Self, CacheError> {
        let client = Client::open(config.url.as_str())
            .map_err(|e| CacheError::store(format!("Failed to create Redis client: {}", e)))?;

        let connection = ConnectionManager::new(client)
            .await
            .map_err(|e| CacheError::store(format!("Failed to connect to Redis: {}", e)))?;

        Ok(Self { connection, config })
    }

    /// Connects with default configuration and the given URL
    pub async fn with_url(url: impl Into<String>) -> Result<Self, CacheError> {
        Self::new(RedisStoreConfig::new(url)).await
    }

    fn prefix_key(&self, key: &str) -> String {
        match &self.config.key_prefix {
            Some(prefix) => format!("{}:{}", prefix, key),
            None => key.to_string(),
        }
    }
}

#[async_trait]
impl CacheStore for RedisStore {
    fn name(&self) -> &str {
        "redis"
    }

    async fn get(&self, key: &str) -> Result<Option<CacheRecord>, CacheError> {
        let prefixed_key = self.prefix_key(key);
        let mut conn = self.connection.clone();

        let payload: Option<String> = conn.get(&prefixed_key).await.map_err(|e| {
            CacheError::store(format!("Failed to get key '{}': {}", key, e))
        })?;

        match payload {
            Some(payload) => {
                let record: CacheRecord = serde_json::from_str(&payload).map_err(|e| {
                    CacheError::store(format!(
                        "Failed to deserialize record for key '{}': {}",
                        key, e
                    ))
                })?;
                Ok(Some(record))
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
        let prefixed_key = self.prefix_key(key);
        let mut conn = self.connection.clone();

        let payload = serde_json::to_string(record).map_err(|e| {
            CacheError::store(format!("Failed to serialize record for key '{}': {}", key, e))
        })?;

        match ttl {
            Some(ttl) => {
                let ttl_millis = (ttl.as_millis() as u64).max(1);
                conn.pset_ex::<_, _, ()>(&prefixed_key, payload, ttl_millis)
                    .await
                    .map_err(|e| {
                        CacheError::store(format!("Failed to set key '{}': {}", key, e))
                    })?;
            }
            None => {
                conn.set::<_, _, ()>(&prefixed_key, payload).await.map_err(|e| {
                    CacheError::store(format!("Failed to set key '{}': {}", key, e))
                })?;
            }
        }

        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        let prefixed_key = self.prefix_key(key);
        let mut conn = self.connection.clone();

        conn.del::<_, ()>(&prefixed_key).await.map_err(|e| {
            CacheError::store(format!("Failed to delete key '{}': {}", key, e))
        })?;

        Ok(())
    }

    async fn clear(&self) -> Result<(), CacheError> {
        let mut conn = self.connection.clone();

        match &self.config.key_prefix {
            // with a prefix, scan and delete only our keys
            Some(_) => {
                let pattern = self.prefix_key("*");
                let mut cursor = 0u64;

                loop {
                    let (new_cursor, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                        .arg(cursor)
                        .arg("MATCH")
                        .arg(&pattern)
                        .arg("COUNT")
                        .arg(100)
                        .query_async(&mut conn)
                        .await
                        .map_err(|e| {
                            CacheError::store(format!("Failed to scan keys: {}", e))
                        })?;

                    if !keys.is_empty() {
                        conn.del::<_, ()>(keys).await.map_err(|e| {
                            CacheError::store(format!("Failed to delete keys: {}", e))
                        })?;
                    }

                    cursor = new_cursor;
                    if cursor == 0 {
                        break;
                    }
                }
            }
            // without one, flush the entire database (use with caution!)
            None => {
                redis::cmd("FLUSHDB")
                    .query_async::<()>(&mut conn)
                    .await
                    .map_err(|e| {
                        CacheError::store(format!("Failed to flush database: {}", e))
                    })?;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = RedisStoreConfig::default();
        assert_eq!(config.url, "redis://127.0.0.1:6379");
        assert!(config.key_prefix.is_none());
    }

    #[test]
    fn test_config_builders() {
        let config = RedisStoreConfig::new("redis://cache:6380").with_key_prefix("app");
        assert_eq!(config.url, "redis://cache:6380");
        assert_eq!(config.key_prefix.as_deref(), Some("app"));
    }
}
