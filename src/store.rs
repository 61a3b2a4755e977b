//! Store contract
//!
//! The capability every backing store must expose, consumed polymorphically
//! by the cache orchestrator. Any store implementing [`CacheStore`]
//! (in-memory, networked key-value, or a decorating wrapper) plugs in
//! without orchestrator changes.

use std::fmt::Debug;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::CacheError;
use crate::time::now_millis;

/// The unit of storage: a value plus the time it was produced.
///
/// `age` is when the value was last produced, not when it was cached, so
/// freshness decisions survive copies between stores.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheRecord {
    pub value: Value,
    /// Milliseconds since the Unix epoch at production time.
    pub age: u64,
}

impl CacheRecord {
    /// Creates a record stamped with the current time.
    pub fn new<T: Serialize>(value: &T) -> Result<Self, CacheError> {
        Ok(Self {
            value: serde_json::to_value(value)?,
            age: now_millis(),
        })
    }

    /// Creates a record with a caller-supplied production time.
    pub fn with_age<T: Serialize>(value: &T, age: u64) -> Result<Self, CacheError> {
        Ok(Self {
            value: serde_json::to_value(value)?,
            age,
        })
    }

    /// Elapsed time since the value was produced.
    pub fn elapsed(&self) -> Duration {
        Duration::from_millis(now_millis().saturating_sub(self.age))
    }

    /// Whether the record is within the given freshness window.
    pub fn is_fresh(&self, fresh: Duration) -> bool {
        self.elapsed() < fresh
    }

    /// Decodes the stored value into a concrete type.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, CacheError> {
        serde_json::from_value(self.value.clone()).map_err(CacheError::from)
    }
}

/// Contract for cache backing stores.
///
/// Absence of an entry is `Ok(None)`; a present record whose value is JSON
/// null is still `Ok(Some(..))`. TTLs are handed through opaquely; expiry
/// enforcement is the store's responsibility.
#[async_trait]
pub trait CacheStore: Send + Sync + Debug {
    /// Identifies the store in logs and metrics.
    fn name(&self) -> &str;

    /// Reads the record for a key, if any.
    async fn get(&self, key: &str) -> Result<Option<CacheRecord>, CacheError>;

    /// Writes a record, expiring after `ttl` when given.
    async fn set(
        &self,
        key: &str,
        record: &CacheRecord,
        ttl: Option<Duration>,
    ) -> Result<(), CacheError>;

    /// Removes the record for a key. Removing an absent key is not an error.
    async fn delete(&self, key: &str) -> Result<(), CacheError>;

    /// Removes every record. Optional.
    async fn clear(&self) -> Result<(), CacheError> {
        Err(CacheError::store(format!(
            "store '{}' does not support clear",
            self.name()
        )))
    }

    /// Releases any underlying resources. Optional.
    async fn dispose(&self) -> Result<(), CacheError> {
        Ok(())
    }
}


#[cfg(test)]
mod tests {
    use super::mock::MockStore;
    use super::*;
    use serde_json::json;

    #[test]
    fn test_record_freshness() {
        let record = CacheRecord::new(&"value").unwrap();
        assert!(record.is_fresh(Duration::from_secs(30)));

        let old = CacheRecord {
            value: json!("value"),
            age: now_millis() - 3_600_000,
        };
        assert!(!old.is_fresh(Duration::from_secs(60)));
    }

    #[test]
    fn test_record_decode_round_trip() {
        let record = CacheRecord::new(&vec![1, 2, 3]).unwrap();
        let decoded: Vec<i32> = record.decode().unwrap();
        assert_eq!(decoded, vec![1, 2, 3]);
    }

    #[test]
    fn test_null_value_is_a_present_record() {
        let record = CacheRecord::new(&Value::Null).unwrap();
        assert_eq!(record.value, Value::Null);
    }

    #[tokio::test]
    async fn test_mock_store_set_get_delete() {
        let store = MockStore::default();
        let record = CacheRecord::new(&"value").unwrap();

        store.set("k", &record, None).await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), Some(record));

        store.delete("k").await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_mock_store_seeded_record() {
        let record = CacheRecord::new(&42).unwrap();
        let store = MockStore::default().with_record("k", record.clone());
        assert_eq!(store.get("k").await.unwrap(), Some(record));
    }

    #[tokio::test]
    async fn test_mock_store_with_error() {
        let store = MockStore::default().with_error("boom");
        assert!(store.get("k").await.is_err());
    }

    #[tokio::test]
    async fn test_default_clear_is_unsupported() {
        #[derive(Debug)]
        struct Bare;

        #[async_trait]
        impl CacheStore for Bare {
            fn name(&self) -> &str {
                "bare"
            }

            async fn get(&self, _key: &str) -> Result<Option<CacheRecord>, CacheError> {
                Ok(None)
            }

            async fn set(
                &self,
                _key: &str,
                _record: &CacheRecord,
                _ttl: Option<Duration>,
            ) -> Result<(), CacheError> {
                Ok(())
            }

            async fn delete(&self, _key: &str) -> Result<(), CacheError> {
                Ok(())
            }
        }

        assert!(Bare.clear().await.is_err());
        assert!(Bare.dispose().await.is_ok());
    }
}
