//! memoquery
//!
//! Stale-while-revalidate cache orchestration over any number of
//! heterogeneous backing stores, with support for:
//! - Fresh/stale/miss decisions driven by record age, not store expiry
//! - Single-flight deduplication of producer invocations per key
//! - Background revalidation and write-through fan-out with
//!   partial-failure tolerance
//! - Deferred-work scheduling for serverless-style "run after response"
//! - Structural key hashing and memoized cached functions
//!
//! ```no_run
//! use std::sync::Arc;
//! use memoquery::{Cache, CacheOptions, MemoryStore};
//! use serde_json::json;
//!
//! # async fn example() -> Result<(), memoquery::CacheError> {
//! let cache = Cache::new(
//!     CacheOptions::new().with_stores(vec![Arc::new(MemoryStore::new())]),
//! )?;
//!
//! let user: String = cache
//!     .cache_query(
//!         &[json!("users"), json!({"id": 42})],
//!         || async { Ok("alice".to_string()) },
//!         None,
//!     )
//!     .await?;
//! # cache.flush().await;
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod cached;
pub mod context;
pub mod error;
pub mod key;
pub mod middleware;
pub mod store;
pub mod stores;
pub mod time;

pub use cache::{Cache, CacheOptions, DEFAULT_FRESH, DEFAULT_TTL, QueryOptions};
pub use cached::CachedFunction;
pub use context::{Context, StatefulContext};
pub use error::CacheError;
pub use key::{QueryKey, hash_key, hash_string};
pub use middleware::{EncryptedStore, MetricsStore};
pub use store::{CacheRecord, CacheStore};
pub use stores::{MemoryStore, MemoryStoreConfig, RedisStore, RedisStoreConfig};
