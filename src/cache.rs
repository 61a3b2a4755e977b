//! Cache orchestration
//!
//! The central read-through / stale-while-revalidate protocol: resolve the
//! store set (possibly asynchronously, once), probe stores in order for a
//! fresh record, serve stale records while revalidating in the background,
//! and guarantee at most one in-flight producer per key per orchestrator
//! instance.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::FutureExt;
use futures::future::{BoxFuture, Shared, join_all};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::OnceCell;

use crate::context::{Context, StatefulContext};
use crate::error::CacheError;
use crate::key::hash_key;
use crate::store::{CacheRecord, CacheStore};
use crate::time::now_millis;

/// Default freshness window: records younger than this are served without
/// revalidation.
pub const DEFAULT_FRESH: Duration = Duration::from_secs(30);

/// Default record expiry handed to stores.
pub const DEFAULT_TTL: Duration = Duration::from_secs(5 * 60);

type StoreSet = Vec<Arc<dyn CacheStore>>;
type StoreInit = Box<dyn FnOnce() -> BoxFuture<'static, Result<StoreSet, CacheError>> + Send>;
type Flight = Shared<BoxFuture<'static, Result<Value, CacheError>>>;

/// Construction options for [`Cache`].
///
/// Exactly one of `with_stores` / `with_stores_async` must be supplied.
pub struct CacheOptions {
    stores: Option<StoreSet>,
    get_stores_async: Option<StoreInit>,
    default_ttl: Duration,
    default_fresh: Duration,
    context: Option<Arc<dyn Context>>,
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self {
            stores: None,
            get_stores_async: None,
            default_ttl: DEFAULT_TTL,
            default_fresh: DEFAULT_FRESH,
            context: None,
        }
    }
}

impl CacheOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores to read from, first to last; writes fan out to all of them.
    pub fn with_stores(mut self, stores: Vec<Arc<dyn CacheStore>>) -> Self {
        self.stores = Some(stores);
        self
    }

    /// Asynchronous one-time store initializer, for environments that must
    /// load backends dynamically. Runs on first use; failure is logged and
    /// degrades the cache to always-miss.
    pub fn with_stores_async<F, Fut>(mut self, init: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<Vec<Arc<dyn CacheStore>>, CacheError>> + Send + 'static,
    {
        self.get_stores_async = Some(Box::new(move || init().boxed()));
        self
    }

    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = ttl;
        self
    }

    pub fn with_default_fresh(mut self, fresh: Duration) -> Self {
        self.default_fresh = fresh;
        self
    }

    pub fn with_context(mut self, context: Arc<dyn Context>) -> Self {
        self.context = Some(context);
        self
    }
}

/// Per-call options for [`Cache::cache_query`].
#[derive(Debug, Clone, Default)]
pub struct QueryOptions {
    /// Record expiry handed to stores. Falls back to the orchestrator
    /// default.
    pub ttl: Option<Duration>,
    /// Freshness window. Falls back to the orchestrator default.
    pub fresh: Option<Duration>,
    /// Extra namespace component prepended to the query key.
    pub cache_prefix: Option<String>,
}

impl QueryOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn with_fresh(mut self, fresh: Duration) -> Self {
        self.fresh = Some(fresh);
        self
    }

    pub fn with_cache_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.cache_prefix = Some(prefix.into());
        self
    }
}

struct CacheInner {
    stores: OnceCell<StoreSet>,
    store_init: Mutex<Option<StoreInit>>,
    in_flight: Mutex<HashMap<String, Flight>>,
    default_ttl: Duration,
    default_fresh: Duration,
    context: Arc<dyn Context>,
}

impl CacheInner {
    /// Resolves the store set, running the async initializer at most once.
    /// Initializer failure is swallowed into an empty store set.
    async fn stores(&self) -> &StoreSet {
        self.stores
            .get_or_init(|| async {
                let init = self.store_init.lock().unwrap().take();
                match init {
                    Some(init) => match init().await {
                        Ok(stores) => stores,
                        Err(error) => {
                            tracing::warn!(
                                %error,
                                "failed to initialize cache stores, continuing with none"
                            );
                            Vec::new()
                        }
                    },
                    None => Vec::new(),
                }
            })
            .await
    }
}

/// Stale-while-revalidate cache orchestrator over a set of stores.
///
/// Cheap to clone; clones share the same store set, in-flight map, and
/// context.
#[derive(Clone)]
pub struct Cache {
    inner: Arc<CacheInner>,
}

impl fmt::Debug for Cache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cache")
            .field("default_ttl", &self.inner.default_ttl)
            .field("default_fresh", &self.inner.default_fresh)
            .finish()
    }
}

impl Cache {
    pub fn new(options: CacheOptions) -> Result<Self, CacheError> {
        let CacheOptions {
            stores,
            get_stores_async,
            default_ttl,
            default_fresh,
            context,
        } = options;

        if stores.is_none() && get_stores_async.is_none() {
            return Err(CacheError::configuration("no stores provided"));
        }

        let context: Arc<dyn Context> =
            context.unwrap_or_else(|| Arc::new(StatefulContext::new()));

        Ok(Self {
            inner: Arc::new(CacheInner {
                stores: OnceCell::new_with(stores),
                store_init: Mutex::new(get_stores_async),
                in_flight: Mutex::new(HashMap::new()),
                default_ttl,
                default_fresh,
                context,
            }),
        })
    }

    /// The context deferred work is handed to.
    pub fn context(&self) -> Arc<dyn Context> {
        Arc::clone(&self.inner.context)
    }

    /// Awaits all deferred write-through and revalidation work.
    pub async fn flush(&self) {
        self.inner.context.flush().await;
    }

    /// Resolves a query through the cache.
    ///
    /// A fresh record is returned without invoking `query_fn`. A stale
    /// record is returned immediately while `query_fn` revalidates it in
    /// the background. On a miss, `query_fn` runs under single-flight
    /// deduplication and its result is written through to every store;
    /// its failure propagates to the caller.
    pub async fn cache_query<T, F, Fut>(
        &self,
        query_key: &[Value],
        query_fn: F,
        options: Option<QueryOptions>,
    ) -> Result<T, CacheError>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, CacheError>> + Send + 'static,
    {
        let options = options.unwrap_or_default();
        let key = full_key(query_key, &options);
        let fresh = options.fresh.unwrap_or(self.inner.default_fresh);
        let ttl = options.ttl.unwrap_or(self.inner.default_ttl);

        let stores = self.inner.stores().await;

        // Probe in list order. The first fresh record short-circuits;
        // otherwise the most recently produced stale record is the
        // candidate (freshest-wins).
        let mut candidate: Option<CacheRecord> = None;
        for store in stores {
            match store.get(&key).await {
                Ok(Some(record)) => {
                    if record.is_fresh(fresh) {
                        tracing::debug!(store = store.name(), key = %key, "fresh cache hit");
                        return record.decode();
                    }
                    if candidate.as_ref().is_none_or(|c| record.age > c.age) {
                        candidate = Some(record);
                    }
                }
                Ok(None) => {}
                Err(error) => {
                    tracing::warn!(
                        store = store.name(),
                        key = %key,
                        %error,
                        "cache store read failed"
                    );
                }
            }
        }

        let producer: BoxFuture<'static, Result<Value, CacheError>> = async move {
            let value = query_fn().await?;
            serde_json::to_value(value).map_err(CacheError::from)
        }
        .boxed();

        if let Some(record) = candidate {
            tracing::debug!(
                key = %key,
                age_ms = record.elapsed().as_millis() as u64,
                "serving stale value, revalidating in background"
            );
            self.revalidate_in_background(&key, producer, ttl);
            return record.decode();
        }

        let value = self.begin_flight(&key, producer, ttl).await?;
        serde_json::from_value(value).map_err(CacheError::from)
    }

    /// Writes a fully-formed record to every store, bypassing any producer.
    /// Used to seed or overwrite cache state. Per-store failures are logged
    /// and do not affect the other stores.
    pub async fn set_cache_data(
        &self,
        query_key: &[Value],
        record: CacheRecord,
        options: Option<QueryOptions>,
    ) {
        let options = options.unwrap_or_default();
        let key = full_key(query_key, &options);
        let ttl = options.ttl.unwrap_or(self.inner.default_ttl);
        let stores = self.inner.stores().await;
        write_all(stores, &key, &record, ttl).await;
    }

    /// Deletes the record for a key from every store, all-settle.
    pub async fn invalidate(&self, query_key: &[Value], options: Option<QueryOptions>) {
        let options = options.unwrap_or_default();
        let key = full_key(query_key, &options);
        let stores = self.inner.stores().await;

        let deletes = stores.iter().map(|store| {
            let store = Arc::clone(store);
            let key = key.clone();
            async move {
                if let Err(error) = store.delete(&key).await {
                    tracing::warn!(
                        store = store.name(),
                        key = %key,
                        %error,
                        "cache store delete failed"
                    );
                }
            }
        });
        join_all(deletes).await;
    }

    /// Disposes every store, tolerating individual failures.
    pub async fn dispose(&self) {
        let stores = self.inner.stores().await;

        let disposals = stores.iter().map(|store| {
            let store = Arc::clone(store);
            async move {
                if let Err(error) = store.dispose().await {
                    tracing::warn!(store = store.name(), %error, "cache store dispose failed");
                }
            }
        });
        join_all(disposals).await;
    }

    /// Joins the in-flight producer for `key`, or registers a new one.
    ///
    /// The entry is inserted synchronously, before any await point, so two
    /// concurrent callers can never both start a producer for the same key.
    /// The flight removes its own entry once the producer settles, success
    /// or failure, so a later call after a failure retries cleanly.
    fn begin_flight(
        &self,
        key: &str,
        producer: BoxFuture<'static, Result<Value, CacheError>>,
        ttl: Duration,
    ) -> Flight {
        let mut in_flight = self.inner.in_flight.lock().unwrap();
        if let Some(existing) = in_flight.get(key) {
            tracing::debug!(key = %key, "joining in-flight producer");
            return existing.clone();
        }

        let inner = Arc::clone(&self.inner);
        let owned_key = key.to_string();
        let flight: Flight = async move {
            let result = producer.await;

            if let Ok(value) = &result {
                let record = CacheRecord {
                    value: value.clone(),
                    age: now_millis(),
                };
                let stores = inner.stores().await.clone();
                let write_key = owned_key.clone();
                inner.context.wait_until(
                    async move { write_all(&stores, &write_key, &record, ttl).await }.boxed(),
                );
            }

            // always release the slot so a failed producer can be retried
            inner.in_flight.lock().unwrap().remove(&owned_key);
            result
        }
        .boxed()
        .shared();

        in_flight.insert(key.to_string(), flight.clone());
        drop(in_flight);

        // drive the flight to completion even if every caller abandons it
        tokio::spawn(flight.clone().map(|_| ()));

        flight
    }

    /// Revalidates a stale key exactly once; concurrent callers observe the
    /// same flight. Failures are logged, never propagated; the stale value
    /// already handed to the caller stands.
    fn revalidate_in_background(
        &self,
        key: &str,
        producer: BoxFuture<'static, Result<Value, CacheError>>,
        ttl: Duration,
    ) {
        let flight = self.begin_flight(key, producer, ttl);
        let owned_key = key.to_string();
        self.inner.context.wait_until(
            flight
                .map(move |result| {
                    if let Err(error) = result {
                        tracing::warn!(
                            key = %owned_key,
                            %error,
                            "background revalidation failed"
                        );
                    }
                })
                .boxed(),
        );
    }
}

fn full_key(query_key: &[Value], options: &QueryOptions) -> String {
    match &options.cache_prefix {
        Some(prefix) => {
            let mut components = Vec::with_capacity(query_key.len() + 1);
            components.push(Value::from(prefix.as_str()));
            components.extend_from_slice(query_key);
            hash_key(&components)
        }
        None => hash_key(query_key),
    }
}

/// Fans a record out to every store. One store's failure never blocks or
/// fails another's write.
async fn write_all(stores: &[Arc<dyn CacheStore>], key: &str, record: &CacheRecord, ttl: Duration) {
    let writes = stores.iter().map(|store| {
        let store = Arc::clone(store);
        let key = key.to_string();
        let record = record.clone();
        async move {
            if let Err(error) = store.set(&key, &record, Some(ttl)).await {
                tracing::warn!(
                    store = store.name(),
                    key = %key,
                    %error,
                    "cache store write failed"
                );
            }
        }
    });
    join_all(writes).await;
}
