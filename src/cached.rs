//! Function memoization on top of the cache orchestrator.
//!
//! Wraps a producer function so that calls with structurally equal
//! arguments share one cache entry. Each function gets its own namespace
//! prefix derived from an explicit, stable identifier (Rust has no runtime
//! source text to hash), so two functions never collide on a keyspace even
//! when their argument values coincide.

use std::future::Future;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;
use once_cell::sync::OnceCell;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::cache::{Cache, QueryOptions};
use crate::error::CacheError;
use crate::key::hash_string;

type QueryFn<A, T> = Arc<dyn Fn(A) -> BoxFuture<'static, Result<T, CacheError>> + Send + Sync>;

/// A memoized producer function bound to a [`Cache`].
///
/// Built with [`Cache::cached_function`]. Cloning is cheap; clones share
/// the underlying function and the memoized prefix.
pub struct CachedFunction<A, T> {
    cache: Cache,
    ident: String,
    query_fn: QueryFn<A, T>,
    options: QueryOptions,
    prefix: OnceCell<String>,
}

impl Cache {
    /// Wraps `query_fn` so repeated calls with structurally equal arguments
    /// resolve through the cache.
    ///
    /// `ident` is the stable identity seed for the namespace prefix; use
    /// the function's name. Two wrappers built with the same identifier
    /// share a keyspace, different identifiers practically never collide.
    pub fn cached_function<F, Fut, A, T>(
        &self,
        ident: impl Into<String>,
        query_fn: F,
        options: Option<QueryOptions>,
    ) -> CachedFunction<A, T>
    where
        F: Fn(A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, CacheError>> + Send + 'static,
        A: Serialize + Send + 'static,
        T: Serialize + DeserializeOwned + Send + 'static,
    {
        CachedFunction {
            cache: self.clone(),
            ident: ident.into(),
            query_fn: Arc::new(move |args| query_fn(args).boxed()),
            options: options.unwrap_or_default(),
            prefix: OnceCell::new(),
        }
    }
}

impl<A, T> CachedFunction<A, T>
where
    A: Serialize + Send + 'static,
    T: Serialize + DeserializeOwned + Send + 'static,
{
    /// Resolves a call through the cache, invoking the wrapped function
    /// only on a miss or for background revalidation.
    pub async fn call(&self, args: A) -> Result<T, CacheError> {
        let key = self.query_key(&args)?;
        let query_fn = Arc::clone(&self.query_fn);

        let mut options = self.options.clone();
        // the prefix is already the first key component
        options.cache_prefix = None;

        self.cache
            .cache_query(&key, move || query_fn(args), Some(options))
            .await
    }

    /// Removes the cache entry for these arguments from every store.
    pub async fn invalidate(&self, args: &A) -> Result<(), CacheError> {
        let key = self.query_key(args)?;
        self.cache.invalidate(&key, None).await;
        Ok(())
    }

    /// The namespace prefix, derived once on first use and memoized for
    /// the wrapper's lifetime.
    pub fn cache_prefix(&self) -> &str {
        self.prefix.get_or_init(|| match &self.options.cache_prefix {
            Some(prefix) => prefix.clone(),
            None => format!("{}/{}", self.ident, hash_string(&self.ident)),
        })
    }

    fn query_key(&self, args: &A) -> Result<Vec<Value>, CacheError> {
        Ok(vec![
            Value::from(self.cache_prefix()),
            serde_json::to_value(args)?,
        ])
    }
}

impl<A, T> Clone for CachedFunction<A, T> {
    fn clone(&self) -> Self {
        Self {
            cache: self.cache.clone(),
            ident: self.ident.clone(),
            query_fn: Arc::clone(&self.query_fn),
            options: self.options.clone(),
            prefix: self.prefix.clone(),
        }
    }
}

impl<A, T> std::fmt::Debug for CachedFunction<A, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachedFunction")
            .field("ident", &self.ident)
            .field("prefix", &self.prefix.get())
            .finish()
    }
}
