//! Time-bounded response cache shared by the upstream clients

use cached::{Cached, TimedCache};
use std::fmt::Debug;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// Cloneable handle to a TTL cache; clones share entries
pub struct TtlCache<K, V> {
    inner: Arc<Mutex<TimedCache<K, V>>>,
}

impl<K, V> Clone for TtlCache<K, V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<K, V> TtlCache<K, V>
where
    K: Hash + Eq + Clone + Debug,
    V: Clone,
{
    pub fn new(ttl: Duration) -> Self {
        Self {
            inner: Arc::new(Mutex::new(TimedCache::with_lifespan(ttl))),
        }
    }

    /// Live entry for `key`; expired entries are evicted on lookup
    pub async fn get(&self, key: &K) -> Option<V> {
        self.inner.lock().await.cache_get(key).cloned()
    }

    pub async fn insert(&self, key: K, value: V) {
        self.inner.lock().await.cache_set(key, value);
    }

    /// Cached value for `key`, or the result of `load` which is then stored
    ///
    /// A failed load leaves the cache untouched. The lock is not held while
    /// loading, so concurrent misses may both hit upstream.
    pub async fn get_or_load<F, Fut, E>(&self, key: K, load: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        if let Some(hit) = self.get(&key).await {
            tracing::debug!(?key, "cache hit");
            return Ok(hit);
        }

        tracing::debug!(?key, "cache miss");
        let value = load().await?;
        self.insert(key, value.clone()).await;
        Ok(value)
    }

    pub async fn clear(&self) {
        self.inner.lock().await.cache_clear();
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.cache_size()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
