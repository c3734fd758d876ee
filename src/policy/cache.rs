//! Process-wide cache of tenant origin policies.
//!
//! Policies are loaded lazily from the document store and kept until an
//! explicit [`PolicyCache::invalidate`]. Stale reads between a policy write
//! and the next reset are an accepted trade-off favoring read latency.

use crate::policy::OriginPolicy;
use crate::store::Store;
use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use std::sync::Arc;
use tracing::{debug, warn};

/// Default number of (origin, application) entries kept in memory.
const DEFAULT_CACHE_CAPACITY: usize = 10_000;

type PolicyKey = (String, String);

/// Cache statistics for monitoring.
#[derive(Debug, Default, Clone)]
pub struct PolicyCacheStats {
    /// Number of cache hits.
    pub hits: u64,
    /// Number of cache misses.
    pub misses: u64,
    /// Number of policies loaded from the store.
    pub loads: u64,
    /// Number of explicit invalidations.
    pub invalidations: u64,
}

impl PolicyCacheStats {
    /// Calculate hit rate as a percentage.
    #[must_use]
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            (self.hits as f64 / total as f64) * 100.0
        }
    }
}

/// LRU cache of origin policies, keyed by (origin, application).
#[derive(Clone)]
pub struct PolicyCache {
    inner: Arc<Mutex<LruCache<PolicyKey, Arc<OriginPolicy>>>>,
    stats: Arc<Mutex<PolicyCacheStats>>,
    store: Arc<dyn Store>,
}

impl PolicyCache {
    /// Create a cache with default capacity over the given store.
    #[must_use]
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self::with_capacity(store, DEFAULT_CACHE_CAPACITY)
    }

    /// Create a cache with the specified capacity.
    #[must_use]
    pub fn with_capacity(store: Arc<dyn Store>, capacity: usize) -> Self {
        let cap = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: Arc::new(Mutex::new(LruCache::new(cap))),
            stats: Arc::new(Mutex::new(PolicyCacheStats::default())),
            store,
        }
    }

    /// Policy for the (origin, application) pair, loading it on a miss.
    ///
    /// Returns `None` when no policy exists or the store is unavailable;
    /// the latter is logged and never raised.
    pub async fn get(&self, origin: &str, application: &str) -> Option<Arc<OriginPolicy>> {
        let key = (origin.to_string(), application.to_string());

        if let Some(policy) = self.inner.lock().get(&key).cloned() {
            self.stats.lock().hits += 1;
            return Some(policy);
        }
        self.stats.lock().misses += 1;

        match self.store.policy(origin, application).await {
            Ok(Some(policy)) => {
                let policy = Arc::new(policy);
                self.inner.lock().put(key, policy.clone());
                let mut stats = self.stats.lock();
                stats.loads += 1;
                debug!(%origin, %application, "Origin policy loaded");
                Some(policy)
            }
            Ok(None) => {
                debug!(%origin, %application, "No origin policy configured");
                None
            }
            Err(e) => {
                warn!(%origin, %application, "Origin policy load failed: {e}");
                None
            }
        }
    }

    /// Drop every cached policy. The next read reloads from the store.
    pub fn invalidate(&self) {
        self.inner.lock().clear();
        self.stats.lock().invalidations += 1;
        debug!("Policy cache invalidated");
    }

    /// Get current cache statistics.
    #[must_use]
    pub fn stats(&self) -> PolicyCacheStats {
        self.stats.lock().clone()
    }

    /// Get the current number of cached policies.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    /// Check if the cache is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}
