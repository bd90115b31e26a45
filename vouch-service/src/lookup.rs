//! Cache-aside identity lookup.
//!
//! Read path: cache first, store on miss, then populate the cache. The cache
//! is an accelerator only; any cache failure degrades to a store read and is
//! never returned to the caller.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use vouch_core::{IdentityRecord, VouchError, VouchResult};
use vouch_storage::{CacheBackend, IdentityCache, IdentityStore};

use crate::cancel::CancelSignal;

// ============================================================================
// METRICS
// ============================================================================

/// Counters for the lookup read path.
#[derive(Debug, Default)]
pub struct LookupMetrics {
    pub cache_hits: AtomicU64,
    /// Cache misses, including degraded reads.
    pub cache_misses: AtomicU64,
    /// Cache reads that failed or returned an undecodable payload.
    pub cache_read_errors: AtomicU64,
    pub store_reads: AtomicU64,
    pub cache_write_failures: AtomicU64,
    pub not_found: AtomicU64,
}

impl LookupMetrics {
    pub fn snapshot(&self) -> LookupSnapshot {
        LookupSnapshot {
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
            cache_read_errors: self.cache_read_errors.load(Ordering::Relaxed),
            store_reads: self.store_reads.load(Ordering::Relaxed),
            cache_write_failures: self.cache_write_failures.load(Ordering::Relaxed),
            not_found: self.not_found.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LookupSnapshot {
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub cache_read_errors: u64,
    pub store_reads: u64,
    pub cache_write_failures: u64,
    pub not_found: u64,
}

// ============================================================================
// SERVICE
// ============================================================================

/// Identity lookup by username over a store and an optional cache.
pub struct IdentityLookupService<S: IdentityStore, C: CacheBackend> {
    store: Arc<S>,
    cache: Option<IdentityCache<C>>,
    metrics: Arc<LookupMetrics>,
}

impl<S: IdentityStore, C: CacheBackend> Clone for IdentityLookupService<S, C> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            cache: self.cache.clone(),
            metrics: Arc::clone(&self.metrics),
        }
    }
}

impl<S: IdentityStore, C: CacheBackend> IdentityLookupService<S, C> {
    /// Lookup with cache-aside enabled.
    pub fn new(store: Arc<S>, cache: IdentityCache<C>) -> Self {
        Self::with_optional_cache(store, Some(cache))
    }

    /// Lookup straight against the store.
    pub fn uncached(store: Arc<S>) -> Self {
        Self::with_optional_cache(store, None)
    }

    /// `None` disables caching entirely: no reads, no writes.
    pub fn with_optional_cache(store: Arc<S>, cache: Option<IdentityCache<C>>) -> Self {
        Self {
            store,
            cache,
            metrics: Arc::new(LookupMetrics::default()),
        }
    }

    pub fn cache_enabled(&self) -> bool {
        self.cache.is_some()
    }

    pub fn metrics(&self) -> &Arc<LookupMetrics> {
        &self.metrics
    }

    /// Resolve `username` to its identity record.
    ///
    /// Returns [`VouchError::NotFound`] when the store has no such user.
    /// Store errors propagate; cache errors never do.
    pub async fn lookup(&self, username: &str) -> VouchResult<IdentityRecord> {
        if let Some(cache) = &self.cache {
            if let Some(record) = self.read_cache(cache, username).await {
                return Ok(record);
            }
        }

        self.metrics.store_reads.fetch_add(1, Ordering::Relaxed);
        let Some(record) = self.store.get_by_username(username).await? else {
            self.metrics.not_found.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(username, "Identity not found");
            return Err(VouchError::NotFound {
                username: username.to_string(),
            });
        };

        if let Some(cache) = &self.cache {
            if let Err(e) = cache.put(&record).await {
                self.metrics
                    .cache_write_failures
                    .fetch_add(1, Ordering::Relaxed);
                tracing::warn!(username, error = %e, "Failed to populate cache after store read");
            }
        }

        Ok(record)
    }

    /// [`Self::lookup`], abandoned with [`VouchError::Cancelled`] if `cancel`
    /// fires first.
    pub async fn lookup_with_cancel(
        &self,
        username: &str,
        cancel: &CancelSignal,
    ) -> VouchResult<IdentityRecord> {
        cancel.run(self.lookup(username)).await
    }

    async fn read_cache(&self, cache: &IdentityCache<C>, username: &str) -> Option<IdentityRecord> {
        match cache.get(username).await {
            Ok(Some(record)) => {
                self.metrics.cache_hits.fetch_add(1, Ordering::Relaxed);
                tracing::trace!(username, "Cache hit");
                Some(record)
            }
            Ok(None) => {
                self.metrics.cache_misses.fetch_add(1, Ordering::Relaxed);
                None
            }
            Err(e) => {
                self.metrics.cache_misses.fetch_add(1, Ordering::Relaxed);
                self.metrics.cache_read_errors.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(username, error = %e, "Cache read failed, falling back to store");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vouch_core::NewIdentity;
    use vouch_storage::{CacheConfig, InMemoryCacheBackend, InMemoryIdentityStore};

    async fn seeded_store() -> Arc<InMemoryIdentityStore> {
        let store = Arc::new(InMemoryIdentityStore::new());
        store
            .bulk_insert(&[NewIdentity::new("alice@example.com", "h".into())])
            .await
            .expect("seed");
        store
    }

    #[tokio::test]
    async fn test_second_lookup_is_served_from_cache() {
        let store = seeded_store().await;
        let backend = Arc::new(InMemoryCacheBackend::new());
        let service = IdentityLookupService::new(
            Arc::clone(&store),
            IdentityCache::new(Arc::clone(&backend), CacheConfig::default()),
        );

        let first = service.lookup("alice@example.com").await.expect("first");
        let second = service.lookup("alice@example.com").await.expect("second");
        assert_eq!(first, second);

        let snap = service.metrics().snapshot();
        assert_eq!(snap.store_reads, 1);
        assert_eq!(snap.cache_hits, 1);
        assert_eq!(snap.cache_misses, 1);
    }

    #[tokio::test]
    async fn test_unknown_user_is_not_found_and_not_cached() {
        let store = seeded_store().await;
        let backend = Arc::new(InMemoryCacheBackend::new());
        let service = IdentityLookupService::new(
            store,
            IdentityCache::new(Arc::clone(&backend), CacheConfig::default()),
        );

        let err = service.lookup("ghost@example.com").await.unwrap_err();
        assert!(err.is_not_found());
        assert!(backend.is_empty());
    }

    #[tokio::test]
    async fn test_uncached_service_always_reads_store() {
        let store = seeded_store().await;
        let service: IdentityLookupService<_, InMemoryCacheBackend> =
            IdentityLookupService::uncached(store);
        assert!(!service.cache_enabled());

        for _ in 0..3 {
            service.lookup("alice@example.com").await.expect("lookup");
        }
        assert_eq!(service.metrics().snapshot().store_reads, 3);
    }
}
