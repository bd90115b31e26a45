//! In-memory cache backend.
//!
//! Expiry uses `tokio::time::Instant`, so tests can drive TTLs with a paused
//! clock.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;
use vouch_core::{CacheError, VouchResult};

use super::key::CacheKey;
use super::traits::{CacheBackend, CacheStats};

#[derive(Debug)]
struct Entry {
    payload: Vec<u8>,
    expires_at: Instant,
}

#[derive(Debug, Default)]
struct Inner {
    entries: HashMap<String, Entry>,
    stats: CacheStats,
}

/// Process-local cache backend over a locked `HashMap`.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCacheBackend {
    inner: Arc<RwLock<Inner>>,
}

fn poisoned() -> CacheError {
    CacheError::Unavailable {
        reason: "cache lock poisoned".to_string(),
    }
}

impl InMemoryCacheBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries, expired ones included.
    pub fn len(&self) -> usize {
        self.inner.read().map(|i| i.entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Raw payload for a key regardless of expiry, without touching stats.
    pub fn peek(&self, key: &CacheKey) -> Option<Vec<u8>> {
        self.inner
            .read()
            .ok()
            .and_then(|i| i.entries.get(key.as_str()).map(|e| e.payload.clone()))
    }

    /// Overwrite a payload in place, keeping its expiry. Used to simulate
    /// corrupted entries.
    pub fn corrupt(&self, key: &CacheKey, payload: Vec<u8>) -> bool {
        match self.inner.write() {
            Ok(mut inner) => match inner.entries.get_mut(key.as_str()) {
                Some(entry) => {
                    entry.payload = payload;
                    true
                }
                None => false,
            },
            Err(_) => false,
        }
    }
}

#[async_trait]
impl CacheBackend for InMemoryCacheBackend {
    async fn get(&self, key: &CacheKey) -> VouchResult<Option<Vec<u8>>> {
        let mut inner = self.inner.write().map_err(|_| poisoned())?;
        let now = Instant::now();

        let lookup = inner
            .entries
            .get(key.as_str())
            .map(|e| (e.expires_at > now, e.payload.clone()));

        match lookup {
            Some((true, payload)) => {
                inner.stats.hits += 1;
                Ok(Some(payload))
            }
            Some((false, _)) => {
                inner.entries.remove(key.as_str());
                inner.stats.expirations += 1;
                inner.stats.misses += 1;
                Ok(None)
            }
            None => {
                inner.stats.misses += 1;
                Ok(None)
            }
        }
    }

    async fn set(&self, key: &CacheKey, value: Vec<u8>, ttl: Duration) -> VouchResult<()> {
        let mut inner = self.inner.write().map_err(|_| poisoned())?;
        inner.entries.insert(
            key.as_str().to_string(),
            Entry {
                payload: value,
                expires_at: Instant::now() + ttl,
            },
        );
        inner.stats.writes += 1;
        Ok(())
    }

    async fn set_batch(
        &self,
        entries: Vec<(CacheKey, Vec<u8>)>,
        ttl: Duration,
    ) -> VouchResult<usize> {
        let mut inner = self.inner.write().map_err(|_| poisoned())?;
        let expires_at = Instant::now() + ttl;
        let count = entries.len();
        for (key, payload) in entries {
            inner.entries.insert(
                key.as_str().to_string(),
                Entry {
                    payload,
                    expires_at,
                },
            );
        }
        inner.stats.writes += count as u64;
        Ok(count)
    }

    async fn stats(&self) -> VouchResult<CacheStats> {
        let inner = self.inner.read().map_err(|_| poisoned())?;
        Ok(CacheStats {
            entry_count: inner.entries.len() as u64,
            ..inner.stats.clone()
        })
    }
}
