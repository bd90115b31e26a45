//! Cache backend trait and statistics.

use std::time::Duration;

use async_trait::async_trait;
use vouch_core::VouchResult;

use super::key::CacheKey;

/// Byte-level key/value cache with per-entry expiry.
///
/// Backends store opaque payloads; serialization is the caller's concern
/// (see [`super::IdentityCache`]). Implementations must be safe to share
/// across tasks.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Get a live payload. Expired entries read as `None`.
    async fn get(&self, key: &CacheKey) -> VouchResult<Option<Vec<u8>>>;

    /// Store a payload, replacing any previous value for the key.
    async fn set(&self, key: &CacheKey, value: Vec<u8>, ttl: Duration) -> VouchResult<()>;

    /// Store many payloads with one shared TTL in a single round trip.
    ///
    /// Returns the number of entries written.
    async fn set_batch(&self, entries: Vec<(CacheKey, Vec<u8>)>, ttl: Duration)
        -> VouchResult<usize>;

    /// Get cache statistics.
    async fn stats(&self) -> VouchResult<CacheStats>;
}

/// Statistics about cache usage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of cache hits.
    pub hits: u64,
    /// Number of cache misses, expired reads included.
    pub misses: u64,
    /// Number of entries currently stored, live or expired.
    pub entry_count: u64,
    /// Number of reads that found an expired entry.
    pub expirations: u64,
    /// Number of entries written.
    pub writes: u64,
}

impl CacheStats {
    /// Calculate the hit rate (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}
