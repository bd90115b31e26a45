//! Typed identity cache over a byte-level backend.
//!
//! Owns the key namespace, the TTL and the JSON payload format so the lookup
//! service and the precache worker always agree on both.

use std::sync::Arc;
use std::time::Duration;

use vouch_core::{CacheError, CacheSettings, IdentityRecord, VouchResult};

use super::key::CacheKey;
use super::traits::{CacheBackend, CacheStats};

/// Configuration for the identity cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    /// Key namespace prepended to every username.
    pub prefix: String,
    /// TTL for cached entries.
    pub entry_ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self::from(&CacheSettings::default())
    }
}

impl From<&CacheSettings> for CacheConfig {
    fn from(settings: &CacheSettings) -> Self {
        Self {
            prefix: settings.prefix.clone(),
            entry_ttl: settings.ttl,
        }
    }
}

impl CacheConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the key namespace.
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Set the entry TTL.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.entry_ttl = ttl;
        self
    }
}

/// Outcome of a bulk cache population.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchPut {
    /// Entries handed to the backend.
    pub cached: usize,
    /// Records dropped because they failed to serialize.
    pub skipped: usize,
}

/// Identity records keyed by username, stored as JSON.
pub struct IdentityCache<C: CacheBackend> {
    backend: Arc<C>,
    config: CacheConfig,
}

impl<C: CacheBackend> Clone for IdentityCache<C> {
    fn clone(&self) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
            config: self.config.clone(),
        }
    }
}

impl<C: CacheBackend> IdentityCache<C> {
    pub fn new(backend: Arc<C>, config: CacheConfig) -> Self {
        Self { backend, config }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn backend(&self) -> &Arc<C> {
        &self.backend
    }

    pub fn key_for(&self, username: &str) -> CacheKey {
        CacheKey::new(&self.config.prefix, username)
    }

    /// Read a cached record.
    ///
    /// A payload that does not decode as an [`IdentityRecord`] is reported as
    /// [`CacheError::Deserialization`]; callers decide whether that is a miss.
    pub async fn get(&self, username: &str) -> VouchResult<Option<IdentityRecord>> {
        let key = self.key_for(username);
        let Some(bytes) = self.backend.get(&key).await? else {
            return Ok(None);
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| {
                CacheError::Deserialization {
                    key: key.to_string(),
                    reason: e.to_string(),
                }
                .into()
            })
    }

    /// Write one record with the configured TTL.
    pub async fn put(&self, record: &IdentityRecord) -> VouchResult<()> {
        let payload = serde_json::to_vec(record).map_err(|e| CacheError::Serialization {
            reason: e.to_string(),
        })?;
        self.backend
            .set(&self.key_for(&record.username), payload, self.config.entry_ttl)
            .await
    }

    /// Write a page of records in one backend call.
    ///
    /// Records that fail to serialize are logged and skipped; the rest of the
    /// page is still written.
    pub async fn put_batch(&self, records: &[IdentityRecord]) -> VouchResult<BatchPut> {
        let mut entries = Vec::with_capacity(records.len());
        let mut skipped = 0;

        for record in records {
            match serde_json::to_vec(record) {
                Ok(payload) => entries.push((self.key_for(&record.username), payload)),
                Err(e) => {
                    skipped += 1;
                    tracing::warn!(
                        id = record.id,
                        username = %record.username,
                        error = %e,
                        "Skipping identity that failed to serialize"
                    );
                }
            }
        }

        let cached = if entries.is_empty() {
            0
        } else {
            self.backend
                .set_batch(entries, self.config.entry_ttl)
                .await?
        };

        Ok(BatchPut { cached, skipped })
    }

    pub async fn stats(&self) -> VouchResult<CacheStats> {
        self.backend.stats().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::InMemoryCacheBackend;
    use chrono::Utc;
    use vouch_core::{CredentialHash, VouchError};

    fn record(id: i64, username: &str) -> IdentityRecord {
        IdentityRecord {
            id,
            username: username.to_string(),
            credential_hash: CredentialHash::from("$argon2id$v=19$stub"),
            created_at: Utc::now(),
        }
    }

    fn cache() -> (IdentityCache<InMemoryCacheBackend>, Arc<InMemoryCacheBackend>) {
        let backend = Arc::new(InMemoryCacheBackend::new());
        let cache = IdentityCache::new(Arc::clone(&backend), CacheConfig::default());
        (cache, backend)
    }

    #[tokio::test]
    async fn test_put_then_get_returns_identical_record() {
        let (cache, backend) = cache();
        let alice = record(1, "alice@example.com");
        cache.put(&alice).await.expect("put");

        assert!(backend
            .peek(&CacheKey::new("auth:", "alice@example.com"))
            .is_some());
        assert_eq!(cache.get("alice@example.com").await.expect("get"), Some(alice));
    }

    #[tokio::test]
    async fn test_malformed_payload_is_deserialization_error() {
        let (cache, backend) = cache();
        cache.put(&record(1, "bob")).await.expect("put");
        assert!(backend.corrupt(&cache.key_for("bob"), b"not json".to_vec()));

        let err = cache.get("bob").await.unwrap_err();
        assert!(matches!(
            err,
            VouchError::Cache(CacheError::Deserialization { ref key, .. }) if key == "auth:bob"
        ));
    }

    #[tokio::test]
    async fn test_put_batch_writes_page() {
        let (cache, backend) = cache();
        let page: Vec<_> = (1..=3).map(|i| record(i, &format!("u{i}"))).collect();

        let outcome = cache.put_batch(&page).await.expect("batch");
        assert_eq!(outcome, BatchPut { cached: 3, skipped: 0 });
        assert_eq!(backend.len(), 3);
        assert_eq!(cache.stats().await.expect("stats").writes, 3);
    }

    #[tokio::test]
    async fn test_put_batch_empty_page_skips_backend() {
        let (cache, backend) = cache();
        assert_eq!(cache.put_batch(&[]).await.expect("batch"), BatchPut::default());
        assert_eq!(backend.stats().await.expect("stats").writes, 0);
    }

    #[test]
    fn test_config_from_settings() {
        let settings = CacheSettings::default()
            .with_prefix("id:")
            .with_ttl(Duration::from_secs(5));
        let config = CacheConfig::from(&settings);
        assert_eq!(config, CacheConfig::new().with_prefix("id:").with_ttl(Duration::from_secs(5)));
    }
}
