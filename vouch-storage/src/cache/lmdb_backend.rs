//! LMDB-backed cache implementation.
//!
//! Uses the heed crate (Rust bindings for LMDB) to provide a memory-mapped
//! key-value store that survives process restarts, so a warm cache is still
//! warm after the precache worker is redeployed.
//!
//! # Value Format
//!
//! `[expires_at: 8 bytes, i64 unix millis LE][payload]`
//!
//! Expired entries read as misses and are removed by [`LmdbCacheBackend::purge_expired`].
//!
//! # Thread Safety
//!
//! LMDB provides ACID transactions. The backend uses:
//! - Read transactions for `get` and `stats`
//! - One write transaction per `set` and per `set_batch`
//! - Statistics behind an `RwLock`

use std::path::Path;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use heed::types::Bytes;
use heed::{Database, Env, EnvOpenOptions};
use vouch_core::{CacheError, VouchError, VouchResult};

use super::key::CacheKey;
use super::traits::{CacheBackend, CacheStats};

const HEADER_LEN: usize = 8;

/// Error type for LMDB cache operations.
#[derive(Debug, thiserror::Error)]
pub enum LmdbCacheError {
    /// Failed to open or create the LMDB environment.
    #[error("Failed to open LMDB environment: {0}")]
    EnvOpen(String),

    /// Failed to open the database within the environment.
    #[error("Failed to open database: {0}")]
    DbOpen(String),

    /// Transaction error.
    #[error("Transaction error: {0}")]
    Transaction(String),

    /// Stored value is shorter than its header.
    #[error("Corrupt entry for {0}")]
    Corrupt(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<LmdbCacheError> for VouchError {
    fn from(e: LmdbCacheError) -> Self {
        match e {
            LmdbCacheError::Corrupt(key) => VouchError::Cache(CacheError::Deserialization {
                key,
                reason: "entry shorter than expiry header".to_string(),
            }),
            other => VouchError::Cache(CacheError::Unavailable {
                reason: other.to_string(),
            }),
        }
    }
}

fn txn_err(e: heed::Error) -> LmdbCacheError {
    LmdbCacheError::Transaction(e.to_string())
}

fn expiry_millis(ttl: Duration) -> i64 {
    let ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
    Utc::now().timestamp_millis().saturating_add(ttl_ms)
}

fn encode_value(expires_at: i64, payload: &[u8]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(HEADER_LEN + payload.len());
    bytes.extend_from_slice(&expires_at.to_le_bytes());
    bytes.extend_from_slice(payload);
    bytes
}

fn decode_expiry(bytes: &[u8]) -> Option<i64> {
    let header: [u8; HEADER_LEN] = bytes.get(..HEADER_LEN)?.try_into().ok()?;
    Some(i64::from_le_bytes(header))
}

/// LMDB-backed cache backend.
///
/// # Example
///
/// ```ignore
/// use vouch_storage::cache::{CacheKey, LmdbCacheBackend};
///
/// let backend = LmdbCacheBackend::new("./data/cache", 512)?;
/// let key = CacheKey::new("auth:", "00000001@example.com");
/// backend.set(&key, payload, Duration::from_secs(3600)).await?;
/// ```
pub struct LmdbCacheBackend {
    env: Env,
    db: Database<Bytes, Bytes>,
    stats: Arc<RwLock<CacheStats>>,
}

impl LmdbCacheBackend {
    /// Open (or create) an LMDB cache at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The directory cannot be created
    /// - LMDB environment cannot be opened
    /// - Database cannot be created
    pub fn new<P: AsRef<Path>>(path: P, max_size_mb: usize) -> Result<Self, LmdbCacheError> {
        std::fs::create_dir_all(&path)?;

        // SAFETY: the environment directory is owned by this process; the
        // same path must not be opened twice within one process.
        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(max_size_mb * 1024 * 1024)
                .max_dbs(1)
                .open(path.as_ref())
        }
        .map_err(|e| LmdbCacheError::EnvOpen(e.to_string()))?;

        let mut wtxn = env.write_txn().map_err(txn_err)?;
        let db: Database<Bytes, Bytes> = env
            .create_database(&mut wtxn, None)
            .map_err(|e| LmdbCacheError::DbOpen(e.to_string()))?;
        wtxn.commit().map_err(txn_err)?;

        Ok(Self {
            env,
            db,
            stats: Arc::new(RwLock::new(CacheStats::default())),
        })
    }

    fn record(&self, update: impl FnOnce(&mut CacheStats)) {
        if let Ok(mut stats) = self.stats.write() {
            update(&mut stats);
        }
    }

    /// Delete every expired entry. Returns the number removed.
    pub fn purge_expired(&self) -> Result<u64, LmdbCacheError> {
        let now = Utc::now().timestamp_millis();

        let expired: Vec<Vec<u8>> = {
            let rtxn = self.env.read_txn().map_err(txn_err)?;
            let iter = self.db.iter(&rtxn).map_err(txn_err)?;
            iter.filter_map(Result::ok)
                .filter(|(_, value)| decode_expiry(value).map_or(true, |exp| exp <= now))
                .map(|(key, _)| key.to_vec())
                .collect()
        };

        let mut wtxn = self.env.write_txn().map_err(txn_err)?;
        let mut deleted = 0u64;
        for key in &expired {
            if self.db.delete(&mut wtxn, key).map_err(txn_err)? {
                deleted += 1;
            }
        }
        wtxn.commit().map_err(txn_err)?;

        Ok(deleted)
    }
}

#[async_trait]
impl CacheBackend for LmdbCacheBackend {
    async fn get(&self, key: &CacheKey) -> VouchResult<Option<Vec<u8>>> {
        let rtxn = self.env.read_txn().map_err(txn_err)?;

        let bytes = match self.db.get(&rtxn, key.encode()) {
            Ok(Some(bytes)) => bytes,
            Ok(None) => {
                self.record(|s| s.misses += 1);
                return Ok(None);
            }
            Err(e) => {
                self.record(|s| s.misses += 1);
                return Err(txn_err(e).into());
            }
        };

        let Some(expires_at) = decode_expiry(bytes) else {
            self.record(|s| s.misses += 1);
            return Err(LmdbCacheError::Corrupt(key.to_string()).into());
        };

        if expires_at <= Utc::now().timestamp_millis() {
            self.record(|s| {
                s.misses += 1;
                s.expirations += 1;
            });
            return Ok(None);
        }

        self.record(|s| s.hits += 1);
        Ok(Some(bytes[HEADER_LEN..].to_vec()))
    }

    async fn set(&self, key: &CacheKey, value: Vec<u8>, ttl: Duration) -> VouchResult<()> {
        let full_bytes = encode_value(expiry_millis(ttl), &value);

        let mut wtxn = self.env.write_txn().map_err(txn_err)?;
        self.db
            .put(&mut wtxn, key.encode(), &full_bytes)
            .map_err(|e| CacheError::WriteFailed {
                entries: 1,
                reason: e.to_string(),
            })?;
        wtxn.commit().map_err(txn_err)?;

        self.record(|s| s.writes += 1);
        Ok(())
    }

    async fn set_batch(
        &self,
        entries: Vec<(CacheKey, Vec<u8>)>,
        ttl: Duration,
    ) -> VouchResult<usize> {
        if entries.is_empty() {
            return Ok(0);
        }
        let expires_at = expiry_millis(ttl);
        let count = entries.len();

        let mut wtxn = self.env.write_txn().map_err(txn_err)?;
        for (key, payload) in &entries {
            let full_bytes = encode_value(expires_at, payload);
            self.db
                .put(&mut wtxn, key.encode(), &full_bytes)
                .map_err(|e| CacheError::WriteFailed {
                    entries: count,
                    reason: e.to_string(),
                })?;
        }
        wtxn.commit().map_err(|e| CacheError::WriteFailed {
            entries: count,
            reason: e.to_string(),
        })?;

        self.record(|s| s.writes += count as u64);
        Ok(count)
    }

    async fn stats(&self) -> VouchResult<CacheStats> {
        let rtxn = self.env.read_txn().map_err(txn_err)?;
        let entry_count = self.db.len(&rtxn).map_err(txn_err)?;
        let mut stats = self.stats.read().map(|s| s.clone()).unwrap_or_default();
        stats.entry_count = entry_count;
        Ok(stats)
    }
}
