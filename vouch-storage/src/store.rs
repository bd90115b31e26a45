//! Identity store trait and in-memory implementation.
//!
//! The durable store is the source of truth. PostgreSQL lives in
//! `vouch-service::db`; [`InMemoryIdentityStore`] backs tests and local runs.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::Utc;
use vouch_core::{
    parse_sequence, IdentityRecord, NewIdentity, RecordId, StorageError, VouchResult,
};

/// Async accessor for the durable identity store.
///
/// Identifiers are assigned by the store, strictly increasing and never
/// reused. Every method is safe to call concurrently.
#[async_trait]
pub trait IdentityStore: Send + Sync {
    /// Exact-match lookup by username.
    async fn get_by_username(&self, username: &str) -> VouchResult<Option<IdentityRecord>>;

    /// Up to `limit` records with `id > after_id`, ascending by id.
    async fn scan_page(&self, after_id: RecordId, limit: usize)
        -> VouchResult<Vec<IdentityRecord>>;

    /// Insert all identities in one transaction.
    ///
    /// Either every row is committed or none is. Returns the number of rows
    /// inserted.
    async fn bulk_insert(&self, identities: &[NewIdentity]) -> VouchResult<u64>;

    /// Largest numeric username prefix present, or 0 when there is none.
    async fn max_sequence_value(&self) -> VouchResult<u64>;
}

// ============================================================================
// IN-MEMORY STORE
// ============================================================================

#[derive(Debug, Default)]
struct StoreInner {
    rows: BTreeMap<RecordId, IdentityRecord>,
    by_username: HashMap<String, RecordId>,
    last_id: RecordId,
}

/// In-memory identity store for tests and local development.
#[derive(Debug, Clone, Default)]
pub struct InMemoryIdentityStore {
    inner: Arc<RwLock<StoreInner>>,
}

impl InMemoryIdentityStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored identities.
    pub fn len(&self) -> usize {
        self.inner.read().map(|inner| inner.rows.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All usernames in id order.
    pub fn usernames(&self) -> Vec<String> {
        self.inner
            .read()
            .map(|inner| inner.rows.values().map(|r| r.username.clone()).collect())
            .unwrap_or_default()
    }

    /// Remove every identity. Identifiers are not reused afterwards.
    pub fn clear(&self) {
        if let Ok(mut inner) = self.inner.write() {
            inner.rows.clear();
            inner.by_username.clear();
        }
    }
}

#[async_trait]
impl IdentityStore for InMemoryIdentityStore {
    async fn get_by_username(&self, username: &str) -> VouchResult<Option<IdentityRecord>> {
        let inner = self.inner.read().map_err(|_| StorageError::LockPoisoned)?;
        Ok(inner
            .by_username
            .get(username)
            .and_then(|id| inner.rows.get(id))
            .cloned())
    }

    async fn scan_page(
        &self,
        after_id: RecordId,
        limit: usize,
    ) -> VouchResult<Vec<IdentityRecord>> {
        let inner = self.inner.read().map_err(|_| StorageError::LockPoisoned)?;
        Ok(inner
            .rows
            .range((after_id.saturating_add(1))..)
            .take(limit)
            .map(|(_, record)| record.clone())
            .collect())
    }

    async fn bulk_insert(&self, identities: &[NewIdentity]) -> VouchResult<u64> {
        let mut inner = self.inner.write().map_err(|_| StorageError::LockPoisoned)?;

        // Validate the whole batch first so a conflict leaves nothing behind.
        let mut seen = HashSet::with_capacity(identities.len());
        for identity in identities {
            if inner.by_username.contains_key(&identity.username)
                || !seen.insert(identity.username.as_str())
            {
                return Err(StorageError::UniqueViolation {
                    username: identity.username.clone(),
                }
                .into());
            }
        }

        let now = Utc::now();
        for identity in identities {
            inner.last_id += 1;
            let id = inner.last_id;
            inner.by_username.insert(identity.username.clone(), id);
            inner.rows.insert(
                id,
                IdentityRecord {
                    id,
                    username: identity.username.clone(),
                    credential_hash: identity.credential_hash.clone(),
                    created_at: now,
                },
            );
        }

        Ok(identities.len() as u64)
    }

    async fn max_sequence_value(&self) -> VouchResult<u64> {
        let inner = self.inner.read().map_err(|_| StorageError::LockPoisoned)?;
        Ok(inner
            .by_username
            .keys()
            .filter_map(|username| parse_sequence(username))
            .max()
            .unwrap_or(0))
    }
}
