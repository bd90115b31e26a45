//! VOUCH Test Utilities
//!
//! Shared test infrastructure for the VOUCH workspace:
//! - Instrumented store and cache wrappers with call counters and fault injection
//! - Proptest generators for identities and seeding plans
//! - Fixtures for common scenarios
//! - Assertions over seeded usernames

// Re-export in-memory backends from their source crate
pub use vouch_storage::{
    CacheBackend, CacheConfig, CacheKey, CacheStats, IdentityCache, IdentityStore,
    InMemoryCacheBackend, InMemoryIdentityStore,
};

// Re-export core types for convenience
pub use vouch_core::{
    parse_sequence, seed_username, CacheError, CredentialHash, IdentityRecord, NewIdentity,
    RecordId, SequenceRange, StorageError, VouchError, VouchResult,
};

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

// ============================================================================
// INSTRUMENTED STORE
// ============================================================================

/// Call counters for [`InstrumentedStore`].
#[derive(Debug, Default)]
pub struct StoreCalls {
    gets: AtomicU64,
    scans: AtomicU64,
    inserts: AtomicU64,
    in_flight_inserts: AtomicUsize,
    max_in_flight_inserts: AtomicUsize,
}

impl StoreCalls {
    pub fn gets(&self) -> u64 {
        self.gets.load(Ordering::SeqCst)
    }

    pub fn scans(&self) -> u64 {
        self.scans.load(Ordering::SeqCst)
    }

    pub fn inserts(&self) -> u64 {
        self.inserts.load(Ordering::SeqCst)
    }

    /// Highest number of `bulk_insert` calls observed running at once.
    pub fn max_in_flight_inserts(&self) -> usize {
        self.max_in_flight_inserts.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Default)]
struct StoreFaults {
    fail_gets: bool,
    fail_scan_after: Option<u64>,
    replay_first_page: bool,
    fail_inserts_for: HashSet<String>,
    panic_inserts_for: HashSet<String>,
}

/// Decrements the in-flight gauge even when the insert panics.
struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

fn injected_storage(operation: &str) -> VouchError {
    StorageError::Unavailable {
        reason: format!("injected {} failure", operation),
    }
    .into()
}

/// [`InMemoryIdentityStore`] wrapper that counts calls, tracks insert
/// concurrency and injects failures on demand.
#[derive(Debug, Clone, Default)]
pub struct InstrumentedStore {
    inner: InMemoryIdentityStore,
    calls: Arc<StoreCalls>,
    faults: Arc<Mutex<StoreFaults>>,
    get_delay: Option<Duration>,
    insert_delay: Option<Duration>,
}

impl InstrumentedStore {
    pub fn new(inner: InMemoryIdentityStore) -> Self {
        Self {
            inner,
            ..Default::default()
        }
    }

    /// Sleep this long inside every `get_by_username`.
    pub fn with_get_delay(mut self, delay: Duration) -> Self {
        self.get_delay = Some(delay);
        self
    }

    /// Sleep this long inside every `bulk_insert`, so overlapping batches
    /// show up in [`StoreCalls::max_in_flight_inserts`].
    pub fn with_insert_delay(mut self, delay: Duration) -> Self {
        self.insert_delay = Some(delay);
        self
    }

    pub fn inner(&self) -> &InMemoryIdentityStore {
        &self.inner
    }

    pub fn calls(&self) -> &StoreCalls {
        &self.calls
    }

    pub fn fail_gets(&self, fail: bool) {
        self.with_faults(|f| f.fail_gets = fail);
    }

    /// Let `pages` scans succeed, then fail every later one.
    pub fn fail_scan_after(&self, pages: u64) {
        self.with_faults(|f| f.fail_scan_after = Some(pages));
    }

    /// Ignore the cursor and always serve the first page, like a store whose
    /// identifiers are not monotonic.
    pub fn replay_first_page(&self) {
        self.with_faults(|f| f.replay_first_page = true);
    }

    /// Fail any insert batch that contains `username`.
    pub fn fail_inserts_containing(&self, username: impl Into<String>) {
        let username = username.into();
        self.with_faults(|f| {
            f.fail_inserts_for.insert(username);
        });
    }

    /// Panic inside any insert batch that contains `username`.
    pub fn panic_inserts_containing(&self, username: impl Into<String>) {
        let username = username.into();
        self.with_faults(|f| {
            f.panic_inserts_for.insert(username);
        });
    }

    fn with_faults<T>(&self, f: impl FnOnce(&mut StoreFaults) -> T) -> T {
        let mut faults = self.faults.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut faults)
    }
}

#[async_trait]
impl IdentityStore for InstrumentedStore {
    async fn get_by_username(&self, username: &str) -> VouchResult<Option<IdentityRecord>> {
        self.calls.gets.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.get_delay {
            tokio::time::sleep(delay).await;
        }
        if self.with_faults(|f| f.fail_gets) {
            return Err(injected_storage("get"));
        }
        self.inner.get_by_username(username).await
    }

    async fn scan_page(
        &self,
        after_id: RecordId,
        limit: usize,
    ) -> VouchResult<Vec<IdentityRecord>> {
        let completed = self.calls.scans.fetch_add(1, Ordering::SeqCst);
        let (fail_after, replay) =
            self.with_faults(|f| (f.fail_scan_after, f.replay_first_page));
        if fail_after.is_some_and(|pages| completed >= pages) {
            return Err(injected_storage("scan"));
        }
        let after_id = if replay { 0 } else { after_id };
        self.inner.scan_page(after_id, limit).await
    }

    async fn bulk_insert(&self, identities: &[NewIdentity]) -> VouchResult<u64> {
        self.calls.inserts.fetch_add(1, Ordering::SeqCst);
        let now = self.calls.in_flight_inserts.fetch_add(1, Ordering::SeqCst) + 1;
        let _in_flight = InFlight(&self.calls.in_flight_inserts);
        self.calls
            .max_in_flight_inserts
            .fetch_max(now, Ordering::SeqCst);

        if let Some(delay) = self.insert_delay {
            tokio::time::sleep(delay).await;
        }

        let (fail, panic) = self.with_faults(|f| {
            let hit = |set: &HashSet<String>| identities.iter().any(|i| set.contains(&i.username));
            (hit(&f.fail_inserts_for), hit(&f.panic_inserts_for))
        });
        if panic {
            panic!("injected insert panic");
        }
        if fail {
            return Err(injected_storage("insert"));
        }
        self.inner.bulk_insert(identities).await
    }

    async fn max_sequence_value(&self) -> VouchResult<u64> {
        self.inner.max_sequence_value().await
    }
}

// ============================================================================
// FLAKY CACHE
// ============================================================================

fn injected_cache(operation: &str) -> VouchError {
    CacheError::Unavailable {
        reason: format!("injected {} failure", operation),
    }
    .into()
}

/// [`InMemoryCacheBackend`] wrapper whose reads and writes can be switched
/// to fail.
#[derive(Debug, Default)]
pub struct FlakyCache {
    inner: InMemoryCacheBackend,
    fail_get: AtomicBool,
    fail_set: AtomicBool,
    gets: AtomicU64,
    sets: AtomicU64,
    batch_sets: AtomicU64,
}

impl FlakyCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inner(&self) -> &InMemoryCacheBackend {
        &self.inner
    }

    pub fn fail_get(&self, fail: bool) {
        self.fail_get.store(fail, Ordering::SeqCst);
    }

    /// Fail both `set` and `set_batch`.
    pub fn fail_set(&self, fail: bool) {
        self.fail_set.store(fail, Ordering::SeqCst);
    }

    pub fn gets(&self) -> u64 {
        self.gets.load(Ordering::SeqCst)
    }

    pub fn sets(&self) -> u64 {
        self.sets.load(Ordering::SeqCst)
    }

    pub fn batch_sets(&self) -> u64 {
        self.batch_sets.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CacheBackend for FlakyCache {
    async fn get(&self, key: &CacheKey) -> VouchResult<Option<Vec<u8>>> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        if self.fail_get.load(Ordering::SeqCst) {
            return Err(injected_cache("get"));
        }
        self.inner.get(key).await
    }

    async fn set(&self, key: &CacheKey, value: Vec<u8>, ttl: Duration) -> VouchResult<()> {
        self.sets.fetch_add(1, Ordering::SeqCst);
        if self.fail_set.load(Ordering::SeqCst) {
            return Err(injected_cache("set"));
        }
        self.inner.set(key, value, ttl).await
    }

    async fn set_batch(
        &self,
        entries: Vec<(CacheKey, Vec<u8>)>,
        ttl: Duration,
    ) -> VouchResult<usize> {
        self.batch_sets.fetch_add(1, Ordering::SeqCst);
        if self.fail_set.load(Ordering::SeqCst) {
            return Err(injected_cache("set_batch"));
        }
        self.inner.set_batch(entries, ttl).await
    }

    async fn stats(&self) -> VouchResult<CacheStats> {
        self.inner.stats().await
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for identity types and seeding plans.

    use super::*;
    use chrono::{TimeZone, Utc};
    use proptest::prelude::*;

    /// Sequence numbers that fit the eight-digit padding.
    pub fn arb_sequence() -> impl Strategy<Value = u64> {
        1u64..=99_999_999
    }

    pub fn arb_domain() -> impl Strategy<Value = String> {
        "[a-z]{1,12}\\.(com|io|org|net)"
    }

    /// Either a seeded username or a free-form one.
    pub fn arb_username() -> impl Strategy<Value = String> {
        prop_oneof![
            (arb_sequence(), arb_domain()).prop_map(|(seq, domain)| seed_username(seq, &domain)),
            "[a-z][a-z0-9._-]{0,15}@[a-z]{1,8}\\.com",
        ]
    }

    pub fn arb_credential_hash() -> impl Strategy<Value = CredentialHash> {
        prop::collection::vec(any::<u8>(), 1..96).prop_map(CredentialHash::from)
    }

    pub fn arb_identity_record() -> impl Strategy<Value = IdentityRecord> {
        (
            1i64..i64::MAX,
            arb_username(),
            arb_credential_hash(),
            0i64..4_102_444_800,
        )
            .prop_map(|(id, username, credential_hash, secs)| IdentityRecord {
                id,
                username,
                credential_hash,
                created_at: Utc
                    .timestamp_opt(secs, 0)
                    .single()
                    .unwrap_or_else(Utc::now),
            })
    }

    /// `(total, batch_size, concurrency)` for a bulk seeding run.
    pub fn arb_seed_plan() -> impl Strategy<Value = (u64, usize, usize)> {
        (0u64..600, 1usize..128, 1usize..12)
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built fixtures for common testing scenarios.

    use super::*;

    pub const TEST_DOMAIN: &str = "example.com";

    /// A stand-in credential hash; never verified.
    pub fn test_hash() -> CredentialHash {
        CredentialHash::from("$argon2id$v=19$m=19456,t=2,p=1$dGVzdHNhbHQ$dGVzdGhhc2g")
    }

    /// Seeded identities for every sequence in `range`.
    pub fn identities(range: std::ops::Range<u64>) -> Vec<NewIdentity> {
        range
            .map(|seq| NewIdentity::new(seed_username(seq, TEST_DOMAIN), test_hash()))
            .collect()
    }

    /// A store holding `count` seeded identities with ids `1..=count`.
    pub async fn seeded_store(count: u64) -> InMemoryIdentityStore {
        let store = InMemoryIdentityStore::new();
        if count > 0 {
            store
                .bulk_insert(&identities(1..count + 1))
                .await
                .expect("seed fixture store");
        }
        store
    }

    pub fn test_cache_config() -> CacheConfig {
        CacheConfig::new()
            .with_prefix("auth:")
            .with_ttl(Duration::from_secs(3600))
    }

    /// A typed cache over a fresh in-memory backend, plus the backend.
    pub fn memory_cache() -> (Arc<InMemoryCacheBackend>, IdentityCache<InMemoryCacheBackend>) {
        let backend = Arc::new(InMemoryCacheBackend::new());
        let cache = IdentityCache::new(Arc::clone(&backend), test_cache_config());
        (backend, cache)
    }

    /// A typed cache over a fresh [`FlakyCache`], plus the backend.
    pub fn flaky_cache() -> (Arc<FlakyCache>, IdentityCache<FlakyCache>) {
        let backend = Arc::new(FlakyCache::new());
        let cache = IdentityCache::new(Arc::clone(&backend), test_cache_config());
        (backend, cache)
    }
}

// ============================================================================
// CUSTOM ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertions over seeded usernames.

    use super::*;

    /// Assert no username appears twice.
    pub fn assert_unique_usernames(usernames: &[String]) {
        let mut seen = HashSet::with_capacity(usernames.len());
        for username in usernames {
            assert!(seen.insert(username), "duplicate username: {}", username);
        }
    }

    /// Assert the seeded usernames cover exactly the sequences in `range`.
    pub fn assert_sequences_cover(usernames: &[String], range: SequenceRange) {
        let mut sequences: Vec<u64> = usernames
            .iter()
            .map(|u| parse_sequence(u).unwrap_or_else(|| panic!("not a seeded username: {}", u)))
            .collect();
        sequences.sort_unstable();
        let expected: Vec<u64> = range.sequences().collect();
        assert_eq!(
            sequences.len(),
            expected.len(),
            "expected {} seeded usernames, found {}",
            expected.len(),
            sequences.len()
        );
        assert_eq!(sequences, expected, "seeded sequences are not contiguous");
    }
}

// ============================================================================
// TESTS
// ============================================================================
