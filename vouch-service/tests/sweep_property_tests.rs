//! Property-Based Tests for Precache Sweep Completeness
//!
//! Runs full sweeps over stores of arbitrary size with arbitrary page sizes.

use std::collections::HashSet;
use std::sync::Arc;

use proptest::prelude::*;
use vouch_service::PrecacheWorker;
use vouch_test_utils::fixtures::{memory_cache, seeded_store};
use vouch_test_utils::InstrumentedStore;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// **Property 1: Sweep Completeness**
    ///
    /// For any table of M records and page size B:
    /// 1. Exactly M records are processed and cached, each id once
    /// 2. ceil(M / B) non-empty pages are written
    /// 3. One extra empty read happens only when M is a multiple of B
    #[test]
    fn prop_sweep_caches_every_record_once(
        records in 0u64..400,
        batch_size in 1usize..64,
    ) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let store = Arc::new(InstrumentedStore::new(seeded_store(records).await));
            let (backend, cache) = memory_cache();
            let worker = PrecacheWorker::new(Arc::clone(&store), cache);

            let report = worker.run_sweep(batch_size).await.unwrap();

            let b = batch_size as u64;
            let expected_pages = records.div_ceil(b);
            let extra_read = u64::from(records % b == 0);
            prop_assert_eq!(report.processed, records);
            prop_assert_eq!(report.pages, expected_pages);
            prop_assert_eq!(store.calls().scans(), expected_pages + extra_read);
            prop_assert_eq!(report.last_id, records as i64);
            prop_assert_eq!(backend.len() as u64, records);
            Ok(())
        })?;
    }

    /// **Property 2: Sweep Idempotency**
    ///
    /// Sweeping twice leaves the same key set as sweeping once.
    #[test]
    fn prop_repeated_sweeps_leave_same_keys(
        records in 0u64..200,
        batch_size in 1usize..32,
    ) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let store = Arc::new(seeded_store(records).await);
            let (backend, cache) = memory_cache();
            let worker = PrecacheWorker::new(Arc::clone(&store), cache.clone());

            worker.run_sweep(batch_size).await.unwrap();
            let first: HashSet<_> = store
                .usernames()
                .into_iter()
                .filter(|u| backend.peek(&cache.key_for(u)).is_some())
                .collect();
            worker.run_sweep(batch_size).await.unwrap();

            prop_assert_eq!(first.len() as u64, records);
            prop_assert_eq!(backend.len() as u64, records);
            Ok(())
        })?;
    }
}
