//! Bulk seeder: naming, uniqueness, bounded concurrency, failure isolation
//! and cancellation.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use vouch_core::{SeederSettings, SequenceRange, StorageError, VouchError};
use vouch_service::{cancel_pair, BulkSeeder, ProgressSink, ProgressSnapshot, SeedRequest};
use vouch_storage::InMemoryIdentityStore;
use vouch_test_utils::assertions::{assert_sequences_cover, assert_unique_usernames};
use vouch_test_utils::fixtures::test_hash;
use vouch_test_utils::{IdentityStore, InstrumentedStore, NewIdentity};

#[derive(Clone, Default)]
struct RecordingSink {
    updates: Arc<Mutex<Vec<ProgressSnapshot>>>,
    finished: Arc<Mutex<Vec<ProgressSnapshot>>>,
}

impl ProgressSink for RecordingSink {
    fn update(&mut self, snapshot: &ProgressSnapshot) {
        self.updates.lock().unwrap().push(*snapshot);
    }

    fn finish(&mut self, snapshot: &ProgressSnapshot) {
        self.finished.lock().unwrap().push(*snapshot);
    }
}

fn request(total: u64, batch_size: usize, concurrency: usize) -> SeedRequest {
    SeedRequest::from_settings(total, &SeederSettings::default())
        .with_batch_size(batch_size)
        .with_concurrency(concurrency)
}

fn instrumented() -> Arc<InstrumentedStore> {
    Arc::new(InstrumentedStore::new(InMemoryIdentityStore::new()))
}

#[tokio::test]
async fn test_seeds_contiguous_usernames_in_batches() {
    let store = instrumented();
    let seeder = BulkSeeder::new(Arc::clone(&store));

    let report = seeder
        .seed_bulk(request(2500, 1000, 10), test_hash())
        .await
        .unwrap();

    assert_eq!(report.requested, 2500);
    assert_eq!(report.processed, 2500);
    assert_eq!(report.starting_sequence, 1);
    assert_eq!(report.batches, 3);
    assert!(report.failed.is_empty());
    assert!(report.is_complete());
    assert_eq!(store.calls().inserts(), 3);

    let usernames = store.inner().usernames();
    assert_sequences_cover(&usernames, SequenceRange::new(1, 2501));
    assert!(usernames.contains(&"00000001@example.com".to_string()));
    assert!(usernames.contains(&"00002500@example.com".to_string()));
}

#[tokio::test]
async fn test_every_identity_shares_the_hash() {
    let store = instrumented();
    let seeder = BulkSeeder::new(Arc::clone(&store));

    seeder.seed_bulk(request(20, 7, 3), test_hash()).await.unwrap();

    let page = store.inner().scan_page(0, 100).await.unwrap();
    assert_eq!(page.len(), 20);
    assert!(page.iter().all(|r| r.credential_hash == test_hash()));
}

#[tokio::test]
async fn test_second_run_continues_after_existing_sequences() {
    let store = instrumented();
    let seeder = BulkSeeder::new(Arc::clone(&store));

    seeder.seed_bulk(request(2500, 1000, 10), test_hash()).await.unwrap();
    let report = seeder.seed_bulk(request(500, 1000, 10), test_hash()).await.unwrap();

    assert_eq!(report.starting_sequence, 2501);
    let usernames = store.inner().usernames();
    assert_unique_usernames(&usernames);
    assert_sequences_cover(&usernames, SequenceRange::new(1, 3001));
}

#[tokio::test]
async fn test_non_numeric_usernames_do_not_shift_sequence() {
    let store = instrumented();
    store
        .bulk_insert(&[NewIdentity::new("alice@example.com", test_hash())])
        .await
        .unwrap();
    let seeder = BulkSeeder::new(Arc::clone(&store));

    let report = seeder.seed_bulk(request(3, 10, 1), test_hash()).await.unwrap();

    assert_eq!(report.starting_sequence, 1);
    assert_eq!(store.inner().len(), 4);
}

#[tokio::test(start_paused = true)]
async fn test_in_flight_batches_never_exceed_concurrency() {
    let store = Arc::new(
        InstrumentedStore::new(InMemoryIdentityStore::new())
            .with_insert_delay(Duration::from_millis(50)),
    );
    let seeder = BulkSeeder::new(Arc::clone(&store));

    let report = seeder.seed_bulk(request(1000, 10, 4), test_hash()).await.unwrap();

    assert_eq!(report.batches, 100);
    assert!(report.is_complete());
    assert_eq!(store.calls().max_in_flight_inserts(), 4);
}

#[tokio::test(start_paused = true)]
async fn test_concurrency_of_one_is_sequential() {
    let store = Arc::new(
        InstrumentedStore::new(InMemoryIdentityStore::new())
            .with_insert_delay(Duration::from_millis(20)),
    );
    let seeder = BulkSeeder::new(Arc::clone(&store));

    let report = seeder.seed_bulk(request(50, 10, 1), test_hash()).await.unwrap();

    assert!(report.is_complete());
    assert_eq!(store.calls().max_in_flight_inserts(), 1);
}

#[tokio::test]
async fn test_failed_batch_does_not_stop_siblings() {
    let store = instrumented();
    store.fail_inserts_containing("00001500@example.com");
    let seeder = BulkSeeder::new(Arc::clone(&store));
    let sink = RecordingSink::default();

    let (_handle, signal) = cancel_pair();
    let report = seeder
        .seed_bulk_with(request(2500, 1000, 10), test_hash(), sink.clone(), &signal)
        .await
        .unwrap();

    assert_eq!(report.processed, 1500);
    assert!(!report.is_complete());
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].range, SequenceRange::new(1001, 2001));
    assert!(matches!(report.failed[0].error, VouchError::Storage(_)));
    assert_eq!(report.failed_rows(), 1000);

    // The failed transaction left nothing behind.
    let usernames = store.inner().usernames();
    assert_eq!(usernames.len(), 1500);
    assert!(!usernames.contains(&"00001500@example.com".to_string()));

    // Progress counts committed rows only.
    let finished = sink.finished.lock().unwrap();
    assert_eq!(finished.len(), 1);
    assert_eq!(finished[0].processed, 1500);
}

#[tokio::test]
async fn test_panicking_batch_is_reported_as_failed() {
    let store = instrumented();
    store.panic_inserts_containing("00000015@example.com");
    let seeder = BulkSeeder::new(Arc::clone(&store));

    let report = seeder.seed_bulk(request(30, 10, 3), test_hash()).await.unwrap();

    assert_eq!(report.processed, 20);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].range, SequenceRange::new(11, 21));
    assert!(matches!(
        report.failed[0].error,
        VouchError::Storage(StorageError::WriteFailed { .. })
    ));
}

#[tokio::test]
async fn test_progress_is_monotonic_and_reaches_total() {
    let store = instrumented();
    let seeder = BulkSeeder::new(Arc::clone(&store));
    let sink = RecordingSink::default();

    let (_handle, signal) = cancel_pair();
    seeder
        .seed_bulk_with(request(95, 10, 4), test_hash(), sink.clone(), &signal)
        .await
        .unwrap();

    let updates = sink.updates.lock().unwrap();
    assert_eq!(updates.len(), 10);
    assert!(updates.windows(2).all(|w| w[0].processed < w[1].processed));
    assert_eq!(updates.last().map(|s| s.processed), Some(95));
    assert!(updates.iter().all(|s| s.total == 95));
    assert_eq!(sink.finished.lock().unwrap().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_stops_dispatch_and_reports_skipped_ranges() {
    let store = Arc::new(
        InstrumentedStore::new(InMemoryIdentityStore::new())
            .with_insert_delay(Duration::from_secs(1)),
    );
    let seeder = BulkSeeder::new(Arc::clone(&store));

    let (handle, signal) = cancel_pair();
    handle.cancel_after(Duration::from_millis(1500));

    let report = seeder
        .seed_bulk_with(request(100, 10, 2), test_hash(), RecordingSink::default(), &signal)
        .await
        .unwrap();

    assert!(!report.skipped.is_empty());
    assert!(report.failed.is_empty());
    assert_eq!(report.processed + report.skipped_rows(), 100);
    assert_eq!(store.inner().len() as u64, report.processed);
    assert_eq!(report.skipped.last().map(|r| r.end), Some(101));
    // Skipped ranges are the contiguous tail of the run.
    assert!(report.skipped.windows(2).all(|w| w[0].end == w[1].start));
}

#[tokio::test]
async fn test_cancel_before_start_dispatches_nothing() {
    let store = instrumented();
    let seeder = BulkSeeder::new(Arc::clone(&store));

    let (handle, signal) = cancel_pair();
    handle.cancel();

    let report = seeder
        .seed_bulk_with(request(25, 10, 2), test_hash(), RecordingSink::default(), &signal)
        .await
        .unwrap();

    assert_eq!(report.batches, 0);
    assert_eq!(report.processed, 0);
    assert_eq!(report.skipped.len(), 3);
    assert_eq!(store.calls().inserts(), 0);
}

#[tokio::test]
async fn test_invalid_request_is_rejected_before_store_access() {
    let store = instrumented();
    let seeder = BulkSeeder::new(Arc::clone(&store));

    let err = seeder.seed_bulk(request(10, 0, 1), test_hash()).await.unwrap_err();
    assert!(matches!(err, VouchError::Validation(_)));

    let err = seeder.seed_bulk(request(10, 5, 0), test_hash()).await.unwrap_err();
    assert!(matches!(err, VouchError::Validation(_)));
    assert_eq!(store.calls().inserts(), 0);
}

#[tokio::test]
async fn test_exhausted_sequence_range_is_rejected_before_insert() {
    let store = instrumented();
    store
        .bulk_insert(&[NewIdentity::new(
            format!("{}@example.com", u64::MAX),
            test_hash(),
        )])
        .await
        .unwrap();
    let seeder = BulkSeeder::new(Arc::clone(&store));

    let err = seeder.seed_bulk(request(3, 10, 1), test_hash()).await.unwrap_err();

    assert!(matches!(err, VouchError::Validation(_)));
    assert_eq!(store.calls().inserts(), 1);
    assert_eq!(store.inner().len(), 1);
}

#[tokio::test]
async fn test_run_crossing_u64_max_is_rejected() {
    let store = instrumented();
    store
        .bulk_insert(&[NewIdentity::new(
            format!("{}@example.com", u64::MAX - 2),
            test_hash(),
        )])
        .await
        .unwrap();
    let seeder = BulkSeeder::new(Arc::clone(&store));

    let err = seeder.seed_bulk(request(3, 2, 2), test_hash()).await.unwrap_err();
    assert!(matches!(err, VouchError::Validation(_)));

    // One identity still fits below the exclusive end.
    let report = seeder.seed_bulk(request(1, 2, 2), test_hash()).await.unwrap();
    assert_eq!(report.starting_sequence, u64::MAX - 1);
    assert!(report.is_complete());
    assert_eq!(store.inner().len(), 2);
}

#[tokio::test]
async fn test_seed_one_inserts_and_rejects_duplicates() {
    let store = instrumented();
    let seeder = BulkSeeder::new(Arc::clone(&store));

    seeder.seed_one("admin@example.com", test_hash()).await.unwrap();
    let err = seeder
        .seed_one("admin@example.com", test_hash())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        VouchError::Storage(StorageError::UniqueViolation { .. })
    ));
    assert_eq!(store.inner().len(), 1);
}
