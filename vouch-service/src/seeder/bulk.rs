//! Bulk seeder: many synthetic identities through bounded parallel inserts.
//!
//! The request is split into contiguous sequence ranges. The dispatcher
//! takes a permit from the [`ConcurrencyLimiter`] before spawning each batch,
//! so at most `concurrency` insert transactions are ever in flight. Each
//! batch is one `bulk_insert`; a failed batch is recorded and its siblings
//! carry on.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tokio::task::JoinSet;
use vouch_core::{
    partition, seed_username, CredentialHash, NewIdentity, SeederSettings, SequenceRange,
    StorageError, ValidationError, VouchError, VouchResult,
};
use vouch_storage::IdentityStore;

use super::limiter::ConcurrencyLimiter;
use super::progress::{
    LogProgressSink, ProgressAggregator, ProgressSink, PROGRESS_CHANNEL_CAPACITY,
};
use crate::cancel::CancelSignal;

/// Parameters for one bulk seeding run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeedRequest {
    pub total: u64,
    pub batch_size: usize,
    pub concurrency: usize,
    pub domain: String,
}

impl SeedRequest {
    /// `total` identities with batch size, concurrency and domain from
    /// `settings`.
    pub fn from_settings(total: u64, settings: &SeederSettings) -> Self {
        Self {
            total,
            batch_size: settings.batch_size,
            concurrency: settings.concurrency,
            domain: settings.domain.clone(),
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.batch_size == 0 {
            return Err(ValidationError::InvalidValue {
                field: "batch_size".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.concurrency == 0 {
            return Err(ValidationError::InvalidValue {
                field: "concurrency".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.domain.is_empty() {
            return Err(ValidationError::InvalidValue {
                field: "domain".to_string(),
                reason: "must not be empty".to_string(),
            });
        }
        Ok(())
    }
}

/// First sequence number of a run of `total` after `max_sequence`.
///
/// The exclusive end of the run must fit in a `u64`; otherwise the run is
/// rejected before anything is dispatched.
fn sequence_start(max_sequence: u64, total: u64) -> Result<u64, ValidationError> {
    max_sequence
        .checked_add(1)
        .filter(|start| start.checked_add(total).is_some())
        .ok_or_else(|| ValidationError::InvalidValue {
            field: "total".to_string(),
            reason: format!(
                "{} identities after sequence {} exceed the sequence range",
                total, max_sequence
            ),
        })
}

/// A batch whose insert transaction did not commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedBatch {
    /// Sequence numbers the batch would have created.
    pub range: SequenceRange,
    pub error: VouchError,
}

/// Outcome of a bulk seeding run.
#[derive(Debug, Clone, PartialEq)]
pub struct SeedReport {
    pub requested: u64,
    /// Rows committed, as counted by the progress aggregator.
    pub processed: u64,
    /// First sequence number of this run; 0 when nothing was requested.
    pub starting_sequence: u64,
    /// Batches dispatched.
    pub batches: usize,
    /// Failed batches, ordered by range.
    pub failed: Vec<FailedBatch>,
    /// Ranges never dispatched because the run was cancelled.
    pub skipped: Vec<SequenceRange>,
    pub elapsed: Duration,
}

impl SeedReport {
    fn empty(requested: u64) -> Self {
        Self {
            requested,
            processed: 0,
            starting_sequence: 0,
            batches: 0,
            failed: Vec::new(),
            skipped: Vec::new(),
            elapsed: Duration::ZERO,
        }
    }

    /// Every requested row was committed.
    pub fn is_complete(&self) -> bool {
        self.processed == self.requested
    }

    pub fn failed_rows(&self) -> u64 {
        self.failed.iter().map(|f| f.range.len()).sum()
    }

    pub fn skipped_rows(&self) -> u64 {
        self.skipped.iter().map(SequenceRange::len).sum()
    }

    /// Committed rows per second.
    pub fn rate(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.processed as f64 / secs
        } else {
            0.0
        }
    }
}

/// Inserts synthetic identities into an [`IdentityStore`].
pub struct BulkSeeder<S: IdentityStore> {
    store: Arc<S>,
}

impl<S: IdentityStore + 'static> BulkSeeder<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Insert exactly one identity.
    pub async fn seed_one(&self, username: &str, credential_hash: CredentialHash) -> VouchResult<()> {
        if username.is_empty() {
            return Err(ValidationError::InvalidValue {
                field: "username".to_string(),
                reason: "must not be empty".to_string(),
            }
            .into());
        }
        self.store
            .bulk_insert(&[NewIdentity::new(username, credential_hash)])
            .await?;
        tracing::info!(username, "Single identity inserted");
        Ok(())
    }

    /// Seed with progress logged through tracing and no cancellation.
    pub async fn seed_bulk(
        &self,
        request: SeedRequest,
        shared_hash: CredentialHash,
    ) -> VouchResult<SeedReport> {
        self.seed_bulk_with(request, shared_hash, LogProgressSink::default(), &CancelSignal::never())
            .await
    }

    /// Seed `request.total` identities sharing `shared_hash`.
    ///
    /// Usernames continue from the largest existing sequence number. Once
    /// `cancel` fires no new batch is dispatched; batches already running
    /// finish and the undispatched ranges are reported as skipped.
    pub async fn seed_bulk_with<P: ProgressSink>(
        &self,
        request: SeedRequest,
        shared_hash: CredentialHash,
        sink: P,
        cancel: &CancelSignal,
    ) -> VouchResult<SeedReport> {
        request.validate()?;
        if request.total == 0 {
            return Ok(SeedReport::empty(0));
        }

        let started = Instant::now();
        let max_sequence = self.store.max_sequence_value().await?;
        let starting_sequence = sequence_start(max_sequence, request.total)?;
        let limiter = ConcurrencyLimiter::new(request.concurrency)?;

        tracing::info!(
            total = request.total,
            batch_size = request.batch_size,
            concurrency = request.concurrency,
            starting_sequence,
            "Starting bulk seeder"
        );

        let (progress_tx, progress_rx) = mpsc::channel(PROGRESS_CHANNEL_CAPACITY);
        let aggregator = tokio::spawn(ProgressAggregator::new(request.total, sink).run(progress_rx));

        let shared_hash = Arc::new(shared_hash);
        let domain: Arc<str> = Arc::from(request.domain.as_str());
        let mut tasks = JoinSet::new();
        let mut outstanding = BTreeSet::new();
        let mut skipped = Vec::new();
        let mut batches = 0usize;

        // sequence_start guarantees every shifted range fits.
        let mut ranges = partition(request.total, request.batch_size as u64)
            .map_while(|r| r.checked_offset(starting_sequence));

        while let Some(range) = ranges.next() {
            let permit = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                permit = limiter.acquire() => Some(permit?),
            };
            let Some(permit) = permit else {
                skipped.push(range);
                skipped.extend(ranges.by_ref());
                tracing::warn!(
                    skipped_batches = skipped.len(),
                    "Seeder cancelled, stopping dispatch"
                );
                break;
            };

            let store = Arc::clone(&self.store);
            let hash = Arc::clone(&shared_hash);
            let domain = Arc::clone(&domain);
            let progress_tx = progress_tx.clone();

            outstanding.insert(range);
            batches += 1;
            tasks.spawn(async move {
                let _permit = permit;
                let result = insert_batch(store.as_ref(), range, &domain, &hash).await;
                if let Ok(rows) = result {
                    let _ = progress_tx.send(rows).await;
                }
                (range, result)
            });
        }
        drop(progress_tx);

        let mut failed = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((range, Ok(_))) => {
                    outstanding.remove(&range);
                }
                Ok((range, Err(error))) => {
                    outstanding.remove(&range);
                    tracing::error!(
                        start = range.start,
                        end = range.end,
                        error = %error,
                        "Failed to seed batch"
                    );
                    failed.push(FailedBatch { range, error });
                }
                Err(e) => {
                    tracing::error!(error = %e, "Seeder batch task did not complete");
                }
            }
        }

        // Ranges whose task panicked never reported back.
        for range in outstanding {
            failed.push(FailedBatch {
                range,
                error: StorageError::WriteFailed {
                    range: Some(range),
                    reason: "batch task aborted".to_string(),
                }
                .into(),
            });
        }
        failed.sort_by_key(|f| f.range);

        let processed = match aggregator.await {
            Ok(total) => total,
            Err(e) => {
                tracing::error!(error = %e, "Progress aggregator did not complete");
                0
            }
        };

        let report = SeedReport {
            requested: request.total,
            processed,
            starting_sequence,
            batches,
            failed,
            skipped,
            elapsed: started.elapsed(),
        };

        tracing::info!(
            total_users = report.requested,
            processed = report.processed,
            failed_batches = report.failed.len(),
            skipped_batches = report.skipped.len(),
            duration_ms = report.elapsed.as_millis() as u64,
            rate = %format!("{:.2}", report.rate()),
            batch_size = request.batch_size,
            "User seeder completed"
        );

        Ok(report)
    }
}

async fn insert_batch<S: IdentityStore + ?Sized>(
    store: &S,
    range: SequenceRange,
    domain: &str,
    hash: &CredentialHash,
) -> VouchResult<u64> {
    let identities: Vec<NewIdentity> = range
        .sequences()
        .map(|seq| NewIdentity::new(seed_username(seq, domain), hash.clone()))
        .collect();
    store.bulk_insert(&identities).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use vouch_storage::InMemoryIdentityStore;

    fn request(total: u64) -> SeedRequest {
        SeedRequest::from_settings(total, &SeederSettings::default())
    }

    #[tokio::test]
    async fn test_zero_total_does_not_touch_store() {
        let store = Arc::new(InMemoryIdentityStore::new());
        let seeder = BulkSeeder::new(Arc::clone(&store));
        let report = seeder
            .seed_bulk(request(0), CredentialHash::from("h"))
            .await
            .expect("seed");
        assert_eq!(report.processed, 0);
        assert_eq!(report.batches, 0);
        assert!(report.is_complete());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_invalid_request_is_rejected() {
        let seeder = BulkSeeder::new(Arc::new(InMemoryIdentityStore::new()));
        for bad in [request(10).with_batch_size(0), request(10).with_concurrency(0)] {
            let err = seeder
                .seed_bulk(bad, CredentialHash::from("h"))
                .await
                .unwrap_err();
            assert!(matches!(err, VouchError::Validation(_)));
        }
    }

    #[tokio::test]
    async fn test_seed_continues_sequence() {
        let store = Arc::new(InMemoryIdentityStore::new());
        let seeder = BulkSeeder::new(Arc::clone(&store));
        let hash = CredentialHash::from("shared");

        let first = seeder
            .seed_bulk(request(30).with_batch_size(7), hash.clone())
            .await
            .expect("first run");
        let second = seeder
            .seed_bulk(request(30).with_batch_size(7), hash)
            .await
            .expect("second run");

        assert_eq!(first.starting_sequence, 1);
        assert_eq!(second.starting_sequence, 31);
        assert_eq!(store.len(), 60);
        assert!(store.usernames().contains(&"00000060@example.com".to_string()));
    }

    #[test]
    fn test_sequence_start_near_u64_max() {
        assert_eq!(sequence_start(0, 10), Ok(1));
        assert_eq!(sequence_start(u64::MAX - 4, 3), Ok(u64::MAX - 3));
        assert!(sequence_start(u64::MAX - 4, 4).is_err());
        assert!(sequence_start(u64::MAX, 1).is_err());
    }

    #[tokio::test]
    async fn test_seed_one() {
        let store = Arc::new(InMemoryIdentityStore::new());
        let seeder = BulkSeeder::new(Arc::clone(&store));
        seeder
            .seed_one("admin@example.com", CredentialHash::from("h"))
            .await
            .expect("insert");
        assert!(seeder.seed_one("admin@example.com", CredentialHash::from("h")).await.is_err());
        assert!(seeder.seed_one("", CredentialHash::from("h")).await.is_err());
        assert_eq!(store.len(), 1);
    }
}
