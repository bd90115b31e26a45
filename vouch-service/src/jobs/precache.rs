//! Precache Worker
//!
//! Sweeps the whole identity table in id order and bulk-populates the cache,
//! one page per cache round trip, so the first login of every user is a
//! cache hit.
//!
//! A sweep is a pure overwrite and safe to repeat. [`precache_task`] runs
//! sweeps on a fixed interval until cancelled.
//!
//! # Configuration
//!
//! ```rust
//! use vouch_service::jobs::PrecacheConfig;
//! use std::time::Duration;
//!
//! let config = PrecacheConfig {
//!     enabled: true,
//!     batch_size: 10_000,                  // Records per page
//!     interval: Duration::from_secs(300),  // Sweep every 5 minutes
//!     run_on_start: true,                  // First sweep immediately
//! };
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::time::{interval_at, MissedTickBehavior};
use vouch_core::{BatchCursor, PageStep, RecordId, VouchError, VouchResult};
use vouch_storage::{CacheBackend, IdentityCache, IdentityStore};

use crate::cancel::CancelSignal;

/// Schedule for [`precache_task`].
pub type PrecacheConfig = vouch_core::PrecacheSettings;

// ============================================================================
// SWEEP
// ============================================================================

/// Outcome of one complete sweep.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SweepReport {
    /// Records read from the store.
    pub processed: u64,
    /// Records skipped because they failed to serialize.
    pub skipped: u64,
    /// Non-empty pages fetched.
    pub pages: u64,
    /// Highest id seen, or 0 for an empty table.
    pub last_id: RecordId,
    pub elapsed: Duration,
}

impl SweepReport {
    /// Records per second over the whole sweep.
    pub fn rate(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.processed as f64 / secs
        } else {
            0.0
        }
    }
}

/// Walks the store with a keyset cursor and writes every record to the cache.
pub struct PrecacheWorker<S: IdentityStore, C: CacheBackend> {
    store: Arc<S>,
    cache: IdentityCache<C>,
}

impl<S: IdentityStore, C: CacheBackend> PrecacheWorker<S, C> {
    pub fn new(store: Arc<S>, cache: IdentityCache<C>) -> Self {
        Self { store, cache }
    }

    /// Run one sweep to completion.
    pub async fn run_sweep(&self, batch_size: usize) -> VouchResult<SweepReport> {
        self.run_sweep_with_cancel(batch_size, &CancelSignal::never())
            .await
    }

    /// Run one sweep, stopping with [`VouchError::Cancelled`] as soon as
    /// `cancel` fires.
    ///
    /// Any store or cache failure aborts the sweep with
    /// [`VouchError::SweepAborted`] carrying the number of records already
    /// processed. There is no retry within a sweep.
    pub async fn run_sweep_with_cancel(
        &self,
        batch_size: usize,
        cancel: &CancelSignal,
    ) -> VouchResult<SweepReport> {
        let mut cursor = BatchCursor::new(batch_size)?;
        let started = Instant::now();
        let mut processed = 0u64;
        let mut skipped = 0u64;
        let mut pages = 0u64;

        tracing::info!(batch_size, "Precache sweep started");

        loop {
            let page = cancel
                .run(self.store.scan_page(cursor.last_seen(), batch_size))
                .await
                .map_err(|e| abort(processed, e))?;

            if page.is_empty() {
                break;
            }

            let step = cursor
                .advance(&page)
                .map_err(|e| abort(processed, e.into()))?;

            let outcome = cancel
                .run(self.cache.put_batch(&page))
                .await
                .map_err(|e| abort(processed, e))?;

            pages += 1;
            processed += page.len() as u64;
            skipped += outcome.skipped as u64;

            tracing::debug!(
                page = pages,
                records = page.len(),
                cached = outcome.cached,
                last_id = cursor.last_seen(),
                total = processed,
                "Precache page written"
            );

            if step == PageStep::Exhausted {
                break;
            }
        }

        let report = SweepReport {
            processed,
            skipped,
            pages,
            last_id: cursor.last_seen(),
            elapsed: started.elapsed(),
        };

        tracing::info!(
            processed = report.processed,
            skipped = report.skipped,
            pages = report.pages,
            last_id = report.last_id,
            elapsed_ms = report.elapsed.as_millis() as u64,
            rate = %format!("{:.0}", report.rate()),
            "Precache sweep completed"
        );

        Ok(report)
    }
}

fn abort(processed: u64, error: VouchError) -> VouchError {
    match error {
        VouchError::Cancelled => {
            tracing::info!(processed, "Precache sweep cancelled");
            VouchError::Cancelled
        }
        source => {
            tracing::error!(processed, error = %source, "Precache sweep aborted");
            VouchError::SweepAborted {
                processed,
                source: Box::new(source),
            }
        }
    }
}

// ============================================================================
// METRICS
// ============================================================================

/// Counters for the scheduled precache task.
#[derive(Debug, Default)]
pub struct PrecacheMetrics {
    /// Sweeps that ran to completion
    pub sweeps_completed: AtomicU64,

    /// Sweeps that aborted with an error
    pub sweeps_failed: AtomicU64,

    /// Records written across all completed sweeps
    pub records_cached: AtomicU64,

    /// Records processed by the most recent completed sweep
    pub last_sweep_records: AtomicU64,
}

impl PrecacheMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> PrecacheSnapshot {
        PrecacheSnapshot {
            sweeps_completed: self.sweeps_completed.load(Ordering::Relaxed),
            sweeps_failed: self.sweeps_failed.load(Ordering::Relaxed),
            records_cached: self.records_cached.load(Ordering::Relaxed),
            last_sweep_records: self.last_sweep_records.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of precache metrics at a point in time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PrecacheSnapshot {
    pub sweeps_completed: u64,
    pub sweeps_failed: u64,
    pub records_cached: u64,
    pub last_sweep_records: u64,
}

// ============================================================================
// BACKGROUND TASK
// ============================================================================

/// Background task that sweeps on a fixed interval until `cancel` fires.
///
/// A failed sweep is logged and counted; the schedule continues. Ticks
/// missed while a long sweep is running are skipped rather than queued.
///
/// # Example
///
/// ```ignore
/// let (handle, signal) = cancel_pair();
/// let worker = Arc::new(PrecacheWorker::new(store, cache));
/// let task = tokio::spawn(precache_task(worker, PrecacheConfig::from_env(), signal));
///
/// // On shutdown
/// handle.cancel();
/// let metrics = task.await?;
/// ```
pub async fn precache_task<S, C>(
    worker: Arc<PrecacheWorker<S, C>>,
    config: PrecacheConfig,
    cancel: CancelSignal,
) -> Arc<PrecacheMetrics>
where
    S: IdentityStore + 'static,
    C: CacheBackend + 'static,
{
    let metrics = Arc::new(PrecacheMetrics::new());

    if !config.enabled {
        tracing::info!("Precache worker is disabled");
        return metrics;
    }
    if config.interval.is_zero() {
        tracing::error!("Precache interval must be greater than zero, not scheduling sweeps");
        return metrics;
    }

    let first_tick = if config.run_on_start {
        tokio::time::Instant::now()
    } else {
        tokio::time::Instant::now() + config.interval
    };
    let mut ticker = interval_at(first_tick, config.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    tracing::info!(
        interval_secs = config.interval.as_secs(),
        batch_size = config.batch_size,
        run_on_start = config.run_on_start,
        "Precache task started"
    );

    loop {
        tokio::select! {
            biased;

            _ = cancel.cancelled() => {
                tracing::info!("Precache task shutting down");
                break;
            }

            _ = ticker.tick() => {
                match worker.run_sweep_with_cancel(config.batch_size, &cancel).await {
                    Ok(report) => {
                        metrics.sweeps_completed.fetch_add(1, Ordering::Relaxed);
                        metrics
                            .records_cached
                            .fetch_add(report.processed - report.skipped, Ordering::Relaxed);
                        metrics
                            .last_sweep_records
                            .store(report.processed, Ordering::Relaxed);
                    }
                    Err(VouchError::Cancelled) => {
                        tracing::info!("Precache task cancelled mid-sweep");
                        break;
                    }
                    Err(e) => {
                        metrics.sweeps_failed.fetch_add(1, Ordering::Relaxed);
                        tracing::error!(error = %e, "Precache sweep failed, will retry next interval");
                    }
                }
            }
        }
    }

    let snapshot = metrics.snapshot();
    tracing::info!(
        sweeps_completed = snapshot.sweeps_completed,
        sweeps_failed = snapshot.sweeps_failed,
        records_cached = snapshot.records_cached,
        "Precache task completed"
    );

    metrics
}

#[cfg(test)]
mod tests {
    use super::*;
    use vouch_core::{seed_username, NewIdentity, ValidationError};
    use vouch_storage::{CacheConfig, InMemoryCacheBackend, InMemoryIdentityStore};

    async fn worker_with(
        count: u64,
    ) -> (PrecacheWorker<InMemoryIdentityStore, InMemoryCacheBackend>, Arc<InMemoryCacheBackend>) {
        let store = Arc::new(InMemoryIdentityStore::new());
        let batch: Vec<_> = (1..=count)
            .map(|seq| NewIdentity::new(seed_username(seq, "example.com"), "h".into()))
            .collect();
        store.bulk_insert(&batch).await.expect("seed");

        let backend = Arc::new(InMemoryCacheBackend::new());
        let cache = IdentityCache::new(Arc::clone(&backend), CacheConfig::default());
        (PrecacheWorker::new(store, cache), backend)
    }

    #[tokio::test]
    async fn test_sweep_caches_every_record() {
        let (worker, backend) = worker_with(25).await;
        let report = worker.run_sweep(10).await.expect("sweep");

        assert_eq!(report.processed, 25);
        assert_eq!(report.pages, 3);
        assert_eq!(report.last_id, 25);
        assert_eq!(backend.len(), 25);
    }

    #[tokio::test]
    async fn test_empty_table_sweep() {
        let (worker, backend) = worker_with(0).await;
        let report = worker.run_sweep(10).await.expect("sweep");
        assert_eq!(report.processed, 0);
        assert_eq!(report.pages, 0);
        assert_eq!(report.last_id, 0);
        assert!(backend.is_empty());
    }

    #[tokio::test]
    async fn test_zero_batch_size_is_rejected() {
        let (worker, _) = worker_with(3).await;
        let err = worker.run_sweep(0).await.unwrap_err();
        assert!(matches!(
            err,
            VouchError::Validation(ValidationError::InvalidValue { .. })
        ));
    }

    #[tokio::test]
    async fn test_precache_task_stops_on_cancel() {
        let (worker, backend) = worker_with(5).await;
        let (handle, signal) = crate::cancel::cancel_pair();
        let config = PrecacheConfig {
            batch_size: 2,
            interval: Duration::from_secs(3600),
            ..PrecacheConfig::default()
        };

        let task = tokio::spawn(precache_task(Arc::new(worker), config, signal));
        tokio::time::sleep(Duration::from_millis(50)).await;
        handle.cancel();

        let metrics = task.await.expect("task should join");
        let snap = metrics.snapshot();
        assert_eq!(snap.sweeps_completed, 1);
        assert_eq!(snap.last_sweep_records, 5);
        assert_eq!(backend.len(), 5);
    }

    #[tokio::test]
    async fn test_disabled_task_returns_immediately() {
        let (worker, backend) = worker_with(5).await;
        let config = PrecacheConfig {
            enabled: false,
            ..PrecacheConfig::default()
        };
        let metrics = precache_task(Arc::new(worker), config, CancelSignal::never()).await;
        assert_eq!(metrics.snapshot(), PrecacheSnapshot::default());
        assert!(backend.is_empty());
    }
}
