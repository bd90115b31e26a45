//! Bulk identity seeder.
//!
//! - `limiter`: semaphore-backed bound on in-flight batches
//! - `progress`: single-owner progress aggregator and its sinks
//! - `bulk`: partitioning, dispatch and per-batch failure isolation

pub mod bulk;
pub mod limiter;
pub mod progress;

pub use bulk::{BulkSeeder, FailedBatch, SeedReport, SeedRequest};
pub use limiter::ConcurrencyLimiter;
pub use progress::{
    render_bar, LogProgressSink, ProgressAggregator, ProgressSink, ProgressSnapshot,
    TerminalProgressSink, PROGRESS_BAR_WIDTH, PROGRESS_CHANNEL_CAPACITY,
};
