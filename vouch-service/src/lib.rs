//! VOUCH Service - Cached Identity Access
//!
//! Three cooperating components over one identity store and one cache:
//!
//! - [`lookup`]: cache-aside lookup by username
//! - [`jobs`]: the precache worker that sweeps the store into the cache
//! - [`seeder`]: bounded-concurrency bulk insertion of synthetic identities
//!
//! Supporting modules provide cancellation, credential hashing, the
//! PostgreSQL store and tracing setup.

pub mod cancel;
pub mod credentials;
pub mod db;
pub mod jobs;
pub mod lookup;
pub mod seeder;
pub mod telemetry;

pub use cancel::{cancel_pair, shutdown_signal, CancelHandle, CancelSignal};
pub use credentials::{hash_blocking, Argon2Hasher, CredentialHasher};
pub use db::{create_pool, PgIdentityStore};
pub use jobs::{precache_task, PrecacheConfig, PrecacheMetrics, PrecacheWorker, SweepReport};
pub use lookup::{IdentityLookupService, LookupMetrics, LookupSnapshot};
pub use seeder::{
    BulkSeeder, ConcurrencyLimiter, FailedBatch, LogProgressSink, ProgressSink, ProgressSnapshot,
    SeedReport, SeedRequest, TerminalProgressSink,
};
pub use telemetry::{init_tracing, LogFormat, TelemetryConfig};
