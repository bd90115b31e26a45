//! Constants for VOUCH
//!
//! Default values for every configuration knob, kept in one place so the
//! binaries, the config loaders and the tests agree.

// ============================================================================
// DATABASE
// ============================================================================

/// Default PostgreSQL host
pub const DEFAULT_DB_HOST: &str = "localhost";

/// Default PostgreSQL port
pub const DEFAULT_DB_PORT: u16 = 5432;

/// Default database name
pub const DEFAULT_DB_NAME: &str = "vouch";

/// Default database role
pub const DEFAULT_DB_USER: &str = "postgres";

/// Default maximum number of pooled connections
pub const DEFAULT_DB_POOL_SIZE: usize = 16;

/// Default connect and pool-wait timeout in seconds
pub const DEFAULT_DB_TIMEOUT_SECS: u64 = 30;

// ============================================================================
// CACHE
// ============================================================================

/// Default key namespace for cached identity records
pub const DEFAULT_CACHE_PREFIX: &str = "auth:";

/// Default cache entry time-to-live in seconds (1 hour)
pub const DEFAULT_CACHE_TTL_SECS: u64 = 3600;

/// Default directory for the LMDB cache environment
pub const DEFAULT_CACHE_PATH: &str = "./data/cache";

/// Default LMDB map size in megabytes
pub const DEFAULT_CACHE_MAX_SIZE_MB: usize = 512;

// ============================================================================
// PRECACHE
// ============================================================================

/// Default number of records fetched per sweep page
pub const DEFAULT_PRECACHE_BATCH_SIZE: usize = 10_000;

/// Default interval between scheduled sweeps in seconds (5 minutes)
pub const DEFAULT_PRECACHE_INTERVAL_SECS: u64 = 300;

// ============================================================================
// SEEDER
// ============================================================================

/// Default number of records per seeder insert transaction
pub const DEFAULT_SEEDER_BATCH_SIZE: usize = 1000;

/// Default number of insert transactions allowed in flight
pub const DEFAULT_SEEDER_CONCURRENCY: usize = 10;

/// Default domain suffix for synthetic usernames
pub const DEFAULT_SEEDER_DOMAIN: &str = "example.com";

/// Default plaintext shared by every synthetic identity
pub const DEFAULT_SEEDER_PASSWORD: &str = "testpassword123";

/// PostgreSQL accepts at most this many bind parameters per statement
pub const MAX_BIND_PARAMETERS: usize = 65_535;

/// Bind parameters used by one inserted identity row
pub const PARAMS_PER_IDENTITY_ROW: usize = 2;
