//! Cache layer for identity records.
//!
//! [`CacheBackend`] is a byte-level key/value store with per-entry TTL.
//! [`IdentityCache`] layers the key namespace and the JSON payload format on
//! top, and is what the lookup service and the precache worker share.
//!
//! Cached entries may trail the store by up to one TTL or one sweep
//! interval. Credential changes are expected to go through a path that
//! overwrites the cache entry.

pub mod identity_cache;
pub mod key;
pub mod lmdb_backend;
pub mod memory;
pub mod traits;

pub use identity_cache::{BatchPut, CacheConfig, IdentityCache};
pub use key::CacheKey;
pub use lmdb_backend::{LmdbCacheBackend, LmdbCacheError};
pub use memory::InMemoryCacheBackend;
pub use traits::{CacheBackend, CacheStats};
