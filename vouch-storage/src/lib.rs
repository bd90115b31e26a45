//! VOUCH Storage - Store and Cache Accessors
//!
//! Defines the two external dependencies of the identity access layer: the
//! durable [`IdentityStore`] and the [`CacheBackend`]. In-memory
//! implementations of both live here; PostgreSQL lives in `vouch-service`.

pub mod cache;
pub mod store;

pub use cache::{
    BatchPut, CacheBackend, CacheConfig, CacheKey, CacheStats, IdentityCache,
    InMemoryCacheBackend, LmdbCacheBackend, LmdbCacheError,
};
pub use store::{IdentityStore, InMemoryIdentityStore};
