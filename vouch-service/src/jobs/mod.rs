//! Background Jobs for VOUCH
//!
//! - `precache`: sweeps the identity table into the cache on a schedule
//!
//! # Usage
//!
//! ```ignore
//! use vouch_service::cancel::cancel_pair;
//! use vouch_service::jobs::{precache_task, PrecacheConfig, PrecacheWorker};
//!
//! let (handle, signal) = cancel_pair();
//! let worker = Arc::new(PrecacheWorker::new(store, cache));
//! tokio::spawn(precache_task(worker, PrecacheConfig::from_env(), signal));
//!
//! // On shutdown
//! handle.cancel();
//! ```

pub mod precache;

pub use precache::{
    precache_task, PrecacheConfig, PrecacheMetrics, PrecacheSnapshot, PrecacheWorker, SweepReport,
};
