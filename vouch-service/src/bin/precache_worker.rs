//! VOUCH Precache Worker Entry Point
//!
//! Sweeps the `users` table into the LMDB cache once at startup and then on
//! a fixed interval until SIGINT or SIGTERM.

use std::process::ExitCode;
use std::sync::Arc;

use vouch_core::{VouchConfig, VouchResult};
use vouch_service::{
    cancel_pair, init_tracing, precache_task, shutdown_signal, PgIdentityStore,
    PrecacheWorker, TelemetryConfig,
};
use vouch_storage::{CacheConfig, IdentityCache, LmdbCacheBackend};

#[tokio::main]
async fn main() -> VouchResult<ExitCode> {
    let telemetry_config = TelemetryConfig::from_env("vouch-precache");
    init_tracing(&telemetry_config)?;

    let config = VouchConfig::from_env();
    config.validate()?;

    if !config.precache.enabled {
        tracing::info!("Precache worker is disabled, exiting");
        return Ok(ExitCode::SUCCESS);
    }
    if !config.cache.enabled {
        tracing::warn!("Cache is disabled, nothing to precache");
        return Ok(ExitCode::SUCCESS);
    }

    let store = PgIdentityStore::from_settings(&config.database)?;
    store.ensure_schema().await?;

    let backend = LmdbCacheBackend::new(&config.cache.path, config.cache.max_size_mb)?;
    let cache = IdentityCache::new(Arc::new(backend), CacheConfig::from(&config.cache));
    let worker = Arc::new(PrecacheWorker::new(Arc::new(store), cache));

    tracing::info!(
        database = %config.database.target(),
        cache_path = %config.cache.path.display(),
        interval_secs = config.precache.interval.as_secs(),
        batch_size = config.precache.batch_size,
        "Starting precache worker"
    );

    let (handle, signal) = cancel_pair();
    let mut task = tokio::spawn(precache_task(worker, config.precache.clone(), signal));

    let joined = tokio::select! {
        joined = &mut task => joined,
        _ = shutdown_signal() => {
            tracing::info!("Shutdown signal received");
            handle.cancel();
            task.await
        }
    };

    match joined {
        Ok(metrics) => {
            let snapshot = metrics.snapshot();
            tracing::info!(
                sweeps_completed = snapshot.sweeps_completed,
                sweeps_failed = snapshot.sweeps_failed,
                records_cached = snapshot.records_cached,
                "Precache worker stopped"
            );
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            tracing::error!(error = %e, "Precache task did not complete");
            Ok(ExitCode::FAILURE)
        }
    }
}
