//! VOUCH Seeder Entry Point
//!
//! Inserts one named identity, or `-n` synthetic identities in parallel
//! batches that all share a single Argon2 hash.

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use vouch_core::{VouchConfig, VouchResult};
use vouch_service::{
    cancel_pair, hash_blocking, init_tracing, shutdown_signal, Argon2Hasher, BulkSeeder,
    LogProgressSink, PgIdentityStore, ProgressSink, SeedRequest, TelemetryConfig,
    TerminalProgressSink,
};

#[derive(Parser, Debug)]
#[command(name = "vouch-seeder")]
#[command(about = "Seed the users table with synthetic identities")]
#[command(version)]
struct Cli {
    /// Number of identities to create in bulk mode
    #[arg(short = 'n', long = "count", default_value_t = 1000)]
    count: u64,

    /// Insert exactly this username instead of seeding in bulk
    #[arg(long)]
    username: Option<String>,

    /// Plaintext password; defaults to the shared seeder password
    #[arg(long, env = "VOUCH_SEEDER_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Rows per insert transaction
    #[arg(long, env = "VOUCH_SEEDER_BATCH_SIZE")]
    batch_size: Option<usize>,

    /// Maximum insert transactions in flight
    #[arg(short, long, env = "VOUCH_SEEDER_CONCURRENCY")]
    concurrency: Option<usize>,

    /// Domain appended to generated usernames
    #[arg(long, env = "VOUCH_SEEDER_DOMAIN")]
    domain: Option<String>,

    /// Report progress through the log instead of a terminal bar
    #[arg(long)]
    no_progress_bar: bool,
}

#[tokio::main]
async fn main() -> VouchResult<ExitCode> {
    let cli = Cli::parse();

    let telemetry_config = TelemetryConfig::from_env("vouch-seeder");
    init_tracing(&telemetry_config)?;

    let mut config = VouchConfig::from_env();
    if let Some(batch_size) = cli.batch_size {
        config.seeder.batch_size = batch_size;
    }
    if let Some(concurrency) = cli.concurrency {
        config.seeder.concurrency = concurrency;
    }
    if let Some(domain) = cli.domain.clone() {
        config.seeder.domain = domain;
    }
    config.validate()?;

    let store = PgIdentityStore::from_settings(&config.database)?;
    store.ensure_schema().await?;
    let seeder = BulkSeeder::new(Arc::new(store));
    let hasher = Arc::new(Argon2Hasher::new());
    let password = cli
        .password
        .clone()
        .unwrap_or_else(|| config.seeder.shared_password.clone());

    if let Some(username) = cli.username.as_deref() {
        let hash = hash_blocking(hasher, password).await?;
        seeder.seed_one(username, hash).await?;
        return Ok(ExitCode::SUCCESS);
    }

    // Hashed once; every generated identity shares it.
    let shared_hash = hash_blocking(hasher, password).await?;
    let request = SeedRequest::from_settings(cli.count, &config.seeder);

    let (handle, signal) = cancel_pair();
    tokio::spawn(async move {
        shutdown_signal().await;
        tracing::info!("Shutdown signal received, finishing in-flight batches");
        handle.cancel();
    });

    let sink: Box<dyn ProgressSink> = if cli.no_progress_bar {
        Box::new(LogProgressSink::default())
    } else {
        Box::new(TerminalProgressSink)
    };

    let report = seeder
        .seed_bulk_with(request, shared_hash, sink, &signal)
        .await?;

    if report.is_complete() {
        Ok(ExitCode::SUCCESS)
    } else {
        tracing::warn!(
            failed_rows = report.failed_rows(),
            skipped_rows = report.skipped_rows(),
            "Seeding finished with missing rows"
        );
        Ok(ExitCode::FAILURE)
    }
}
