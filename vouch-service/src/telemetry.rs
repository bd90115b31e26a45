//! Tracing subscriber setup shared by the binaries.

use std::str::FromStr;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use vouch_core::{ConfigError, VouchResult};

/// Default `EnvFilter` directives when `RUST_LOG` is unset.
pub const DEFAULT_LOG_FILTER: &str = "vouch=debug,vouch_service=debug,vouch_storage=debug,info";

/// Output format for log lines.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pretty" | "text" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::InvalidValue {
                field: "VOUCH_LOG_FORMAT".to_string(),
                value: other.to_string(),
                reason: "expected 'pretty' or 'json'".to_string(),
            }),
        }
    }
}

/// Telemetry configuration from environment variables.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub service_name: String,
    pub log_format: LogFormat,
}

impl TelemetryConfig {
    /// Environment variables:
    /// - `VOUCH_LOG_FORMAT` (default: pretty)
    /// - `RUST_LOG` is read by the filter itself
    pub fn from_env(service_name: &str) -> Self {
        let log_format = std::env::var("VOUCH_LOG_FORMAT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or_default();
        Self {
            service_name: service_name.to_string(),
            log_format,
        }
    }
}

/// Install the global tracing subscriber.
///
/// Call once at startup before any tracing occurs.
pub fn init_tracing(config: &TelemetryConfig) -> VouchResult<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    let registry = tracing_subscriber::registry().with(env_filter);
    let result = match config.log_format {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .try_init(),
        LogFormat::Pretty => registry
            .with(tracing_subscriber::fmt::layer().with_target(false))
            .try_init(),
    };

    result.map_err(|e| ConfigError::InvalidValue {
        field: "tracing".to_string(),
        value: config.service_name.clone(),
        reason: format!("Failed to init subscriber: {}", e),
    })?;

    tracing::info!(
        service_name = %config.service_name,
        log_format = ?config.log_format,
        "Telemetry initialized"
    );

    Ok(())
}
