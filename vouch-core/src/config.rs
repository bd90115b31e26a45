//! Configuration types
//!
//! Every section loads from `VOUCH_*` environment variables with defaults
//! from [`crate::constants`]. Unparseable values fall back to the default;
//! semantic checks happen in [`VouchConfig::validate`].

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::constants::*;
use crate::error::ConfigError;

fn env_parse<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

fn env_flag(key: &str, default: bool) -> bool {
    std::env::var(key)
        .ok()
        .map(|s| match s.trim().to_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => true,
            "false" | "0" | "no" | "off" => false,
            _ => default,
        })
        .unwrap_or(default)
}

fn env_string(key: &str, default: &str) -> String {
    std::env::var(key)
        .ok()
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| default.to_string())
}

/// PostgreSQL connection settings for the identity store.
#[derive(Clone, PartialEq, Eq)]
pub struct DatabaseSettings {
    pub host: String,
    pub port: u16,
    pub name: String,
    pub user: String,
    pub password: String,
    /// Upper bound on pooled connections.
    pub pool_size: usize,
    /// Applies to both connecting and waiting for a pooled connection.
    pub timeout: Duration,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            host: DEFAULT_DB_HOST.to_string(),
            port: DEFAULT_DB_PORT,
            name: DEFAULT_DB_NAME.to_string(),
            user: DEFAULT_DB_USER.to_string(),
            password: String::new(),
            pool_size: DEFAULT_DB_POOL_SIZE,
            timeout: Duration::from_secs(DEFAULT_DB_TIMEOUT_SECS),
        }
    }
}

impl DatabaseSettings {
    /// Environment variables:
    /// - `VOUCH_DB_HOST` (default: "localhost")
    /// - `VOUCH_DB_PORT` (default: 5432)
    /// - `VOUCH_DB_NAME` (default: "vouch")
    /// - `VOUCH_DB_USER` (default: "postgres")
    /// - `VOUCH_DB_PASSWORD` (default: empty)
    /// - `VOUCH_DB_POOL_SIZE` (default: 16)
    /// - `VOUCH_DB_TIMEOUT_SECS` (default: 30)
    pub fn from_env() -> Self {
        Self {
            host: env_string("VOUCH_DB_HOST", DEFAULT_DB_HOST),
            port: env_parse("VOUCH_DB_PORT", DEFAULT_DB_PORT),
            name: env_string("VOUCH_DB_NAME", DEFAULT_DB_NAME),
            user: env_string("VOUCH_DB_USER", DEFAULT_DB_USER),
            password: env_string("VOUCH_DB_PASSWORD", ""),
            pool_size: env_parse("VOUCH_DB_POOL_SIZE", DEFAULT_DB_POOL_SIZE),
            timeout: Duration::from_secs(env_parse(
                "VOUCH_DB_TIMEOUT_SECS",
                DEFAULT_DB_TIMEOUT_SECS,
            )),
        }
    }

    /// `host:port/name`, for logs and error messages.
    pub fn target(&self) -> String {
        format!("{}:{}/{}", self.host, self.port, self.name)
    }
}

impl std::fmt::Debug for DatabaseSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseSettings")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("name", &self.name)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("pool_size", &self.pool_size)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Cache-aside settings shared by the lookup service and the precache worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheSettings {
    /// Whether lookups consult and populate the cache.
    pub enabled: bool,
    /// Key namespace prepended to every username.
    pub prefix: String,
    /// Time-to-live for cache entries.
    pub ttl: Duration,
    /// LMDB environment directory.
    pub path: PathBuf,
    /// LMDB map size in megabytes.
    pub max_size_mb: usize,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            prefix: DEFAULT_CACHE_PREFIX.to_string(),
            ttl: Duration::from_secs(DEFAULT_CACHE_TTL_SECS),
            path: PathBuf::from(DEFAULT_CACHE_PATH),
            max_size_mb: DEFAULT_CACHE_MAX_SIZE_MB,
        }
    }
}

impl CacheSettings {
    /// Environment variables:
    /// - `VOUCH_CACHE_ENABLED` (default: true)
    /// - `VOUCH_CACHE_PREFIX` (default: "auth:")
    /// - `VOUCH_CACHE_TTL_SECS` (default: 3600)
    /// - `VOUCH_CACHE_PATH` (default: "./data/cache")
    /// - `VOUCH_CACHE_MAX_SIZE_MB` (default: 512)
    pub fn from_env() -> Self {
        Self {
            enabled: env_flag("VOUCH_CACHE_ENABLED", true),
            prefix: env_string("VOUCH_CACHE_PREFIX", DEFAULT_CACHE_PREFIX),
            ttl: Duration::from_secs(env_parse("VOUCH_CACHE_TTL_SECS", DEFAULT_CACHE_TTL_SECS)),
            path: PathBuf::from(env_string("VOUCH_CACHE_PATH", DEFAULT_CACHE_PATH)),
            max_size_mb: env_parse("VOUCH_CACHE_MAX_SIZE_MB", DEFAULT_CACHE_MAX_SIZE_MB),
        }
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }
}

/// Precache worker schedule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrecacheSettings {
    pub enabled: bool,
    pub batch_size: usize,
    pub interval: Duration,
    /// Run one sweep immediately before the first scheduled tick.
    pub run_on_start: bool,
}

impl Default for PrecacheSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            batch_size: DEFAULT_PRECACHE_BATCH_SIZE,
            interval: Duration::from_secs(DEFAULT_PRECACHE_INTERVAL_SECS),
            run_on_start: true,
        }
    }
}

impl PrecacheSettings {
    /// Environment variables:
    /// - `VOUCH_PRECACHE_ENABLED` (default: true)
    /// - `VOUCH_PRECACHE_BATCH_SIZE` (default: 10000)
    /// - `VOUCH_PRECACHE_INTERVAL_SECS` (default: 300)
    /// - `VOUCH_PRECACHE_RUN_ON_START` (default: true)
    pub fn from_env() -> Self {
        Self {
            enabled: env_flag("VOUCH_PRECACHE_ENABLED", true),
            batch_size: env_parse("VOUCH_PRECACHE_BATCH_SIZE", DEFAULT_PRECACHE_BATCH_SIZE),
            interval: Duration::from_secs(env_parse(
                "VOUCH_PRECACHE_INTERVAL_SECS",
                DEFAULT_PRECACHE_INTERVAL_SECS,
            )),
            run_on_start: env_flag("VOUCH_PRECACHE_RUN_ON_START", true),
        }
    }

    /// Short intervals and small pages for local development.
    pub fn development() -> Self {
        Self {
            enabled: true,
            batch_size: 500,
            interval: Duration::from_secs(30),
            run_on_start: true,
        }
    }
}

/// Bulk seeder settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeederSettings {
    pub batch_size: usize,
    pub concurrency: usize,
    pub domain: String,
    pub shared_password: String,
}

impl Default for SeederSettings {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_SEEDER_BATCH_SIZE,
            concurrency: DEFAULT_SEEDER_CONCURRENCY,
            domain: DEFAULT_SEEDER_DOMAIN.to_string(),
            shared_password: DEFAULT_SEEDER_PASSWORD.to_string(),
        }
    }
}

impl SeederSettings {
    /// Environment variables:
    /// - `VOUCH_SEEDER_BATCH_SIZE` (default: 1000)
    /// - `VOUCH_SEEDER_CONCURRENCY` (default: 10)
    /// - `VOUCH_SEEDER_DOMAIN` (default: "example.com")
    /// - `VOUCH_SEEDER_PASSWORD` (default: "testpassword123")
    pub fn from_env() -> Self {
        Self {
            batch_size: env_parse("VOUCH_SEEDER_BATCH_SIZE", DEFAULT_SEEDER_BATCH_SIZE),
            concurrency: env_parse("VOUCH_SEEDER_CONCURRENCY", DEFAULT_SEEDER_CONCURRENCY),
            domain: env_string("VOUCH_SEEDER_DOMAIN", DEFAULT_SEEDER_DOMAIN),
            shared_password: env_string("VOUCH_SEEDER_PASSWORD", DEFAULT_SEEDER_PASSWORD),
        }
    }
}

/// Master configuration for the identity access layer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VouchConfig {
    pub database: DatabaseSettings,
    pub cache: CacheSettings,
    pub precache: PrecacheSettings,
    pub seeder: SeederSettings,
}

impl VouchConfig {
    pub fn from_env() -> Self {
        Self {
            database: DatabaseSettings::from_env(),
            cache: CacheSettings::from_env(),
            precache: PrecacheSettings::from_env(),
            seeder: SeederSettings::from_env(),
        }
    }

    /// Check the invariants the workers rely on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.database.host.is_empty() {
            return Err(ConfigError::MissingRequired {
                field: "database.host".to_string(),
            });
        }
        if self.database.pool_size == 0 {
            return Err(invalid("database.pool_size", "0", "must be greater than zero"));
        }
        if self.database.timeout.is_zero() {
            return Err(invalid("database.timeout", "0", "must be greater than zero"));
        }
        if self.cache.ttl.is_zero() {
            return Err(invalid("cache.ttl", "0", "must be greater than zero"));
        }
        if self.cache.max_size_mb == 0 {
            return Err(invalid("cache.max_size_mb", "0", "must be greater than zero"));
        }
        if self.precache.batch_size == 0 {
            return Err(invalid("precache.batch_size", "0", "must be greater than zero"));
        }
        if self.precache.interval.is_zero() {
            return Err(invalid("precache.interval", "0", "must be greater than zero"));
        }
        if self.seeder.batch_size == 0 {
            return Err(invalid("seeder.batch_size", "0", "must be greater than zero"));
        }
        let max_rows = MAX_BIND_PARAMETERS / PARAMS_PER_IDENTITY_ROW;
        if self.seeder.batch_size > max_rows {
            return Err(invalid(
                "seeder.batch_size",
                &self.seeder.batch_size.to_string(),
                &format!("exceeds {} rows per insert statement", max_rows),
            ));
        }
        if self.seeder.concurrency == 0 {
            return Err(invalid("seeder.concurrency", "0", "must be greater than zero"));
        }
        if self.seeder.domain.is_empty() {
            return Err(ConfigError::MissingRequired {
                field: "seeder.domain".to_string(),
            });
        }
        Ok(())
    }
}

fn invalid(field: &str, value: &str, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EnvVarGuard {
        key: &'static str,
        original: Option<String>,
    }

    impl EnvVarGuard {
        fn set(key: &'static str, value: &str) -> Self {
            let original = std::env::var(key).ok();
            std::env::set_var(key, value);
            Self { key, original }
        }
    }

    impl Drop for EnvVarGuard {
        fn drop(&mut self) {
            match self.original.as_deref() {
                Some(v) => std::env::set_var(self.key, v),
                None => std::env::remove_var(self.key),
            }
        }
    }

    #[test]
    fn test_database_settings_from_env() {
        let _host = EnvVarGuard::set("VOUCH_DB_HOST", "db.internal");
        let _port = EnvVarGuard::set("VOUCH_DB_PORT", "not-a-port");
        let _pool = EnvVarGuard::set("VOUCH_DB_POOL_SIZE", " 4 ");
        let _timeout = EnvVarGuard::set("VOUCH_DB_TIMEOUT_SECS", "5");

        let settings = DatabaseSettings::from_env();
        assert_eq!(settings.host, "db.internal");
        assert_eq!(settings.port, DEFAULT_DB_PORT);
        assert_eq!(settings.pool_size, 4);
        assert_eq!(settings.timeout, Duration::from_secs(5));
        assert_eq!(settings.target(), "db.internal:5432/vouch");
    }

    #[test]
    fn test_database_password_is_redacted() {
        let settings = DatabaseSettings {
            password: "hunter2".to_string(),
            ..DatabaseSettings::default()
        };
        let rendered = format!("{:?}", settings);
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn test_validate_rejects_empty_pool() {
        let mut config = VouchConfig::default();
        config.database.pool_size = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("database.pool_size"));
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = VouchConfig::default();
        assert!(config.validate().is_ok());
        assert!(config.cache.enabled);
        assert_eq!(config.cache.prefix, "auth:");
        assert_eq!(config.cache.ttl, Duration::from_secs(3600));
        assert_eq!(config.precache.batch_size, 10_000);
        assert_eq!(config.precache.interval, Duration::from_secs(300));
        assert_eq!(config.seeder.batch_size, 1000);
        assert_eq!(config.seeder.concurrency, 10);
    }

    #[test]
    fn test_validate_rejects_zero_concurrency() {
        let mut config = VouchConfig::default();
        config.seeder.concurrency = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("seeder.concurrency"));
    }

    #[test]
    fn test_validate_rejects_oversized_seeder_batch() {
        let mut config = VouchConfig::default();
        config.seeder.batch_size = 40_000;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("rows per insert statement"));
    }

    #[test]
    fn test_validate_rejects_zero_ttl() {
        let mut config = VouchConfig::default();
        config.cache = config.cache.with_ttl(Duration::ZERO);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_cache_settings_builder() {
        let settings = CacheSettings::default()
            .with_enabled(false)
            .with_prefix("id:")
            .with_ttl(Duration::from_secs(60));
        assert!(!settings.enabled);
        assert_eq!(settings.prefix, "id:");
        assert_eq!(settings.ttl, Duration::from_secs(60));
    }
}
