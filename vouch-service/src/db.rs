//! PostgreSQL Identity Store
//!
//! Connection pooling with deadpool-postgres and the `users` table accessors
//! behind [`IdentityStore`].

use async_trait::async_trait;
use deadpool_postgres::{
    Config, ManagerConfig, Pool, PoolConfig, PoolError, RecyclingMethod, Runtime,
};
use tokio_postgres::error::SqlState;
use tokio_postgres::types::ToSql;
use tokio_postgres::{NoTls, Row};
use vouch_core::{
    ConfigError, CredentialHash, DatabaseSettings, IdentityRecord, NewIdentity, RecordId, StorageError, Timestamp,
    VouchError, VouchResult,
};
use vouch_storage::IdentityStore;

// ============================================================================
// CONNECTION POOL
// ============================================================================

/// Build a lazily connecting pool from `settings`.
///
/// No connection is opened until the first query.
pub fn create_pool(settings: &DatabaseSettings) -> VouchResult<Pool> {
    let mut cfg = Config::new();
    cfg.host = Some(settings.host.clone());
    cfg.port = Some(settings.port);
    cfg.dbname = Some(settings.name.clone());
    cfg.user = Some(settings.user.clone());
    cfg.password = Some(settings.password.clone());
    cfg.connect_timeout = Some(settings.timeout);
    cfg.manager = Some(ManagerConfig {
        recycling_method: RecyclingMethod::Fast,
    });

    let mut pool_cfg = PoolConfig::new(settings.pool_size);
    pool_cfg.timeouts.wait = Some(settings.timeout);
    cfg.pool = Some(pool_cfg);

    cfg.create_pool(Some(Runtime::Tokio1), NoTls).map_err(|e| {
        ConfigError::InvalidValue {
            field: "database".to_string(),
            value: settings.target(),
            reason: e.to_string(),
        }
        .into()
    })
}

// ============================================================================
// ERROR MAPPING
// ============================================================================

fn pool_error(err: PoolError) -> VouchError {
    tracing::error!("Connection pool error: {:?}", err);
    match err {
        PoolError::Timeout(_) => StorageError::Timeout {
            operation: "acquire connection".to_string(),
        },
        PoolError::Closed => StorageError::Unavailable {
            reason: "connection pool is closed".to_string(),
        },
        other => StorageError::Unavailable {
            reason: other.to_string(),
        },
    }
    .into()
}

fn query_error(err: tokio_postgres::Error) -> VouchError {
    if err.is_closed() {
        return StorageError::Unavailable {
            reason: err.to_string(),
        }
        .into();
    }
    StorageError::QueryFailed {
        reason: err.to_string(),
    }
    .into()
}

fn insert_error(err: tokio_postgres::Error) -> VouchError {
    let Some(db_err) = err.as_db_error() else {
        return query_error(err);
    };
    if db_err.code() == &SqlState::UNIQUE_VIOLATION {
        let username = db_err
            .detail()
            .map(|detail| duplicate_key_value(detail).unwrap_or(detail))
            .unwrap_or("<unknown>");
        return StorageError::UniqueViolation {
            username: username.to_string(),
        }
        .into();
    }
    StorageError::WriteFailed {
        range: None,
        reason: db_err.message().to_string(),
    }
    .into()
}

/// Pull the offending value out of a unique violation detail such as
/// `Key (username)=(00000001@example.com) already exists.`
fn duplicate_key_value(detail: &str) -> Option<&str> {
    let (_, rest) = detail.split_once(")=(")?;
    let (value, _) = rest.rsplit_once(") already exists")?;
    Some(value)
}

fn record_from_row(row: &Row) -> IdentityRecord {
    let id: RecordId = row.get("id");
    let username: String = row.get("username");
    let password_hash: Vec<u8> = row.get("password_hash");
    let created_at: Timestamp = row.get("created_at");
    IdentityRecord {
        id,
        username,
        credential_hash: CredentialHash::from(password_hash),
        created_at,
    }
}

// ============================================================================
// STORE
// ============================================================================

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS users (
    id BIGSERIAL PRIMARY KEY,
    username TEXT NOT NULL UNIQUE,
    password_hash BYTEA NOT NULL,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now()
)";

const SELECT_BY_USERNAME: &str =
    "SELECT id, username, password_hash, created_at FROM users WHERE username = $1";

const SCAN_PAGE: &str = "SELECT id, username, password_hash, created_at FROM users \
     WHERE id > $1 ORDER BY id ASC LIMIT $2";

// Local parts longer than 18 digits may not fit BIGINT and are not seeded
// sequences.
const MAX_SEQUENCE: &str = "SELECT COALESCE(MAX(CAST(split_part(username, '@', 1) AS BIGINT)), 0) \
     FROM users WHERE username ~ '^[0-9]{1,18}@'";

/// Build `INSERT INTO users (username, password_hash) VALUES ($1, $2), ...`.
fn bulk_insert_sql(rows: usize) -> String {
    let mut sql = String::from("INSERT INTO users (username, password_hash) VALUES ");
    for i in 0..rows {
        if i > 0 {
            sql.push_str(", ");
        }
        sql.push_str(&format!("(${}, ${})", i * 2 + 1, i * 2 + 2));
    }
    sql
}

/// [`IdentityStore`] over a PostgreSQL `users` table.
#[derive(Clone)]
pub struct PgIdentityStore {
    pool: Pool,
}

impl PgIdentityStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    pub fn from_settings(settings: &DatabaseSettings) -> VouchResult<Self> {
        Ok(Self::new(create_pool(settings)?))
    }

    /// Current pool size for observability.
    pub fn pool_size(&self) -> usize {
        self.pool.status().size
    }

    async fn get_conn(&self) -> VouchResult<deadpool_postgres::Object> {
        self.pool.get().await.map_err(pool_error)
    }

    /// Create the `users` table if it does not exist.
    pub async fn ensure_schema(&self) -> VouchResult<()> {
        let conn = self.get_conn().await?;
        conn.batch_execute(SCHEMA).await.map_err(query_error)?;
        tracing::debug!("users table ensured");
        Ok(())
    }
}

#[async_trait]
impl IdentityStore for PgIdentityStore {
    async fn get_by_username(&self, username: &str) -> VouchResult<Option<IdentityRecord>> {
        let conn = self.get_conn().await?;
        let row = conn
            .query_opt(SELECT_BY_USERNAME, &[&username])
            .await
            .map_err(query_error)?;
        Ok(row.as_ref().map(record_from_row))
    }

    async fn scan_page(
        &self,
        after_id: RecordId,
        limit: usize,
    ) -> VouchResult<Vec<IdentityRecord>> {
        let conn = self.get_conn().await?;
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = conn
            .query(SCAN_PAGE, &[&after_id, &limit])
            .await
            .map_err(query_error)?;
        Ok(rows.iter().map(record_from_row).collect())
    }

    async fn bulk_insert(&self, identities: &[NewIdentity]) -> VouchResult<u64> {
        if identities.is_empty() {
            return Ok(0);
        }

        let sql = bulk_insert_sql(identities.len());
        let hashes: Vec<&[u8]> = identities
            .iter()
            .map(|i| i.credential_hash.as_bytes())
            .collect();
        let mut params: Vec<&(dyn ToSql + Sync)> = Vec::with_capacity(identities.len() * 2);
        for (identity, hash) in identities.iter().zip(hashes.iter()) {
            params.push(&identity.username);
            params.push(hash);
        }

        let mut conn = self.get_conn().await?;
        // Rolled back on drop unless committed.
        let tx = conn.transaction().await.map_err(query_error)?;
        let inserted = tx.execute(sql.as_str(), &params).await.map_err(insert_error)?;
        tx.commit().await.map_err(insert_error)?;

        Ok(inserted)
    }

    async fn max_sequence_value(&self) -> VouchResult<u64> {
        let conn = self.get_conn().await?;
        let row = conn.query_one(MAX_SEQUENCE, &[]).await.map_err(query_error)?;
        let max: i64 = row.get(0);
        Ok(u64::try_from(max).unwrap_or(0))
    }
}
