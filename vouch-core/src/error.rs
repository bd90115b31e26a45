//! Error types for VOUCH operations

use crate::cursor::SequenceRange;
use crate::identity::RecordId;
use thiserror::Error;

/// Durable store errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("Store unavailable: {reason}")]
    Unavailable { reason: String },

    #[error("Store operation timed out: {operation}")]
    Timeout { operation: String },

    #[error("Query failed: {reason}")]
    QueryFailed { reason: String },

    #[error("Write failed for sequence range {}: {reason}", range_label(.range))]
    WriteFailed {
        range: Option<SequenceRange>,
        reason: String,
    },

    #[error("Username already exists: {username}")]
    UniqueViolation { username: String },

    #[error("Storage lock poisoned")]
    LockPoisoned,
}

fn range_label(range: &Option<SequenceRange>) -> String {
    range.map(|r| r.to_string()).unwrap_or_else(|| "-".to_string())
}

/// Cache layer errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CacheError {
    #[error("Cache unavailable: {reason}")]
    Unavailable { reason: String },

    #[error("Cache operation timed out: {operation}")]
    Timeout { operation: String },

    #[error("Cache write failed for {entries} entries: {reason}")]
    WriteFailed { entries: usize, reason: String },

    #[error("Serialization error: {reason}")]
    Serialization { reason: String },

    #[error("Malformed cache payload for {key}: {reason}")]
    Deserialization { key: String, reason: String },
}

/// Validation errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Cursor regression: page contained id {observed} at or below last seen id {last_seen}")]
    CursorRegression {
        last_seen: RecordId,
        observed: RecordId,
    },
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required configuration field: {field}")]
    MissingRequired { field: String },

    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

/// Master error type for all VOUCH errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum VouchError {
    #[error("Identity not found: {username}")]
    NotFound { username: String },

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Precache sweep aborted after {processed} records: {source}")]
    SweepAborted {
        processed: u64,
        source: Box<VouchError>,
    },
}

impl VouchError {
    /// Whether the caller may safely retry the same operation.
    pub fn is_transient(&self) -> bool {
        match self {
            VouchError::Storage(StorageError::Unavailable { .. })
            | VouchError::Storage(StorageError::Timeout { .. })
            | VouchError::Cache(CacheError::Unavailable { .. })
            | VouchError::Cache(CacheError::Timeout { .. }) => true,
            VouchError::SweepAborted { source, .. } => source.is_transient(),
            _ => false,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, VouchError::NotFound { .. })
    }
}

/// Result type alias for VOUCH operations.
pub type VouchResult<T> = Result<T, VouchError>;

// =============================================================================
// TESTS
// =============================================================================
