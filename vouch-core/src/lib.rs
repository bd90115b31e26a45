//! VOUCH Core - Identity Types
//!
//! Pure data structures shared by the storage and service crates: identity
//! records, cursor and range arithmetic, the error taxonomy and
//! configuration. This crate performs no I/O.

pub mod config;
pub mod constants;
pub mod cursor;
pub mod error;
pub mod identity;

pub use config::{CacheSettings, DatabaseSettings, PrecacheSettings, SeederSettings, VouchConfig};
pub use cursor::{partition, BatchCursor, PageStep, Partition, SequenceRange, CURSOR_START};
pub use error::{
    CacheError, ConfigError, StorageError, ValidationError, VouchError, VouchResult,
};
pub use identity::{
    parse_sequence, seed_username, CredentialHash, IdentityRecord, NewIdentity, RecordId,
    Timestamp,
};
