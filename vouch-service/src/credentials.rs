//! Credential hashing.
//!
//! Hashes are Argon2id PHC strings (`$argon2id$v=19$...`) stored as raw
//! bytes. Hashing is CPU-bound; async callers should go through
//! [`hash_blocking`].

use std::sync::Arc;

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use vouch_core::{CredentialHash, ValidationError, VouchError, VouchResult};

/// One-way password hashing.
pub trait CredentialHasher: Send + Sync {
    /// Hash `plaintext` with a fresh random salt.
    fn hash(&self, plaintext: &str) -> VouchResult<CredentialHash>;

    /// Check `plaintext` against a stored hash.
    fn verify(&self, plaintext: &str, hash: &CredentialHash) -> VouchResult<bool>;
}

/// Argon2id with default parameters.
#[derive(Default, Clone)]
pub struct Argon2Hasher {
    argon2: Argon2<'static>,
}

impl Argon2Hasher {
    pub fn new() -> Self {
        Self::default()
    }
}

fn hash_error(e: argon2::password_hash::Error) -> VouchError {
    ValidationError::InvalidValue {
        field: "credential".to_string(),
        reason: e.to_string(),
    }
    .into()
}

impl CredentialHasher for Argon2Hasher {
    fn hash(&self, plaintext: &str) -> VouchResult<CredentialHash> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = self
            .argon2
            .hash_password(plaintext.as_bytes(), &salt)
            .map_err(hash_error)?;
        Ok(CredentialHash::from(hash.to_string().into_bytes()))
    }

    fn verify(&self, plaintext: &str, hash: &CredentialHash) -> VouchResult<bool> {
        let encoded = std::str::from_utf8(hash.as_bytes()).map_err(|e| {
            VouchError::from(ValidationError::InvalidValue {
                field: "credential".to_string(),
                reason: e.to_string(),
            })
        })?;
        let parsed = PasswordHash::new(encoded).map_err(hash_error)?;
        match self.argon2.verify_password(plaintext.as_bytes(), &parsed) {
            Ok(()) => Ok(true),
            Err(argon2::password_hash::Error::Password) => Ok(false),
            Err(e) => Err(hash_error(e)),
        }
    }
}

/// Hash on the blocking pool so runtime workers stay free.
pub async fn hash_blocking<H: CredentialHasher + 'static>(
    hasher: Arc<H>,
    plaintext: String,
) -> VouchResult<CredentialHash> {
    tokio::task::spawn_blocking(move || hasher.hash(&plaintext))
        .await
        .map_err(|e| {
            VouchError::from(ValidationError::InvalidValue {
                field: "credential".to_string(),
                reason: format!("hashing task failed: {}", e),
            })
        })?
}
