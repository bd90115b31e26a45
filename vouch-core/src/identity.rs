//! Identity record types and the synthetic username codec.

use chrono::{DateTime, Utc};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Store-assigned record identifier. Monotonic and immutable once created.
pub type RecordId = i64;

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;

/// Opaque credential hash bytes.
///
/// The core never interprets these bytes; they are produced by a
/// `CredentialHasher` and verified by the authentication layer. In cache
/// payloads the hash is encoded as a lowercase hex string.
#[derive(Clone, Default, PartialEq, Eq, Hash)]
pub struct CredentialHash(Vec<u8>);

impl CredentialHash {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<u8>> for CredentialHash {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

impl From<&str> for CredentialHash {
    fn from(value: &str) -> Self {
        Self(value.as_bytes().to_vec())
    }
}

// Never print hash material, only its size.
impl fmt::Debug for CredentialHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CredentialHash({} bytes)", self.0.len())
    }
}

impl Serialize for CredentialHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(&self.0))
    }
}

impl<'de> Deserialize<'de> for CredentialHash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        hex::decode(&encoded)
            .map(CredentialHash)
            .map_err(|e| de::Error::custom(format!("invalid credential hash: {}", e)))
    }
}

/// A persisted identity record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityRecord {
    pub id: RecordId,
    pub username: String,
    pub credential_hash: CredentialHash,
    pub created_at: Timestamp,
}

impl IdentityRecord {
    /// Sequence number encoded in the username, if it is a seeded username.
    pub fn sequence(&self) -> Option<u64> {
        parse_sequence(&self.username)
    }
}

/// Insert payload for a new identity. The store assigns `id` and `created_at`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewIdentity {
    pub username: String,
    pub credential_hash: CredentialHash,
}

impl NewIdentity {
    pub fn new(username: impl Into<String>, credential_hash: CredentialHash) -> Self {
        Self {
            username: username.into(),
            credential_hash,
        }
    }
}

/// Build the synthetic username for a seeder sequence number.
///
/// Format: zero-padded to eight digits, then `@domain`. Sequences wider than
/// eight digits are printed in full.
pub fn seed_username(sequence: u64, domain: &str) -> String {
    format!("{:08}@{}", sequence, domain)
}

/// Extract the sequence number from a seeded username.
///
/// Returns `None` when the local part is empty or not purely numeric, so
/// hand-registered usernames never influence sequence allocation.
pub fn parse_sequence(username: &str) -> Option<u64> {
    let (local, _domain) = username.split_once('@')?;
    if local.is_empty() || !local.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    local.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seed_username_is_zero_padded() {
        assert_eq!(seed_username(1, "example.com"), "00000001@example.com");
        assert_eq!(seed_username(2500, "example.com"), "00002500@example.com");
        assert_eq!(seed_username(123_456_789, "x.io"), "123456789@x.io");
    }

    #[test]
    fn test_parse_sequence() {
        assert_eq!(parse_sequence("00000042@example.com"), Some(42));
        assert_eq!(parse_sequence("alice@example.com"), None);
        assert_eq!(parse_sequence("@example.com"), None);
        assert_eq!(parse_sequence("12345"), None);
        assert_eq!(parse_sequence("12a45@example.com"), None);
    }

    #[test]
    fn test_credential_hash_serializes_as_hex() {
        let record = IdentityRecord {
            id: 7,
            username: "00000007@example.com".to_string(),
            credential_hash: CredentialHash::new(vec![0xde, 0xad, 0xbe, 0xef]),
            created_at: Utc::now(),
        };

        let json = serde_json::to_value(&record).expect("serialize should succeed");
        assert_eq!(json["credential_hash"], "deadbeef");

        let decoded: IdentityRecord =
            serde_json::from_value(json).expect("deserialize should succeed");
        assert_eq!(decoded, record);
        assert_eq!(decoded.sequence(), Some(7));
    }

    #[test]
    fn test_credential_hash_rejects_bad_hex() {
        let json = serde_json::json!({
            "id": 1,
            "username": "bob@example.com",
            "credential_hash": "not-hex",
            "created_at": "2024-01-01T00:00:00Z",
        });
        assert!(serde_json::from_value::<IdentityRecord>(json).is_err());
    }

    #[test]
    fn test_credential_hash_debug_hides_bytes() {
        let hash = CredentialHash::from("secret-material");
        assert_eq!(format!("{:?}", hash), "CredentialHash(15 bytes)");
    }
}
