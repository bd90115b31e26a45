//! Namespaced cache keys.
//!
//! A [`CacheKey`] can only be built from a namespace prefix and a username,
//! so identity entries never collide with other tenants of the same cache.

use std::fmt;

/// A cache key scoped to a namespace prefix.
///
/// The encoded form is the prefix immediately followed by the username,
/// e.g. `auth:00000001@example.com`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    inner: KeyInner,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct KeyInner {
    encoded: String,
    prefix_len: usize,
}

impl CacheKey {
    pub fn new(prefix: &str, username: &str) -> Self {
        let mut encoded = String::with_capacity(prefix.len() + username.len());
        encoded.push_str(prefix);
        encoded.push_str(username);
        Self {
            inner: KeyInner {
                encoded,
                prefix_len: prefix.len(),
            },
        }
    }

    pub fn prefix(&self) -> &str {
        &self.inner.encoded[..self.inner.prefix_len]
    }

    pub fn username(&self) -> &str {
        &self.inner.encoded[self.inner.prefix_len..]
    }

    pub fn as_str(&self) -> &str {
        &self.inner.encoded
    }

    /// Byte encoding used by binary backends.
    pub fn encode(&self) -> &[u8] {
        self.inner.encoded.as_bytes()
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.inner.encoded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_layout() {
        let key = CacheKey::new("auth:", "00000001@example.com");
        assert_eq!(key.as_str(), "auth:00000001@example.com");
        assert_eq!(key.prefix(), "auth:");
        assert_eq!(key.username(), "00000001@example.com");
        assert_eq!(key.encode(), b"auth:00000001@example.com");
    }

    #[test]
    fn test_prefixes_isolate_keys() {
        let a = CacheKey::new("auth:", "bob@example.com");
        let b = CacheKey::new("session:", "bob@example.com");
        assert_ne!(a, b);
        assert_eq!(a.username(), b.username());
    }

    #[test]
    fn test_empty_prefix() {
        let key = CacheKey::new("", "carol");
        assert_eq!(key.prefix(), "");
        assert_eq!(key.to_string(), "carol");
    }

    mod props {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn prop_key_splits_back_into_parts(
                prefix in "[a-z]{0,8}:?",
                username in "[a-z0-9._@-]{1,32}",
            ) {
                let key = CacheKey::new(&prefix, &username);
                prop_assert_eq!(key.prefix(), prefix.as_str());
                prop_assert_eq!(key.username(), username.as_str());
                prop_assert_eq!(key.encode().len(), prefix.len() + username.len());
            }
        }
    }
}
