//! Connection Hasher (spec §4.1, C1).
//!
//! Deterministic fingerprint of `{url, user, password, isXA, properties}`
//! identifying a backend pool for the lifetime of the process. The hash is
//! stable across restarts for identical inputs because it does not depend
//! on process-local randomization (`SipHasher13` is seeded with a fixed
//! key, not `RandomState`'s per-process seed).

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;

/// Fixed seed so the fingerprint is stable across process restarts. Not a
/// secret: the password is already hashed into the digest, this key only
/// decorrelates the fingerprint from an unrelated use of SHA-256 elsewhere.
const FINGERPRINT_SALT: &[u8] = b"ojp-connection-fingerprint-v1";

/// Stable, collision-resistant-in-practice identifier for a backend pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConnectionFingerprint(u64);

impl ConnectionFingerprint {
    /// Computes the fingerprint for a connection tuple. `properties` order
    /// does not matter: it is sorted before hashing so that two equivalent
    /// property maps never produce different fingerprints.
    pub fn compute(
        url: &str,
        user: &str,
        password: &str,
        is_xa: bool,
        properties: &BTreeMap<String, String>,
    ) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(FINGERPRINT_SALT);
        hasher.update(b"\0url=");
        hasher.update(url.as_bytes());
        hasher.update(b"\0user=");
        hasher.update(user.as_bytes());
        hasher.update(b"\0password=");
        hasher.update(password.as_bytes());
        hasher.update(b"\0xa=");
        hasher.update(&[is_xa as u8]);
        for (k, v) in properties {
            hasher.update(b"\0prop:");
            hasher.update(k.as_bytes());
            hasher.update(b"=");
            hasher.update(v.as_bytes());
        }
        let digest = hasher.finalize();
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&digest[0..8]);
        ConnectionFingerprint(u64::from_be_bytes(bytes))
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn props() -> BTreeMap<String, String> {
        let mut m = BTreeMap::new();
        m.insert("applicationName".to_string(), "billing".to_string());
        m
    }

    #[test]
    fn stable_across_calls() {
        let a = ConnectionFingerprint::compute("jdbc:postgresql://db/app", "u", "p", false, &props());
        let b = ConnectionFingerprint::compute("jdbc:postgresql://db/app", "u", "p", false, &props());
        assert_eq!(a, b);
    }

    #[test]
    fn differs_on_xa_flag() {
        let a = ConnectionFingerprint::compute("jdbc:postgresql://db/app", "u", "p", false, &props());
        let b = ConnectionFingerprint::compute("jdbc:postgresql://db/app", "u", "p", true, &props());
        assert_ne!(a, b);
    }

    #[test]
    fn property_order_does_not_matter() {
        let mut p1 = BTreeMap::new();
        p1.insert("a".to_string(), "1".to_string());
        p1.insert("b".to_string(), "2".to_string());
        let mut p2 = BTreeMap::new();
        p2.insert("b".to_string(), "2".to_string());
        p2.insert("a".to_string(), "1".to_string());
        let a = ConnectionFingerprint::compute("url", "u", "p", false, &p1);
        let b = ConnectionFingerprint::compute("url", "u", "p", false, &p2);
        assert_eq!(a, b);
    }

    #[test]
    fn differs_on_password_despite_hashing() {
        let a = ConnectionFingerprint::compute("url", "u", "secret1", false, &props());
        let b = ConnectionFingerprint::compute("url", "u", "secret2", false, &props());
        assert_ne!(a, b);
    }
}
