//! Hashing utilities for voter fingerprints and admin credentials.
//!
//! # Examples
//!
//! ```
//! use tally_common::crypto::Fingerprinter;
//!
//! let fingerprinter = Fingerprinter::new("salt");
//! let a = fingerprinter.fingerprint("203.0.113.7", "Mozilla/5.0");
//! let b = fingerprinter.fingerprint("203.0.113.7", "Mozilla/5.0");
//! assert_eq!(a, b);
//! assert_eq!(a.len(), 64);
//! ```

use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

type HmacSha256 = Hmac<Sha256>;

/// Separator placed between the fingerprint inputs.
const FINGERPRINT_DELIMITER: char = '|';

/// Derives voter fingerprints from client attributes and a server-side salt.
#[derive(Clone)]
pub struct Fingerprinter {
    salt: String,
}

impl std::fmt::Debug for Fingerprinter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Fingerprinter").finish_non_exhaustive()
    }
}

impl Fingerprinter {
    /// Create a fingerprinter with the given salt.
    #[must_use]
    pub fn new(salt: impl Into<String>) -> Self {
        Self { salt: salt.into() }
    }

    /// SHA-256 of `ip|user_agent|salt` as lowercase hex.
    ///
    /// Empty inputs are hashed as-is.
    #[must_use]
    pub fn fingerprint(&self, ip: &str, user_agent: &str) -> String {
        let raw = format!(
            "{ip}{FINGERPRINT_DELIMITER}{user_agent}{FINGERPRINT_DELIMITER}{}",
            self.salt
        );
        hex::encode(Sha256::digest(raw.as_bytes()))
    }
}

/// Compares a presented credential against the configured secret.
///
/// Both sides are run through HMAC and compared with `verify_slice`, so the
/// comparison time does not depend on where the inputs first differ.
#[derive(Clone)]
pub struct SecretMatcher {
    key: Vec<u8>,
    expected: Vec<u8>,
}

impl std::fmt::Debug for SecretMatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretMatcher").finish_non_exhaustive()
    }
}

impl SecretMatcher {
    /// Create a matcher for `secret`. `key` only needs to be stable for the process.
    #[must_use]
    pub fn new(secret: &str, key: &[u8]) -> Self {
        let expected = Self::mac(key, secret)
            .map(|mac| mac.finalize().into_bytes().to_vec())
            .unwrap_or_default();
        Self {
            key: key.to_vec(),
            expected,
        }
    }

    fn mac(key: &[u8], value: &str) -> Option<HmacSha256> {
        let mut mac = HmacSha256::new_from_slice(key).ok()?;
        mac.update(value.as_bytes());
        Some(mac)
    }

    /// Whether `candidate` equals the secret.
    #[must_use]
    pub fn matches(&self, candidate: &str) -> bool {
        Self::mac(&self.key, candidate).is_some_and(|mac| mac.verify_slice(&self.expected).is_ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fingerprint_is_deterministic() {
        let f = Fingerprinter::new("salt");
        assert_eq!(
            f.fingerprint("10.0.0.1", "curl/8.0"),
            f.fingerprint("10.0.0.1", "curl/8.0")
        );
    }

    #[test]
    fn test_fingerprint_depends_on_salt() {
        let a = Fingerprinter::new("salt-a").fingerprint("10.0.0.1", "curl/8.0");
        let b = Fingerprinter::new("salt-b").fingerprint("10.0.0.1", "curl/8.0");
        assert_ne!(a, b);
    }

    #[test]
    fn test_fingerprint_depends_on_client() {
        let f = Fingerprinter::new("salt");
        assert_ne!(
            f.fingerprint("10.0.0.1", "curl/8.0"),
            f.fingerprint("10.0.0.2", "curl/8.0")
        );
        assert_ne!(
            f.fingerprint("10.0.0.1", "curl/8.0"),
            f.fingerprint("10.0.0.1", "curl/8.1")
        );
    }

    #[test]
    fn test_fingerprint_known_value() {
        // sha256("1.2.3.4|ua|s")
        let expected = hex::encode(Sha256::digest(b"1.2.3.4|ua|s"));
        assert_eq!(Fingerprinter::new("s").fingerprint("1.2.3.4", "ua"), expected);
    }

    #[test]
    fn test_fingerprint_accepts_empty_inputs() {
        let f = Fingerprinter::new("salt");
        let fp = f.fingerprint("", "");
        assert_eq!(fp.len(), 64);
        assert_eq!(fp, f.fingerprint("", ""));
    }

    #[test]
    fn test_secret_matcher() {
        let matcher = SecretMatcher::new("changeme", b"process-key");
        assert!(matcher.matches("changeme"));
        assert!(!matcher.matches("changeme "));
        assert!(!matcher.matches(""));
        assert!(!matcher.matches("wrong"));
    }
}
