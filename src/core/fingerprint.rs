//! Fingerprint Generator
//!
//! Derives the session grouping key from a principal and its request context.
//! Identical `{principal, client_ip}` pairs always map to the same fingerprint.

use md5::Md5;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::sync::Mutex;

use crate::types::{Fingerprint, FingerprintAlgorithm, RequestContext};

const PRINCIPAL: &str = "principal";
const CLIENT_IP: &str = "client_ip";

/// Fingerprint generator interface (for dependency injection).
pub trait FingerprintGenerator: Send + Sync {
    /// Compute the fingerprint for a principal in a request context.
    fn extract_key(&self, principal: &str, context: &RequestContext) -> Fingerprint;
}

/// Default fingerprint generator: digest over the canonical attribute map.
pub struct DefaultFingerprintGenerator {
    algorithm: FingerprintAlgorithm,
}

impl DefaultFingerprintGenerator {
    /// Create MD5 fingerprint generator.
    pub fn new() -> Self {
        Self::with_algorithm(FingerprintAlgorithm::Md5)
    }

    /// Create fingerprint generator with a specific digest.
    pub fn with_algorithm(algorithm: FingerprintAlgorithm) -> Self {
        Self { algorithm }
    }

    pub fn algorithm(&self) -> FingerprintAlgorithm {
        self.algorithm
    }

    /// Canonical string form, e.g. `{client_ip=10.0.0.1, principal=alice}`.
    pub fn canonical_form(principal: &str, context: &RequestContext) -> String {
        let mut values = BTreeMap::new();
        values.insert(PRINCIPAL, principal);
        if let Some(ip) = context.client_ip.as_deref() {
            values.insert(CLIENT_IP, ip);
        }

        let body = values
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join(", ");
        format!("{{{}}}", body)
    }
}

impl Default for DefaultFingerprintGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl FingerprintGenerator for DefaultFingerprintGenerator {
    fn extract_key(&self, principal: &str, context: &RequestContext) -> Fingerprint {
        let canonical = Self::canonical_form(principal, context);
        let digest = match self.algorithm {
            FingerprintAlgorithm::Md5 => hex::encode(Md5::digest(canonical.as_bytes())),
            FingerprintAlgorithm::Sha256 => hex::encode(Sha256::digest(canonical.as_bytes())),
        };
        Fingerprint::new(digest)
    }
}

/// Mock fingerprint generator for testing.
///
/// Uses the principal (and IP) verbatim unless a fixed fingerprint is set,
/// which forces collisions between different principals.
#[derive(Default)]
pub struct MockFingerprintGenerator {
    fixed: Mutex<Option<Fingerprint>>,
    history: Mutex<Vec<(String, RequestContext)>>,
}

impl MockFingerprintGenerator {
    /// Create new mock fingerprint generator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Return this fingerprint for every principal.
    pub fn set_fixed(&self, fingerprint: Option<Fingerprint>) -> &Self {
        *self.fixed.lock().unwrap() = fingerprint;
        self
    }

    /// Get extract history.
    pub fn get_history(&self) -> Vec<(String, RequestContext)> {
        self.history.lock().unwrap().clone()
    }
}

impl FingerprintGenerator for MockFingerprintGenerator {
    fn extract_key(&self, principal: &str, context: &RequestContext) -> Fingerprint {
        self.history
            .lock()
            .unwrap()
            .push((principal.to_string(), context.clone()));

        if let Some(fixed) = self.fixed.lock().unwrap().clone() {
            return fixed;
        }

        match context.client_ip.as_deref() {
            Some(ip) => Fingerprint::new(format!("{}@{}", principal, ip)),
            None => Fingerprint::new(principal),
        }
    }
}

/// Create production fingerprint generator.
pub fn create_fingerprint_generator(algorithm: FingerprintAlgorithm) -> impl FingerprintGenerator {
    DefaultFingerprintGenerator::with_algorithm(algorithm)
}

/// Create mock fingerprint generator for testing.
pub fn create_mock_fingerprint_generator() -> MockFingerprintGenerator {
    MockFingerprintGenerator::new()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_form_is_ordered() {
        let ctx = RequestContext::with_client_ip("10.0.0.1");
        assert_eq!(
            DefaultFingerprintGenerator::canonical_form("alice", &ctx),
            "{client_ip=10.0.0.1, principal=alice}"
        );
        assert_eq!(
            DefaultFingerprintGenerator::canonical_form("alice", &RequestContext::empty()),
            "{principal=alice}"
        );
    }

    #[test]
    fn test_md5_fingerprint() {
        let generator = DefaultFingerprintGenerator::new();
        // md5("{principal=alice}")
        let expected = hex::encode(Md5::digest(b"{principal=alice}"));
        let fingerprint = generator.extract_key("alice", &RequestContext::empty());

        assert_eq!(fingerprint.as_str(), expected);
        assert_eq!(fingerprint.as_str().len(), 32);
        assert!(fingerprint
            .as_str()
            .chars()
            .all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn test_sha256_fingerprint_width() {
        let generator = DefaultFingerprintGenerator::with_algorithm(FingerprintAlgorithm::Sha256);
        let fingerprint = generator.extract_key("alice", &RequestContext::empty());
        assert_eq!(fingerprint.as_str().len(), FingerprintAlgorithm::Sha256.hex_len());
    }

    #[test]
    fn test_fingerprint_is_deterministic() {
        let generator = DefaultFingerprintGenerator::new();
        let ctx = RequestContext::with_client_ip("192.168.1.7");
        assert_eq!(
            generator.extract_key("alice", &ctx),
            generator.extract_key("alice", &ctx)
        );
    }

    #[test]
    fn test_fingerprint_depends_on_ip() {
        let generator = DefaultFingerprintGenerator::new();
        let a = generator.extract_key("alice", &RequestContext::with_client_ip("10.0.0.1"));
        let b = generator.extract_key("alice", &RequestContext::with_client_ip("10.0.0.2"));
        let c = generator.extract_key("bob", &RequestContext::with_client_ip("10.0.0.1"));
        assert_ne!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_mock_fixed_fingerprint() {
        let generator = MockFingerprintGenerator::new();
        generator.set_fixed(Some(Fingerprint::new("shared")));

        assert_eq!(
            generator.extract_key("alice", &RequestContext::empty()),
            generator.extract_key("bob", &RequestContext::empty())
        );
        assert_eq!(generator.get_history().len(), 2);
    }
}
