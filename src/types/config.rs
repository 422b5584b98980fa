//! Configuration Types
//!
//! Token store configuration.

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigurationError;

/// Token store configuration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TokenStoreConfig {
    /// Prepended to every physical cache key; isolates token realms sharing one cache.
    pub key_prefix: String,
    /// Default access token validity used by `issue_token`.
    pub access_token_validity: Duration,
    /// Default refresh token validity used by `issue_token`.
    pub refresh_token_validity: Duration,
    /// Digest used for session fingerprints.
    pub fingerprint_algorithm: FingerprintAlgorithm,
    /// Random bytes per token value.
    pub token_value_length: usize,
}

impl Default for TokenStoreConfig {
    fn default() -> Self {
        Self {
            key_prefix: String::new(),
            access_token_validity: Duration::from_secs(DEFAULT_ACCESS_TOKEN_VALIDITY_SECS),
            refresh_token_validity: Duration::from_secs(DEFAULT_REFRESH_TOKEN_VALIDITY_SECS),
            fingerprint_algorithm: FingerprintAlgorithm::default(),
            token_value_length: DEFAULT_TOKEN_VALUE_LENGTH,
        }
    }
}

/// Fingerprint digest algorithm.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FingerprintAlgorithm {
    /// 128-bit, 32 hex characters.
    #[default]
    Md5,
    /// 256-bit, 64 hex characters.
    Sha256,
}

impl FingerprintAlgorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Md5 => "md5",
            Self::Sha256 => "sha256",
        }
    }

    /// Length of the rendered hex digest.
    pub fn hex_len(&self) -> usize {
        match self {
            Self::Md5 => 32,
            Self::Sha256 => 64,
        }
    }
}

impl FromStr for FingerprintAlgorithm {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "md5" => Ok(Self::Md5),
            "sha256" | "sha-256" => Ok(Self::Sha256),
            _ => Err(ConfigurationError::DigestUnavailable {
                algorithm: s.to_string(),
            }),
        }
    }
}

/// Default configuration values.
pub const DEFAULT_ACCESS_TOKEN_VALIDITY_SECS: u64 = 60 * 60 * 12;
pub const DEFAULT_REFRESH_TOKEN_VALIDITY_SECS: u64 = 60 * 60 * 24 * 30;
pub const DEFAULT_TOKEN_VALUE_LENGTH: usize = 20;
pub const MIN_TOKEN_VALUE_LENGTH: usize = 16;
