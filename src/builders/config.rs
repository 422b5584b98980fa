//! Configuration Builder
//!
//! Fluent builder for token store configuration.

use std::time::Duration;

use crate::error::{ConfigurationError, TokenStoreError};
use crate::types::{FingerprintAlgorithm, TokenStoreConfig, MIN_TOKEN_VALUE_LENGTH};

/// Token store configuration builder.
#[derive(Default)]
pub struct TokenStoreConfigBuilder {
    key_prefix: Option<String>,
    access_token_validity: Option<Duration>,
    refresh_token_validity: Option<Duration>,
    fingerprint_algorithm: Option<FingerprintAlgorithm>,
    token_value_length: Option<usize>,
}

impl TokenStoreConfigBuilder {
    /// Create new configuration builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the cache key prefix (token realm).
    pub fn key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = Some(prefix.into());
        self
    }

    /// Set default access token validity.
    pub fn access_token_validity(mut self, validity: Duration) -> Self {
        self.access_token_validity = Some(validity);
        self
    }

    /// Set default refresh token validity.
    pub fn refresh_token_validity(mut self, validity: Duration) -> Self {
        self.refresh_token_validity = Some(validity);
        self
    }

    /// Set fingerprint digest algorithm.
    pub fn fingerprint_algorithm(mut self, algorithm: FingerprintAlgorithm) -> Self {
        self.fingerprint_algorithm = Some(algorithm);
        self
    }

    /// Set number of random bytes per token value.
    pub fn token_value_length(mut self, length: usize) -> Self {
        self.token_value_length = Some(length);
        self
    }

    /// Build the token store configuration.
    pub fn build(self) -> Result<TokenStoreConfig, TokenStoreError> {
        let defaults = TokenStoreConfig::default();

        let key_prefix = self.key_prefix.unwrap_or(defaults.key_prefix);
        if key_prefix
            .chars()
            .any(|c| c.is_whitespace() || c.is_control())
        {
            return Err(ConfigurationError::InvalidKeyPrefix { prefix: key_prefix }.into());
        }

        let access_token_validity = self
            .access_token_validity
            .unwrap_or(defaults.access_token_validity);
        let refresh_token_validity = self
            .refresh_token_validity
            .unwrap_or(defaults.refresh_token_validity);

        if access_token_validity.as_secs() == 0 {
            return Err(ConfigurationError::InvalidConfig {
                message: "access_token_validity must be at least one second".to_string(),
            }
            .into());
        }
        if refresh_token_validity.as_secs() == 0 {
            return Err(ConfigurationError::InvalidConfig {
                message: "refresh_token_validity must be at least one second".to_string(),
            }
            .into());
        }

        let token_value_length = self
            .token_value_length
            .unwrap_or(defaults.token_value_length);
        if token_value_length < MIN_TOKEN_VALUE_LENGTH {
            return Err(ConfigurationError::InvalidConfig {
                message: format!(
                    "token_value_length must be at least {} bytes",
                    MIN_TOKEN_VALUE_LENGTH
                ),
            }
            .into());
        }

        Ok(TokenStoreConfig {
            key_prefix,
            access_token_validity,
            refresh_token_validity,
            fingerprint_algorithm: self
                .fingerprint_algorithm
                .unwrap_or(defaults.fingerprint_algorithm),
            token_value_length,
        })
    }
}

/// Create a new token store configuration builder.
pub fn token_store_config() -> TokenStoreConfigBuilder {
    TokenStoreConfigBuilder::new()
}
