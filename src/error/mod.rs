//! Token Store Error Types
//!
//! Error hierarchy for token issuance, indexing and revocation.
//!
//! Lookup misses are never errors: every read returns `Option` and callers map
//! `None` to a generic "invalid or expired credential" response.

use std::time::Duration;
use thiserror::Error;

/// Root error type for the token store.
#[derive(Error, Debug)]
pub enum TokenStoreError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(#[from] ArgumentError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] SerializationError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("Grant error: {0}")]
    Grant(#[from] GrantError),
}

impl TokenStoreError {
    /// Get error code for telemetry.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidArgument(_) => "TOKEN_STORE_ARGUMENT",
            Self::Serialization(_) => "TOKEN_STORE_SERIALIZATION",
            Self::Cache(_) => "TOKEN_STORE_CACHE",
            Self::Configuration(_) => "TOKEN_STORE_CONFIG",
            Self::Grant(_) => "TOKEN_STORE_GRANT",
        }
    }

    /// Check if the failed call may succeed when repeated.
    ///
    /// The store itself never retries; this only informs the caller.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Cache(e) => e.is_retryable(),
            _ => false,
        }
    }

    /// Check if the caller has to authenticate again.
    pub fn needs_reauth(&self) -> bool {
        matches!(self, Self::Grant(_))
    }
}

/// Caller supplied an unusable argument.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ArgumentError {
    #[error("Token value must not be empty")]
    EmptyTokenValue,

    #[error("Authentication principal must not be empty")]
    EmptyPrincipal,

    #[error("Validity of {validity_secs}s is out of range")]
    InvalidValidity { validity_secs: u64 },
}

/// Codec failure while encoding or decoding a stored blob.
#[derive(Error, Debug)]
pub enum SerializationError {
    #[error("Encode failed: {message}")]
    EncodeFailed { message: String },

    #[error("Decode failed: {message}")]
    DecodeFailed { message: String },

    #[error("Stored value is not valid UTF-8")]
    InvalidUtf8,
}

/// Backing cache failure, propagated unmodified.
#[derive(Error, Debug, Clone)]
pub enum CacheError {
    #[error("Connection failed: {message}")]
    ConnectionFailed { message: String },

    #[error("Cache operation timed out after {timeout:?}")]
    Timeout { timeout: Duration },

    #[error("Cache command failed: {message}")]
    CommandFailed { message: String },
}

impl CacheError {
    /// Check if error is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ConnectionFailed { .. } | Self::Timeout { .. })
    }
}

/// Invalid store configuration.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigurationError {
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    #[error("Invalid key prefix: {prefix:?}")]
    InvalidKeyPrefix { prefix: String },

    #[error("Digest algorithm unavailable: {algorithm}")]
    DigestUnavailable { algorithm: String },
}

/// Refresh grant rejection.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GrantError {
    #[error("Invalid or expired refresh token")]
    InvalidGrant,
}

/// Result type for token store operations.
pub type TokenStoreResult<T> = Result<T, TokenStoreError>;

/// Get user-facing error message.
///
/// Never reveals which index lookup failed.
pub fn get_user_message(error: &TokenStoreError) -> String {
    match error {
        TokenStoreError::Grant(_) | TokenStoreError::InvalidArgument(_) => {
            "Invalid or expired credential.".to_string()
        }
        TokenStoreError::Cache(e) if e.is_retryable() => {
            "The authentication service is temporarily unavailable. Please try again later."
                .to_string()
        }
        _ => "An authentication error occurred. Please try again.".to_string(),
    }
}
