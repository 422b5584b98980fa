//! Cache Token Store
//!
//! Cache-backed OAuth2 token issuance and indexing.
//!
//! # Features
//!
//! - Opaque bearer access/refresh token pairs (RFC 6749 Section 1.4, 1.5)
//! - One current access token per session fingerprint (principal + client IP)
//! - Token reuse, refresh attachment and expired-token replacement on issuance
//! - Revocation of access tokens, refresh tokens and whole sessions
//! - Single-use refresh token rotation (RFC 6749 Section 6)
//! - Key prefixes isolating token realms in one shared cache
//!
//! # Example
//!
//! ```rust,ignore
//! use cache_token_store::{
//!     create_token_store, token_store_config, InMemoryCacheService, RequestContext,
//!     UserAuthentication,
//! };
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = token_store_config()
//!         .key_prefix("user:")
//!         .access_token_validity(Duration::from_secs(3600))
//!         .build()?;
//!
//!     let store = create_token_store(InMemoryCacheService::new(), config);
//!
//!     let auth = UserAuthentication::new("alice").authority("ROLE_USER");
//!     let ctx = RequestContext::with_client_ip("203.0.113.7");
//!     let token = store.issue_token(&auth, &ctx).await?;
//!
//!     println!("Authorization: {}", token.authorization_header());
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! - `types`: tokens, authentication, request context and configuration
//! - `error`: error hierarchy
//! - `core`: clock, fingerprinting, token values and serialization
//! - `cache`: the key/value store the indices live in
//! - `store`: index manager and token store facade
//! - `flows`: grant handlers built on the store
//! - `builders`: fluent configuration builder
//! - `telemetry`: metrics sink

pub mod builders;
pub mod cache;
pub mod core;
pub mod error;
pub mod flows;
pub mod store;
pub mod telemetry;
pub mod types;

// Re-export builders
pub use builders::{token_store_config, TokenStoreConfigBuilder};

// Re-export errors
pub use error::{
    get_user_message, ArgumentError, CacheError, ConfigurationError, GrantError,
    SerializationError, TokenStoreError, TokenStoreResult,
};

// Re-export types
pub use types::{
    // Token
    AccessToken, AsTokenValue, RefreshToken, TokenType,
    // Auth
    Authentication, Fingerprint, RequestContext, StoredAuthentication, UserAuthentication,
    // Config
    FingerprintAlgorithm, TokenStoreConfig,
};

// Re-export core components
pub use core::{
    // Clock
    Clock, MockClock, SystemClock,
    // Fingerprint
    DefaultFingerprintGenerator, FingerprintGenerator, MockFingerprintGenerator,
    // Token values
    DefaultTokenValueGenerator, MockTokenValueGenerator, TokenValueGenerator,
    // Serialization
    JsonSerializer, Serializer,
};

// Re-export cache
pub use cache::{CacheService, InMemoryCacheService, MockCacheService};

// Re-export store
pub use store::{create_token_store, IndexManager, StoreComponents, TokenStore};

// Re-export flows
pub use flows::{
    create_refresh_token_grant, MockRefreshTokenGrant, RefreshTokenGrant, RefreshTokenGrantImpl,
};

// Re-export telemetry
pub use telemetry::{
    create_in_memory_metrics, no_op_metrics, InMemoryMetrics, MetricEntry, NoOpMetrics,
    TokenStoreMetrics,
};
