//! Builders
//!
//! Fluent builder patterns for token store configuration.

pub mod config;

pub use config::{token_store_config, TokenStoreConfigBuilder};
