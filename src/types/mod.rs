//! Token Store Types
//!
//! Core type definitions for token issuance and indexing.

pub mod auth;
pub mod config;
pub mod token;

pub use auth::*;
pub use config::*;
pub use token::*;
