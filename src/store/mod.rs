//! Token Store
//!
//! Token issuance and the cache indices behind it.

mod keys;

pub mod index;
pub mod token_store;

pub use index::IndexManager;
pub use token_store::{create_token_store, StoreComponents, TokenStore};
