//! Grant Flows
//!
//! Grant handlers built on the token store.
//!
//! - **Refresh Token Grant** (RFC 6749 Section 6): single-use refresh token rotation

pub mod refresh;

pub use refresh::{
    create_mock_refresh_token_grant, create_refresh_token_grant, MockRefreshTokenGrant,
    RefreshTokenGrant, RefreshTokenGrantImpl,
};
