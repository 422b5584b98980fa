//! Refresh Token Grant
//!
//! RFC 6749 Section 6 - Refreshing an Access Token.
//!
//! Refresh tokens are single-use: a successful grant consumes the presented
//! refresh token and the access token it points at before re-issuing.

use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use tracing::{info, warn};

use crate::cache::CacheService;
use crate::core::Serializer;
use crate::error::{ArgumentError, GrantError, TokenStoreError};
use crate::store::TokenStore;
use crate::types::{AccessToken, Authentication, RequestContext};

/// Refresh grant interface.
#[async_trait]
pub trait RefreshTokenGrant: Send + Sync {
    /// Exchange a refresh token value for a new token pair.
    async fn refresh(
        &self,
        refresh_value: &str,
        context: &RequestContext,
    ) -> Result<AccessToken, TokenStoreError>;
}

/// Refresh grant over a token store.
pub struct RefreshTokenGrantImpl<C, S, A> {
    store: Arc<TokenStore<C, S, A>>,
    access_validity_secs: u64,
    refresh_validity_secs: u64,
}

impl<C, S, A> RefreshTokenGrantImpl<C, S, A>
where
    C: CacheService,
    S: Serializer,
    A: Authentication,
{
    /// Create refresh grant issuing with the store's configured validities.
    pub fn new(store: Arc<TokenStore<C, S, A>>) -> Self {
        let config = store.config();
        let access_validity_secs = config.access_token_validity.as_secs();
        let refresh_validity_secs = config.refresh_token_validity.as_secs();
        Self {
            store,
            access_validity_secs,
            refresh_validity_secs,
        }
    }

    /// Override validities of re-issued tokens.
    pub fn with_validities(mut self, access_secs: u64, refresh_secs: u64) -> Self {
        self.access_validity_secs = access_secs;
        self.refresh_validity_secs = refresh_secs;
        self
    }

    fn reject(&self, reason: &str) -> TokenStoreError {
        warn!(realm = self.store.realm(), reason, "Rejected refresh grant");
        self.store
            .metrics()
            .record_refresh_grant(self.store.realm(), false);
        GrantError::InvalidGrant.into()
    }
}

#[async_trait]
impl<C, S, A> RefreshTokenGrant for RefreshTokenGrantImpl<C, S, A>
where
    C: CacheService,
    S: Serializer,
    A: Authentication,
{
    async fn refresh(
        &self,
        refresh_value: &str,
        context: &RequestContext,
    ) -> Result<AccessToken, TokenStoreError> {
        if refresh_value.is_empty() {
            return Err(ArgumentError::EmptyTokenValue.into());
        }

        let authentication = match self
            .store
            .read_authentication_for_refresh_token(refresh_value)
            .await?
        {
            Some(authentication) => authentication,
            None => return Err(self.reject("unknown refresh token")),
        };

        let expired = match self.store.read_refresh_token(refresh_value).await? {
            Some(refresh) => refresh.is_expired_at(self.store.now()),
            None => true,
        };
        if expired {
            return Err(self.reject("expired refresh token"));
        }

        self.store
            .remove_access_token_using_refresh_token(refresh_value)
            .await?;
        self.store.remove_refresh_token(refresh_value).await?;

        let token = self
            .store
            .create_token(
                &authentication,
                context,
                self.access_validity_secs,
                self.refresh_validity_secs,
            )
            .await?;

        self.store
            .metrics()
            .record_refresh_grant(self.store.realm(), true);
        info!(realm = self.store.realm(), "Refresh grant served");
        Ok(token)
    }
}

/// Mock refresh grant for testing.
#[derive(Default)]
pub struct MockRefreshTokenGrant {
    request_history: Mutex<Vec<(String, RequestContext)>>,
    next_token: Mutex<Option<AccessToken>>,
    next_error: Mutex<Option<GrantError>>,
}

impl MockRefreshTokenGrant {
    /// Create new mock grant.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set next token to return.
    pub fn set_next_token(&self, token: AccessToken) -> &Self {
        *self.next_token.lock().unwrap() = Some(token);
        self
    }

    /// Set next error.
    pub fn set_next_error(&self, error: GrantError) -> &Self {
        *self.next_error.lock().unwrap() = Some(error);
        self
    }

    /// Get request history.
    pub fn get_request_history(&self) -> Vec<(String, RequestContext)> {
        self.request_history.lock().unwrap().clone()
    }
}

#[async_trait]
impl RefreshTokenGrant for MockRefreshTokenGrant {
    async fn refresh(
        &self,
        refresh_value: &str,
        context: &RequestContext,
    ) -> Result<AccessToken, TokenStoreError> {
        self.request_history
            .lock()
            .unwrap()
            .push((refresh_value.to_string(), context.clone()));

        if let Some(error) = self.next_error.lock().unwrap().take() {
            return Err(error.into());
        }

        self.next_token
            .lock()
            .unwrap()
            .take()
            .ok_or_else(|| GrantError::InvalidGrant.into())
    }
}

/// Create refresh grant over a token store.
pub fn create_refresh_token_grant<C, S, A>(
    store: Arc<TokenStore<C, S, A>>,
) -> RefreshTokenGrantImpl<C, S, A>
where
    C: CacheService,
    S: Serializer,
    A: Authentication,
{
    RefreshTokenGrantImpl::new(store)
}

/// Create mock refresh grant for testing.
pub fn create_mock_refresh_token_grant() -> MockRefreshTokenGrant {
    MockRefreshTokenGrant::new()
}
