//! Token Store
//!
//! Issues, reuses, looks up and revokes token pairs on top of the index
//! manager. One current access token is kept per session fingerprint.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::info;

use super::index::IndexManager;
use crate::cache::CacheService;
use crate::core::{
    Clock, DefaultFingerprintGenerator, DefaultTokenValueGenerator, FingerprintGenerator,
    JsonSerializer, Serializer, SystemClock, TokenValueGenerator,
};
use crate::error::{ArgumentError, TokenStoreResult};
use crate::telemetry::{NoOpMetrics, TokenStoreMetrics};
use crate::types::{
    AccessToken, AsTokenValue, Authentication, RefreshToken, RequestContext, TokenStoreConfig,
    MIN_TOKEN_VALUE_LENGTH,
};

/// Injectable collaborators of a token store.
#[derive(Clone)]
pub struct StoreComponents {
    pub fingerprints: Arc<dyn FingerprintGenerator>,
    pub token_values: Arc<dyn TokenValueGenerator>,
    pub clock: Arc<dyn Clock>,
    pub metrics: Arc<dyn TokenStoreMetrics>,
}

impl StoreComponents {
    /// Production components for a configuration.
    pub fn from_config(config: &TokenStoreConfig) -> Self {
        Self {
            fingerprints: Arc::new(DefaultFingerprintGenerator::with_algorithm(
                config.fingerprint_algorithm,
            )),
            token_values: Arc::new(DefaultTokenValueGenerator::with_length(
                config.token_value_length.max(MIN_TOKEN_VALUE_LENGTH),
            )),
            clock: Arc::new(SystemClock),
            metrics: Arc::new(NoOpMetrics),
        }
    }

    /// Replace the fingerprint generator.
    pub fn with_fingerprints(mut self, fingerprints: Arc<dyn FingerprintGenerator>) -> Self {
        self.fingerprints = fingerprints;
        self
    }

    /// Replace the token value generator.
    pub fn with_token_values(mut self, token_values: Arc<dyn TokenValueGenerator>) -> Self {
        self.token_values = token_values;
        self
    }

    /// Replace the clock.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Replace the metrics sink.
    pub fn with_metrics(mut self, metrics: Arc<dyn TokenStoreMetrics>) -> Self {
        self.metrics = metrics;
        self
    }
}

/// Token store facade.
///
/// Per fingerprint a session moves through no token, active, then expired or
/// revoked, and back to no token. Nothing locks that progression; two
/// concurrent [`create_token`](Self::create_token) calls for one fingerprint
/// may both mint, and the later write owns the fingerprint slot.
pub struct TokenStore<C, S, A> {
    index: IndexManager<C, S, A>,
    config: TokenStoreConfig,
    token_values: Arc<dyn TokenValueGenerator>,
    clock: Arc<dyn Clock>,
    metrics: Arc<dyn TokenStoreMetrics>,
}

impl<C, S, A> TokenStore<C, S, A>
where
    C: CacheService,
    S: Serializer,
    A: Authentication,
{
    /// Create token store with production components.
    pub fn new(cache: C, serializer: S, config: TokenStoreConfig) -> Self {
        let components = StoreComponents::from_config(&config);
        Self::with_components(cache, serializer, config, components)
    }

    /// Create token store with explicit components.
    pub fn with_components(
        cache: C,
        serializer: S,
        config: TokenStoreConfig,
        components: StoreComponents,
    ) -> Self {
        let index = IndexManager::new(
            cache,
            serializer,
            config.key_prefix.clone(),
            components.fingerprints,
            components.clock.clone(),
            components.metrics.clone(),
        );
        Self {
            index,
            config,
            token_values: components.token_values,
            clock: components.clock,
            metrics: components.metrics,
        }
    }

    /// Key prefix of this realm.
    pub fn realm(&self) -> &str {
        self.index.realm()
    }

    pub fn config(&self) -> &TokenStoreConfig {
        &self.config
    }

    /// Underlying index manager.
    pub fn index(&self) -> &IndexManager<C, S, A> {
        &self.index
    }

    pub(crate) fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub(crate) fn metrics(&self) -> &dyn TokenStoreMetrics {
        self.metrics.as_ref()
    }

    /// Issue a token pair for an authentication, or hand back the current one.
    ///
    /// - an expired current token is revoked and replaced;
    /// - a live token without a usable refresh token keeps its access value
    ///   and gets a fresh refresh token attached;
    /// - a live token with a live refresh token is returned unchanged;
    /// - otherwise a new pair is minted.
    pub async fn create_token(
        &self,
        authentication: &A,
        context: &RequestContext,
        access_validity_secs: u64,
        refresh_validity_secs: u64,
    ) -> TokenStoreResult<AccessToken> {
        let now = self.clock.now();

        if let Some(mut existing) = self.index.get_access_token(authentication, context).await? {
            if existing.is_expired_at(now) {
                if let Some(refresh) = &existing.refresh_token {
                    self.index.remove_refresh_token(refresh.value()).await?;
                }
                self.index.remove_access_token(existing.value()).await?;
                info!(realm = self.realm(), "Replacing expired access token");
            } else {
                let refresh_usable = existing
                    .refresh_token
                    .as_ref()
                    .map(|refresh| !refresh.is_expired_at(now))
                    .unwrap_or(false);

                if refresh_usable {
                    self.metrics.record_token_reused(self.realm());
                    return Ok(existing);
                }

                let refresh = self.mint_refresh_token(now, refresh_validity_secs)?;
                if let Some(stale) = existing.refresh_token.replace(refresh) {
                    self.index.discard_refresh_token(stale.value()).await?;
                }
                self.index
                    .store_access_token(&existing, authentication, context)
                    .await?;
                self.metrics.record_refresh_attached(self.realm());
                info!(realm = self.realm(), "Attached refresh token to access token");
                return Ok(existing);
            }
        }

        let token = self
            .mint_access_token(authentication, now, access_validity_secs)?
            .with_refresh_token(self.mint_refresh_token(now, refresh_validity_secs)?);
        self.index
            .store_access_token(&token, authentication, context)
            .await?;

        self.metrics.record_token_issued(self.realm(), true);
        info!(
            realm = self.realm(),
            access_validity_secs,
            refresh_validity_secs,
            "Issued token pair"
        );
        Ok(token)
    }

    /// [`create_token`](Self::create_token) with the configured validities.
    pub async fn issue_token(
        &self,
        authentication: &A,
        context: &RequestContext,
    ) -> TokenStoreResult<AccessToken> {
        self.create_token(
            authentication,
            context,
            self.config.access_token_validity.as_secs(),
            self.config.refresh_token_validity.as_secs(),
        )
        .await
    }

    /// Mint a bare access token. It is not stored; pass it to
    /// [`store_access_token`](Self::store_access_token) to index it.
    pub fn create_access_token(
        &self,
        authentication: &A,
        validity_secs: u64,
    ) -> TokenStoreResult<AccessToken> {
        if authentication.principal().is_empty() {
            return Err(ArgumentError::EmptyPrincipal.into());
        }
        self.mint_access_token(authentication, self.clock.now(), validity_secs)
    }

    pub async fn store_access_token(
        &self,
        token: &AccessToken,
        authentication: &A,
        context: &RequestContext,
    ) -> TokenStoreResult<()> {
        self.index
            .store_access_token(token, authentication, context)
            .await
    }

    pub async fn read_access_token(&self, value: &str) -> TokenStoreResult<Option<AccessToken>> {
        self.index.read_access_token(value).await
    }

    /// Authentication an access token (or access value) was issued for.
    pub async fn read_authentication<V>(&self, token: &V) -> TokenStoreResult<Option<A>>
    where
        V: AsTokenValue + ?Sized,
    {
        self.index.read_authentication(token.token_value()).await
    }

    pub async fn remove_access_token<V>(&self, token: &V) -> TokenStoreResult<()>
    where
        V: AsTokenValue + ?Sized,
    {
        self.index.remove_access_token(token.token_value()).await?;
        self.record_revocation("access");
        Ok(())
    }

    /// Remove an access token and the refresh token attached to it.
    ///
    /// A passed [`AccessToken`] supplies its own refresh token, so the pair is
    /// removed even after the access entry has expired from the cache.
    pub async fn remove_all_token<V>(&self, token: &V) -> TokenStoreResult<()>
    where
        V: AsTokenValue + ?Sized,
    {
        self.index
            .remove_all_token(token.token_value(), token.attached_refresh_token())
            .await?;
        self.record_revocation("all");
        Ok(())
    }

    pub async fn store_refresh_token(
        &self,
        token: &RefreshToken,
        authentication: &A,
        context: &RequestContext,
    ) -> TokenStoreResult<()> {
        self.index
            .store_refresh_token(token, authentication, context)
            .await
    }

    pub async fn read_refresh_token(&self, value: &str) -> TokenStoreResult<Option<RefreshToken>> {
        self.index.read_refresh_token(value).await
    }

    pub async fn read_authentication_for_refresh_token<V>(
        &self,
        token: &V,
    ) -> TokenStoreResult<Option<A>>
    where
        V: AsTokenValue + ?Sized,
    {
        self.index
            .read_authentication_for_refresh_token(token.token_value())
            .await
    }

    /// Remove a refresh token and, when still resolvable, its access token.
    pub async fn remove_refresh_token<V>(&self, token: &V) -> TokenStoreResult<()>
    where
        V: AsTokenValue + ?Sized,
    {
        self.index.remove_refresh_token(token.token_value()).await?;
        self.record_revocation("refresh");
        Ok(())
    }

    pub async fn remove_access_token_using_refresh_token<V>(&self, token: &V) -> TokenStoreResult<()>
    where
        V: AsTokenValue + ?Sized,
    {
        self.index
            .remove_access_token_using_refresh_token(token.token_value())
            .await
    }

    /// Current access token for an authentication's fingerprint.
    pub async fn get_access_token(
        &self,
        authentication: &A,
        context: &RequestContext,
    ) -> TokenStoreResult<Option<AccessToken>> {
        self.index.get_access_token(authentication, context).await
    }

    /// Revoke the current token pair of a session. Returns whether one existed.
    pub async fn revoke_session(
        &self,
        authentication: &A,
        context: &RequestContext,
    ) -> TokenStoreResult<bool> {
        match self.index.get_access_token(authentication, context).await? {
            Some(token) => {
                self.remove_all_token(&token).await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn mint_access_token(
        &self,
        authentication: &A,
        now: DateTime<Utc>,
        validity_secs: u64,
    ) -> TokenStoreResult<AccessToken> {
        let token = AccessToken::try_new(self.token_values.new_token_value(), now, validity_secs)?;
        Ok(token.with_scopes(authentication.granted_scopes()))
    }

    fn mint_refresh_token(
        &self,
        now: DateTime<Utc>,
        validity_secs: u64,
    ) -> TokenStoreResult<RefreshToken> {
        Ok(RefreshToken::try_new(
            self.token_values.new_token_value(),
            now,
            validity_secs,
        )?)
    }

    fn record_revocation(&self, kind: &str) {
        self.metrics.record_revocation(self.realm(), kind);
        info!(realm = self.realm(), kind, "Revoked token");
    }
}

/// Create token store over a cache with JSON serialization.
pub fn create_token_store<C, A>(cache: C, config: TokenStoreConfig) -> TokenStore<C, JsonSerializer, A>
where
    C: CacheService,
    A: Authentication,
{
    TokenStore::new(cache, JsonSerializer, config)
}
