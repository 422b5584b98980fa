//! Index Manager
//!
//! Maintains the six cache entries that together make up one issued token pair:
//!
//! | Entry | Addressed by | Holds | Expires with |
//! |---|---|---|---|
//! | access | access value | access token | access token |
//! | auth | access value | authentication | access token |
//! | auth_to_access | fingerprint | access token | access token |
//! | refresh | refresh value | refresh token | refresh token |
//! | refresh_auth | refresh value | authentication | refresh token |
//! | refresh_to_access | refresh value | access value | earlier of both |
//!
//! Writes are sequential single-key operations; there is no cross-key
//! transaction. Concurrent issuance for one fingerprint can leave an access
//! token reachable by value but no longer by fingerprint until it expires.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use super::keys::KeyScheme;
use crate::cache::CacheService;
use crate::core::{Clock, FingerprintGenerator, Serializer};
use crate::error::{ArgumentError, TokenStoreResult};
use crate::telemetry::TokenStoreMetrics;
use crate::types::{
    AccessToken, Authentication, Fingerprint, RefreshToken, RequestContext, StoredAuthentication,
};

/// Remaining lifetime of an entry, computed once per store call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Expiry {
    Never,
    In(Duration),
    Elapsed,
}

impl Expiry {
    /// Whole seconds between `now` and `expires_at`.
    pub(crate) fn until(expires_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> Self {
        match expires_at {
            None => Self::Never,
            Some(exp) => {
                let secs = exp.timestamp() - now.timestamp();
                if secs > 0 {
                    Self::In(Duration::from_secs(secs as u64))
                } else {
                    Self::Elapsed
                }
            }
        }
    }

    /// The earlier of two expiries.
    pub(crate) fn min(self, other: Self) -> Self {
        match (self, other) {
            (Self::Elapsed, _) | (_, Self::Elapsed) => Self::Elapsed,
            (Self::Never, other) => other,
            (this, Self::Never) => this,
            (Self::In(a), Self::In(b)) => Self::In(a.min(b)),
        }
    }
}

/// Borrowed form of [`StoredAuthentication`]; serializes identically.
#[derive(Serialize)]
struct StoredAuthenticationRef<'a, A> {
    authentication: &'a A,
    context: &'a RequestContext,
}

/// Index manager over a cache service.
pub struct IndexManager<C, S, A> {
    cache: C,
    serializer: S,
    keys: KeyScheme,
    fingerprints: Arc<dyn FingerprintGenerator>,
    clock: Arc<dyn Clock>,
    metrics: Arc<dyn TokenStoreMetrics>,
    _authentication: PhantomData<fn() -> A>,
}

impl<C, S, A> IndexManager<C, S, A>
where
    C: CacheService,
    S: Serializer,
    A: Authentication,
{
    /// Create new index manager.
    pub fn new(
        cache: C,
        serializer: S,
        key_prefix: impl Into<String>,
        fingerprints: Arc<dyn FingerprintGenerator>,
        clock: Arc<dyn Clock>,
        metrics: Arc<dyn TokenStoreMetrics>,
    ) -> Self {
        Self {
            cache,
            serializer,
            keys: KeyScheme::new(key_prefix),
            fingerprints,
            clock,
            metrics,
            _authentication: PhantomData,
        }
    }

    /// Key prefix of this realm.
    pub fn realm(&self) -> &str {
        self.keys.prefix()
    }

    /// Underlying cache.
    pub fn cache(&self) -> &C {
        &self.cache
    }

    /// Fingerprint for an authentication in a request context.
    pub fn fingerprint(
        &self,
        authentication: &A,
        context: &RequestContext,
    ) -> TokenStoreResult<Fingerprint> {
        let principal = authentication.principal();
        if principal.is_empty() {
            return Err(ArgumentError::EmptyPrincipal.into());
        }
        Ok(self.fingerprints.extract_key(principal, context))
    }

    /// Write the access, auth and auth_to_access entries, plus the refresh-side
    /// entries when the token carries a refresh token.
    pub async fn store_access_token(
        &self,
        token: &AccessToken,
        authentication: &A,
        context: &RequestContext,
    ) -> TokenStoreResult<()> {
        let value = non_empty(token.value())?;
        let fingerprint = self.fingerprint(authentication, context)?;
        let now = self.clock.now();
        let access_expiry = Expiry::until(token.expires_at, now);

        let token_blob = self.serializer.serialize(token)?;
        let auth_blob = self.serialize_authentication(authentication, context)?;

        self.write(&self.keys.access(value), token_blob.clone(), access_expiry)
            .await?;
        self.write(&self.keys.auth(value), auth_blob.clone(), access_expiry)
            .await?;
        self.write(
            &self.keys.auth_to_access(&fingerprint),
            token_blob,
            access_expiry,
        )
        .await?;

        if let Some(refresh) = &token.refresh_token {
            let refresh_value = non_empty(refresh.value())?;
            let refresh_expiry = Expiry::until(refresh.expires_at, now);
            self.write(
                &self.keys.refresh_to_access(refresh_value),
                self.serializer.serialize_string(value),
                access_expiry.min(refresh_expiry),
            )
            .await?;
            self.write_refresh_entries(refresh, auth_blob, refresh_expiry)
                .await?;
        }

        debug!(
            realm = self.realm(),
            fingerprint = %fingerprint,
            with_refresh = token.refresh_token.is_some(),
            expiry = ?access_expiry,
            "Stored access token"
        );
        Ok(())
    }

    /// Read an access token by value.
    pub async fn read_access_token(&self, value: &str) -> TokenStoreResult<Option<AccessToken>> {
        let value = non_empty(value)?;
        self.read(&self.keys.access(value)).await
    }

    /// Read the authentication an access token was issued for.
    pub async fn read_authentication(&self, value: &str) -> TokenStoreResult<Option<A>> {
        let value = non_empty(value)?;
        Ok(self
            .read_stored_authentication(&self.keys.auth(value))
            .await?
            .map(|stored| stored.authentication))
    }

    /// Remove an access token's access, auth and fingerprint entries.
    ///
    /// The fingerprint entry is only cleared when the stored authentication is
    /// still readable and the entry still points at this token; otherwise it is
    /// left to expire on its own.
    pub async fn remove_access_token(&self, value: &str) -> TokenStoreResult<()> {
        let value = non_empty(value)?;
        let stored = self
            .read_stored_authentication(&self.keys.auth(value))
            .await?;

        if let Some(stored) = stored {
            let fingerprint = self.fingerprint(&stored.authentication, &stored.context)?;
            let index_key = self.keys.auth_to_access(&fingerprint);
            let current: Option<AccessToken> = self.read(&index_key).await?;
            match current {
                Some(current) if current.value() != value => {
                    debug!(
                        realm = self.realm(),
                        fingerprint = %fingerprint,
                        "Fingerprint index points at a newer token; leaving it"
                    );
                }
                _ => {
                    self.cache.delete(&index_key).await?;
                }
            }
        }

        self.cache.delete(&self.keys.auth(value)).await?;
        self.cache.delete(&self.keys.access(value)).await?;

        debug!(realm = self.realm(), "Removed access token");
        Ok(())
    }

    /// Remove an access token together with its refresh token.
    ///
    /// `attached` is the refresh token the caller already holds. The stored
    /// access entry is consulted as well, since a refresh token attached later
    /// only exists there; once that entry has expired `attached` is the only
    /// way to reach the refresh token.
    pub async fn remove_all_token(
        &self,
        value: &str,
        attached: Option<&RefreshToken>,
    ) -> TokenStoreResult<()> {
        let value = non_empty(value)?;
        let mut refresh_values: Vec<String> = attached
            .map(|refresh| refresh.value().to_string())
            .into_iter()
            .collect();
        if let Some(token) = self.read_access_token(value).await? {
            if let Some(refresh) = token.refresh_token {
                if !refresh_values.iter().any(|known| known == refresh.value()) {
                    refresh_values.push(refresh.value().to_string());
                }
            }
        }

        for refresh_value in &refresh_values {
            if !refresh_value.is_empty() {
                self.remove_refresh_token(refresh_value).await?;
            }
        }
        self.remove_access_token(value).await
    }

    /// Write the refresh and refresh_auth entries.
    pub async fn store_refresh_token(
        &self,
        token: &RefreshToken,
        authentication: &A,
        context: &RequestContext,
    ) -> TokenStoreResult<()> {
        non_empty(token.value())?;
        if authentication.principal().is_empty() {
            return Err(ArgumentError::EmptyPrincipal.into());
        }
        let expiry = Expiry::until(token.expires_at, self.clock.now());
        let auth_blob = self.serialize_authentication(authentication, context)?;
        self.write_refresh_entries(token, auth_blob, expiry).await
    }

    /// Read a refresh token by value.
    pub async fn read_refresh_token(&self, value: &str) -> TokenStoreResult<Option<RefreshToken>> {
        let value = non_empty(value)?;
        self.read(&self.keys.refresh(value)).await
    }

    /// Read the authentication a refresh token was issued for.
    pub async fn read_authentication_for_refresh_token(
        &self,
        value: &str,
    ) -> TokenStoreResult<Option<A>> {
        let value = non_empty(value)?;
        Ok(self
            .read_stored_authentication(&self.keys.refresh_auth(value))
            .await?
            .map(|stored| stored.authentication))
    }

    /// Remove a refresh token's three entries, then the access token it still
    /// points at.
    pub async fn remove_refresh_token(&self, value: &str) -> TokenStoreResult<()> {
        let value = non_empty(value)?;
        let access_value = self.read_string(&self.keys.refresh_to_access(value)).await?;

        self.discard_refresh_token(value).await?;

        if let Some(access_value) = access_value {
            self.remove_access_token(&access_value).await?;
        }
        Ok(())
    }

    /// Delete a refresh token's three entries without touching the access
    /// token it points at.
    pub async fn discard_refresh_token(&self, value: &str) -> TokenStoreResult<()> {
        let value = non_empty(value)?;
        self.cache.delete(&self.keys.refresh(value)).await?;
        self.cache.delete(&self.keys.refresh_auth(value)).await?;
        self.cache
            .delete(&self.keys.refresh_to_access(value))
            .await?;
        debug!(realm = self.realm(), "Removed refresh token");
        Ok(())
    }

    /// Remove the access token a refresh token points at.
    pub async fn remove_access_token_using_refresh_token(&self, value: &str) -> TokenStoreResult<()> {
        let value = non_empty(value)?;
        let key = self.keys.refresh_to_access(value);
        let access_value = self.read_string(&key).await?;
        self.cache.delete(&key).await?;

        if let Some(access_value) = access_value {
            self.remove_access_token(&access_value).await?;
        }
        Ok(())
    }

    /// Current access token for an authentication's fingerprint.
    ///
    /// Rewrites the index when the token found there was stored for a
    /// different fingerprint (or its authentication is gone).
    pub async fn get_access_token(
        &self,
        authentication: &A,
        context: &RequestContext,
    ) -> TokenStoreResult<Option<AccessToken>> {
        let fingerprint = self.fingerprint(authentication, context)?;
        let token: Option<AccessToken> = self.read(&self.keys.auth_to_access(&fingerprint)).await?;

        let Some(token) = token else {
            return Ok(None);
        };

        let stored = self
            .read_stored_authentication(&self.keys.auth(token.value()))
            .await?;
        let matches = match &stored {
            Some(stored) => {
                self.fingerprint(&stored.authentication, &stored.context)? == fingerprint
            }
            None => false,
        };

        if !matches {
            warn!(
                realm = self.realm(),
                fingerprint = %fingerprint,
                "Stale fingerprint index; re-storing access token"
            );
            self.metrics.record_stale_index_repaired(self.realm());
            self.store_access_token(&token, authentication, context)
                .await?;
        }

        Ok(Some(token))
    }

    async fn write_refresh_entries(
        &self,
        token: &RefreshToken,
        auth_blob: Vec<u8>,
        expiry: Expiry,
    ) -> TokenStoreResult<()> {
        let value = token.value();
        let token_blob = self.serializer.serialize(token)?;
        self.write(&self.keys.refresh(value), token_blob, expiry)
            .await?;
        self.write(&self.keys.refresh_auth(value), auth_blob, expiry)
            .await?;
        debug!(realm = self.realm(), expiry = ?expiry, "Stored refresh token");
        Ok(())
    }

    fn serialize_authentication(
        &self,
        authentication: &A,
        context: &RequestContext,
    ) -> TokenStoreResult<Vec<u8>> {
        Ok(self.serializer.serialize(&StoredAuthenticationRef {
            authentication,
            context,
        })?)
    }

    async fn write(&self, key: &[u8], value: Vec<u8>, expiry: Expiry) -> TokenStoreResult<()> {
        match expiry {
            Expiry::Never => self.cache.set(key, value).await?,
            Expiry::In(ttl) => self.cache.set_with_ttl(key, value, ttl).await?,
            Expiry::Elapsed => {
                self.cache.delete(key).await?;
            }
        }
        Ok(())
    }

    async fn read<T: serde::de::DeserializeOwned>(&self, key: &[u8]) -> TokenStoreResult<Option<T>> {
        match self.cache.get(key).await? {
            Some(bytes) => Ok(Some(self.serializer.deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    async fn read_string(&self, key: &[u8]) -> TokenStoreResult<Option<String>> {
        match self.cache.get(key).await? {
            Some(bytes) => Ok(Some(self.serializer.deserialize_string(&bytes)?)),
            None => Ok(None),
        }
    }

    async fn read_stored_authentication(
        &self,
        key: &[u8],
    ) -> TokenStoreResult<Option<StoredAuthentication<A>>> {
        self.read(key).await
    }
}

fn non_empty(value: &str) -> TokenStoreResult<&str> {
    if value.is_empty() {
        return Err(ArgumentError::EmptyTokenValue.into());
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{InMemoryCacheService, MockCacheService};
    use crate::core::{JsonSerializer, MockClock, MockFingerprintGenerator};
    use crate::error::{CacheError, TokenStoreError};
    use crate::telemetry::InMemoryMetrics;
    use crate::types::UserAuthentication;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use mockall::mock;

    type Index<C> = IndexManager<C, JsonSerializer, UserAuthentication>;

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap()
    }

    struct Fixture {
        index: Index<InMemoryCacheService>,
        clock: Arc<MockClock>,
        fingerprints: Arc<MockFingerprintGenerator>,
        metrics: Arc<InMemoryMetrics>,
    }

    fn fixture() -> Fixture {
        let clock = Arc::new(MockClock::new(start()));
        let fingerprints = Arc::new(MockFingerprintGenerator::new());
        let metrics = Arc::new(InMemoryMetrics::new());
        let index = IndexManager::new(
            InMemoryCacheService::with_clock(clock.clone()),
            JsonSerializer,
            "",
            fingerprints.clone(),
            clock.clone(),
            metrics.clone(),
        );
        Fixture {
            index,
            clock,
            fingerprints,
            metrics,
        }
    }

    fn token_pair(access: &str, refresh: &str) -> AccessToken {
        AccessToken::new(access, start(), 60).with_refresh_token(RefreshToken::new(
            refresh,
            start(),
            3600,
        ))
    }

    #[test]
    fn test_expiry_until() {
        let now = start();
        assert_eq!(Expiry::until(None, now), Expiry::Never);
        assert_eq!(
            Expiry::until(Some(now + chrono::Duration::seconds(60)), now),
            Expiry::In(Duration::from_secs(60))
        );
        assert_eq!(Expiry::until(Some(now), now), Expiry::Elapsed);
        assert_eq!(
            Expiry::until(Some(now - chrono::Duration::seconds(5)), now),
            Expiry::Elapsed
        );
    }

    #[test]
    fn test_expiry_min() {
        let short = Expiry::In(Duration::from_secs(60));
        let long = Expiry::In(Duration::from_secs(3600));
        assert_eq!(short.min(long), short);
        assert_eq!(Expiry::Never.min(long), long);
        assert_eq!(long.min(Expiry::Never), long);
        assert_eq!(Expiry::Elapsed.min(Expiry::Never), Expiry::Elapsed);
    }

    #[tokio::test]
    async fn test_store_writes_all_six_entries() {
        let f = fixture();
        let auth = UserAuthentication::new("alice");
        let token = token_pair("a1", "r1");

        f.index
            .store_access_token(&token, &auth, &RequestContext::empty())
            .await
            .unwrap();

        assert_eq!(
            f.index.cache().keys(),
            vec![
                "access:a1",
                "auth:a1",
                "auth_to_access:alice",
                "refresh:r1",
                "refresh_auth:r1",
                "refresh_to_access:r1",
            ]
        );
        assert_eq!(f.index.cache().ttl(b"access:a1"), Some(Duration::from_secs(60)));
        assert_eq!(f.index.cache().ttl(b"refresh:r1"), Some(Duration::from_secs(3600)));
        assert_eq!(
            f.index.cache().ttl(b"refresh_to_access:r1"),
            Some(Duration::from_secs(60))
        );
    }

    #[tokio::test]
    async fn test_refresh_to_access_holds_plain_value() {
        let f = fixture();
        let auth = UserAuthentication::new("alice");
        f.index
            .store_access_token(&token_pair("a1", "r1"), &auth, &RequestContext::empty())
            .await
            .unwrap();

        let raw = f.index.cache().get(b"refresh_to_access:r1").await.unwrap();
        assert_eq!(raw, Some(b"a1".to_vec()));
    }

    #[tokio::test]
    async fn test_non_expiring_token_stored_without_ttl() {
        let f = fixture();
        let mut token = AccessToken::new("a1", start(), 60);
        token.expires_at = None;

        f.index
            .store_access_token(&token, &UserAuthentication::new("alice"), &RequestContext::empty())
            .await
            .unwrap();

        assert!(f.index.cache().get(b"access:a1").await.unwrap().is_some());
        assert_eq!(f.index.cache().ttl(b"access:a1"), None);
    }

    #[tokio::test]
    async fn test_already_expired_token_is_not_written() {
        let f = fixture();
        let token = AccessToken::new("a1", start(), 0);

        f.index
            .store_access_token(&token, &UserAuthentication::new("alice"), &RequestContext::empty())
            .await
            .unwrap();

        assert!(f.index.read_access_token("a1").await.unwrap().is_none());
        assert!(f.index.cache().is_empty());
    }

    #[tokio::test]
    async fn test_remove_access_token_keeps_refresh_side() {
        let f = fixture();
        let auth = UserAuthentication::new("alice");
        f.index
            .store_access_token(&token_pair("a1", "r1"), &auth, &RequestContext::empty())
            .await
            .unwrap();

        f.index.remove_access_token("a1").await.unwrap();

        assert_eq!(
            f.index.cache().keys(),
            vec!["refresh:r1", "refresh_auth:r1", "refresh_to_access:r1"]
        );
    }

    #[tokio::test]
    async fn test_remove_access_token_after_auth_expired_leaves_index() {
        let f = fixture();
        let auth = UserAuthentication::new("alice");
        let token = AccessToken::new("a1", start(), 60);
        f.index
            .store_access_token(&token, &auth, &RequestContext::empty())
            .await
            .unwrap();

        // Simulate the auth entry expiring ahead of the index entry.
        f.index.cache().delete(b"auth:a1").await.unwrap();
        f.index.remove_access_token("a1").await.unwrap();

        assert_eq!(f.index.cache().keys(), vec!["auth_to_access:alice"]);
    }

    #[tokio::test]
    async fn test_remove_access_token_does_not_clear_newer_index() {
        let f = fixture();
        let auth = UserAuthentication::new("alice");
        let ctx = RequestContext::empty();
        f.index
            .store_access_token(&AccessToken::new("old", start(), 60), &auth, &ctx)
            .await
            .unwrap();
        f.index
            .store_access_token(&AccessToken::new("new", start(), 60), &auth, &ctx)
            .await
            .unwrap();

        f.index.remove_access_token("old").await.unwrap();

        let current = f.index.get_access_token(&auth, &ctx).await.unwrap().unwrap();
        assert_eq!(current.value(), "new");
    }

    #[tokio::test]
    async fn test_remove_refresh_token_cascades_to_access() {
        let f = fixture();
        let auth = UserAuthentication::new("alice");
        f.index
            .store_access_token(&token_pair("a1", "r1"), &auth, &RequestContext::empty())
            .await
            .unwrap();

        f.index.remove_refresh_token("r1").await.unwrap();

        assert!(f.index.cache().is_empty());
    }

    #[tokio::test]
    async fn test_remove_refresh_token_twice_is_noop() {
        let f = fixture();
        let auth = UserAuthentication::new("alice");
        f.index
            .store_access_token(&token_pair("a1", "r1"), &auth, &RequestContext::empty())
            .await
            .unwrap();

        f.index.remove_refresh_token("r1").await.unwrap();
        f.index.remove_refresh_token("r1").await.unwrap();
        assert!(f.index.read_refresh_token("r1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_remove_access_token_using_refresh_token() {
        let f = fixture();
        let auth = UserAuthentication::new("alice");
        f.index
            .store_access_token(&token_pair("a1", "r1"), &auth, &RequestContext::empty())
            .await
            .unwrap();

        f.index
            .remove_access_token_using_refresh_token("r1")
            .await
            .unwrap();

        assert!(f.index.read_access_token("a1").await.unwrap().is_none());
        assert_eq!(
            f.index.cache().keys(),
            vec!["refresh:r1", "refresh_auth:r1"]
        );
    }

    #[tokio::test]
    async fn test_remove_all_token_after_access_expiry_uses_attached_refresh() {
        let f = fixture();
        let auth = UserAuthentication::new("alice");
        let token = token_pair("a1", "r1");
        f.index
            .store_access_token(&token, &auth, &RequestContext::empty())
            .await
            .unwrap();

        f.clock.advance(Duration::from_secs(61));
        assert_eq!(
            f.index.cache().keys(),
            vec!["refresh:r1", "refresh_auth:r1"]
        );

        f.index
            .remove_all_token("a1", token.refresh_token.as_ref())
            .await
            .unwrap();

        assert!(f.index.read_refresh_token("r1").await.unwrap().is_none());
        assert!(f.index.cache().is_empty());
    }

    #[tokio::test]
    async fn test_remove_all_token_by_value_reads_stored_pair() {
        let f = fixture();
        let auth = UserAuthentication::new("alice");
        f.index
            .store_access_token(&token_pair("a1", "r1"), &auth, &RequestContext::empty())
            .await
            .unwrap();

        f.index.remove_all_token("a1", None).await.unwrap();

        assert!(f.index.cache().is_empty());
    }

    #[tokio::test]
    async fn test_remove_all_token_clears_held_and_stored_refresh() {
        let f = fixture();
        let auth = UserAuthentication::new("alice");
        let ctx = RequestContext::empty();
        let held = token_pair("a1", "r1");
        f.index.store_access_token(&held, &auth, &ctx).await.unwrap();
        // The stored record later gains a different refresh token.
        f.index
            .store_access_token(&token_pair("a1", "r2"), &auth, &ctx)
            .await
            .unwrap();

        f.index
            .remove_all_token("a1", held.refresh_token.as_ref())
            .await
            .unwrap();

        assert!(f.index.read_refresh_token("r1").await.unwrap().is_none());
        assert!(f.index.read_refresh_token("r2").await.unwrap().is_none());
        assert!(f.index.cache().is_empty());
    }

    #[tokio::test]
    async fn test_discard_refresh_token_keeps_access_side() {
        let f = fixture();
        let auth = UserAuthentication::new("alice");
        let ctx = RequestContext::empty();
        f.index
            .store_access_token(&token_pair("a1", "r1"), &auth, &ctx)
            .await
            .unwrap();

        f.index.discard_refresh_token("r1").await.unwrap();

        assert_eq!(
            f.index.cache().keys(),
            vec!["access:a1", "auth:a1", "auth_to_access:alice"]
        );
        assert!(f.index.get_access_token(&auth, &ctx).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_refresh_side_outlives_access_side() {
        let f = fixture();
        let auth = UserAuthentication::new("alice");
        f.index
            .store_access_token(&token_pair("a1", "r1"), &auth, &RequestContext::empty())
            .await
            .unwrap();

        f.clock.advance(Duration::from_secs(61));

        assert!(f.index.read_access_token("a1").await.unwrap().is_none());
        assert!(f.index.read_refresh_token("r1").await.unwrap().is_some());
        assert_eq!(
            f.index
                .read_authentication_for_refresh_token("r1")
                .await
                .unwrap(),
            Some(auth)
        );
    }

    #[tokio::test]
    async fn test_get_access_token_repairs_stale_index() {
        let f = fixture();
        let ctx = RequestContext::empty();
        let alice = UserAuthentication::new("alice");
        let bob = UserAuthentication::new("bob");

        f.fingerprints
            .set_fixed(Some(Fingerprint::new("shared")));
        f.index
            .store_access_token(&AccessToken::new("a1", start(), 60), &alice, &ctx)
            .await
            .unwrap();

        // alice's token now resolves to a different fingerprint than the slot it sits in
        f.fingerprints.set_fixed(None);
        f.index
            .cache()
            .set(
                b"auth_to_access:bob",
                serde_json::to_vec(&AccessToken::new("a1", start(), 60)).unwrap(),
            )
            .await
            .unwrap();

        let found = f.index.get_access_token(&bob, &ctx).await.unwrap().unwrap();
        assert_eq!(found.value(), "a1");
        assert_eq!(f.metrics.total("token_store_stale_index_repaired_total"), 1.0);
        assert_eq!(
            f.index.read_authentication("a1").await.unwrap(),
            Some(bob)
        );
    }

    #[tokio::test]
    async fn test_get_access_token_consistent_index_is_untouched() {
        let f = fixture();
        let auth = UserAuthentication::new("alice");
        let ctx = RequestContext::with_client_ip("10.1.1.1");
        f.index
            .store_access_token(&AccessToken::new("a1", start(), 60), &auth, &ctx)
            .await
            .unwrap();

        let found = f.index.get_access_token(&auth, &ctx).await.unwrap();
        assert_eq!(found.map(|t| t.value().to_string()), Some("a1".to_string()));
        assert_eq!(f.metrics.total("token_store_stale_index_repaired_total"), 0.0);
    }

    #[tokio::test]
    async fn test_invalid_arguments() {
        let f = fixture();
        let result = f.index.read_access_token("").await;
        assert!(matches!(
            result,
            Err(TokenStoreError::InvalidArgument(ArgumentError::EmptyTokenValue))
        ));

        let result = f
            .index
            .get_access_token(&UserAuthentication::new(""), &RequestContext::empty())
            .await;
        assert!(matches!(
            result,
            Err(TokenStoreError::InvalidArgument(ArgumentError::EmptyPrincipal))
        ));
    }

    #[tokio::test]
    async fn test_corrupted_blob_surfaces_as_serialization_error() {
        let f = fixture();
        f.index
            .cache()
            .set(b"access:a1", b"not json".to_vec())
            .await
            .unwrap();

        let result = f.index.read_access_token("a1").await;
        assert!(matches!(result, Err(TokenStoreError::Serialization(_))));
    }

    #[tokio::test]
    async fn test_key_prefix_applies_to_every_write() {
        let cache = MockCacheService::new();
        let index: Index<MockCacheService> = IndexManager::new(
            cache,
            JsonSerializer,
            "user:",
            Arc::new(MockFingerprintGenerator::new()),
            Arc::new(MockClock::new(start())),
            Arc::new(InMemoryMetrics::new()),
        );

        index
            .store_access_token(
                &token_pair("a1", "r1"),
                &UserAuthentication::new("alice"),
                &RequestContext::empty(),
            )
            .await
            .unwrap();

        let history = index.cache().get_set_history();
        assert_eq!(history.len(), 6);
        assert!(history.iter().all(|record| record.key.starts_with("user:")));
    }

    mock! {
        Cache {}

        #[async_trait]
        impl CacheService for Cache {
            async fn set(&self, key: &[u8], value: Vec<u8>) -> Result<(), CacheError>;
            async fn set_with_ttl(&self, key: &[u8], value: Vec<u8>, ttl: Duration) -> Result<(), CacheError>;
            async fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, CacheError>;
            async fn delete(&self, key: &[u8]) -> Result<bool, CacheError>;
        }
    }

    #[tokio::test]
    async fn test_cache_failure_propagates_without_retry() {
        let mut cache = MockCache::new();
        cache.expect_get().times(1).returning(|_| {
            Err(CacheError::Timeout {
                timeout: Duration::from_millis(200),
            })
        });

        let index: Index<MockCache> = IndexManager::new(
            cache,
            JsonSerializer,
            "",
            Arc::new(MockFingerprintGenerator::new()),
            Arc::new(MockClock::new(start())),
            Arc::new(InMemoryMetrics::new()),
        );

        let result = index.read_access_token("a1").await;
        match result {
            Err(error) => {
                assert!(error.is_retryable());
                assert!(matches!(
                    error,
                    TokenStoreError::Cache(CacheError::Timeout { .. })
                ));
            }
            Ok(_) => panic!("expected cache failure"),
        }
    }

    #[tokio::test]
    async fn test_write_failure_stops_remaining_writes() {
        let mut cache = MockCache::new();
        cache
            .expect_set_with_ttl()
            .times(1)
            .returning(|_, _, _| {
                Err(CacheError::ConnectionFailed {
                    message: "reset by peer".to_string(),
                })
            });

        let index: Index<MockCache> = IndexManager::new(
            cache,
            JsonSerializer,
            "",
            Arc::new(MockFingerprintGenerator::new()),
            Arc::new(MockClock::new(start())),
            Arc::new(InMemoryMetrics::new()),
        );

        let result = index
            .store_access_token(
                &token_pair("a1", "r1"),
                &UserAuthentication::new("alice"),
                &RequestContext::empty(),
            )
            .await;
        assert!(matches!(result, Err(TokenStoreError::Cache(_))));
    }
}
