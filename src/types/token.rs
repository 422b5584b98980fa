//! Token Types
//!
//! Access and refresh token records as persisted in the cache.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::error::ArgumentError;

/// Instant `validity_secs` after `issued_at`, or `None` past the representable range.
fn checked_expiry(issued_at: DateTime<Utc>, validity_secs: u64) -> Option<DateTime<Utc>> {
    let secs = i64::try_from(validity_secs).ok()?;
    issued_at.checked_add_signed(Duration::try_seconds(secs)?)
}

/// Token type. Only bearer tokens are issued.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TokenType {
    #[default]
    #[serde(rename = "bearer")]
    Bearer,
}

impl TokenType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Bearer => "bearer",
        }
    }
}

/// Refresh token record.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshToken {
    value: String,
    /// When the token was minted.
    pub issued_at: DateTime<Utc>,
    /// Expiration time; `None` never expires.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl RefreshToken {
    /// Create refresh token valid for `validity_secs` from `issued_at`.
    ///
    /// A validity past the last representable instant never expires.
    pub fn new(value: impl Into<String>, issued_at: DateTime<Utc>, validity_secs: u64) -> Self {
        Self {
            value: value.into(),
            issued_at,
            expires_at: checked_expiry(issued_at, validity_secs),
        }
    }

    /// Create refresh token, rejecting a validity past the representable range.
    pub fn try_new(
        value: impl Into<String>,
        issued_at: DateTime<Utc>,
        validity_secs: u64,
    ) -> Result<Self, ArgumentError> {
        let expires_at = checked_expiry(issued_at, validity_secs)
            .ok_or(ArgumentError::InvalidValidity { validity_secs })?;
        Ok(Self {
            value: value.into(),
            issued_at,
            expires_at: Some(expires_at),
        })
    }

    /// Create refresh token without expiration.
    pub fn non_expiring(value: impl Into<String>, issued_at: DateTime<Utc>) -> Self {
        Self {
            value: value.into(),
            issued_at,
            expires_at: None,
        }
    }

    /// Opaque token value.
    pub fn value(&self) -> &str {
        &self.value
    }

    /// Check if token is expired at `now`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map(|exp| exp <= now).unwrap_or(false)
    }
}

impl std::fmt::Debug for RefreshToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefreshToken")
            .field("value", &"[REDACTED]")
            .field("issued_at", &self.issued_at)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Access token record.
///
/// Owns at most one [`RefreshToken`]; the pair is indexed together.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessToken {
    value: String,
    /// Token type.
    #[serde(default)]
    pub token_type: TokenType,
    /// When the token was minted.
    pub issued_at: DateTime<Utc>,
    /// Expiration time; `None` never expires.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    /// Granted scopes.
    #[serde(default)]
    pub scopes: BTreeSet<String>,
    /// Attached refresh token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<RefreshToken>,
}

impl AccessToken {
    /// Create bearer token valid for `validity_secs` from `issued_at`.
    ///
    /// A validity past the last representable instant never expires.
    pub fn new(value: impl Into<String>, issued_at: DateTime<Utc>, validity_secs: u64) -> Self {
        Self {
            value: value.into(),
            token_type: TokenType::Bearer,
            issued_at,
            expires_at: checked_expiry(issued_at, validity_secs),
            scopes: BTreeSet::new(),
            refresh_token: None,
        }
    }

    /// Create bearer token, rejecting a validity past the representable range.
    pub fn try_new(
        value: impl Into<String>,
        issued_at: DateTime<Utc>,
        validity_secs: u64,
    ) -> Result<Self, ArgumentError> {
        let token = Self::new(value, issued_at, validity_secs);
        if token.expires_at.is_none() {
            return Err(ArgumentError::InvalidValidity { validity_secs });
        }
        Ok(token)
    }

    /// Set granted scopes.
    pub fn with_scopes<I, S>(mut self, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scopes = scopes.into_iter().map(Into::into).collect();
        self
    }

    /// Attach a refresh token.
    pub fn with_refresh_token(mut self, refresh_token: RefreshToken) -> Self {
        self.refresh_token = Some(refresh_token);
        self
    }

    /// Opaque token value.
    pub fn value(&self) -> &str {
        &self.value
    }

    /// Check if token is expired at `now`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map(|exp| exp <= now).unwrap_or(false)
    }

    /// Seconds until expiration at `now`, clamped at zero.
    pub fn expires_in(&self, now: DateTime<Utc>) -> Option<i64> {
        self.expires_at
            .map(|exp| (exp.timestamp() - now.timestamp()).max(0))
    }

    /// Format as Authorization header value.
    pub fn authorization_header(&self) -> String {
        format!("Bearer {}", self.value)
    }
}

impl std::fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessToken")
            .field("value", &"[REDACTED]")
            .field("token_type", &self.token_type)
            .field("issued_at", &self.issued_at)
            .field("expires_at", &self.expires_at)
            .field("scopes", &self.scopes)
            .field("refresh_token", &self.refresh_token)
            .finish()
    }
}

/// Anything that can be addressed by its token value.
pub trait AsTokenValue {
    fn token_value(&self) -> &str;

    /// Refresh token carried alongside the value, if the caller holds the record.
    fn attached_refresh_token(&self) -> Option<&RefreshToken> {
        None
    }
}

impl AsTokenValue for str {
    fn token_value(&self) -> &str {
        self
    }
}

impl AsTokenValue for String {
    fn token_value(&self) -> &str {
        self
    }
}

impl AsTokenValue for AccessToken {
    fn token_value(&self) -> &str {
        self.value()
    }

    fn attached_refresh_token(&self) -> Option<&RefreshToken> {
        self.refresh_token.as_ref()
    }
}

impl AsTokenValue for RefreshToken {
    fn token_value(&self) -> &str {
        self.value()
    }
}

impl<T: AsTokenValue + ?Sized> AsTokenValue for &T {
    fn token_value(&self) -> &str {
        (**self).token_value()
    }

    fn attached_refresh_token(&self) -> Option<&RefreshToken> {
        (**self).attached_refresh_token()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn issued() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn test_access_token_expiry() {
        let token = AccessToken::new("abc", issued(), 60);
        assert!(!token.is_expired_at(issued() + Duration::seconds(59)));
        assert!(token.is_expired_at(issued() + Duration::seconds(60)));
        assert_eq!(token.expires_in(issued()), Some(60));
        assert_eq!(token.expires_in(issued() + Duration::seconds(90)), Some(0));
    }

    #[test]
    fn test_debug_redacts_values() {
        let token = AccessToken::new("secret-access", issued(), 60)
            .with_refresh_token(RefreshToken::new("secret-refresh", issued(), 3600));
        let rendered = format!("{:?}", token);
        assert!(!rendered.contains("secret-access"));
        assert!(!rendered.contains("secret-refresh"));
        assert!(rendered.contains("REDACTED"));
    }

    #[test]
    fn test_token_serialization_shape() {
        let token = AccessToken::new("abc", issued(), 60).with_scopes(["read", "write"]);
        let json = serde_json::to_value(&token).unwrap();
        assert_eq!(json["value"], "abc");
        assert_eq!(json["token_type"], "bearer");
        assert!(json.get("refresh_token").is_none());

        let decoded: AccessToken = serde_json::from_value(json).unwrap();
        assert_eq!(decoded, token);
    }

    #[test]
    fn test_non_expiring_refresh_token() {
        let token = RefreshToken::non_expiring("r", issued());
        assert!(!token.is_expired_at(issued() + Duration::days(10_000)));
    }

    #[test]
    fn test_as_token_value() {
        let token = AccessToken::new("abc", issued(), 60);
        assert_eq!(token.token_value(), "abc");
        assert_eq!("xyz".token_value(), "xyz");
        assert_eq!(String::from("s").token_value(), "s");
    }

    #[test]
    fn test_attached_refresh_token() {
        let token = AccessToken::new("abc", issued(), 60)
            .with_refresh_token(RefreshToken::new("r", issued(), 3600));
        assert_eq!(
            token.attached_refresh_token().map(RefreshToken::value),
            Some("r")
        );
        assert_eq!((&token).attached_refresh_token().map(RefreshToken::value), Some("r"));
        assert!("abc".attached_refresh_token().is_none());
        assert!(RefreshToken::new("r", issued(), 60)
            .attached_refresh_token()
            .is_none());
    }

    #[test]
    fn test_validity_past_representable_range_does_not_panic() {
        let huge = 10_000_000_000_000;
        let access = AccessToken::new("a", issued(), huge);
        let refresh = RefreshToken::new("r", issued(), huge);
        assert_eq!(access.expires_at, None);
        assert_eq!(refresh.expires_at, None);

        assert_eq!(
            AccessToken::try_new("a", issued(), huge).unwrap_err(),
            ArgumentError::InvalidValidity { validity_secs: huge }
        );
        assert_eq!(
            RefreshToken::try_new("r", issued(), huge).unwrap_err(),
            ArgumentError::InvalidValidity { validity_secs: huge }
        );
    }

    #[test]
    fn test_max_validity_does_not_wrap_into_the_past() {
        let access = AccessToken::new("a", issued(), u64::MAX);
        assert!(!access.is_expired_at(issued() + Duration::days(365)));
        assert!(matches!(
            RefreshToken::try_new("r", issued(), u64::MAX),
            Err(ArgumentError::InvalidValidity { .. })
        ));
        assert!(AccessToken::try_new("a", issued(), u64::MAX).is_err());
    }

    #[test]
    fn test_try_new_accepts_ordinary_validity() {
        let token = AccessToken::try_new("a", issued(), 60).unwrap();
        assert_eq!(token.expires_at, Some(issued() + Duration::seconds(60)));
        let refresh = RefreshToken::try_new("r", issued(), 0).unwrap();
        assert!(refresh.is_expired_at(issued()));
    }
}
