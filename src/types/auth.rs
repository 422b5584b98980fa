//! Authentication Types
//!
//! The caller-supplied identity that tokens are issued for, and the request
//! context used to group tokens into one session per principal.

use secrecy::SecretString;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Authentication persisted next to every issued token.
///
/// The store treats it as an opaque blob; only the principal is inspected,
/// to derive the session fingerprint.
pub trait Authentication: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// Principal identity (user name, client id).
    fn principal(&self) -> &str;

    /// Scopes granted to tokens issued for this authentication.
    fn granted_scopes(&self) -> BTreeSet<String> {
        BTreeSet::new()
    }
}

/// Default authentication: a named principal with authorities.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct UserAuthentication {
    /// Principal identity.
    pub principal: String,
    /// Granted authorities (roles).
    #[serde(default)]
    pub authorities: BTreeSet<String>,
    /// Granted scopes.
    #[serde(default)]
    pub scopes: BTreeSet<String>,
    /// Additional details (tenant, device, login method).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub details: BTreeMap<String, String>,
    /// Presented credentials. Never persisted.
    #[serde(skip)]
    pub credentials: Option<SecretString>,
}

impl UserAuthentication {
    /// Create authentication for a principal.
    pub fn new(principal: impl Into<String>) -> Self {
        Self {
            principal: principal.into(),
            ..Default::default()
        }
    }

    /// Add an authority.
    pub fn authority(mut self, authority: impl Into<String>) -> Self {
        self.authorities.insert(authority.into());
        self
    }

    /// Add a scope.
    pub fn scope(mut self, scope: impl Into<String>) -> Self {
        self.scopes.insert(scope.into());
        self
    }

    /// Add a detail entry.
    pub fn detail(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.details.insert(key.into(), value.into());
        self
    }

    /// Attach the presented credentials.
    pub fn credentials(mut self, credentials: impl Into<String>) -> Self {
        self.credentials = Some(SecretString::new(credentials.into()));
        self
    }
}

impl PartialEq for UserAuthentication {
    fn eq(&self, other: &Self) -> bool {
        self.principal == other.principal
            && self.authorities == other.authorities
            && self.scopes == other.scopes
            && self.details == other.details
    }
}

impl Eq for UserAuthentication {}

impl Authentication for UserAuthentication {
    fn principal(&self) -> &str {
        &self.principal
    }

    fn granted_scopes(&self) -> BTreeSet<String> {
        self.scopes.clone()
    }
}

/// Request attributes that scope a session, passed explicitly by the caller.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestContext {
    /// Caller's source IP.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_ip: Option<String>,
}

impl RequestContext {
    /// Context without any request attributes.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Context for a caller IP.
    pub fn with_client_ip(ip: impl Into<String>) -> Self {
        Self {
            client_ip: Some(ip.into()),
        }
    }
}

/// Session grouping key derived from principal and request context.
///
/// Not a credential; used only to address the current access token.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn new(hex: impl Into<String>) -> Self {
        Self(hex.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Envelope persisted in the `auth` and `refresh_auth` entries.
///
/// Carries the request context so a later removal recomputes the same
/// fingerprint without ambient state.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StoredAuthentication<A> {
    pub authentication: A,
    #[serde(default)]
    pub context: RequestContext,
}

impl<A: Authentication> StoredAuthentication<A> {
    pub fn new(authentication: A, context: RequestContext) -> Self {
        Self {
            authentication,
            context,
        }
    }
}
