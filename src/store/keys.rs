//! Physical cache key layout.
//!
//! The only place that knows the six key families. Every key is
//! `{prefix}{family}:{id}`.

use crate::types::Fingerprint;

const ACCESS: &str = "access:";
const AUTH: &str = "auth:";
const AUTH_TO_ACCESS: &str = "auth_to_access:";
const REFRESH: &str = "refresh:";
const REFRESH_AUTH: &str = "refresh_auth:";
const REFRESH_TO_ACCESS: &str = "refresh_to_access:";

#[derive(Debug, Clone, Default)]
pub(crate) struct KeyScheme {
    prefix: String,
}

impl KeyScheme {
    pub(crate) fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub(crate) fn prefix(&self) -> &str {
        &self.prefix
    }

    fn key(&self, family: &str, id: &str) -> Vec<u8> {
        let mut key = Vec::with_capacity(self.prefix.len() + family.len() + id.len());
        key.extend_from_slice(self.prefix.as_bytes());
        key.extend_from_slice(family.as_bytes());
        key.extend_from_slice(id.as_bytes());
        key
    }

    /// Access token blob, by access value.
    pub(crate) fn access(&self, access_value: &str) -> Vec<u8> {
        self.key(ACCESS, access_value)
    }

    /// Authentication blob, by access value.
    pub(crate) fn auth(&self, access_value: &str) -> Vec<u8> {
        self.key(AUTH, access_value)
    }

    /// Current access token blob, by fingerprint.
    pub(crate) fn auth_to_access(&self, fingerprint: &Fingerprint) -> Vec<u8> {
        self.key(AUTH_TO_ACCESS, fingerprint.as_str())
    }

    /// Refresh token blob, by refresh value.
    pub(crate) fn refresh(&self, refresh_value: &str) -> Vec<u8> {
        self.key(REFRESH, refresh_value)
    }

    /// Authentication blob, by refresh value.
    pub(crate) fn refresh_auth(&self, refresh_value: &str) -> Vec<u8> {
        self.key(REFRESH_AUTH, refresh_value)
    }

    /// Access token value, by refresh value.
    pub(crate) fn refresh_to_access(&self, refresh_value: &str) -> Vec<u8> {
        self.key(REFRESH_TO_ACCESS, refresh_value)
    }
}
