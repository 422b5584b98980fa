//! Cache Service
//!
//! Byte-oriented key/value store with per-key TTL. The token store only needs
//! single-key set/get/delete; no multi-key or transactional primitive is used.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::core::{Clock, SystemClock};
use crate::error::CacheError;

/// Cache service interface.
#[async_trait]
pub trait CacheService: Send + Sync {
    /// Store a value without expiration.
    async fn set(&self, key: &[u8], value: Vec<u8>) -> Result<(), CacheError>;

    /// Store a value that expires after `ttl`.
    async fn set_with_ttl(&self, key: &[u8], value: Vec<u8>, ttl: Duration)
        -> Result<(), CacheError>;

    /// Retrieve a live value.
    async fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, CacheError>;

    /// Delete a key. Returns whether a live value was removed.
    async fn delete(&self, key: &[u8]) -> Result<bool, CacheError>;

    /// Check if a live value exists.
    async fn exists(&self, key: &[u8]) -> Result<bool, CacheError> {
        Ok(self.get(key).await?.is_some())
    }
}

#[async_trait]
impl<C: CacheService + ?Sized> CacheService for Arc<C> {
    async fn set(&self, key: &[u8], value: Vec<u8>) -> Result<(), CacheError> {
        (**self).set(key, value).await
    }

    async fn set_with_ttl(
        &self,
        key: &[u8],
        value: Vec<u8>,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        (**self).set_with_ttl(key, value, ttl).await
    }

    async fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, CacheError> {
        (**self).get(key).await
    }

    async fn delete(&self, key: &[u8]) -> Result<bool, CacheError> {
        (**self).delete(key).await
    }

    async fn exists(&self, key: &[u8]) -> Result<bool, CacheError> {
        (**self).exists(key).await
    }
}

struct CacheEntry {
    value: Vec<u8>,
    expires_at: Option<DateTime<Utc>>,
}

impl CacheEntry {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map(|exp| exp <= now).unwrap_or(false)
    }
}

/// In-memory cache implementation.
///
/// Expiry is evaluated lazily against the injected clock, so a mock clock
/// drives TTLs deterministically.
pub struct InMemoryCacheService {
    entries: Mutex<HashMap<Vec<u8>, CacheEntry>>,
    clock: Arc<dyn Clock>,
}

impl InMemoryCacheService {
    /// Create new in-memory cache on the system clock.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Create in-memory cache on a specific clock.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            clock,
        }
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        let now = self.clock.now();
        self.entries
            .lock()
            .unwrap()
            .values()
            .filter(|entry| !entry.is_expired(now))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Live keys, lossily rendered as UTF-8.
    pub fn keys(&self) -> Vec<String> {
        let now = self.clock.now();
        let mut keys: Vec<String> = self
            .entries
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, entry)| !entry.is_expired(now))
            .map(|(key, _)| String::from_utf8_lossy(key).into_owned())
            .collect();
        keys.sort();
        keys
    }

    /// Remaining lifetime of a live key; `None` if absent or non-expiring.
    pub fn ttl(&self, key: &[u8]) -> Option<Duration> {
        let now = self.clock.now();
        let entries = self.entries.lock().unwrap();
        let entry = entries.get(key).filter(|entry| !entry.is_expired(now))?;
        entry
            .expires_at
            .and_then(|exp| (exp - now).to_std().ok())
    }

    /// Drop expired entries. Returns how many were removed.
    pub fn clear_expired(&self) -> usize {
        let now = self.clock.now();
        let mut entries = self.entries.lock().unwrap();
        let initial_count = entries.len();
        entries.retain(|_, entry| !entry.is_expired(now));
        initial_count - entries.len()
    }
}

impl Default for InMemoryCacheService {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CacheService for InMemoryCacheService {
    async fn set(&self, key: &[u8], value: Vec<u8>) -> Result<(), CacheError> {
        self.entries.lock().unwrap().insert(
            key.to_vec(),
            CacheEntry {
                value,
                expires_at: None,
            },
        );
        Ok(())
    }

    async fn set_with_ttl(
        &self,
        key: &[u8],
        value: Vec<u8>,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        let ttl = chrono::Duration::from_std(ttl).map_err(|e| CacheError::CommandFailed {
            message: format!("invalid ttl: {}", e),
        })?;
        let expires_at = self.clock.now() + ttl;
        self.entries.lock().unwrap().insert(
            key.to_vec(),
            CacheEntry {
                value,
                expires_at: Some(expires_at),
            },
        );
        Ok(())
    }

    async fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, CacheError> {
        let now = self.clock.now();
        let mut entries = self.entries.lock().unwrap();
        match entries.get(key) {
            Some(entry) if entry.is_expired(now) => {
                entries.remove(key);
                Ok(None)
            }
            Some(entry) => Ok(Some(entry.value.clone())),
            None => Ok(None),
        }
    }

    async fn delete(&self, key: &[u8]) -> Result<bool, CacheError> {
        let now = self.clock.now();
        let removed = self.entries.lock().unwrap().remove(key);
        Ok(removed.map(|entry| !entry.is_expired(now)).unwrap_or(false))
    }
}

/// Recorded cache write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetRecord {
    pub key: String,
    pub value: Vec<u8>,
    pub ttl: Option<Duration>,
}

/// Mock cache service for testing.
///
/// Keeps values without expiry and records every call.
#[derive(Default)]
pub struct MockCacheService {
    entries: Mutex<HashMap<Vec<u8>, Vec<u8>>>,
    set_history: Mutex<Vec<SetRecord>>,
    get_history: Mutex<Vec<String>>,
    delete_history: Mutex<Vec<String>>,
    next_error: Mutex<Option<CacheError>>,
    should_fail: Mutex<bool>,
}

impl MockCacheService {
    /// Create new mock cache service.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set next error to return.
    pub fn set_next_error(&self, error: CacheError) -> &Self {
        *self.next_error.lock().unwrap() = Some(error);
        self
    }

    /// Set cache to fail all operations.
    pub fn set_should_fail(&self, should_fail: bool) -> &Self {
        *self.should_fail.lock().unwrap() = should_fail;
        self
    }

    /// Pre-populate a value.
    pub fn add_value(&self, key: &str, value: Vec<u8>) -> &Self {
        self.entries
            .lock()
            .unwrap()
            .insert(key.as_bytes().to_vec(), value);
        self
    }

    /// Get set history.
    pub fn get_set_history(&self) -> Vec<SetRecord> {
        self.set_history.lock().unwrap().clone()
    }

    /// Get get history.
    pub fn get_get_history(&self) -> Vec<String> {
        self.get_history.lock().unwrap().clone()
    }

    /// Get delete history.
    pub fn get_delete_history(&self) -> Vec<String> {
        self.delete_history.lock().unwrap().clone()
    }

    fn check_error(&self) -> Result<(), CacheError> {
        if *self.should_fail.lock().unwrap() {
            return Err(CacheError::ConnectionFailed {
                message: "Mock cache failure".to_string(),
            });
        }

        if let Some(error) = self.next_error.lock().unwrap().take() {
            return Err(error);
        }

        Ok(())
    }

    fn record_set(&self, key: &[u8], value: &[u8], ttl: Option<Duration>) {
        self.set_history.lock().unwrap().push(SetRecord {
            key: String::from_utf8_lossy(key).into_owned(),
            value: value.to_vec(),
            ttl,
        });
    }
}

#[async_trait]
impl CacheService for MockCacheService {
    async fn set(&self, key: &[u8], value: Vec<u8>) -> Result<(), CacheError> {
        self.check_error()?;
        self.record_set(key, &value, None);
        self.entries.lock().unwrap().insert(key.to_vec(), value);
        Ok(())
    }

    async fn set_with_ttl(
        &self,
        key: &[u8],
        value: Vec<u8>,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        self.check_error()?;
        self.record_set(key, &value, Some(ttl));
        self.entries.lock().unwrap().insert(key.to_vec(), value);
        Ok(())
    }

    async fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, CacheError> {
        self.check_error()?;
        self.get_history
            .lock()
            .unwrap()
            .push(String::from_utf8_lossy(key).into_owned());
        Ok(self.entries.lock().unwrap().get(key).cloned())
    }

    async fn delete(&self, key: &[u8]) -> Result<bool, CacheError> {
        self.check_error()?;
        self.delete_history
            .lock()
            .unwrap()
            .push(String::from_utf8_lossy(key).into_owned());
        Ok(self.entries.lock().unwrap().remove(key).is_some())
    }
}

/// Create in-memory cache service.
pub fn create_in_memory_cache_service() -> InMemoryCacheService {
    InMemoryCacheService::new()
}

/// Create mock cache service for testing.
pub fn create_mock_cache_service() -> MockCacheService {
    MockCacheService::new()
}
