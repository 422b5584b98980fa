//! Token Value Generator
//!
//! Unguessable token values: random bytes from the OS CSPRNG, base64-encoded.
//! Collisions are left to the generator's probability; nothing checks uniqueness.

use base64::Engine;
use rand::rngs::OsRng;
use rand::RngCore;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use crate::types::DEFAULT_TOKEN_VALUE_LENGTH;

/// Token value generator interface (for dependency injection).
pub trait TokenValueGenerator: Send + Sync {
    /// Produce a new token value.
    fn new_token_value(&self) -> String;
}

/// Default token value generator.
pub struct DefaultTokenValueGenerator {
    length: usize,
}

impl DefaultTokenValueGenerator {
    /// Create generator producing 20 random bytes per value.
    pub fn new() -> Self {
        Self::with_length(DEFAULT_TOKEN_VALUE_LENGTH)
    }

    /// Create generator with custom byte length.
    ///
    /// # Panics
    /// Panics if length is zero.
    pub fn with_length(length: usize) -> Self {
        assert!(length > 0, "token value length must be positive");
        Self { length }
    }
}

impl Default for DefaultTokenValueGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl TokenValueGenerator for DefaultTokenValueGenerator {
    fn new_token_value(&self) -> String {
        let mut bytes = vec![0u8; self.length];
        OsRng.fill_bytes(&mut bytes);
        base64::engine::general_purpose::STANDARD.encode(&bytes)
    }
}

/// Mock token value generator for testing.
///
/// Returns queued values first, then `mock-token-N`.
#[derive(Default)]
pub struct MockTokenValueGenerator {
    queued: Mutex<VecDeque<String>>,
    counter: AtomicU64,
}

impl MockTokenValueGenerator {
    /// Create new mock token value generator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the next value to return.
    pub fn push_value(&self, value: impl Into<String>) -> &Self {
        self.queued.lock().unwrap().push_back(value.into());
        self
    }

    /// Number of values produced so far.
    pub fn generated_count(&self) -> u64 {
        self.counter.load(Ordering::SeqCst)
    }
}

impl TokenValueGenerator for MockTokenValueGenerator {
    fn new_token_value(&self) -> String {
        let n = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        self.queued
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| format!("mock-token-{}", n))
    }
}

/// Create production token value generator.
pub fn create_token_value_generator(length: usize) -> impl TokenValueGenerator {
    DefaultTokenValueGenerator::with_length(length)
}

/// Create mock token value generator for testing.
pub fn create_mock_token_value_generator() -> MockTokenValueGenerator {
    MockTokenValueGenerator::new()
}
