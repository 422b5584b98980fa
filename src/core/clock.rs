//! Clock
//!
//! Time source shared by the token store and the in-memory cache.

use chrono::{DateTime, Utc};
use std::sync::Mutex;
use std::time::Duration;

/// Clock interface (for dependency injection).
pub trait Clock: Send + Sync {
    /// Current instant.
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Manually driven clock for testing.
pub struct MockClock {
    now: Mutex<DateTime<Utc>>,
}

impl MockClock {
    /// Create mock clock frozen at `start`.
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    /// Move the clock forward.
    pub fn advance(&self, by: Duration) -> &Self {
        let delta = chrono::Duration::from_std(by).unwrap_or_else(|_| chrono::Duration::zero());
        *self.now.lock().unwrap() += delta;
        self
    }

    /// Jump to an instant.
    pub fn set(&self, instant: DateTime<Utc>) -> &Self {
        *self.now.lock().unwrap() = instant;
        self
    }
}

impl Default for MockClock {
    fn default() -> Self {
        Self::new(Utc::now())
    }
}

impl Clock for MockClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}

/// Create system clock.
pub fn create_system_clock() -> SystemClock {
    SystemClock
}

/// Create mock clock for testing.
pub fn create_mock_clock() -> MockClock {
    MockClock::default()
}
