//! Metrics
//!
//! Token store metrics collection interfaces and implementations.

use std::collections::HashMap;
use std::sync::Mutex;

/// Metric labels.
pub type MetricLabels = HashMap<String, String>;

/// Token store metrics interface.
///
/// Every method takes the key prefix as `realm` so realms sharing one
/// process can be told apart.
pub trait TokenStoreMetrics: Send + Sync {
    /// A new access/refresh pair was minted.
    fn record_token_issued(&self, realm: &str, with_refresh: bool);

    /// An existing access token was handed out again.
    fn record_token_reused(&self, realm: &str);

    /// A refresh token was attached to an existing access token.
    fn record_refresh_attached(&self, realm: &str);

    /// A token was revoked. `kind` is `access`, `refresh` or `all`.
    fn record_revocation(&self, realm: &str, kind: &str);

    /// A stale fingerprint index was rewritten.
    fn record_stale_index_repaired(&self, realm: &str);

    /// A refresh grant was served or rejected.
    fn record_refresh_grant(&self, realm: &str, success: bool);
}

/// No-op metrics implementation.
pub struct NoOpMetrics;

impl TokenStoreMetrics for NoOpMetrics {
    fn record_token_issued(&self, _realm: &str, _with_refresh: bool) {}
    fn record_token_reused(&self, _realm: &str) {}
    fn record_refresh_attached(&self, _realm: &str) {}
    fn record_revocation(&self, _realm: &str, _kind: &str) {}
    fn record_stale_index_repaired(&self, _realm: &str) {}
    fn record_refresh_grant(&self, _realm: &str, _success: bool) {}
}

/// No-op metrics singleton.
pub fn no_op_metrics() -> NoOpMetrics {
    NoOpMetrics
}

/// Metric entry for in-memory storage.
#[derive(Debug, Clone)]
pub struct MetricEntry {
    pub name: String,
    pub value: f64,
    pub labels: MetricLabels,
}

/// In-memory metrics for testing.
pub struct InMemoryMetrics {
    entries: Mutex<Vec<MetricEntry>>,
}

impl InMemoryMetrics {
    /// Create new in-memory metrics.
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
        }
    }

    /// Get all recorded entries.
    pub fn get_entries(&self) -> Vec<MetricEntry> {
        self.entries.lock().unwrap().clone()
    }

    /// Get entries by name.
    pub fn get_entries_by_name(&self, name: &str) -> Vec<MetricEntry> {
        self.entries
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.name == name)
            .cloned()
            .collect()
    }

    /// Sum of values recorded under `name`.
    pub fn total(&self, name: &str) -> f64 {
        self.get_entries_by_name(name).iter().map(|e| e.value).sum()
    }

    /// Clear all entries.
    pub fn clear(&self) {
        self.entries.lock().unwrap().clear();
    }

    fn record(&self, name: &str, value: f64, labels: MetricLabels) {
        self.entries.lock().unwrap().push(MetricEntry {
            name: name.to_string(),
            value,
            labels,
        });
    }

    fn realm_labels(realm: &str) -> MetricLabels {
        let mut labels = MetricLabels::new();
        labels.insert("realm".to_string(), realm.to_string());
        labels
    }
}

impl Default for InMemoryMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl TokenStoreMetrics for InMemoryMetrics {
    fn record_token_issued(&self, realm: &str, with_refresh: bool) {
        let mut labels = Self::realm_labels(realm);
        labels.insert("with_refresh".to_string(), with_refresh.to_string());
        self.record("token_store_tokens_issued_total", 1.0, labels);
    }

    fn record_token_reused(&self, realm: &str) {
        self.record(
            "token_store_tokens_reused_total",
            1.0,
            Self::realm_labels(realm),
        );
    }

    fn record_refresh_attached(&self, realm: &str) {
        self.record(
            "token_store_refresh_attached_total",
            1.0,
            Self::realm_labels(realm),
        );
    }

    fn record_revocation(&self, realm: &str, kind: &str) {
        let mut labels = Self::realm_labels(realm);
        labels.insert("kind".to_string(), kind.to_string());
        self.record("token_store_revocations_total", 1.0, labels);
    }

    fn record_stale_index_repaired(&self, realm: &str) {
        self.record(
            "token_store_stale_index_repaired_total",
            1.0,
            Self::realm_labels(realm),
        );
    }

    fn record_refresh_grant(&self, realm: &str, success: bool) {
        let mut labels = Self::realm_labels(realm);
        labels.insert("success".to_string(), success.to_string());
        self.record("token_store_refresh_grants_total", 1.0, labels);
    }
}

/// Create in-memory metrics for testing.
pub fn create_in_memory_metrics() -> InMemoryMetrics {
    InMemoryMetrics::new()
}
