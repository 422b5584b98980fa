//! Telemetry
//!
//! Observability components for token store operations. Logging goes through
//! `tracing`; this module carries the metrics sink.

pub mod metrics;

pub use metrics::{
    create_in_memory_metrics, no_op_metrics, InMemoryMetrics, MetricEntry, MetricLabels,
    NoOpMetrics, TokenStoreMetrics,
};
