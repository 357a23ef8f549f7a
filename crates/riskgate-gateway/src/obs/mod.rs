//! Lightweight in-process metrics (no exporter crates).
//!
//! Metrics are stored as atomics and rendered by the `/metrics` handler in
//! Prometheus text format.

pub mod metrics;

pub use metrics::RiskMetrics;
