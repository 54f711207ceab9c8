//! Metrics collection for the serial bridge.
//!
//! Provides Prometheus-compatible counters for frame traffic, dropped data
//! and connection churn.

pub mod prometheus;

pub use prometheus::{BridgeMetrics, RejectReason};
