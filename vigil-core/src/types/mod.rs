//! Core domain types for Vigil.

pub mod metric;

// Re-exports
pub use metric::{finite_gauge, Metric, MetricKind, MetricUpdate};
