//! # Observability
//!
//! Prometheus metrics for the controller.
//!
//! - `metrics`: Prometheus metrics collection

pub mod metrics;

// Re-export for convenience
pub use metrics::*;
