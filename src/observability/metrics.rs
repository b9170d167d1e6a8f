//! # Metrics
//!
//! Prometheus metrics for monitoring the controller.
//!
//! ## Metrics Exposed
//!
//! - `app_bundle_reconciliations_total` - Total number of reconciliations (by controller)
//! - `app_bundle_reconciliations_gated_total` - Reconciliations skipped by the state cache
//! - `app_bundle_reconciliation_errors_total` - Reconciliation errors by error class
//! - `app_bundle_reconciliation_duration_seconds` - Duration of reconciliation passes
//! - `app_bundle_resource_writes_total` - Managed resource writes by kind and operation
//! - `app_bundle_template_invalidations_total` - Instances invalidated by template changes
//! - `app_bundle_requeues_total` - Requeues by reason
//! - `app_bundle_state_cache_entries` - Objects tracked by the state cache

use anyhow::Result;
use prometheus::{Histogram, IntCounter, IntCounterVec, IntGauge, Registry};
use std::sync::LazyLock;

// Metrics
pub(crate) static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

static RECONCILIATIONS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "app_bundle_reconciliations_total",
            "Total number of reconciliations",
        ),
        &["controller"],
    )
    .expect("Failed to create RECONCILIATIONS_TOTAL metric - this should never happen")
});

static RECONCILIATIONS_GATED_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "app_bundle_reconciliations_gated_total",
        "Total number of reconciliations skipped because the spec was unchanged",
    )
    .expect("Failed to create RECONCILIATIONS_GATED_TOTAL metric - this should never happen")
});

static RECONCILIATION_ERRORS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "app_bundle_reconciliation_errors_total",
            "Total number of reconciliation errors by error class",
        ),
        &["class"],
    )
    .expect("Failed to create RECONCILIATION_ERRORS_TOTAL metric - this should never happen")
});

static RECONCILIATION_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    Histogram::with_opts(
        prometheus::HistogramOpts::new(
            "app_bundle_reconciliation_duration_seconds",
            "Duration of reconciliation in seconds",
        )
        .buckets(vec![0.05, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0]),
    )
    .expect("Failed to create RECONCILIATION_DURATION metric - this should never happen")
});

static RESOURCE_WRITES_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "app_bundle_resource_writes_total",
            "Total number of managed resource writes by kind and operation",
        ),
        &["kind", "operation"],
    )
    .expect("Failed to create RESOURCE_WRITES_TOTAL metric - this should never happen")
});

static TEMPLATE_INVALIDATIONS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "app_bundle_template_invalidations_total",
        "Total number of AppInstances invalidated by AppTemplate changes",
    )
    .expect("Failed to create TEMPLATE_INVALIDATIONS_TOTAL metric - this should never happen")
});

static REQUEUES_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new("app_bundle_requeues_total", "Total number of requeues by reason"),
        &["reason"],
    )
    .expect("Failed to create REQUEUES_TOTAL metric - this should never happen")
});

static STATE_CACHE_ENTRIES: LazyLock<IntGauge> = LazyLock::new(|| {
    IntGauge::new(
        "app_bundle_state_cache_entries",
        "Current number of objects tracked by the reconcile state cache",
    )
    .expect("Failed to create STATE_CACHE_ENTRIES metric - this should never happen")
});

#[allow(
    clippy::missing_errors_doc,
    reason = "Error documentation is provided in doc comments"
)]
pub fn register_metrics() -> Result<()> {
    REGISTRY.register(Box::new(RECONCILIATIONS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RECONCILIATIONS_GATED_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RECONCILIATION_ERRORS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RECONCILIATION_DURATION.clone()))?;
    REGISTRY.register(Box::new(RESOURCE_WRITES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(TEMPLATE_INVALIDATIONS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(REQUEUES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(STATE_CACHE_ENTRIES.clone()))?;

    Ok(())
}

pub fn increment_reconciliations(controller: &str) {
    RECONCILIATIONS_TOTAL.with_label_values(&[controller]).inc();
}

pub fn increment_gated_reconciliations() {
    RECONCILIATIONS_GATED_TOTAL.inc();
}

pub fn increment_reconciliation_errors(class: &str) {
    RECONCILIATION_ERRORS_TOTAL.with_label_values(&[class]).inc();
}

pub fn observe_reconciliation_duration(duration: f64) {
    RECONCILIATION_DURATION.observe(duration);
}

pub fn increment_resource_writes(kind: &str, operation: &str) {
    RESOURCE_WRITES_TOTAL
        .with_label_values(&[kind, operation])
        .inc();
}

pub fn increment_template_invalidations(count: usize) {
    TEMPLATE_INVALIDATIONS_TOTAL.inc_by(u64::try_from(count).unwrap_or(u64::MAX));
}

pub fn increment_requeues(reason: &str) {
    REQUEUES_TOTAL.with_label_values(&[reason]).inc();
}

pub fn set_state_cache_entries(count: usize) {
    STATE_CACHE_ENTRIES.set(i64::try_from(count).unwrap_or(i64::MAX));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_metrics() {
        // This should not panic - metrics should register successfully
        assert!(register_metrics().is_ok());
    }

    #[test]
    fn test_increment_reconciliations() {
        let before = RECONCILIATIONS_TOTAL.with_label_values(&["instance"]).get();
        increment_reconciliations("instance");
        let after = RECONCILIATIONS_TOTAL.with_label_values(&["instance"]).get();
        assert_eq!(after, before + 1u64);
    }

    #[test]
    fn test_increment_reconciliation_errors_by_class() {
        let before = RECONCILIATION_ERRORS_TOTAL
            .with_label_values(&["configuration"])
            .get();
        increment_reconciliation_errors("configuration");
        let after = RECONCILIATION_ERRORS_TOTAL
            .with_label_values(&["configuration"])
            .get();
        assert_eq!(after, before + 1u64);
    }

    #[test]
    fn test_increment_resource_writes() {
        let before = RESOURCE_WRITES_TOTAL
            .with_label_values(&["Service", "create"])
            .get();
        increment_resource_writes("Service", "create");
        let after = RESOURCE_WRITES_TOTAL
            .with_label_values(&["Service", "create"])
            .get();
        assert_eq!(after, before + 1u64);
    }

    #[test]
    fn test_increment_template_invalidations() {
        let before = TEMPLATE_INVALIDATIONS_TOTAL.get();
        increment_template_invalidations(3);
        assert_eq!(TEMPLATE_INVALIDATIONS_TOTAL.get(), before + 3u64);
    }

    #[test]
    fn test_set_state_cache_entries() {
        set_state_cache_entries(10);
        assert_eq!(STATE_CACHE_ENTRIES.get(), 10);
        set_state_cache_entries(20);
        assert_eq!(STATE_CACHE_ENTRIES.get(), 20);
    }

    #[test]
    fn test_observe_reconciliation_duration() {
        observe_reconciliation_duration(1.5);
        // Just verify it doesn't panic - histogram observation doesn't return a value
    }
}
