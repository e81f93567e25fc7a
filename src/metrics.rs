// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Prometheus metrics for the platform controllers.
//!
//! All metric names carry the prefix `cf_k8s_controllers_`.
//!
//! # Metrics Categories
//!
//! - **Reconciliation Metrics** - Outcomes and duration of reconcile calls
//! - **Queue Metrics** - Work queue depth and requeues
//! - **Resource Lifecycle Metrics** - Cluster objects created and deleted by the controllers
//!
//! # Example
//!
//! ```rust,no_run
//! use cf_k8s_controllers::metrics::record_reconciliation_success;
//!
//! record_reconciliation_success("ServiceBinding", std::time::Duration::from_millis(12));
//! ```

use prometheus::{
    CounterVec, Encoder, GaugeVec, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder,
};
use std::sync::LazyLock;
use std::time::Duration;

// ============================================================================
// Metric Name Constants
// ============================================================================

/// Namespace prefix for all controller metrics (prometheus-safe)
const METRICS_NAMESPACE: &str = "cf_k8s_controllers";

// ============================================================================
// Global Metrics Registry
// ============================================================================

/// Global Prometheus metrics registry
///
/// All metrics are registered in this registry and exposed via `/metrics` endpoint.
pub static METRICS_REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

// ============================================================================
// Reconciliation Metrics
// ============================================================================

/// Total number of reconciliations by controller and outcome
///
/// Labels:
/// - `controller`: Controller name (e.g., `servicebinding`)
/// - `status`: Outcome (`success`, `error`, `requeue`, `terminal`)
pub static RECONCILIATION_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_reconciliations_total"),
        "Total number of reconciliations by controller and outcome",
    );
    let counter = CounterVec::new(opts, &["controller", "status"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(counter.clone()))
        .unwrap();
    counter
});

/// Duration of reconciliations in seconds
pub static RECONCILIATION_DURATION_SECONDS: LazyLock<HistogramVec> = LazyLock::new(|| {
    let opts = HistogramOpts::new(
        format!("{METRICS_NAMESPACE}_reconciliation_duration_seconds"),
        "Duration of reconciliations in seconds by controller",
    )
    .buckets(vec![0.001, 0.01, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0, 60.0]);
    let histogram = HistogramVec::new(opts, &["controller"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(histogram.clone()))
        .unwrap();
    histogram
});

/// Total number of reconcile errors by category
///
/// Labels:
/// - `controller`: Controller name
/// - `error_type`: See [`crate::errors::ReconcileError::category`]
pub static ERRORS_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_errors_total"),
        "Total number of reconcile errors by controller and category",
    );
    let counter = CounterVec::new(opts, &["controller", "error_type"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(counter.clone()))
        .unwrap();
    counter
});

// ============================================================================
// Queue Metrics
// ============================================================================

/// Total number of requeue operations
///
/// Labels:
/// - `controller`: Controller name
/// - `reason`: Reason for requeue (`backoff`, `scheduled`)
pub static REQUEUE_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_requeues_total"),
        "Total number of requeue operations by controller and reason",
    );
    let counter = CounterVec::new(opts, &["controller", "reason"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(counter.clone()))
        .unwrap();
    counter
});

/// Keys waiting in each controller's work queue
pub static QUEUE_DEPTH: LazyLock<GaugeVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_queue_depth"),
        "Number of keys waiting in the work queue by controller",
    );
    let gauge = GaugeVec::new(opts, &["controller"]).unwrap();
    METRICS_REGISTRY.register(Box::new(gauge.clone())).unwrap();
    gauge
});

// ============================================================================
// Resource Lifecycle Metrics
// ============================================================================

/// Total number of cluster objects created by the controllers
///
/// Labels:
/// - `resource_type`: Kind created (e.g., `RoleBinding`, `SubnamespaceAnchor`)
pub static RESOURCES_CREATED_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_resources_created_total"),
        "Total number of cluster objects created by type",
    );
    let counter = CounterVec::new(opts, &["resource_type"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(counter.clone()))
        .unwrap();
    counter
});

/// Total number of cluster objects deleted by the controllers
pub static RESOURCES_DELETED_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_resources_deleted_total"),
        "Total number of cluster objects deleted by type",
    );
    let counter = CounterVec::new(opts, &["resource_type"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(counter.clone()))
        .unwrap();
    counter
});

// ============================================================================
// Helper Functions
// ============================================================================

/// Record a successful reconciliation
///
/// # Arguments
/// * `controller` - Controller name
/// * `duration` - Duration of the reconciliation
pub fn record_reconciliation_success(controller: &str, duration: Duration) {
    RECONCILIATION_TOTAL
        .with_label_values(&[controller, "success"])
        .inc();
    RECONCILIATION_DURATION_SECONDS
        .with_label_values(&[controller])
        .observe(duration.as_secs_f64());
}

/// Record a failed reconciliation
///
/// # Arguments
/// * `controller` - Controller name
/// * `error_type` - Error category
/// * `duration` - Duration of the reconciliation before failure
pub fn record_reconciliation_error(controller: &str, error_type: &str, duration: Duration) {
    let status = if error_type == "terminal" {
        "terminal"
    } else {
        "error"
    };
    RECONCILIATION_TOTAL
        .with_label_values(&[controller, status])
        .inc();
    RECONCILIATION_DURATION_SECONDS
        .with_label_values(&[controller])
        .observe(duration.as_secs_f64());
    ERRORS_TOTAL
        .with_label_values(&[controller, error_type])
        .inc();
}

/// Record a requeue
///
/// # Arguments
/// * `controller` - Controller name
/// * `reason` - `backoff` after an error, `scheduled` when the reconciler asked for it
pub fn record_reconciliation_requeue(controller: &str, reason: &str) {
    RECONCILIATION_TOTAL
        .with_label_values(&[controller, "requeue"])
        .inc();
    REQUEUE_TOTAL.with_label_values(&[controller, reason]).inc();
}

/// Record the current depth of a controller's queue
pub fn record_queue_depth(controller: &str, depth: usize) {
    #[allow(clippy::cast_precision_loss)]
    QUEUE_DEPTH
        .with_label_values(&[controller])
        .set(depth as f64);
}

/// Record creation of a cluster object
pub fn record_resource_created(resource_type: &str) {
    RESOURCES_CREATED_TOTAL
        .with_label_values(&[resource_type])
        .inc();
}

/// Record deletion of a cluster object
pub fn record_resource_deleted(resource_type: &str) {
    RESOURCES_DELETED_TOTAL
        .with_label_values(&[resource_type])
        .inc();
}

/// Gather and encode all metrics in Prometheus text format
///
/// # Errors
/// Returns error if encoding fails
pub fn gather_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = METRICS_REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(format!("UTF-8 error: {e}")))
}
