//! Prometheus metrics for the pipelines operator
//!
//! # Exported metrics
//! The `/metrics` endpoint (when built with `--features metrics`) exports the following metrics:
//! - `dspo_reconcile_duration_seconds` (histogram): reconcile duration labeled by controller.
//! - `dspo_reconcile_errors_total` (counter): reconcile errors labeled by controller and kind.
//! - `dspo_database_available` (gauge): 1 when the last health check passed, labeled by namespace/name/backend.
//! - `dspo_database_probe_duration_seconds` (histogram): duration of database health probes.

use std::sync::atomic::AtomicI64;

use once_cell::sync::Lazy;
use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::metrics::histogram::{exponential_buckets, Histogram};
use prometheus_client::registry::Registry;

use super::decision::BackendDecision;

/// Labels identifying one DSPA's database
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct DatabaseLabels {
    pub namespace: String,
    pub name: String,
    /// External, MariaDB, or None
    pub backend: String,
}

/// Labels for operator reconcile metrics
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct ReconcileLabels {
    /// Controller name, e.g. "dspa"
    pub controller: String,
}

/// Labels for operator error metrics
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct ErrorLabels {
    pub controller: String,
    /// Error kind, see [`crate::error::Error::kind`]
    pub kind: String,
}

/// Gauge set to 1 when the database passed its last health check
pub static DATABASE_AVAILABLE: Lazy<Family<DatabaseLabels, Gauge<i64, AtomicI64>>> =
    Lazy::new(Family::default);

/// Histogram tracking reconcile duration (seconds)
pub static RECONCILE_DURATION_SECONDS: Lazy<Family<ReconcileLabels, Histogram>> = Lazy::new(|| {
    fn reconcile_histogram() -> Histogram {
        // 1ms .. ~32s across 16 buckets.
        Histogram::new(exponential_buckets(0.001, 2.0, 16))
    }

    Family::new_with_constructor(reconcile_histogram)
});

/// Histogram tracking database probe duration (seconds)
pub static PROBE_DURATION_SECONDS: Lazy<Histogram> =
    Lazy::new(|| Histogram::new(exponential_buckets(0.005, 2.0, 14)));

/// Counter tracking reconcile errors
pub static RECONCILE_ERRORS_TOTAL: Lazy<Family<ErrorLabels, Counter>> =
    Lazy::new(Family::default);

/// Global metrics registry
pub static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let mut registry = Registry::default();

    registry.register(
        "dspo_reconcile_duration_seconds",
        "Duration of reconcile loops in seconds",
        RECONCILE_DURATION_SECONDS.clone(),
    );
    registry.register(
        "dspo_reconcile_errors_total",
        "Total number of reconcile errors",
        RECONCILE_ERRORS_TOTAL.clone(),
    );
    registry.register(
        "dspo_database_available",
        "Whether the database passed its last health check",
        DATABASE_AVAILABLE.clone(),
    );
    registry.register(
        "dspo_database_probe_duration_seconds",
        "Duration of database health probes in seconds",
        PROBE_DURATION_SECONDS.clone(),
    );
    registry
});

/// Observe a reconcile duration in seconds.
pub fn observe_reconcile_duration_seconds(controller: &str, seconds: f64) {
    let labels = ReconcileLabels {
        controller: controller.to_string(),
    };
    RECONCILE_DURATION_SECONDS
        .get_or_create(&labels)
        .observe(seconds);
}

/// Increment the reconcile error counter.
pub fn inc_reconcile_error(controller: &str, kind: &str) {
    let labels = ErrorLabels {
        controller: controller.to_string(),
        kind: kind.to_string(),
    };
    RECONCILE_ERRORS_TOTAL.get_or_create(&labels).inc();
}

pub fn observe_probe_duration_seconds(seconds: f64) {
    PROBE_DURATION_SECONDS.observe(seconds);
}

fn database_labels(namespace: &str, name: &str, backend: &str) -> DatabaseLabels {
    DatabaseLabels {
        namespace: namespace.to_string(),
        name: name.to_string(),
        backend: backend.to_string(),
    }
}

/// Record the outcome of a readiness evaluation.
///
/// Series for the DSPA's other backends are removed, so a backend switch
/// leaves exactly one series behind.
pub fn set_database_available(namespace: &str, name: &str, backend: &str, available: bool) {
    for other in BackendDecision::ALL.iter().map(|d| d.as_status()) {
        if other != backend {
            DATABASE_AVAILABLE.remove(&database_labels(namespace, name, other));
        }
    }
    DATABASE_AVAILABLE
        .get_or_create(&database_labels(namespace, name, backend))
        .set(i64::from(available));
}

/// Drop every availability series of a deleted DSPA
pub fn clear_database_available(namespace: &str, name: &str) {
    for backend in BackendDecision::ALL.iter().map(|d| d.as_status()) {
        DATABASE_AVAILABLE.remove(&database_labels(namespace, name, backend));
    }
}

/// Render the registry in the OpenMetrics text format
pub fn encode() -> Result<String, std::fmt::Error> {
    let mut buffer = String::new();
    prometheus_client::encoding::text::encode(&mut buffer, &REGISTRY)?;
    Ok(buffer)
}
