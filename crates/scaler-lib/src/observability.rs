//! Observability infrastructure for the hybrid scaler
//!
//! Provides:
//! - Prometheus metrics (reconcile outcomes and latency, rollovers, reclaimed pods)
//! - Structured JSON logging of rollover events with tracing

use prometheus::{
    register_gauge_vec, register_histogram, register_int_counter, register_int_counter_vec,
    GaugeVec, Histogram, IntCounter, IntCounterVec,
};
use std::sync::OnceLock;
use tracing::{info, warn};

/// Histogram buckets for reconcile latency (in seconds)
const RECONCILE_BUCKETS: &[f64] = &[
    0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<ScalerMetricsInner> = OnceLock::new();

struct ScalerMetricsInner {
    reconciliations: IntCounterVec,
    reconcile_duration_seconds: Histogram,
    rollovers_started: IntCounter,
    rollovers_completed: IntCounter,
    rollovers_failed: IntCounter,
    pods_reclaimed: IntCounter,
    update_conflicts: IntCounter,
    chosen_pod_count: GaugeVec,
    chosen_total_cost: GaugeVec,
}

impl ScalerMetricsInner {
    fn new() -> Self {
        Self {
            reconciliations: register_int_counter_vec!(
                "hybrid_scaler_reconciliations_total",
                "Reconciliations by outcome",
                &["outcome"]
            )
            .expect("Failed to register reconciliations_total"),

            reconcile_duration_seconds: register_histogram!(
                "hybrid_scaler_reconcile_duration_seconds",
                "Time spent in one reconciliation",
                RECONCILE_BUCKETS.to_vec()
            )
            .expect("Failed to register reconcile_duration_seconds"),

            rollovers_started: register_int_counter!(
                "hybrid_scaler_rollovers_started_total",
                "Service updates published for a new profile"
            )
            .expect("Failed to register rollovers_started_total"),

            rollovers_completed: register_int_counter!(
                "hybrid_scaler_rollovers_completed_total",
                "Rollovers that reached Done"
            )
            .expect("Failed to register rollovers_completed_total"),

            rollovers_failed: register_int_counter!(
                "hybrid_scaler_rollovers_failed_total",
                "Rollovers that ended in Failed"
            )
            .expect("Failed to register rollovers_failed_total"),

            pods_reclaimed: register_int_counter!(
                "hybrid_scaler_pods_reclaimed_total",
                "Pods of previous revisions deleted after a rollover"
            )
            .expect("Failed to register pods_reclaimed_total"),

            update_conflicts: register_int_counter!(
                "hybrid_scaler_update_conflicts_total",
                "Service updates rejected because the service changed"
            )
            .expect("Failed to register update_conflicts_total"),

            chosen_pod_count: register_gauge_vec!(
                "hybrid_scaler_chosen_pod_count",
                "Pod count of the chosen profile",
                &["namespace", "service"]
            )
            .expect("Failed to register chosen_pod_count"),

            chosen_total_cost: register_gauge_vec!(
                "hybrid_scaler_chosen_total_cost",
                "Total cost of the chosen profile in canonical resource units",
                &["namespace", "service"]
            )
            .expect("Failed to register chosen_total_cost"),
        }
    }
}

/// Handle to the global scaler metrics. Clones share the same metrics.
#[derive(Clone)]
pub struct ScalerMetrics {
    _private: (),
}

impl Default for ScalerMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl ScalerMetrics {
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(ScalerMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &ScalerMetricsInner {
        GLOBAL_METRICS.get_or_init(ScalerMetricsInner::new)
    }

    pub fn observe_reconcile(&self, outcome: &str, duration_secs: f64) {
        self.inner()
            .reconciliations
            .with_label_values(&[outcome])
            .inc();
        self.inner().reconcile_duration_seconds.observe(duration_secs);
    }

    pub fn inc_rollovers_started(&self) {
        self.inner().rollovers_started.inc();
    }

    pub fn inc_rollovers_completed(&self) {
        self.inner().rollovers_completed.inc();
    }

    pub fn inc_rollovers_failed(&self) {
        self.inner().rollovers_failed.inc();
    }

    pub fn add_pods_reclaimed(&self, count: u64) {
        self.inner().pods_reclaimed.inc_by(count);
    }

    pub fn inc_conflicts(&self) {
        self.inner().update_conflicts.inc();
    }

    pub fn set_chosen_profile(&self, namespace: &str, service: &str, pod_count: u64, cost: f64) {
        self.inner()
            .chosen_pod_count
            .with_label_values(&[namespace, service])
            .set(pod_count as f64);
        self.inner()
            .chosen_total_cost
            .with_label_values(&[namespace, service])
            .set(cost);
    }
}

/// Structured logger for rollover events
#[derive(Clone)]
pub struct StructuredLogger {
    controller: String,
}

impl StructuredLogger {
    pub fn new(controller: impl Into<String>) -> Self {
        Self {
            controller: controller.into(),
        }
    }

    /// Log the profile selected for a service
    #[allow(clippy::too_many_arguments)]
    pub fn log_profile_chosen(
        &self,
        namespace: &str,
        service: &str,
        resource_type: &str,
        resource_level: f64,
        concurrency_target: f64,
        pod_count: u64,
        total_cost: f64,
    ) {
        info!(
            event = "profile_chosen",
            controller = %self.controller,
            namespace = %namespace,
            service = %service,
            resource_type = %resource_type,
            resource_level = resource_level,
            concurrency_target = concurrency_target,
            pod_count = pod_count,
            total_cost = total_cost,
            "Chose cost-minimal profile"
        );
    }

    pub fn log_rollover_published(
        &self,
        namespace: &str,
        service: &str,
        previous_revision: Option<&str>,
        target_revision: &str,
    ) {
        info!(
            event = "rollover_published",
            controller = %self.controller,
            namespace = %namespace,
            service = %service,
            previous_revision = ?previous_revision,
            target_revision = %target_revision,
            "Published new service revision"
        );
    }

    pub fn log_revision_ready(&self, namespace: &str, service: &str, revision: &str, waited_secs: f64) {
        info!(
            event = "revision_ready",
            controller = %self.controller,
            namespace = %namespace,
            service = %service,
            revision = %revision,
            waited_secs = waited_secs,
            "Revision is ready"
        );
    }

    pub fn log_revision_retired(&self, namespace: &str, service: &str, revision: &str, deleted: bool) {
        info!(
            event = "revision_retired",
            controller = %self.controller,
            namespace = %namespace,
            service = %service,
            revision = %revision,
            deleted = deleted,
            "Previous revision removed"
        );
    }

    pub fn log_revision_drained(&self, namespace: &str, service: &str, revision: &str, pods_deleted: usize) {
        info!(
            event = "revision_drained",
            controller = %self.controller,
            namespace = %namespace,
            service = %service,
            revision = %revision,
            pods_deleted = pods_deleted,
            "Previous revision drained"
        );
    }

    pub fn log_rollover_failed(&self, namespace: &str, service: &str, reason: &str) {
        warn!(
            event = "rollover_failed",
            controller = %self.controller,
            namespace = %namespace,
            service = %service,
            reason = %reason,
            "Rollover failed"
        );
    }

    pub fn log_startup(&self, version: &str, watch_namespace: Option<&str>) {
        info!(
            event = "scaler_started",
            controller = %self.controller,
            version = %version,
            watch_namespace = %watch_namespace.unwrap_or("*"),
            "Hybrid scaler started"
        );
    }

    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "scaler_shutdown",
            controller = %self.controller,
            reason = %reason,
            "Hybrid scaler shutting down"
        );
    }
}
