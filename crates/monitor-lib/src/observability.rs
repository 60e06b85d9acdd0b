//! Observability infrastructure for drift monitoring
//!
//! Provides:
//! - Prometheus metrics (evaluation latency, drift checks, alerts, errors)
//! - Structured JSON logging with tracing

use prometheus::{
    register_gauge_vec, register_histogram, register_int_counter, register_int_counter_vec,
    register_int_gauge, GaugeVec, Histogram, IntCounter, IntCounterVec, IntGauge,
};
use std::sync::OnceLock;
use tracing::{error, info, warn};

use crate::models::{Alert, DriftResult, Severity};

/// Histogram buckets for evaluation latency (in seconds)
const LATENCY_BUCKETS: &[f64] = &[
    0.0001, 0.0005, 0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 5.0,
];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<MonitorMetricsInner> = OnceLock::new();

/// Inner metrics structure that holds the actual Prometheus metrics
struct MonitorMetricsInner {
    evaluation_latency_seconds: Histogram,
    points_ingested: IntCounter,
    drift_checks: IntCounter,
    drift_detected: IntCounterVec,
    alerts_raised: IntCounterVec,
    alerts_suppressed: IntCounter,
    alerts_expired: IntCounter,
    evaluation_errors: IntCounterVec,
    evaluations_falling_behind: IntCounter,
    models_monitored: IntGauge,
    model_health_score: GaugeVec,
    collection_errors: IntCounter,
}

impl MonitorMetricsInner {
    fn new() -> Self {
        Self {
            evaluation_latency_seconds: register_histogram!(
                "driftwatch_evaluation_latency_seconds",
                "Time spent evaluating one model",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register evaluation_latency_seconds"),

            points_ingested: register_int_counter!(
                "driftwatch_points_ingested_total",
                "Total number of metric points ingested"
            )
            .expect("Failed to register points_ingested"),

            drift_checks: register_int_counter!(
                "driftwatch_drift_checks_total",
                "Total number of per-feature drift checks run"
            )
            .expect("Failed to register drift_checks"),

            drift_detected: register_int_counter_vec!(
                "driftwatch_drift_detected_total",
                "Total number of drift checks that reported drift",
                &["algorithm"]
            )
            .expect("Failed to register drift_detected"),

            alerts_raised: register_int_counter_vec!(
                "driftwatch_alerts_raised_total",
                "Total number of alerts raised",
                &["severity"]
            )
            .expect("Failed to register alerts_raised"),

            alerts_suppressed: register_int_counter!(
                "driftwatch_alerts_suppressed_total",
                "Total number of alerts suppressed by deduplication"
            )
            .expect("Failed to register alerts_suppressed"),

            alerts_expired: register_int_counter!(
                "driftwatch_alerts_expired_total",
                "Total number of alerts dropped by retention"
            )
            .expect("Failed to register alerts_expired"),

            evaluation_errors: register_int_counter_vec!(
                "driftwatch_evaluation_errors_total",
                "Total number of drift evaluation errors",
                &["kind"]
            )
            .expect("Failed to register evaluation_errors"),

            evaluations_falling_behind: register_int_counter!(
                "driftwatch_evaluations_falling_behind_total",
                "Ticks that skipped a model still evaluating the previous tick"
            )
            .expect("Failed to register evaluations_falling_behind"),

            models_monitored: register_int_gauge!(
                "driftwatch_models_monitored",
                "Number of models currently monitored"
            )
            .expect("Failed to register models_monitored"),

            model_health_score: register_gauge_vec!(
                "driftwatch_model_health_score",
                "Latest health score per monitored model",
                &["model_id"]
            )
            .expect("Failed to register model_health_score"),

            collection_errors: register_int_counter!(
                "driftwatch_collection_errors_total",
                "Total number of metric source collection errors"
            )
            .expect("Failed to register collection_errors"),
        }
    }
}

/// Monitor metrics for Prometheus exposition
///
/// This is a lightweight handle to the global metrics instance.
/// Multiple clones share the same underlying metrics.
#[derive(Clone)]
pub struct MonitorMetrics {
    _private: (),
}

impl Default for MonitorMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl MonitorMetrics {
    /// Create a new metrics handle (initializes global metrics if needed)
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(MonitorMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &MonitorMetricsInner {
        GLOBAL_METRICS.get_or_init(MonitorMetricsInner::new)
    }

    /// Record the duration of one model evaluation
    pub fn observe_evaluation_latency(&self, duration_secs: f64) {
        self.inner().evaluation_latency_seconds.observe(duration_secs);
    }

    pub fn inc_points_ingested(&self) {
        self.inner().points_ingested.inc();
    }

    /// Count one drift check and, if it reported drift, one detection
    pub fn record_drift_check(&self, result: &DriftResult) {
        self.inner().drift_checks.inc();
        if result.is_drift {
            self.inner()
                .drift_detected
                .with_label_values(&[result.algorithm.as_str()])
                .inc();
        }
    }

    pub fn inc_alerts_raised(&self, severity: Severity) {
        self.inner()
            .alerts_raised
            .with_label_values(&[severity.as_str()])
            .inc();
    }

    pub fn inc_alerts_suppressed(&self) {
        self.inner().alerts_suppressed.inc();
    }

    pub fn inc_alerts_expired(&self, count: u64) {
        self.inner().alerts_expired.inc_by(count);
    }

    /// Count an evaluation error by kind
    pub fn inc_evaluation_errors(&self, kind: &str) {
        self.inner().evaluation_errors.with_label_values(&[kind]).inc();
    }

    /// Evaluation errors of one kind counted so far
    pub fn evaluation_errors(&self, kind: &str) -> u64 {
        self.inner().evaluation_errors.with_label_values(&[kind]).get()
    }

    pub fn inc_falling_behind(&self) {
        self.inner().evaluations_falling_behind.inc();
    }

    pub fn set_models_monitored(&self, count: i64) {
        self.inner().models_monitored.set(count);
    }

    /// Publish the latest health score of a model
    pub fn set_health_score(&self, model_id: &str, score: f64) {
        self.inner()
            .model_health_score
            .with_label_values(&[model_id])
            .set(score);
    }

    /// Drop the health series of a model that is no longer monitored
    pub fn remove_health_score(&self, model_id: &str) {
        let _ = self.inner().model_health_score.remove_label_values(&[model_id]);
    }

    pub fn inc_collection_errors(&self) {
        self.inner().collection_errors.inc();
    }
}

/// Structured logger for monitoring events
///
/// Provides consistent JSON-formatted logging for drift evaluations,
/// alerts, and lifecycle events.
#[derive(Clone)]
pub struct StructuredLogger {
    instance: String,
}

impl StructuredLogger {
    pub fn new(instance: impl Into<String>) -> Self {
        Self {
            instance: instance.into(),
        }
    }

    /// Log a completed drift evaluation for one feature
    pub fn log_drift_evaluated(&self, model_id: &str, result: &DriftResult) {
        info!(
            event = "drift_evaluated",
            instance = %self.instance,
            model_id = %model_id,
            feature = %result.feature,
            algorithm = %result.algorithm,
            drift_score = result.drift_score,
            p_value = ?result.p_value,
            effect_size = result.effect_size,
            is_drift = result.is_drift,
            "Drift evaluated"
        );
    }

    /// Log a raised alert
    pub fn log_alert(&self, alert: &Alert) {
        match alert.severity {
            Severity::Critical | Severity::High => {
                warn!(
                    event = "alert_raised",
                    instance = %self.instance,
                    model_id = %alert.model_id,
                    kind = %alert.kind,
                    feature = %alert.feature,
                    severity = %alert.severity,
                    message = %alert.message,
                    recommendation = %alert.recommendation,
                    "Alert raised"
                );
            }
            _ => {
                info!(
                    event = "alert_raised",
                    instance = %self.instance,
                    model_id = %alert.model_id,
                    kind = %alert.kind,
                    feature = %alert.feature,
                    severity = %alert.severity,
                    message = %alert.message,
                    "Alert raised"
                );
            }
        }
    }

    /// Log the start of monitoring for a model
    pub fn log_monitoring_started(
        &self,
        model_id: &str,
        drift_threshold: f64,
        check_interval_secs: i64,
        algorithm: &str,
    ) {
        info!(
            event = "monitoring_started",
            instance = %self.instance,
            model_id = %model_id,
            drift_threshold = drift_threshold,
            check_interval_secs = check_interval_secs,
            algorithm = %algorithm,
            "Monitoring started"
        );
    }

    pub fn log_monitoring_stopped(&self, model_id: &str) {
        info!(
            event = "monitoring_stopped",
            instance = %self.instance,
            model_id = %model_id,
            "Monitoring stopped"
        );
    }

    /// Log a model skipped because its previous evaluation is still running
    pub fn log_falling_behind(&self, model_id: &str) {
        warn!(
            event = "evaluation_falling_behind",
            instance = %self.instance,
            model_id = %model_id,
            "Previous evaluation still running, skipping this tick"
        );
    }

    /// Log a failed evaluation of one feature
    pub fn log_evaluation_failed(&self, model_id: &str, feature: &str, kind: &str, details: &str) {
        error!(
            event = "evaluation_failed",
            instance = %self.instance,
            model_id = %model_id,
            feature = %feature,
            kind = %kind,
            details = %details,
            "Drift evaluation failed"
        );
    }

    /// Log agent startup
    pub fn log_startup(&self, version: &str, port: u16) {
        info!(
            event = "agent_started",
            instance = %self.instance,
            agent_version = %version,
            port = port,
            "Drift monitoring agent started"
        );
    }

    /// Log agent shutdown
    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "agent_shutdown",
            instance = %self.instance,
            reason = %reason,
            "Drift monitoring agent shutting down"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SampleStats;

    #[test]
    fn test_monitor_metrics_handles_share_registry() {
        let metrics = MonitorMetrics::new();
        let other = metrics.clone();

        let stats = SampleStats { mean: 0.9, std: 0.01, n: 50 };
        let result = DriftResult {
            feature: "accuracy".to_string(),
            algorithm: "psi".to_string(),
            drift_score: 0.4,
            p_value: None,
            effect_size: 1.0,
            threshold: 0.2,
            is_drift: true,
            reference_stats: stats,
            current_stats: stats,
        };

        metrics.observe_evaluation_latency(0.002);
        metrics.record_drift_check(&result);
        other.inc_alerts_raised(Severity::High);
        let before = metrics.evaluation_errors("computation_failure");
        other.inc_evaluation_errors("computation_failure");
        assert!(metrics.evaluation_errors("computation_failure") > before);
        other.inc_alerts_expired(3);
        metrics.set_models_monitored(2);
        metrics.set_health_score("fraud-v2", 88.0);
        metrics.remove_health_score("fraud-v2");

        let families = prometheus::gather();
        assert!(families
            .iter()
            .any(|f| f.get_name() == "driftwatch_drift_detected_total"));
    }

    #[test]
    fn test_structured_logger_creation() {
        let logger = StructuredLogger::new("driftwatch-0");
        assert_eq!(logger.instance, "driftwatch-0");
    }
}
