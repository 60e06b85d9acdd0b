//! Core data models for model drift monitoring

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Well-known feature names
pub mod features {
    pub const ACCURACY: &str = "accuracy";
    pub const PRECISION: &str = "precision";
    pub const RECALL: &str = "recall";
    pub const F1_SCORE: &str = "f1_score";
    pub const LATENCY_MS: &str = "latency_ms";
    pub const THROUGHPUT_RPS: &str = "throughput_rps";
    pub const ERROR_RATE: &str = "error_rate";

    /// Features every model is expected to report; anything else is a custom metric
    pub const KNOWN: &[&str] = &[
        ACCURACY,
        PRECISION,
        RECALL,
        F1_SCORE,
        LATENCY_MS,
        THROUGHPUT_RPS,
        ERROR_RATE,
    ];

    pub fn is_known(feature: &str) -> bool {
        KNOWN.contains(&feature)
    }
}

/// A single timestamped observation of one feature of one model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricPoint {
    pub model_id: String,
    pub feature: String,
    pub value: f64,
    pub timestamp: DateTime<Utc>,
}

impl MetricPoint {
    pub fn new(
        model_id: impl Into<String>,
        feature: impl Into<String>,
        value: f64,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            model_id: model_id.into(),
            feature: feature.into(),
            value,
            timestamp,
        }
    }
}

/// Summary statistics of one sample
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SampleStats {
    pub mean: f64,
    pub std: f64,
    pub n: usize,
}

/// Outcome of comparing a current sample against a reference sample
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriftResult {
    pub feature: String,
    pub algorithm: String,
    pub drift_score: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub p_value: Option<f64>,
    pub effect_size: f64,
    pub threshold: f64,
    pub is_drift: bool,
    pub reference_stats: SampleStats,
    pub current_stats: SampleStats,
}

/// Alert severity tiers, ordered from least to most severe
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "LOW",
            Severity::Medium => "MEDIUM",
            Severity::High => "HIGH",
            Severity::Critical => "CRITICAL",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What raised an alert
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    #[default]
    Drift,
    HighErrorRate,
    HighLatency,
}

impl AlertKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertKind::Drift => "drift",
            AlertKind::HighErrorRate => "high_error_rate",
            AlertKind::HighLatency => "high_latency",
        }
    }
}

impl std::fmt::Display for AlertKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A recent mean above a fixed operating limit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdBreach {
    pub feature: String,
    /// Mean of the feature over the evaluation window
    pub value: f64,
    pub threshold: f64,
    /// Number of points the mean was taken over
    pub n: usize,
}

/// Operator-facing alert
///
/// Drift alerts carry the drift result, performance alerts the breach.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub model_id: String,
    #[serde(default)]
    pub kind: AlertKind,
    pub feature: String,
    pub severity: Severity,
    pub message: String,
    pub recommendation: String,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub drift_result: Option<DriftResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub breach: Option<ThresholdBreach>,
}

/// Point-in-time status of one model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelStatus {
    pub model_id: String,
    pub timestamp: DateTime<Utc>,
    /// Mean of the recent buffer per feature
    pub metrics: HashMap<String, f64>,
    pub active_alert_count: usize,
    pub last_drift_check: Option<DateTime<Utc>>,
    pub drift_detected: bool,
    pub monitoring_active: bool,
}

/// Per-feature summary inside a monitoring report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureSummary {
    pub mean: f64,
    pub std: f64,
    /// Pearson correlation between sample index and value
    pub trend: f64,
    pub n: usize,
}

/// Periodic monitoring report for one model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitoringReport {
    pub model_id: String,
    pub period_hours: i64,
    pub total_points: usize,
    pub performance_summary: HashMap<String, FeatureSummary>,
    pub alerts: Vec<Alert>,
    pub health_score: f64,
    pub recommendations: Vec<String>,
    pub generated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_features() {
        assert!(features::is_known("accuracy"));
        assert!(features::is_known(features::LATENCY_MS));
        assert!(!features::is_known("gpu_memory_mb"));
    }

    #[test]
    fn test_severity_order_and_wire_names() {
        assert!(Severity::Low < Severity::Medium);
        assert!(Severity::High < Severity::Critical);
        assert_eq!(serde_json::to_string(&Severity::Critical).unwrap(), "\"CRITICAL\"");

        let parsed: Severity = serde_json::from_str("\"MEDIUM\"").unwrap();
        assert_eq!(parsed, Severity::Medium);
    }

    #[test]
    fn test_missing_p_value_is_omitted() {
        let stats = SampleStats {
            mean: 0.9,
            std: 0.01,
            n: 50,
        };
        let result = DriftResult {
            feature: "accuracy".to_string(),
            algorithm: "psi".to_string(),
            drift_score: 0.31,
            p_value: None,
            effect_size: 1.2,
            threshold: 0.2,
            is_drift: true,
            reference_stats: stats,
            current_stats: stats,
        };

        let json = serde_json::to_value(&result).unwrap();
        assert!(json.get("p_value").is_none());
        let back: DriftResult = serde_json::from_value(json).unwrap();
        assert_eq!(back, result);
    }

    #[test]
    fn test_performance_alert_wire_shape() {
        let alert = Alert {
            model_id: "m".to_string(),
            kind: AlertKind::HighLatency,
            feature: features::LATENCY_MS.to_string(),
            severity: Severity::Medium,
            message: "High latency".to_string(),
            recommendation: String::new(),
            created_at: Utc::now(),
            drift_result: None,
            breach: Some(ThresholdBreach {
                feature: features::LATENCY_MS.to_string(),
                value: 140.0,
                threshold: 100.0,
                n: 3,
            }),
        };

        let json = serde_json::to_value(&alert).unwrap();
        assert_eq!(json["kind"], "high_latency");
        assert!(json.get("drift_result").is_none());
        assert_eq!(json["breach"]["threshold"], 100.0);

        // Records without a kind are drift alerts
        let mut legacy = json.clone();
        legacy.as_object_mut().unwrap().remove("kind");
        let back: Alert = serde_json::from_value(legacy).unwrap();
        assert_eq!(back.kind, AlertKind::Drift);
    }

    #[test]
    fn test_metric_point_from_json() {
        let point: MetricPoint = serde_json::from_str(
            r#"{"model_id":"m","feature":"accuracy","value":0.93,"timestamp":"2026-01-01T00:00:00Z"}"#,
        )
        .unwrap();
        assert_eq!(point.model_id, "m");
        assert_eq!(point.timestamp.timestamp(), 1_767_225_600);
    }
}
