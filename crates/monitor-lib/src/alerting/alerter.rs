//! Alert construction with deduplication
//!
//! Handles:
//! - Turning a drift result or a limit violation into an operator-facing `Alert`
//! - Suppressing repeats for the same (model, feature, kind) inside a window
//! - Letting escalations through regardless of the window

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Duration, Utc};

use super::performance::RuleViolation;
use super::severity::{classify, recommend};
use crate::models::{Alert, AlertKind, DriftResult, Severity};

/// Default deduplication window (15 minutes)
const DEFAULT_DEDUP_WINDOW_MINS: i64 = 15;

/// Key for deduplication
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct DedupKey {
    model_id: String,
    feature: String,
    kind: AlertKind,
}

impl DedupKey {
    fn new(model_id: &str, feature: &str, kind: AlertKind) -> Self {
        Self {
            model_id: model_id.to_string(),
            feature: feature.to_string(),
            kind,
        }
    }
}

/// Last emission for a key
#[derive(Debug, Clone, Copy)]
struct Emission {
    at: DateTime<Utc>,
    severity: Severity,
}

/// Alert builder with deduplication
pub struct Alerter {
    /// Deduplication window
    dedup_window: Duration,
    /// Recent alerts for deduplication (key -> last emission)
    recent_alerts: Mutex<HashMap<DedupKey, Emission>>,
}

impl Alerter {
    /// Create a new alerter with the default 15-minute deduplication window
    pub fn new() -> Self {
        Self {
            dedup_window: Duration::minutes(DEFAULT_DEDUP_WINDOW_MINS),
            recent_alerts: Mutex::new(HashMap::new()),
        }
    }

    /// Set custom deduplication window
    pub fn with_dedup_window(mut self, window: Duration) -> Self {
        self.dedup_window = window;
        self
    }

    pub fn dedup_window(&self) -> Duration {
        self.dedup_window
    }

    /// Build an alert for a drift result without touching dedup state
    pub fn create_alert(&self, model_id: &str, result: &DriftResult, now: DateTime<Utc>) -> Alert {
        let p_value = result.p_value.unwrap_or(1.0);
        let severity = classify(result.drift_score, p_value, result.effect_size);

        let p_display = result
            .p_value
            .map(|p| format!("{:.4}", p))
            .unwrap_or_else(|| "n/a".to_string());

        let message = format!(
            "Drift detected in {} for model {}: {} score {:.4}, p-value {}, effect size {:.2}",
            result.feature, model_id, result.algorithm, result.drift_score, p_display, result.effect_size
        );

        Alert {
            model_id: model_id.to_string(),
            kind: AlertKind::Drift,
            feature: result.feature.clone(),
            severity,
            message,
            recommendation: recommend(&result.feature, severity, result.effect_size),
            created_at: now,
            drift_result: Some(result.clone()),
            breach: None,
        }
    }

    /// Build an alert for a violated operating limit without touching dedup state
    pub fn create_performance_alert(
        &self,
        model_id: &str,
        violation: &RuleViolation,
        now: DateTime<Utc>,
    ) -> Alert {
        let breach = &violation.breach;
        let (message, recommendation) = match violation.kind {
            AlertKind::HighErrorRate => (
                format!(
                    "High error rate for model {}: {:.3} over {} points (limit {:.3})",
                    model_id, breach.value, breach.n, breach.threshold
                ),
                "Inspect recent failures and input validation before the error rate spreads."
                    .to_string(),
            ),
            AlertKind::HighLatency => (
                format!(
                    "High latency for model {}: {:.1}ms over {} points (limit {:.1}ms)",
                    model_id, breach.value, breach.n, breach.threshold
                ),
                "Check serving capacity and recent deployments; scale out if load has grown."
                    .to_string(),
            ),
            AlertKind::Drift => (
                format!(
                    "{} for model {} is {:.4}, above {:.4}",
                    breach.feature, model_id, breach.value, breach.threshold
                ),
                format!("Review recent {} values against the limit.", breach.feature),
            ),
        };

        Alert {
            model_id: model_id.to_string(),
            kind: violation.kind,
            feature: breach.feature.clone(),
            severity: violation.severity,
            message,
            recommendation,
            created_at: now,
            drift_result: None,
            breach: Some(breach.clone()),
        }
    }

    /// Check if an alert should be suppressed due to deduplication
    ///
    /// A repeat inside the window is suppressed unless its severity is
    /// higher than the one last emitted.
    pub fn should_suppress(
        &self,
        model_id: &str,
        feature: &str,
        kind: AlertKind,
        severity: Severity,
        now: DateTime<Utc>,
    ) -> bool {
        let alerts = self.recent_alerts.lock().unwrap_or_else(PoisonError::into_inner);
        match alerts.get(&DedupKey::new(model_id, feature, kind)) {
            Some(last) => now - last.at < self.dedup_window && severity <= last.severity,
            None => false,
        }
    }

    /// Record that an alert was emitted
    pub fn record_alert(
        &self,
        model_id: &str,
        feature: &str,
        kind: AlertKind,
        severity: Severity,
        now: DateTime<Utc>,
    ) {
        let mut alerts = self.recent_alerts.lock().unwrap_or_else(PoisonError::into_inner);
        alerts.insert(DedupKey::new(model_id, feature, kind), Emission { at: now, severity });

        // Clean up old entries
        let window = self.dedup_window;
        alerts.retain(|_, last| now - last.at < window);
    }

    /// Build an alert and apply deduplication
    ///
    /// Returns `None` when the alert is suppressed.
    pub fn raise(&self, model_id: &str, result: &DriftResult, now: DateTime<Utc>) -> Option<Alert> {
        self.deduplicate(self.create_alert(model_id, result, now), now)
    }

    /// Build a performance alert and apply deduplication
    pub fn raise_violation(
        &self,
        model_id: &str,
        violation: &RuleViolation,
        now: DateTime<Utc>,
    ) -> Option<Alert> {
        self.deduplicate(self.create_performance_alert(model_id, violation, now), now)
    }

    fn deduplicate(&self, alert: Alert, now: DateTime<Utc>) -> Option<Alert> {
        if self.should_suppress(&alert.model_id, &alert.feature, alert.kind, alert.severity, now) {
            return None;
        }
        self.record_alert(&alert.model_id, &alert.feature, alert.kind, alert.severity, now);
        Some(alert)
    }

    /// Forget dedup state of a model
    pub fn forget_model(&self, model_id: &str) {
        let mut alerts = self.recent_alerts.lock().unwrap_or_else(PoisonError::into_inner);
        alerts.retain(|key, _| key.model_id != model_id);
    }
}

impl Default for Alerter {
    fn default() -> Self {
        Self::new()
    }
}
