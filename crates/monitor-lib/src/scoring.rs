//! Composite 0-100 health score for a model

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};

use crate::drift::stats;
use crate::models::{features, Alert};

/// Score returned when no feature has enough observations
pub const NEUTRAL_SCORE: f64 = 50.0;

/// Configuration for health scoring
#[derive(Debug, Clone)]
pub struct HealthConfig {
    /// Number of most recent points per feature considered
    pub window: usize,
    /// Finite points a feature needs inside the window to contribute
    pub min_observations: usize,
    /// Points subtracted per recent alert
    pub alert_penalty: f64,
    /// Alerts created within this horizon are penalised
    pub alert_horizon: Duration,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            window: 20,
            min_observations: 10,
            alert_penalty: 10.0,
            alert_horizon: Duration::hours(24),
        }
    }
}

impl HealthConfig {
    pub fn with_window(mut self, window: usize) -> Self {
        self.window = window;
        self
    }

    pub fn with_min_observations(mut self, min_observations: usize) -> Self {
        self.min_observations = min_observations;
        self
    }

    pub fn with_alert_penalty(mut self, alert_penalty: f64) -> Self {
        self.alert_penalty = alert_penalty;
        self
    }
}

/// Computes health scores from recent metrics and alerts
#[derive(Debug, Clone, Default)]
pub struct HealthScorer {
    config: HealthConfig,
}

impl HealthScorer {
    pub fn new(config: HealthConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &HealthConfig {
        &self.config
    }

    /// Score a model from its recent values per feature and its active alerts
    pub fn score(
        &self,
        recent: &HashMap<String, Vec<f64>>,
        alerts: &[Alert],
        now: DateTime<Utc>,
    ) -> f64 {
        let mut sub_scores = Vec::with_capacity(3);

        if let Some(values) = self.observations(recent, features::ACCURACY) {
            sub_scores.push(100.0 - stats::std_dev(&values).unwrap_or(0.0) * 100.0);
        }
        if let Some(values) = self.observations(recent, features::ERROR_RATE) {
            sub_scores.push(100.0 - stats::mean(&values).unwrap_or(0.0) * 1000.0);
        }
        if let Some(values) = self.observations(recent, features::LATENCY_MS) {
            sub_scores.push(100.0 - stats::mean(&values).unwrap_or(0.0) / 10.0);
        }

        if sub_scores.is_empty() {
            return NEUTRAL_SCORE;
        }

        let base = sub_scores.iter().map(|s| s.clamp(0.0, 100.0)).sum::<f64>()
            / sub_scores.len() as f64;

        let horizon_start = now - self.config.alert_horizon;
        let recent_alerts = alerts
            .iter()
            .filter(|a| a.created_at > horizon_start && a.created_at <= now)
            .count();

        (base - recent_alerts as f64 * self.config.alert_penalty).clamp(0.0, 100.0)
    }

    /// Finite values in the scoring window, if there are enough of them
    fn observations(&self, recent: &HashMap<String, Vec<f64>>, feature: &str) -> Option<Vec<f64>> {
        let values = recent.get(feature)?;
        let window = &values[values.len().saturating_sub(self.config.window)..];
        let finite = stats::finite_values(window);
        (finite.len() >= self.config.min_observations).then_some(finite)
    }
}
