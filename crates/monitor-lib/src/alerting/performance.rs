//! Fixed operating limits on recent performance metrics
//!
//! Unlike drift, these compare the recent mean of a feature against an
//! absolute limit and need no baseline.

use std::collections::HashMap;

use chrono::Duration;

use crate::drift::stats;
use crate::models::{features, AlertKind, Severity, ThresholdBreach};

/// Default span of recent data a limit is checked over
const DEFAULT_WINDOW_MINS: i64 = 30;

/// Mean error rate above which a HIGH alert is raised
pub const ERROR_RATE_LIMIT: f64 = 0.05;

/// Mean latency (ms) above which a MEDIUM alert is raised
pub const LATENCY_LIMIT_MS: f64 = 100.0;

/// One operating limit
#[derive(Debug, Clone, PartialEq)]
pub struct PerformanceRule {
    pub kind: AlertKind,
    pub feature: String,
    /// Breached when the recent mean is strictly above this
    pub limit: f64,
    pub severity: Severity,
}

impl PerformanceRule {
    pub fn new(kind: AlertKind, feature: &str, limit: f64, severity: Severity) -> Self {
        Self {
            kind,
            feature: feature.to_string(),
            limit,
            severity,
        }
    }
}

/// A rule whose limit the recent mean exceeded
#[derive(Debug, Clone, PartialEq)]
pub struct RuleViolation {
    pub kind: AlertKind,
    pub severity: Severity,
    pub breach: ThresholdBreach,
}

/// Checks recent data against a set of operating limits
#[derive(Debug, Clone)]
pub struct PerformanceChecker {
    rules: Vec<PerformanceRule>,
    window: Duration,
}

impl PerformanceChecker {
    /// Error rate above 5% and latency above 100 ms over the last 30 minutes
    pub fn new() -> Self {
        Self {
            rules: vec![
                PerformanceRule::new(
                    AlertKind::HighErrorRate,
                    features::ERROR_RATE,
                    ERROR_RATE_LIMIT,
                    Severity::High,
                ),
                PerformanceRule::new(
                    AlertKind::HighLatency,
                    features::LATENCY_MS,
                    LATENCY_LIMIT_MS,
                    Severity::Medium,
                ),
            ],
            window: Duration::minutes(DEFAULT_WINDOW_MINS),
        }
    }

    pub fn with_rules(mut self, rules: Vec<PerformanceRule>) -> Self {
        self.rules = rules;
        self
    }

    pub fn with_window(mut self, window: Duration) -> Self {
        self.window = window;
        self
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Rules breached by `recent`, the per-feature values inside the window
    ///
    /// A feature with no finite value in the window breaches nothing.
    pub fn check(&self, recent: &HashMap<String, Vec<f64>>) -> Vec<RuleViolation> {
        self.rules
            .iter()
            .filter_map(|rule| {
                let values = stats::finite_values(recent.get(&rule.feature)?);
                let mean = stats::mean(&values)?;
                (mean > rule.limit).then(|| RuleViolation {
                    kind: rule.kind,
                    severity: rule.severity,
                    breach: ThresholdBreach {
                        feature: rule.feature.clone(),
                        value: mean,
                        threshold: rule.limit,
                        n: values.len(),
                    },
                })
            })
            .collect()
    }
}

impl Default for PerformanceChecker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recent(entries: &[(&str, Vec<f64>)]) -> HashMap<String, Vec<f64>> {
        entries
            .iter()
            .map(|(feature, values)| (feature.to_string(), values.clone()))
            .collect()
    }

    #[test]
    fn test_default_limits() {
        let checker = PerformanceChecker::new();
        let violations = checker.check(&recent(&[
            ("error_rate", vec![0.04, 0.08, 0.09]),
            ("latency_ms", vec![120.0, 150.0]),
            ("accuracy", vec![0.1; 5]),
        ]));

        assert_eq!(violations.len(), 2);
        assert_eq!(violations[0].kind, AlertKind::HighErrorRate);
        assert_eq!(violations[0].severity, Severity::High);
        assert!((violations[0].breach.value - 0.07).abs() < 1e-12);
        assert_eq!(violations[0].breach.n, 3);
        assert_eq!(violations[1].kind, AlertKind::HighLatency);
        assert_eq!(violations[1].severity, Severity::Medium);
        assert_eq!(violations[1].breach.threshold, LATENCY_LIMIT_MS);
    }

    #[test]
    fn test_limit_is_strict() {
        let checker = PerformanceChecker::new();
        let at_limit = recent(&[
            ("error_rate", vec![ERROR_RATE_LIMIT; 4]),
            ("latency_ms", vec![LATENCY_LIMIT_MS; 4]),
        ]);
        assert!(checker.check(&at_limit).is_empty());
    }

    #[test]
    fn test_missing_or_non_finite_data_breaches_nothing() {
        let checker = PerformanceChecker::new();
        assert!(checker.check(&HashMap::new()).is_empty());
        assert!(checker
            .check(&recent(&[("latency_ms", vec![f64::NAN, f64::INFINITY])]))
            .is_empty());
        assert!(checker.check(&recent(&[("error_rate", vec![])])).is_empty());
    }

    #[test]
    fn test_custom_rules() {
        let checker = PerformanceChecker::new()
            .with_window(Duration::minutes(5))
            .with_rules(vec![PerformanceRule::new(
                AlertKind::HighLatency,
                "p99_latency_ms",
                500.0,
                Severity::High,
            )]);
        assert_eq!(checker.window(), Duration::minutes(5));

        let violations = checker.check(&recent(&[
            ("p99_latency_ms", vec![800.0]),
            ("latency_ms", vec![10_000.0]),
        ]));
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].breach.feature, "p99_latency_ms");
    }
}
