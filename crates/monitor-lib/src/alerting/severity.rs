//! Severity classification and operator recommendations

use crate::models::Severity;

/// p-value below which a result is highly significant
const P_HIGHLY_SIGNIFICANT: f64 = 0.001;
/// p-value below which a result is very significant
const P_VERY_SIGNIFICANT: f64 = 0.01;
/// Conventional significance level
const P_SIGNIFICANT: f64 = 0.05;

/// Effect size considered large
const LARGE_EFFECT: f64 = 0.8;
/// Drift score considered high
const HIGH_DRIFT_SCORE: f64 = 0.3;
/// Drift score considered notable
const NOTABLE_DRIFT_SCORE: f64 = 0.2;

/// Map a statistical signal to a severity tier
///
/// Rules are checked in order and the first match wins. All comparisons are
/// strict, so `p_value == 0.001` does not count as highly significant.
pub fn classify(drift_score: f64, p_value: f64, effect_size: f64) -> Severity {
    let highly_significant = p_value < P_HIGHLY_SIGNIFICANT;
    let large_effect = effect_size > LARGE_EFFECT;
    let high_score = drift_score > HIGH_DRIFT_SCORE;

    if highly_significant && large_effect && high_score {
        Severity::Critical
    } else if (highly_significant && large_effect) || (p_value < P_VERY_SIGNIFICANT && high_score) {
        Severity::High
    } else if p_value < P_SIGNIFICANT || drift_score > NOTABLE_DRIFT_SCORE {
        Severity::Medium
    } else {
        Severity::Low
    }
}

/// Operator guidance for a feature at a given severity
pub fn recommend(feature: &str, severity: Severity, effect_size: f64) -> String {
    match severity {
        Severity::Critical => format!(
            "IMMEDIATE ACTION: {} has degraded critically (effect size {:.2}). Retrain the model immediately.",
            feature, effect_size
        ),
        Severity::High => format!(
            "URGENT: {} shows significant drift (effect size {:.2}). Schedule retraining within 24-48h.",
            feature, effect_size
        ),
        Severity::Medium => format!(
            "MONITOR: {} is changing (effect size {:.2}). Increase monitoring cadence and re-evaluate in one week.",
            feature, effect_size
        ),
        Severity::Low => format!(
            "INFO: minor changes in {}. No action needed, continue the normal monitoring cadence.",
            feature
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_critical_requires_all_three() {
        assert_eq!(classify(0.5, 0.0001, 1.2), Severity::Critical);
        // Drift score not high enough: significance and effect still give HIGH
        assert_eq!(classify(0.3, 0.0001, 1.2), Severity::High);
    }

    #[test]
    fn test_p_value_boundary_is_strict() {
        // p = 0.001 exactly is not highly significant, but is below 0.01
        assert_eq!(classify(0.5, 0.001, 1.2), Severity::High);
        // p = 0.01 exactly with a high score falls through to MEDIUM
        assert_eq!(classify(0.5, 0.01, 0.1), Severity::Medium);
    }

    #[test]
    fn test_effect_size_boundary_is_strict() {
        assert_eq!(classify(0.5, 0.0001, 0.8), Severity::High);
        assert_eq!(classify(0.1, 0.0001, 0.8), Severity::Medium);
    }

    #[test]
    fn test_medium_and_low() {
        assert_eq!(classify(0.1, 0.04, 0.1), Severity::Medium);
        assert_eq!(classify(0.25, 0.5, 0.1), Severity::Medium);
        assert_eq!(classify(0.2, 0.05, 0.1), Severity::Low);
        assert_eq!(classify(0.0, 1.0, 0.0), Severity::Low);
    }

    #[test]
    fn test_classify_is_pure() {
        for _ in 0..10 {
            assert_eq!(classify(0.35, 0.005, 0.5), Severity::High);
        }
    }

    #[test]
    fn test_recommendations_by_severity() {
        assert!(recommend("accuracy", Severity::Critical, 1.5).contains("immediately"));
        assert!(recommend("accuracy", Severity::High, 1.0).contains("24-48h"));
        assert!(recommend("accuracy", Severity::Medium, 0.4).contains("one week"));
        assert!(recommend("accuracy", Severity::Low, 0.1).contains("No action"));
        assert_eq!(
            recommend("latency_ms", Severity::High, 0.9),
            recommend("latency_ms", Severity::High, 0.9)
        );
    }
}
