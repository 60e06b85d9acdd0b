//! Drift detection between a reference sample and a current sample
//!
//! This module provides:
//! - Two-sample Kolmogorov-Smirnov test with a standardized effect size
//! - Population Stability Index over reference-derived histogram bins
//! - A `DriftEngine` selecting the algorithm by tag or by name

mod ks;
mod psi;
pub mod stats;

pub use ks::{ks_p_value, ks_statistic, KsDetector};
pub use psi::{PsiDetector, DEFAULT_PSI_BINS, PSI_DRIFT_THRESHOLD, PSI_EPSILON};

use crate::error::DriftError;
use crate::models::{DriftResult, SampleStats};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use tracing::debug;

/// Minimum number of finite values each sample needs
pub const MIN_SAMPLES: usize = 10;

/// Default significance level for the KS test
pub const DEFAULT_DRIFT_THRESHOLD: f64 = 0.05;

/// Common interface of drift algorithms
pub trait DriftAlgorithm: Send + Sync {
    /// Stable name reported in `DriftResult::algorithm`
    fn name(&self) -> &'static str;

    /// Compare `current` against `reference` for one feature
    fn detect(
        &self,
        feature: &str,
        reference: &[f64],
        current: &[f64],
        threshold: f64,
    ) -> Result<DriftResult, DriftError>;
}

/// Supported drift algorithms
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Algorithm {
    #[default]
    #[serde(rename = "ks_test")]
    KolmogorovSmirnov,
    #[serde(rename = "psi")]
    PopulationStability,
}

impl Algorithm {
    pub const ALL: [Algorithm; 2] = [Algorithm::KolmogorovSmirnov, Algorithm::PopulationStability];

    pub fn as_str(&self) -> &'static str {
        match self {
            Algorithm::KolmogorovSmirnov => "ks_test",
            Algorithm::PopulationStability => "psi",
        }
    }
}

impl std::fmt::Display for Algorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Algorithm {
    type Err = DriftError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ks_test" | "ks" => Ok(Algorithm::KolmogorovSmirnov),
            "psi" => Ok(Algorithm::PopulationStability),
            other => Err(DriftError::InvalidAlgorithm(other.to_string())),
        }
    }
}

/// Discard non-finite values and enforce the minimum sample size
pub(crate) fn clean_samples(
    feature: &str,
    reference: &[f64],
    current: &[f64],
) -> Result<(Vec<f64>, Vec<f64>), DriftError> {
    let reference = stats::finite_values(reference);
    let current = stats::finite_values(current);

    if reference.len() < MIN_SAMPLES || current.len() < MIN_SAMPLES {
        return Err(DriftError::InsufficientData {
            feature: feature.to_string(),
            reference: reference.len(),
            current: current.len(),
            required: MIN_SAMPLES,
        });
    }

    Ok((reference, current))
}

/// Fail with `ComputationFailure` when a computed quantity is not finite
pub(crate) fn ensure_finite(feature: &str, what: &str, value: f64) -> Result<f64, DriftError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(DriftError::ComputationFailure {
            feature: feature.to_string(),
            reason: format!("{} is not finite ({})", what, value),
        })
    }
}

/// Summaries of both samples and their effect size
///
/// Finite inputs can still overflow when summed, so every quantity is checked.
pub(crate) fn checked_summaries(
    feature: &str,
    reference: &[f64],
    current: &[f64],
) -> Result<(SampleStats, SampleStats, f64), DriftError> {
    let reference_stats = checked_summary(feature, "reference", reference)?;
    let current_stats = checked_summary(feature, "current", current)?;
    let effect_size = ensure_finite(
        feature,
        "effect size",
        stats::effect_size(reference, current),
    )?;
    Ok((reference_stats, current_stats, effect_size))
}

fn checked_summary(feature: &str, sample: &str, values: &[f64]) -> Result<SampleStats, DriftError> {
    let summary = stats::summarize(values);
    ensure_finite(feature, &format!("{} mean", sample), summary.mean)?;
    ensure_finite(feature, &format!("{} std", sample), summary.std)?;
    Ok(summary)
}

/// Runs drift algorithms selected by tag or name
pub struct DriftEngine {
    ks: KsDetector,
    psi: PsiDetector,
}

impl DriftEngine {
    pub fn new() -> Self {
        Self {
            ks: KsDetector,
            psi: PsiDetector::default(),
        }
    }

    /// Set the number of PSI histogram bins
    pub fn with_psi_bins(mut self, bins: usize) -> Self {
        self.psi = self.psi.with_bins(bins);
        self
    }

    fn algorithm(&self, algorithm: Algorithm) -> &dyn DriftAlgorithm {
        match algorithm {
            Algorithm::KolmogorovSmirnov => &self.ks,
            Algorithm::PopulationStability => &self.psi,
        }
    }

    /// Detect drift for one feature
    pub fn detect(
        &self,
        feature: &str,
        reference: &[f64],
        current: &[f64],
        algorithm: Algorithm,
        threshold: f64,
    ) -> Result<DriftResult, DriftError> {
        let result = self
            .algorithm(algorithm)
            .detect(feature, reference, current, threshold)?;

        debug!(
            feature = %feature,
            algorithm = %result.algorithm,
            drift_score = result.drift_score,
            p_value = ?result.p_value,
            is_drift = result.is_drift,
            "Drift detection completed"
        );

        Ok(result)
    }

    /// Detect drift with the algorithm given by name (`"ks_test"` or `"psi"`)
    pub fn detect_named(
        &self,
        feature: &str,
        reference: &[f64],
        current: &[f64],
        algorithm: &str,
        threshold: f64,
    ) -> Result<DriftResult, DriftError> {
        let algorithm: Algorithm = algorithm.parse()?;
        self.detect(feature, reference, current, algorithm, threshold)
    }
}

impl Default for DriftEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use rand_distr::{Distribution, Normal};

    fn normal_sample(seed: u64, mean: f64, std: f64, n: usize) -> Vec<f64> {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let dist = Normal::new(mean, std).unwrap();
        (0..n).map(|_| dist.sample(&mut rng)).collect()
    }

    #[test]
    fn test_algorithm_from_str() {
        assert_eq!("ks_test".parse::<Algorithm>().unwrap(), Algorithm::KolmogorovSmirnov);
        assert_eq!("PSI".parse::<Algorithm>().unwrap(), Algorithm::PopulationStability);

        let err = "wasserstein".parse::<Algorithm>().unwrap_err();
        assert_eq!(err, DriftError::InvalidAlgorithm("wasserstein".to_string()));
    }

    #[test]
    fn test_detect_named_invalid_algorithm() {
        let engine = DriftEngine::new();
        let sample = normal_sample(1, 0.0, 1.0, 50);
        let err = engine
            .detect_named("accuracy", &sample, &sample, "chi2", 0.05)
            .unwrap_err();
        assert_eq!(err.kind(), "invalid_algorithm");
    }

    #[test]
    fn test_insufficient_data_after_cleaning() {
        let engine = DriftEngine::new();
        let reference = normal_sample(2, 0.9, 0.02, 50);
        // 12 values, but only 8 finite
        let mut current = normal_sample(3, 0.9, 0.02, 8);
        current.extend([f64::NAN, f64::NAN, f64::INFINITY, f64::NEG_INFINITY]);

        for algorithm in Algorithm::ALL {
            let err = engine
                .detect("accuracy", &reference, &current, algorithm, 0.05)
                .unwrap_err();
            assert!(err.is_skip());
            assert!(matches!(
                err,
                DriftError::InsufficientData { current: 8, required: MIN_SAMPLES, .. }
            ));
        }
    }

    #[test]
    fn test_same_distribution_rarely_flags_drift() {
        let engine = DriftEngine::new();
        let trials = 100;
        let mut false_positives = 0;

        for seed in 0..trials {
            let reference = normal_sample(seed * 2, 0.9, 0.02, 200);
            let current = normal_sample(seed * 2 + 1, 0.9, 0.02, 50);
            let result = engine
                .detect("accuracy", &reference, &current, Algorithm::KolmogorovSmirnov, 0.05)
                .unwrap();
            if result.is_drift {
                false_positives += 1;
                assert!(result.p_value.unwrap() < 0.05);
            } else {
                assert!(result.p_value.unwrap() >= 0.05);
            }
        }

        // Nominal false positive rate is 5%
        assert!(false_positives <= 15, "false positives: {}", false_positives);
    }

    #[test]
    fn test_large_shift_detected_by_both_algorithms() {
        let engine = DriftEngine::new();
        let reference = normal_sample(10, 0.9, 0.02, 200);
        let current = normal_sample(11, 0.5, 0.02, 50);

        for algorithm in Algorithm::ALL {
            let result = engine
                .detect("accuracy", &reference, &current, algorithm, 0.05)
                .unwrap();
            assert!(result.is_drift, "{} missed the shift", algorithm);
            assert_eq!(result.algorithm, algorithm.as_str());
            assert!(result.effect_size > 0.8);
            assert_eq!(result.reference_stats.n, 200);
            assert_eq!(result.current_stats.n, 50);
        }
    }

    #[test]
    fn test_psi_bin_doubling_keeps_decision() {
        let default_bins = DriftEngine::new();
        let double_bins = DriftEngine::new().with_psi_bins(DEFAULT_PSI_BINS * 2);

        let reference = normal_sample(20, 0.9, 0.02, 2000);
        let same = normal_sample(21, 0.9, 0.02, 2000);
        let shifted = normal_sample(22, 0.8, 0.02, 2000);

        for current in [&same, &shifted] {
            let a = default_bins
                .detect("accuracy", &reference, current, Algorithm::PopulationStability, 0.05)
                .unwrap();
            let b = double_bins
                .detect("accuracy", &reference, current, Algorithm::PopulationStability, 0.05)
                .unwrap();
            assert_eq!(a.is_drift, b.is_drift);
        }
    }

    #[test]
    fn test_overflowing_statistics_fail() {
        let engine = DriftEngine::new();
        let reference = vec![1e308; 20];
        let current = vec![-1e308; 20];

        for algorithm in Algorithm::ALL {
            let err = engine
                .detect("latency_ms", &reference, &current, algorithm, 0.05)
                .unwrap_err();
            assert!(!err.is_skip());
            assert_eq!(err.kind(), "computation_failure", "{}", algorithm);
        }
    }

    #[test]
    fn test_overflowing_spread_fails_with_finite_means() {
        // Means stay finite, the pooled spread does not
        let engine = DriftEngine::new();
        let reference: Vec<f64> = (0..20).map(|i| if i % 2 == 0 { 1e308 } else { -1e308 }).collect();
        let current = normal_sample(40, 0.0, 1.0, 20);

        let err = engine
            .detect("latency_ms", &reference, &current, Algorithm::KolmogorovSmirnov, 0.05)
            .unwrap_err();
        assert!(matches!(err, DriftError::ComputationFailure { .. }));
    }

    #[test]
    fn test_detection_is_deterministic() {
        let engine = DriftEngine::new();
        let reference = normal_sample(30, 0.9, 0.02, 100);
        let current = normal_sample(31, 0.88, 0.02, 40);

        for algorithm in Algorithm::ALL {
            let a = engine.detect("accuracy", &reference, &current, algorithm, 0.05).unwrap();
            let b = engine.detect("accuracy", &reference, &current, algorithm, 0.05).unwrap();
            assert_eq!(a, b);
        }
    }
}
