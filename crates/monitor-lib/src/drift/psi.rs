//! Population Stability Index drift measure
//!
//! Bins both samples on equal-width edges derived from the reference sample
//! and sums `(cur - ref) * ln(cur / ref)` over the bin proportions. The drift
//! decision uses the conventional 0.2 cut-off, not the caller's threshold.

use super::{checked_summaries, clean_samples, ensure_finite, DriftAlgorithm};
use crate::error::DriftError;
use crate::models::DriftResult;

/// Default number of histogram bins
pub const DEFAULT_PSI_BINS: usize = 10;

/// Offset added to every bin proportion to keep the logarithm finite
pub const PSI_EPSILON: f64 = 1e-10;

/// PSI above this value is reported as drift
pub const PSI_DRIFT_THRESHOLD: f64 = 0.2;

/// Population Stability Index detector
#[derive(Debug, Clone, Copy)]
pub struct PsiDetector {
    /// Number of equal-width bins over the reference range
    pub bins: usize,
    /// Offset added to each bin proportion
    pub epsilon: f64,
}

impl PsiDetector {
    pub fn new(bins: usize) -> Self {
        Self {
            bins: bins.max(1),
            epsilon: PSI_EPSILON,
        }
    }

    /// Set the number of bins
    pub fn with_bins(mut self, bins: usize) -> Self {
        self.bins = bins.max(1);
        self
    }

    /// Compute the PSI of `current` against `reference`
    ///
    /// Both samples must be non-empty and finite.
    pub fn psi(&self, reference: &[f64], current: &[f64]) -> f64 {
        self.psi_on(&BinEdges::from_reference(reference, self.bins), reference, current)
    }

    fn psi_on(&self, edges: &BinEdges, reference: &[f64], current: &[f64]) -> f64 {
        let ref_dist = edges.proportions(reference, self.epsilon);
        let cur_dist = edges.proportions(current, self.epsilon);

        ref_dist
            .iter()
            .zip(cur_dist.iter())
            .map(|(r, c)| (c - r) * (c / r).ln())
            .sum()
    }
}

impl Default for PsiDetector {
    fn default() -> Self {
        Self::new(DEFAULT_PSI_BINS)
    }
}

impl DriftAlgorithm for PsiDetector {
    fn name(&self) -> &'static str {
        "psi"
    }

    fn detect(
        &self,
        feature: &str,
        reference: &[f64],
        current: &[f64],
        _threshold: f64,
    ) -> Result<DriftResult, DriftError> {
        let (reference, current) = clean_samples(feature, reference, current)?;

        let edges = BinEdges::from_reference(&reference, self.bins);
        if !(edges.width.is_finite() && edges.width > 0.0) {
            return Err(DriftError::ComputationFailure {
                feature: feature.to_string(),
                reason: format!("psi bin width is {} over the reference range", edges.width),
            });
        }

        let psi = ensure_finite(feature, "psi", self.psi_on(&edges, &reference, &current))?;
        let (reference_stats, current_stats, effect_size) =
            checked_summaries(feature, &reference, &current)?;

        Ok(DriftResult {
            feature: feature.to_string(),
            algorithm: self.name().to_string(),
            drift_score: psi,
            p_value: None,
            effect_size,
            threshold: PSI_DRIFT_THRESHOLD,
            is_drift: psi > PSI_DRIFT_THRESHOLD,
            reference_stats,
            current_stats,
        })
    }
}

/// Equal-width bin edges over the reference range
struct BinEdges {
    low: f64,
    width: f64,
    bins: usize,
}

impl BinEdges {
    fn from_reference(reference: &[f64], bins: usize) -> Self {
        let mut low = reference.iter().copied().fold(f64::INFINITY, f64::min);
        let mut high = reference.iter().copied().fold(f64::NEG_INFINITY, f64::max);

        // A constant reference gets a unit-wide range centred on its value
        if high - low <= 0.0 {
            low -= 0.5;
            high += 0.5;
        }

        Self {
            low,
            width: (high - low) / bins as f64,
            bins,
        }
    }

    /// Bin index for a value; out-of-range values land in the outer bins
    fn index(&self, value: f64) -> usize {
        let raw = ((value - self.low) / self.width).floor();
        if raw <= 0.0 {
            0
        } else {
            (raw as usize).min(self.bins - 1)
        }
    }

    fn proportions(&self, values: &[f64], epsilon: f64) -> Vec<f64> {
        let mut counts = vec![0usize; self.bins];
        for v in values {
            counts[self.index(*v)] += 1;
        }

        let total = values.len().max(1) as f64;
        counts
            .into_iter()
            .map(|c| c as f64 / total + epsilon)
            .collect()
    }
}
