//! Error taxonomy for drift evaluation

use thiserror::Error;

/// Errors raised while evaluating drift
///
/// `InsufficientData` and `NotReady` mean "skip this feature", never
/// "no drift". The other two are fatal to the call that raised them.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DriftError {
    #[error(
        "insufficient data for {feature}: reference={reference}, current={current}, need {required}"
    )]
    InsufficientData {
        feature: String,
        reference: usize,
        current: usize,
        required: usize,
    },

    #[error("baseline for {model_id}/{feature} not ready: {size} points over {span_secs}s")]
    NotReady {
        model_id: String,
        feature: String,
        size: usize,
        span_secs: i64,
    },

    #[error("unknown drift algorithm: {0}")]
    InvalidAlgorithm(String),

    #[error("drift computation failed for {feature}: {reason}")]
    ComputationFailure { feature: String, reason: String },
}

impl DriftError {
    /// True for the conditions callers skip silently
    pub fn is_skip(&self) -> bool {
        matches!(
            self,
            DriftError::InsufficientData { .. } | DriftError::NotReady { .. }
        )
    }

    /// Short label used for log fields and metrics
    pub fn kind(&self) -> &'static str {
        match self {
            DriftError::InsufficientData { .. } => "insufficient_data",
            DriftError::NotReady { .. } => "not_ready",
            DriftError::InvalidAlgorithm(_) => "invalid_algorithm",
            DriftError::ComputationFailure { .. } => "computation_failure",
        }
    }
}
