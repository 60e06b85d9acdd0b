//! Alerting for detected drift and performance limits
//!
//! This module provides:
//! - Severity classification of drift results
//! - Operator recommendations per severity
//! - Fixed operating limits on error rate and latency
//! - Alert construction with deduplication

mod alerter;
mod performance;
mod severity;

pub use alerter::Alerter;
pub use performance::{
    PerformanceChecker, PerformanceRule, RuleViolation, ERROR_RATE_LIMIT, LATENCY_LIMIT_MS,
};
pub use severity::{classify, recommend};
