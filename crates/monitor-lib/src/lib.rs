//! Drift monitoring library for deployed ML models
//!
//! This crate provides the core functionality for:
//! - Rolling baseline windows per (model, feature)
//! - Statistical drift detection (Kolmogorov-Smirnov, PSI)
//! - Severity classification, recommendations and deduplicated alerts
//! - Error-rate and latency limits checked on every tick
//! - Health scoring and scheduled per-model monitoring
//! - Metric collection, health checks and observability

pub mod alerting;
pub mod baseline;
pub mod collector;
pub mod drift;
pub mod error;
pub mod health;
pub mod models;
pub mod monitor;
pub mod observability;
pub mod scoring;

pub use alerting::{classify, recommend, Alerter, PerformanceChecker, PerformanceRule};
pub use baseline::{BaselineConfig, BaselineManager, Retention};
pub use drift::{Algorithm, DriftAlgorithm, DriftEngine};
pub use error::DriftError;
pub use health::{
    Component, ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use models::*;
pub use monitor::{ModelConfig, MonitorAck, MonitorConfig, MonitorEvent, MonitorService};
pub use observability::{MonitorMetrics, StructuredLogger};
pub use scoring::{HealthConfig, HealthScorer};
