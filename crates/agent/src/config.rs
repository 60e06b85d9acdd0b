//! Agent configuration

use anyhow::{Context, Result};
use chrono::Duration;
use monitor_lib::{
    collector::CollectionConfig, Algorithm, BaselineConfig, ModelConfig, MonitorConfig, Retention,
};
use serde::Deserialize;

/// Agent configuration, read from `DRIFTWATCH_*` environment variables
#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    /// Instance name attached to structured logs
    #[serde(default = "default_instance")]
    pub instance: String,

    /// HTTP port for the API, health and metrics
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    /// Monitor loop tick in seconds
    #[serde(default = "default_tick_interval")]
    pub tick_interval_secs: u64,

    /// Default significance level for new models
    #[serde(default = "default_drift_threshold")]
    pub drift_threshold: f64,

    /// Default time between scheduled drift checks in seconds
    #[serde(default = "default_check_interval")]
    pub check_interval_secs: i64,

    /// Default drift algorithm (`ks_test` or `psi`)
    #[serde(default = "default_algorithm")]
    pub algorithm: String,

    /// Points a baseline needs before it is used
    #[serde(default = "default_baseline_min_size")]
    pub baseline_min_size: usize,

    /// Time a baseline must span before it is used, in seconds
    #[serde(default = "default_baseline_min_span")]
    pub baseline_min_span_secs: i64,

    /// Baseline retention in hours
    #[serde(default = "default_baseline_retention")]
    pub baseline_retention_hours: i64,

    /// Alert retention in hours
    #[serde(default = "default_alert_retention")]
    pub alert_retention_hours: i64,

    /// Points forming the current sample
    #[serde(default = "default_current_window")]
    pub current_window: usize,

    /// Metric collection interval in seconds
    #[serde(default = "default_collection_interval")]
    pub collection_interval_secs: u64,

    /// Points queued per model on the buffered ingest path
    #[serde(default = "default_push_queue_capacity")]
    pub push_queue_capacity: usize,
}

fn default_instance() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "driftwatch".to_string())
}

fn default_api_port() -> u16 {
    8080
}

fn default_tick_interval() -> u64 {
    60
}

fn default_drift_threshold() -> f64 {
    0.05
}

fn default_check_interval() -> i64 {
    900
}

fn default_algorithm() -> String {
    "ks_test".to_string()
}

fn default_baseline_min_size() -> usize {
    30
}

fn default_baseline_min_span() -> i64 {
    86_400
}

fn default_baseline_retention() -> i64 {
    7 * 24
}

fn default_alert_retention() -> i64 {
    24
}

fn default_current_window() -> usize {
    50
}

fn default_collection_interval() -> u64 {
    30
}

fn default_push_queue_capacity() -> usize {
    10_000
}

impl AgentConfig {
    /// Load configuration from the environment
    pub fn load() -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::Environment::with_prefix("DRIFTWATCH").try_parsing(true))
            .build()?;

        config
            .try_deserialize()
            .context("invalid DRIFTWATCH_* configuration")
    }

    /// Library configuration for the monitoring service
    pub fn monitor_config(&self) -> Result<MonitorConfig> {
        let algorithm: Algorithm = self
            .algorithm
            .parse()
            .with_context(|| format!("DRIFTWATCH_ALGORITHM={}", self.algorithm))?;

        let model_defaults = ModelConfig::default()
            .with_drift_threshold(self.drift_threshold)
            .with_check_interval(Duration::seconds(self.check_interval_secs))
            .with_algorithm(algorithm);

        let baseline = BaselineConfig::default()
            .with_min_size(self.baseline_min_size)
            .with_min_span(Duration::seconds(self.baseline_min_span_secs))
            .with_retention(Retention::Duration(Duration::hours(self.baseline_retention_hours)));

        let mut config = MonitorConfig::default()
            .with_tick_interval(std::time::Duration::from_secs(self.tick_interval_secs))
            .with_model_defaults(model_defaults)
            .with_alert_retention(Duration::hours(self.alert_retention_hours))
            .with_current_window(self.current_window)
            .with_baseline(baseline);
        config.instance = self.instance.clone();

        Ok(config)
    }

    /// Configuration for the metric collection loop
    pub fn collection_config(&self) -> CollectionConfig {
        CollectionConfig {
            interval: std::time::Duration::from_secs(self.collection_interval_secs),
            ..CollectionConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn defaults() -> AgentConfig {
        serde_json::from_str("{}").unwrap()
    }

    #[test]
    fn test_defaults_fill_missing_fields() {
        let config = defaults();
        assert_eq!(config.api_port, 8080);
        assert_eq!(config.algorithm, "ks_test");
        assert_eq!(config.check_interval_secs, 900);
    }

    #[test]
    fn test_monitor_config_mapping() {
        let mut config = defaults();
        config.algorithm = "psi".to_string();
        config.check_interval_secs = 60;

        let monitor = config.monitor_config().unwrap();
        assert_eq!(monitor.model_defaults.algorithm, Algorithm::PopulationStability);
        assert_eq!(monitor.model_defaults.check_interval, Duration::minutes(1));
        assert_eq!(monitor.baseline.min_size, 30);
        assert_eq!(monitor.baseline.retention, Retention::Duration(Duration::days(7)));
    }

    #[test]
    fn test_invalid_algorithm_is_rejected() {
        let mut config = defaults();
        config.algorithm = "wasserstein".to_string();
        assert!(config.monitor_config().is_err());
    }
}
