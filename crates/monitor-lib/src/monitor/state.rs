//! Per-model monitoring state and recent value buffers

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;

use crate::drift::{Algorithm, DEFAULT_DRIFT_THRESHOLD};
use crate::models::Alert;

/// Monitoring parameters of one model
#[derive(Debug, Clone, PartialEq)]
pub struct ModelConfig {
    /// Significance level handed to the drift algorithm
    pub drift_threshold: f64,
    /// Minimum time between two scheduled drift checks
    pub check_interval: Duration,
    pub algorithm: Algorithm,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            drift_threshold: DEFAULT_DRIFT_THRESHOLD,
            check_interval: Duration::minutes(15),
            algorithm: Algorithm::default(),
        }
    }
}

impl ModelConfig {
    pub fn with_drift_threshold(mut self, drift_threshold: f64) -> Self {
        self.drift_threshold = drift_threshold;
        self
    }

    pub fn with_check_interval(mut self, check_interval: Duration) -> Self {
        self.check_interval = check_interval;
        self
    }

    pub fn with_algorithm(mut self, algorithm: Algorithm) -> Self {
        self.algorithm = algorithm;
        self
    }
}

/// Outcome of a lifecycle call
#[derive(Debug, Clone, PartialEq)]
pub enum MonitorAck {
    Started,
    /// The model was already monitored; its configuration is unchanged
    AlreadyActive { config: ModelConfig },
    Updated,
    Stopped,
    NotMonitored,
}

/// Mutable state of a monitored model
#[derive(Debug, Clone)]
pub(crate) struct ModelMonitorState {
    pub config: ModelConfig,
    pub started_at: DateTime<Utc>,
    pub last_drift_check: Option<DateTime<Utc>>,
    pub drift_detected: bool,
    pub alerts: Vec<Alert>,
}

impl ModelMonitorState {
    pub fn new(config: ModelConfig, now: DateTime<Utc>) -> Self {
        Self {
            config,
            started_at: now,
            last_drift_check: None,
            drift_detected: false,
            alerts: Vec::new(),
        }
    }

    /// Whether a scheduled drift check is due at `now`
    pub fn is_check_due(&self, now: DateTime<Utc>) -> bool {
        match self.last_drift_check {
            Some(last) => now - last >= self.config.check_interval,
            None => true,
        }
    }

    /// Drop alerts older than the retention horizon, returning how many went
    pub fn expire_alerts(&mut self, now: DateTime<Utc>, retention: Duration) -> usize {
        let before = self.alerts.len();
        let cutoff = now - retention;
        self.alerts.retain(|a| a.created_at > cutoff);
        before - self.alerts.len()
    }

    /// Alerts still inside the retention horizon
    pub fn live_alerts(&self, now: DateTime<Utc>, retention: Duration) -> Vec<Alert> {
        let cutoff = now - retention;
        self.alerts
            .iter()
            .filter(|a| a.created_at > cutoff)
            .cloned()
            .collect()
    }
}

/// Registry entry of a monitored model
///
/// The evaluation guard is held by whichever task is evaluating the model.
/// Stopping sets the cancel flag and then waits on the guard, so an
/// evaluation either commits before the stop or writes nothing.
pub(crate) struct ModelHandle {
    pub model_id: String,
    state: Mutex<ModelMonitorState>,
    cancelled: AtomicBool,
    pub eval_guard: Arc<tokio::sync::Mutex<()>>,
}

impl ModelHandle {
    pub fn new(model_id: &str, state: ModelMonitorState) -> Self {
        Self {
            model_id: model_id.to_string(),
            state: Mutex::new(state),
            cancelled: AtomicBool::new(false),
            eval_guard: Arc::new(tokio::sync::Mutex::new(())),
        }
    }

    pub fn state(&self) -> MutexGuard<'_, ModelMonitorState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Bounded buffers of the most recent values per (model, feature)
///
/// Each model's buffers live under one map entry, so a producer and a
/// reader never interleave within a model.
pub(crate) struct RecentStore {
    capacity: usize,
    models: DashMap<String, HashMap<String, VecDeque<(DateTime<Utc>, f64)>>>,
}

impl RecentStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            models: DashMap::new(),
        }
    }

    pub fn push(&self, model_id: &str, feature: &str, value: f64, timestamp: DateTime<Utc>) {
        let mut features = self.models.entry(model_id.to_string()).or_default();
        let buffer = features.entry(feature.to_string()).or_default();
        buffer.push_back((timestamp, value));
        while buffer.len() > self.capacity {
            buffer.pop_front();
        }
    }

    /// The last `n` values of one feature, oldest first
    pub fn current(&self, model_id: &str, feature: &str, n: usize) -> Vec<f64> {
        let Some(features) = self.models.get(model_id) else {
            return Vec::new();
        };
        match features.get(feature) {
            Some(buffer) => {
                let skip = buffer.len().saturating_sub(n);
                buffer.iter().skip(skip).map(|(_, v)| *v).collect()
            }
            None => Vec::new(),
        }
    }

    /// All buffered values per feature, oldest first
    pub fn snapshot(&self, model_id: &str) -> HashMap<String, Vec<f64>> {
        self.since(model_id, None)
    }

    /// Buffered values per feature with a timestamp at or after `start`
    pub fn since(
        &self,
        model_id: &str,
        start: Option<DateTime<Utc>>,
    ) -> HashMap<String, Vec<f64>> {
        let Some(features) = self.models.get(model_id) else {
            return HashMap::new();
        };
        features
            .iter()
            .map(|(feature, buffer)| {
                let values = buffer
                    .iter()
                    .filter(|(ts, _)| start.map_or(true, |s| *ts >= s))
                    .map(|(_, v)| *v)
                    .collect();
                (feature.clone(), values)
            })
            .collect()
    }

    pub fn features(&self, model_id: &str) -> Vec<String> {
        let mut features: Vec<String> = self
            .models
            .get(model_id)
            .map(|f| f.keys().cloned().collect())
            .unwrap_or_default();
        features.sort();
        features
    }

    /// Number of buffered values of one feature
    pub fn len(&self, model_id: &str, feature: &str) -> usize {
        self.models
            .get(model_id)
            .and_then(|f| f.get(feature).map(|b| b.len()))
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AlertKind, DriftResult, SampleStats, Severity};
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap()
    }

    fn alert_at(created_at: DateTime<Utc>) -> Alert {
        let stats = SampleStats { mean: 0.0, std: 0.0, n: 0 };
        Alert {
            model_id: "m".to_string(),
            kind: AlertKind::Drift,
            feature: "accuracy".to_string(),
            severity: Severity::Medium,
            message: String::new(),
            recommendation: String::new(),
            created_at,
            drift_result: Some(DriftResult {
                feature: "accuracy".to_string(),
                algorithm: "ks_test".to_string(),
                drift_score: 0.25,
                p_value: Some(0.03),
                effect_size: 0.3,
                threshold: 0.05,
                is_drift: true,
                reference_stats: stats,
                current_stats: stats,
            }),
            breach: None,
        }
    }

    #[test]
    fn test_check_due() {
        let mut state = ModelMonitorState::new(ModelConfig::default(), t0());
        assert!(state.is_check_due(t0()));

        state.last_drift_check = Some(t0());
        assert!(!state.is_check_due(t0() + Duration::minutes(14)));
        assert!(state.is_check_due(t0() + Duration::minutes(15)));
    }

    #[test]
    fn test_expire_alerts() {
        let mut state = ModelMonitorState::new(ModelConfig::default(), t0());
        state.alerts.push(alert_at(t0()));
        state.alerts.push(alert_at(t0() + Duration::hours(10)));

        let now = t0() + Duration::hours(25);
        assert_eq!(state.live_alerts(now, Duration::hours(24)).len(), 1);
        assert_eq!(state.expire_alerts(now, Duration::hours(24)), 1);
        assert_eq!(state.alerts.len(), 1);
    }

    #[test]
    fn test_recent_store_is_bounded() {
        let store = RecentStore::new(5);
        for i in 0..8 {
            store.push("m", "latency_ms", i as f64, t0() + Duration::minutes(i));
        }

        assert_eq!(store.len("m", "latency_ms"), 5);
        assert_eq!(store.current("m", "latency_ms", 2), vec![6.0, 7.0]);
        assert_eq!(store.current("m", "latency_ms", 50), vec![3.0, 4.0, 5.0, 6.0, 7.0]);
        assert!(store.current("m", "accuracy", 5).is_empty());
        assert!(store.current("other", "latency_ms", 5).is_empty());
    }

    #[test]
    fn test_recent_store_since() {
        let store = RecentStore::new(100);
        for i in 0..10 {
            store.push("m", "accuracy", i as f64, t0() + Duration::hours(i));
        }
        store.push("m", "error_rate", 0.01, t0());

        let window = store.since("m", Some(t0() + Duration::hours(7)));
        assert_eq!(window["accuracy"], vec![7.0, 8.0, 9.0]);
        assert!(window["error_rate"].is_empty());

        assert_eq!(store.features("m"), vec!["accuracy", "error_rate"]);
        assert_eq!(store.snapshot("m")["accuracy"].len(), 10);
    }
}
