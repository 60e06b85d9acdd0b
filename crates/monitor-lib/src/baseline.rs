//! Rolling baseline windows per (model, feature)
//!
//! Maintains the trusted reference sample for drift detection. Windows are
//! bounded by a retention policy that is evaluated lazily on every update,
//! and a window is only handed out once it holds enough points over a long
//! enough span.

use crate::error::DriftError;
use crate::models::features;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use std::collections::VecDeque;
use tracing::debug;

/// Default minimum number of points before a baseline is usable
pub const DEFAULT_MIN_SIZE: usize = 30;

/// How much history a baseline window keeps
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Retention {
    /// Keep points newer than `newest - duration`
    Duration(Duration),
    /// Keep the most recent N points
    Count(usize),
}

impl Default for Retention {
    fn default() -> Self {
        Retention::Duration(Duration::days(7))
    }
}

/// Configuration for baseline windows
#[derive(Debug, Clone)]
pub struct BaselineConfig {
    /// Minimum number of points for a ready window
    pub min_size: usize,
    /// Minimum time between the oldest and newest point for a ready window
    pub min_span: Duration,
    /// Retention policy
    pub retention: Retention,
}

impl Default for BaselineConfig {
    fn default() -> Self {
        Self {
            min_size: DEFAULT_MIN_SIZE,
            min_span: Duration::days(1),
            retention: Retention::default(),
        }
    }
}

impl BaselineConfig {
    pub fn with_min_size(mut self, min_size: usize) -> Self {
        self.min_size = min_size;
        self
    }

    pub fn with_min_span(mut self, min_span: Duration) -> Self {
        self.min_span = min_span;
        self
    }

    pub fn with_retention(mut self, retention: Retention) -> Self {
        self.retention = retention;
        self
    }
}

/// Reference window for one (model, feature) pair
#[derive(Debug, Clone)]
pub struct BaselineWindow {
    pub model_id: String,
    pub feature: String,
    pub min_size: usize,
    points: VecDeque<(DateTime<Utc>, f64)>,
    window_start: Option<DateTime<Utc>>,
    window_end: Option<DateTime<Utc>>,
}

impl BaselineWindow {
    fn new(model_id: &str, feature: &str, min_size: usize) -> Self {
        Self {
            model_id: model_id.to_string(),
            feature: feature.to_string(),
            min_size,
            points: VecDeque::new(),
            window_start: None,
            window_end: None,
        }
    }

    /// Append a point and apply the retention policy
    fn push(&mut self, timestamp: DateTime<Utc>, value: f64, retention: Retention) {
        self.points.push_back((timestamp, value));
        self.window_start = Some(self.window_start.map_or(timestamp, |s| s.min(timestamp)));
        self.window_end = Some(self.window_end.map_or(timestamp, |e| e.max(timestamp)));

        if self.exceeds_retention(retention) {
            self.rebuild(retention);
        }
    }

    fn exceeds_retention(&self, retention: Retention) -> bool {
        match retention {
            Retention::Count(max) => self.points.len() > max,
            Retention::Duration(horizon) => match (self.window_start, self.window_end) {
                (Some(start), Some(end)) => start < end - horizon,
                _ => false,
            },
        }
    }

    /// Rebuild the window from the points still inside the horizon
    fn rebuild(&mut self, retention: Retention) {
        let before = self.points.len();
        let retained: VecDeque<(DateTime<Utc>, f64)> = match retention {
            Retention::Count(max) => {
                let skip = self.points.len().saturating_sub(max);
                self.points.iter().skip(skip).copied().collect()
            }
            Retention::Duration(horizon) => {
                let Some(end) = self.window_end else {
                    return;
                };
                let cutoff = end - horizon;
                self.points.iter().filter(|(ts, _)| *ts >= cutoff).copied().collect()
            }
        };

        self.window_start = retained.iter().map(|(ts, _)| *ts).min();
        self.window_end = retained.iter().map(|(ts, _)| *ts).max();
        self.points = retained;

        debug!(
            model_id = %self.model_id,
            feature = %self.feature,
            dropped = before - self.points.len(),
            retained = self.points.len(),
            "Baseline window rebuilt"
        );
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn window_start(&self) -> Option<DateTime<Utc>> {
        self.window_start
    }

    pub fn window_end(&self) -> Option<DateTime<Utc>> {
        self.window_end
    }

    /// Values and span of the window without its newest `held_out` points
    fn leading(&self, held_out: usize) -> (Vec<f64>, Duration) {
        let keep = self.points.len().saturating_sub(held_out);
        let leading = self.points.iter().take(keep);

        let (mut start, mut end) = (None::<DateTime<Utc>>, None::<DateTime<Utc>>);
        let mut values = Vec::with_capacity(keep);
        for (ts, value) in leading {
            start = Some(start.map_or(*ts, |s| s.min(*ts)));
            end = Some(end.map_or(*ts, |e| e.max(*ts)));
            values.push(*value);
        }

        let span = match (start, end) {
            (Some(start), Some(end)) => end - start,
            _ => Duration::zero(),
        };
        (values, span)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct WindowKey {
    model_id: String,
    feature: String,
}

impl WindowKey {
    fn new(model_id: &str, feature: &str) -> Self {
        Self {
            model_id: model_id.to_string(),
            feature: feature.to_string(),
        }
    }
}

/// Maintains baseline windows for every (model, feature) pair
///
/// Each window is updated under its own map entry lock, so concurrent
/// producers never lose updates and readers always see a whole window.
pub struct BaselineManager {
    config: BaselineConfig,
    windows: DashMap<WindowKey, BaselineWindow>,
}

impl BaselineManager {
    pub fn new(config: BaselineConfig) -> Self {
        Self {
            config,
            windows: DashMap::new(),
        }
    }

    pub fn config(&self) -> &BaselineConfig {
        &self.config
    }

    /// Append an observation to the (model, feature) window
    pub fn update(&self, model_id: &str, feature: &str, value: f64, timestamp: DateTime<Utc>) {
        let min_size = self.config.min_size;
        self.windows
            .entry(WindowKey::new(model_id, feature))
            .or_insert_with(|| {
                debug!(
                    model_id = %model_id,
                    feature = %feature,
                    custom = !features::is_known(feature),
                    "Opening baseline window"
                );
                BaselineWindow::new(model_id, feature, min_size)
            })
            .push(timestamp, value, self.config.retention);
    }

    /// Reference sample for a ready window, `NotReady` otherwise
    pub fn get_reference(&self, model_id: &str, feature: &str) -> Result<Vec<f64>, DriftError> {
        self.get_reference_excluding(model_id, feature, 0)
    }

    /// Reference sample without the newest `held_out` points
    ///
    /// The held-out points are the ones a caller compares against the
    /// reference, so they must not be part of it. Readiness is judged on
    /// what remains.
    pub fn get_reference_excluding(
        &self,
        model_id: &str,
        feature: &str,
        held_out: usize,
    ) -> Result<Vec<f64>, DriftError> {
        let not_ready = |size: usize, span: Duration| DriftError::NotReady {
            model_id: model_id.to_string(),
            feature: feature.to_string(),
            size,
            span_secs: span.num_seconds(),
        };

        let Some(window) = self.windows.get(&WindowKey::new(model_id, feature)) else {
            return Err(not_ready(0, Duration::zero()));
        };

        let (values, span) = window.leading(held_out);
        if values.len() >= window.min_size && span >= self.config.min_span {
            Ok(values)
        } else {
            Err(not_ready(values.len(), span))
        }
    }

    /// Number of points in a window (0 if absent)
    pub fn len(&self, model_id: &str, feature: &str) -> usize {
        self.windows
            .get(&WindowKey::new(model_id, feature))
            .map(|w| w.len())
            .unwrap_or(0)
    }

    /// Oldest and newest timestamps of a window
    pub fn window_bounds(
        &self,
        model_id: &str,
        feature: &str,
    ) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        let window = self.windows.get(&WindowKey::new(model_id, feature))?;
        Some((window.window_start()?, window.window_end()?))
    }

    /// Features with a window for this model, sorted by name
    pub fn features(&self, model_id: &str) -> Vec<String> {
        let mut features: Vec<String> = self
            .windows
            .iter()
            .filter(|entry| entry.key().model_id == model_id)
            .map(|entry| entry.key().feature.clone())
            .collect();
        features.sort();
        features
    }

    /// Drop every window of a model
    pub fn remove_model(&self, model_id: &str) {
        self.windows.retain(|key, _| key.model_id != model_id);
    }
}

impl Default for BaselineManager {
    fn default() -> Self {
        Self::new(BaselineConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    /// Feed `n` points `step` apart
    fn feed(manager: &BaselineManager, n: usize, step: Duration) {
        for i in 0..n {
            manager.update("model-a", "accuracy", 0.9, t0() + step * i as i32);
        }
    }

    #[test]
    fn test_not_ready_below_min_size() {
        let manager = BaselineManager::default();
        feed(&manager, DEFAULT_MIN_SIZE - 1, Duration::hours(2));

        let err = manager.get_reference("model-a", "accuracy").unwrap_err();
        assert!(err.is_skip());
        assert!(matches!(err, DriftError::NotReady { size, .. } if size == DEFAULT_MIN_SIZE - 1));
    }

    #[test]
    fn test_ready_at_min_size_with_span() {
        let manager = BaselineManager::default();
        // 30 points one hour apart span 29 hours
        feed(&manager, DEFAULT_MIN_SIZE, Duration::hours(1));

        let reference = manager.get_reference("model-a", "accuracy").unwrap();
        assert_eq!(reference.len(), DEFAULT_MIN_SIZE);
    }

    #[test]
    fn test_not_ready_when_span_too_short() {
        let manager = BaselineManager::default();
        feed(&manager, 100, Duration::minutes(1));

        assert!(manager.get_reference("model-a", "accuracy").is_err());
    }

    #[test]
    fn test_reference_excludes_held_out_tail() {
        let manager = BaselineManager::default();
        for i in 0..80 {
            manager.update("model-a", "latency_ms", i as f64, t0() + Duration::hours(i));
        }

        let reference = manager.get_reference_excluding("model-a", "latency_ms", 50).unwrap();
        assert_eq!(reference.len(), 30);
        assert_eq!(reference.last(), Some(&29.0));
        assert_eq!(manager.get_reference("model-a", "latency_ms").unwrap().len(), 80);

        // Holding out 51 leaves 29 points, one short of ready
        let err = manager
            .get_reference_excluding("model-a", "latency_ms", 51)
            .unwrap_err();
        assert!(matches!(err, DriftError::NotReady { size: 29, .. }));
    }

    #[test]
    fn test_held_out_readiness_uses_remaining_span() {
        let config = BaselineConfig::default()
            .with_min_size(10)
            .with_min_span(Duration::hours(12));
        let manager = BaselineManager::new(config);

        // 20 points a minute apart, then 50 points an hour apart
        for i in 0..20 {
            manager.update("model-a", "accuracy", 0.9, t0() + Duration::minutes(i));
        }
        for i in 0..50 {
            manager.update("model-a", "accuracy", 0.8, t0() + Duration::hours(i + 1));
        }

        assert!(manager.get_reference("model-a", "accuracy").is_ok());
        let err = manager
            .get_reference_excluding("model-a", "accuracy", 50)
            .unwrap_err();
        assert!(matches!(err, DriftError::NotReady { size: 20, span_secs: 1140, .. }));
    }

    #[test]
    fn test_unknown_window_is_not_ready() {
        let manager = BaselineManager::default();
        let err = manager.get_reference("missing", "accuracy").unwrap_err();
        assert!(matches!(err, DriftError::NotReady { size: 0, .. }));
    }

    #[test]
    fn test_duration_retention_drops_old_points() {
        let config = BaselineConfig::default().with_retention(Retention::Duration(Duration::hours(1)));
        let manager = BaselineManager::new(config);

        // One point per minute for two hours
        for i in 0..120 {
            manager.update("model-a", "latency_ms", i as f64, t0() + Duration::minutes(i));
        }

        let len = manager.len("model-a", "latency_ms");
        assert!((59..=61).contains(&len), "len = {}", len);

        let (start, end) = manager.window_bounds("model-a", "latency_ms").unwrap();
        assert!(end - start <= Duration::hours(1));
    }

    #[test]
    fn test_count_retention_keeps_most_recent() {
        let config = BaselineConfig::default().with_retention(Retention::Count(50));
        let manager = BaselineManager::new(config);

        for i in 0..80 {
            manager.update("model-a", "accuracy", i as f64, t0() + Duration::minutes(i));
        }

        assert_eq!(manager.len("model-a", "accuracy"), 50);
        let (start, _) = manager.window_bounds("model-a", "accuracy").unwrap();
        assert_eq!(start, t0() + Duration::minutes(30));
    }

    #[test]
    fn test_features_and_remove_model() {
        let manager = BaselineManager::default();
        manager.update("model-a", "latency_ms", 10.0, t0());
        manager.update("model-a", "accuracy", 0.9, t0());
        manager.update("model-b", "accuracy", 0.8, t0());

        assert_eq!(manager.features("model-a"), vec!["accuracy", "latency_ms"]);

        manager.remove_model("model-a");
        assert!(manager.features("model-a").is_empty());
        assert_eq!(manager.features("model-b"), vec!["accuracy"]);
    }

    #[test]
    fn test_concurrent_updates_are_not_lost() {
        use std::sync::Arc;

        let manager = Arc::new(BaselineManager::new(
            BaselineConfig::default().with_retention(Retention::Count(100_000)),
        ));

        let handles: Vec<_> = (0..8)
            .map(|worker| {
                let manager = manager.clone();
                std::thread::spawn(move || {
                    for i in 0..500 {
                        let ts = t0() + Duration::seconds(worker * 1000 + i);
                        manager.update("model-a", "accuracy", 0.9, ts);
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(manager.len("model-a", "accuracy"), 8 * 500);
    }
}
