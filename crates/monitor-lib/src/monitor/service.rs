//! Model monitoring service
//!
//! Owns the baseline windows, recent buffers, per-model monitoring state and
//! the scheduler task. Every monitored model is evaluated on each tick in its
//! own task; a failure in one model or feature never reaches the others.
//! Drift checks follow each model's check interval, while error-rate and
//! latency limits are checked on every tick.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::scheduler::{self, SchedulerHandle};
use super::state::{ModelConfig, ModelHandle, ModelMonitorState, MonitorAck, RecentStore};
use crate::alerting::{Alerter, PerformanceChecker, RuleViolation};
use crate::baseline::{BaselineConfig, BaselineManager};
use crate::drift::{stats, Algorithm, DriftEngine, DEFAULT_PSI_BINS};
use crate::error::DriftError;
use crate::health::{Component, HealthRegistry};
use crate::models::{
    Alert, DriftResult, FeatureSummary, ModelStatus, MonitoringReport, Severity,
};
use crate::observability::{MonitorMetrics, StructuredLogger};
use crate::scoring::{HealthConfig, HealthScorer};

/// Configuration for the monitoring service
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Scheduler tick period
    pub tick_interval: std::time::Duration,
    /// Configuration applied by `start_monitoring` callers that pass the defaults
    pub model_defaults: ModelConfig,
    /// Alerts older than this are expired
    pub alert_retention: Duration,
    /// Repeat alerts for one feature inside this window are suppressed
    pub dedup_window: Duration,
    /// Number of most recent points forming the current sample
    pub current_window: usize,
    /// Points kept per (model, feature) recent buffer
    pub recent_capacity: usize,
    /// Number of PSI histogram bins
    pub psi_bins: usize,
    pub baseline: BaselineConfig,
    pub health: HealthConfig,
    /// Operating limits checked on every tick
    pub performance: PerformanceChecker,
    /// Capacity of the event channel
    pub event_buffer: usize,
    /// Instance name attached to structured log records
    pub instance: String,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            tick_interval: std::time::Duration::from_secs(60),
            model_defaults: ModelConfig::default(),
            alert_retention: Duration::hours(24),
            dedup_window: Duration::minutes(15),
            current_window: 50,
            recent_capacity: 1000,
            psi_bins: DEFAULT_PSI_BINS,
            baseline: BaselineConfig::default(),
            health: HealthConfig::default(),
            performance: PerformanceChecker::default(),
            event_buffer: 1024,
            instance: "driftwatch".to_string(),
        }
    }
}

impl MonitorConfig {
    pub fn with_tick_interval(mut self, tick_interval: std::time::Duration) -> Self {
        self.tick_interval = tick_interval;
        self
    }

    pub fn with_model_defaults(mut self, model_defaults: ModelConfig) -> Self {
        self.model_defaults = model_defaults;
        self
    }

    pub fn with_alert_retention(mut self, alert_retention: Duration) -> Self {
        self.alert_retention = alert_retention;
        self
    }

    pub fn with_current_window(mut self, current_window: usize) -> Self {
        self.current_window = current_window;
        self
    }

    pub fn with_recent_capacity(mut self, recent_capacity: usize) -> Self {
        self.recent_capacity = recent_capacity;
        self
    }

    pub fn with_baseline(mut self, baseline: BaselineConfig) -> Self {
        self.baseline = baseline;
        self
    }

    pub fn with_health(mut self, health: HealthConfig) -> Self {
        self.health = health;
        self
    }

    pub fn with_performance(mut self, performance: PerformanceChecker) -> Self {
        self.performance = performance;
        self
    }
}

/// Records emitted for the persistence and notification layer
#[derive(Debug, Clone)]
pub enum MonitorEvent {
    DriftEvaluated { model_id: String, result: DriftResult },
    AlertRaised(Alert),
}

/// Drift monitoring service
pub struct MonitorService {
    config: MonitorConfig,
    baseline: BaselineManager,
    recent: RecentStore,
    engine: DriftEngine,
    alerter: Alerter,
    scorer: HealthScorer,
    models: RwLock<HashMap<String, Arc<ModelHandle>>>,
    scheduler: tokio::sync::Mutex<Option<SchedulerHandle>>,
    events_tx: mpsc::Sender<MonitorEvent>,
    health: HealthRegistry,
    metrics: MonitorMetrics,
    logger: StructuredLogger,
}

impl MonitorService {
    /// Create a new service and the receiving end of its event channel
    pub fn new(
        config: MonitorConfig,
        health: HealthRegistry,
    ) -> (Arc<Self>, mpsc::Receiver<MonitorEvent>) {
        let (events_tx, events_rx) = mpsc::channel(config.event_buffer.max(1));

        let service = Self {
            baseline: BaselineManager::new(config.baseline.clone()),
            recent: RecentStore::new(config.recent_capacity),
            engine: DriftEngine::new().with_psi_bins(config.psi_bins),
            alerter: Alerter::new().with_dedup_window(config.dedup_window),
            scorer: HealthScorer::new(config.health.clone()),
            models: RwLock::new(HashMap::new()),
            scheduler: tokio::sync::Mutex::new(None),
            events_tx,
            health,
            metrics: MonitorMetrics::new(),
            logger: StructuredLogger::new(config.instance.clone()),
            config,
        };

        (Arc::new(service), events_rx)
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    /// Model configuration used when the caller supplies none
    pub fn default_model_config(&self) -> ModelConfig {
        self.config.model_defaults.clone()
    }

    pub fn health_registry(&self) -> &HealthRegistry {
        &self.health
    }

    pub fn baseline(&self) -> &BaselineManager {
        &self.baseline
    }

    /// Record one observation
    ///
    /// Safe to call concurrently from many producers while ticks run.
    pub fn ingest(&self, model_id: &str, feature: &str, value: f64, timestamp: DateTime<Utc>) {
        self.baseline.update(model_id, feature, value, timestamp);
        self.recent.push(model_id, feature, value, timestamp);
        self.metrics.inc_points_ingested();
    }

    /// Start monitoring a model
    ///
    /// An already monitored model keeps its configuration; use
    /// `update_config` to change it.
    pub async fn start_monitoring(self: &Arc<Self>, model_id: &str, config: ModelConfig) -> MonitorAck {
        {
            let mut models = self.models.write().await;
            if let Some(handle) = models.get(model_id) {
                return MonitorAck::AlreadyActive {
                    config: handle.state().config.clone(),
                };
            }

            self.logger.log_monitoring_started(
                model_id,
                config.drift_threshold,
                config.check_interval.num_seconds(),
                config.algorithm.as_str(),
            );

            let state = ModelMonitorState::new(config, Utc::now());
            models.insert(model_id.to_string(), Arc::new(ModelHandle::new(model_id, state)));
            self.metrics.set_models_monitored(models.len() as i64);
        }

        self.ensure_scheduler().await;
        MonitorAck::Started
    }

    /// Replace the configuration of a monitored model
    pub async fn update_config(&self, model_id: &str, config: ModelConfig) -> MonitorAck {
        let models = self.models.read().await;
        match models.get(model_id) {
            Some(handle) => {
                info!(
                    model_id = %model_id,
                    drift_threshold = config.drift_threshold,
                    check_interval_secs = config.check_interval.num_seconds(),
                    algorithm = %config.algorithm,
                    "Monitoring configuration updated"
                );
                handle.state().config = config;
                MonitorAck::Updated
            }
            None => MonitorAck::NotMonitored,
        }
    }

    /// Stop monitoring a model
    ///
    /// Waits for an in-flight evaluation to observe the cancellation before
    /// returning. Stopping the last model stops the scheduler task.
    pub async fn stop_monitoring(&self, model_id: &str) -> MonitorAck {
        let handle = {
            let mut models = self.models.write().await;
            let handle = models.remove(model_id);
            self.metrics.set_models_monitored(models.len() as i64);
            handle
        };

        let Some(handle) = handle else {
            return MonitorAck::NotMonitored;
        };

        handle.cancel();
        let _ = handle.eval_guard.lock().await;
        self.alerter.forget_model(model_id);
        self.metrics.remove_health_score(model_id);

        let monitored_secs = (Utc::now() - handle.state().started_at).num_seconds();
        debug!(model_id = %model_id, monitored_secs = monitored_secs, "Model state released");
        self.logger.log_monitoring_stopped(model_id);

        self.stop_scheduler_if_idle().await;
        MonitorAck::Stopped
    }

    /// Stop monitoring every model and the scheduler task
    pub async fn shutdown(&self) {
        let handles: Vec<Arc<ModelHandle>> = {
            let mut models = self.models.write().await;
            self.metrics.set_models_monitored(0);
            models.drain().map(|(_, handle)| handle).collect()
        };

        for handle in &handles {
            handle.cancel();
        }
        for handle in &handles {
            let _ = handle.eval_guard.lock().await;
            self.alerter.forget_model(&handle.model_id);
            self.metrics.remove_health_score(&handle.model_id);
        }

        if let Some(scheduler) = self.scheduler.lock().await.take() {
            scheduler.stop().await;
        }

        info!(models = handles.len(), "Monitor service shut down");
    }

    /// Ids of monitored models, sorted
    pub async fn monitored_models(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.models.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub async fn is_monitored(&self, model_id: &str) -> bool {
        self.models.read().await.contains_key(model_id)
    }

    /// Configuration of a monitored model
    pub async fn monitoring_config(&self, model_id: &str) -> Option<ModelConfig> {
        self.model_handle(model_id)
            .await
            .map(|handle| handle.state().config.clone())
    }

    /// Current status of a model
    pub async fn get_status(&self, model_id: &str) -> ModelStatus {
        let now = Utc::now();
        let metrics = self
            .recent
            .snapshot(model_id)
            .into_iter()
            .filter_map(|(feature, values)| {
                stats::mean(&stats::finite_values(&values)).map(|mean| (feature, mean))
            })
            .collect();

        let handle = self.model_handle(model_id).await;
        let (active_alert_count, last_drift_check, drift_detected) = match &handle {
            Some(handle) => {
                let state = handle.state();
                (
                    state.live_alerts(now, self.config.alert_retention).len(),
                    state.last_drift_check,
                    state.drift_detected,
                )
            }
            None => (0, None, false),
        };

        ModelStatus {
            model_id: model_id.to_string(),
            timestamp: now,
            metrics,
            active_alert_count,
            last_drift_check,
            drift_detected,
            monitoring_active: handle.is_some(),
        }
    }

    /// Alerts of a monitored model inside the retention horizon
    pub async fn active_alerts(&self, model_id: &str) -> Vec<Alert> {
        match self.model_handle(model_id).await {
            Some(handle) => handle
                .state()
                .live_alerts(Utc::now(), self.config.alert_retention),
            None => Vec::new(),
        }
    }

    /// Health score of a model in [0, 100]
    pub async fn get_health_score(&self, model_id: &str) -> f64 {
        self.health_score_at(model_id, Utc::now()).await
    }

    pub(crate) async fn health_score_at(&self, model_id: &str, now: DateTime<Utc>) -> f64 {
        let alerts = match self.model_handle(model_id).await {
            Some(handle) => handle.state().live_alerts(now, self.config.alert_retention),
            None => Vec::new(),
        };
        self.scorer.score(&self.recent.snapshot(model_id), &alerts, now)
    }

    /// Run a drift check now with the model's configured algorithm
    ///
    /// Features whose data is insufficient or whose baseline is not ready are
    /// omitted from the result.
    pub async fn manual_drift_check(
        &self,
        model_id: &str,
        feature: Option<&str>,
    ) -> Result<Vec<DriftResult>, DriftError> {
        let config = self.model_config(model_id).await;
        self.run_manual_check(model_id, feature, config.algorithm, config.drift_threshold)
            .await
    }

    /// Run a drift check now with the algorithm given by name
    pub async fn manual_drift_check_with(
        &self,
        model_id: &str,
        feature: Option<&str>,
        algorithm: &str,
    ) -> Result<Vec<DriftResult>, DriftError> {
        let algorithm: Algorithm = algorithm.parse()?;
        let config = self.model_config(model_id).await;
        self.run_manual_check(model_id, feature, algorithm, config.drift_threshold)
            .await
    }

    async fn run_manual_check(
        &self,
        model_id: &str,
        feature: Option<&str>,
        algorithm: Algorithm,
        threshold: f64,
    ) -> Result<Vec<DriftResult>, DriftError> {
        let features = match feature {
            Some(feature) => vec![feature.to_string()],
            None => self.baseline.features(model_id),
        };

        let mut results = Vec::with_capacity(features.len());
        for feature in &features {
            match self.check_feature(model_id, feature, algorithm, threshold) {
                Ok(result) => results.push(result),
                Err(e) if e.is_skip() => {
                    debug!(model_id = %model_id, feature = %feature, reason = %e, "Feature skipped");
                }
                Err(e) => {
                    self.metrics.inc_evaluation_errors(e.kind());
                    self.logger
                        .log_evaluation_failed(model_id, feature, e.kind(), &e.to_string());
                    return Err(e);
                }
            }
        }

        let now = Utc::now();
        let handle = self.model_handle(model_id).await;
        let alerts = self.raise_alerts(model_id, &results, now);
        if let Some(handle) = &handle {
            let mut state = handle.state();
            state.drift_detected = results.iter().any(|r| r.is_drift);
            state.alerts.extend(alerts.iter().cloned());
        }

        self.emit(model_id, &results, alerts);
        Ok(results)
    }

    /// Generate a report over the last `period`
    pub async fn generate_report(&self, model_id: &str, period: Duration) -> MonitoringReport {
        self.report_at(model_id, period, Utc::now()).await
    }

    pub(crate) async fn report_at(
        &self,
        model_id: &str,
        period: Duration,
        now: DateTime<Utc>,
    ) -> MonitoringReport {
        let start = now - period;

        let mut total_points = 0;
        let performance_summary: HashMap<String, FeatureSummary> = self
            .recent
            .since(model_id, Some(start))
            .into_iter()
            .filter_map(|(feature, values)| {
                let values = stats::finite_values(&values);
                if values.is_empty() {
                    return None;
                }
                total_points += values.len();
                let summary = stats::summarize(&values);
                Some((
                    feature,
                    FeatureSummary {
                        mean: summary.mean,
                        std: summary.std,
                        trend: stats::index_correlation(&values),
                        n: summary.n,
                    },
                ))
            })
            .collect();

        let alerts: Vec<Alert> = match self.model_handle(model_id).await {
            Some(handle) => handle
                .state()
                .alerts
                .iter()
                .filter(|a| a.created_at >= start)
                .cloned()
                .collect(),
            None => Vec::new(),
        };

        let health_score = self.health_score_at(model_id, now).await;
        let recommendations = report_recommendations(&alerts, health_score);

        MonitoringReport {
            model_id: model_id.to_string(),
            period_hours: period.num_hours(),
            total_points,
            performance_summary,
            alerts,
            health_score,
            recommendations,
            generated_at: now,
        }
    }

    /// Dispatch one tick and wait for every evaluation it started
    pub async fn run_tick(self: &Arc<Self>, now: DateTime<Utc>) {
        for task in self.dispatch_tick(now).await {
            if let Err(e) = task.await {
                warn!(error = %e, "Model evaluation task failed");
            }
        }
    }

    /// Start an evaluation task for every monitored model that is not still
    /// busy with the previous tick
    pub(crate) async fn dispatch_tick(self: &Arc<Self>, now: DateTime<Utc>) -> Vec<JoinHandle<()>> {
        let handles: Vec<Arc<ModelHandle>> = self.models.read().await.values().cloned().collect();

        let mut tasks = Vec::with_capacity(handles.len());
        let mut behind = Vec::new();

        for handle in handles {
            let guard = match handle.eval_guard.clone().try_lock_owned() {
                Ok(guard) => guard,
                Err(_) => {
                    self.metrics.inc_falling_behind();
                    self.logger.log_falling_behind(&handle.model_id);
                    behind.push(handle.model_id.clone());
                    continue;
                }
            };

            let service = Arc::clone(self);
            tasks.push(tokio::spawn(async move {
                let _guard = guard;
                service.evaluate_model(&handle, now);
            }));
        }

        self.health.report_lagging(&behind).await;

        tasks
    }

    /// Evaluate one model for a tick; the caller holds its evaluation guard
    pub(super) fn evaluate_model(&self, handle: &ModelHandle, now: DateTime<Utc>) {
        let started = Instant::now();
        let model_id = handle.model_id.as_str();

        let (config, due) = {
            let state = handle.state();
            (state.config.clone(), state.is_check_due(now))
        };

        let mut results = Vec::new();
        if due {
            for feature in self.baseline.features(model_id) {
                if handle.is_cancelled() {
                    debug!(model_id = %model_id, "Evaluation cancelled");
                    return;
                }
                match self.check_feature(model_id, &feature, config.algorithm, config.drift_threshold) {
                    Ok(result) => results.push(result),
                    Err(e) if e.is_skip() => {
                        debug!(model_id = %model_id, feature = %feature, reason = %e, "Feature skipped");
                    }
                    Err(e) => {
                        self.metrics.inc_evaluation_errors(e.kind());
                        self.logger
                            .log_evaluation_failed(model_id, &feature, e.kind(), &e.to_string());
                    }
                }
            }
        }

        let recent = self.recent.snapshot(model_id);
        let violations = self.config.performance.check(
            &self
                .recent
                .since(model_id, Some(now - self.config.performance.window())),
        );

        let (alerts, health_score) = {
            let mut state = handle.state();
            if handle.is_cancelled() {
                debug!(model_id = %model_id, "Evaluation cancelled before commit");
                return;
            }

            let mut alerts = if due {
                state.last_drift_check = Some(now);
                state.drift_detected = results.iter().any(|r| r.is_drift);
                self.raise_alerts(model_id, &results, now)
            } else {
                Vec::new()
            };
            alerts.extend(self.raise_violations(model_id, &violations, now));
            state.alerts.extend(alerts.iter().cloned());

            let expired = state.expire_alerts(now, self.config.alert_retention);
            if expired > 0 {
                self.metrics.inc_alerts_expired(expired as u64);
                debug!(model_id = %model_id, expired = expired, "Alerts expired");
            }

            let live = state.live_alerts(now, self.config.alert_retention);
            (alerts, self.scorer.score(&recent, &live, now))
        };

        self.metrics.set_health_score(model_id, health_score);
        self.metrics
            .observe_evaluation_latency(started.elapsed().as_secs_f64());
        debug!(
            model_id = %model_id,
            drift_checked = due,
            features = results.len(),
            limits_breached = violations.len(),
            alerts = alerts.len(),
            health_score = health_score,
            "Model evaluated"
        );

        self.emit(model_id, &results, alerts);
    }

    /// Compare the current window of one feature against its baseline
    ///
    /// The reference is read first and leaves out the newest
    /// `current_window` points, so a point ingested in between lands only in
    /// the current sample and the two samples never overlap.
    fn check_feature(
        &self,
        model_id: &str,
        feature: &str,
        algorithm: Algorithm,
        threshold: f64,
    ) -> Result<DriftResult, DriftError> {
        let window = self.config.current_window;
        let reference = self.baseline.get_reference_excluding(model_id, feature, window)?;
        let current = self.recent.current(model_id, feature, window);
        let result = self
            .engine
            .detect(feature, &reference, &current, algorithm, threshold)?;
        self.metrics.record_drift_check(&result);
        Ok(result)
    }

    /// Build deduplicated alerts for the drifted results
    fn raise_alerts(&self, model_id: &str, results: &[DriftResult], now: DateTime<Utc>) -> Vec<Alert> {
        results
            .iter()
            .filter(|r| r.is_drift)
            .filter_map(|r| match self.alerter.raise(model_id, r, now) {
                Some(alert) => {
                    self.metrics.inc_alerts_raised(alert.severity);
                    Some(alert)
                }
                None => {
                    self.metrics.inc_alerts_suppressed();
                    debug!(model_id = %model_id, feature = %r.feature, "Duplicate alert suppressed");
                    None
                }
            })
            .collect()
    }

    /// Build deduplicated alerts for violated operating limits
    fn raise_violations(
        &self,
        model_id: &str,
        violations: &[RuleViolation],
        now: DateTime<Utc>,
    ) -> Vec<Alert> {
        violations
            .iter()
            .filter_map(|v| match self.alerter.raise_violation(model_id, v, now) {
                Some(alert) => {
                    self.metrics.inc_alerts_raised(alert.severity);
                    Some(alert)
                }
                None => {
                    self.metrics.inc_alerts_suppressed();
                    debug!(model_id = %model_id, kind = %v.kind, "Duplicate alert suppressed");
                    None
                }
            })
            .collect()
    }

    /// Log and publish evaluation records
    fn emit(&self, model_id: &str, results: &[DriftResult], alerts: Vec<Alert>) {
        for result in results {
            self.logger.log_drift_evaluated(model_id, result);
            self.send(MonitorEvent::DriftEvaluated {
                model_id: model_id.to_string(),
                result: result.clone(),
            });
        }
        for alert in alerts {
            self.logger.log_alert(&alert);
            self.send(MonitorEvent::AlertRaised(alert));
        }
    }

    fn send(&self, event: MonitorEvent) {
        if let Err(e) = self.events_tx.try_send(event) {
            warn!(error = %e, "Failed to publish monitor event");
        }
    }

    async fn model_config(&self, model_id: &str) -> ModelConfig {
        match self.model_handle(model_id).await {
            Some(handle) => handle.state().config.clone(),
            None => self.default_model_config(),
        }
    }

    pub(crate) async fn model_handle(&self, model_id: &str) -> Option<Arc<ModelHandle>> {
        self.models.read().await.get(model_id).cloned()
    }

    /// Spawn the scheduler task unless it is already running
    async fn ensure_scheduler(self: &Arc<Self>) {
        let mut scheduler = self.scheduler.lock().await;
        if scheduler.as_ref().is_some_and(|s| !s.is_finished()) {
            return;
        }
        *scheduler = Some(scheduler::spawn(Arc::downgrade(self), self.config.tick_interval));
        self.health.set_healthy(Component::MonitorLoop).await;
    }

    async fn stop_scheduler_if_idle(&self) {
        let mut scheduler = self.scheduler.lock().await;
        if !self.models.read().await.is_empty() {
            return;
        }
        if let Some(handle) = scheduler.take() {
            handle.stop().await;
        }
    }

    pub(crate) async fn scheduler_running(&self) -> bool {
        self.scheduler
            .lock()
            .await
            .as_ref()
            .is_some_and(|s| !s.is_finished())
    }
}

/// Operator recommendations for a report
fn report_recommendations(alerts: &[Alert], health_score: f64) -> Vec<String> {
    let mut recommendations = Vec::new();

    if alerts.iter().any(|a| a.severity == Severity::Critical) {
        recommendations
            .push("Immediate model retraining required: critical performance degradation".to_string());
    }
    if alerts.iter().any(|a| a.severity == Severity::High) {
        recommendations.push("Plan model retraining within the next 48 hours".to_string());
    }
    if health_score < 70.0 {
        recommendations.push("Review model performance metrics and consider optimization".to_string());
    }
    if recommendations.is_empty() {
        recommendations.push("Model is operating within normal parameters".to_string());
    }

    recommendations
}
