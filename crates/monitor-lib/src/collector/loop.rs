//! Metric collection loop
//!
//! Periodically polls every metric source for each monitored model and
//! ingests the results, with configurable intervals and jitter.

use super::MetricSource;
use crate::health::Component;
use crate::monitor::MonitorService;
use crate::observability::MonitorMetrics;
use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Configuration for the metric collection loop
#[derive(Debug, Clone)]
pub struct CollectionConfig {
    /// Base collection interval (default: 30 seconds)
    pub interval: Duration,
    /// Maximum jitter to add to interval (default: 1 second)
    pub jitter: Duration,
    /// Degraded mode interval after slow cycles (default: 120 seconds)
    pub degraded_interval: Duration,
    /// Cycles slower than this switch to degraded mode
    pub slow_cycle_threshold: Duration,
}

impl Default for CollectionConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            jitter: Duration::from_secs(1),
            degraded_interval: Duration::from_secs(120),
            slow_cycle_threshold: Duration::from_millis(500),
        }
    }
}

/// Collection loop feeding metric sources into the monitoring service
pub struct CollectionLoop {
    /// Metric sources polled on each cycle
    sources: Vec<Arc<dyn MetricSource>>,
    /// Service receiving the collected points
    service: Arc<MonitorService>,
    /// Configuration
    config: CollectionConfig,
    metrics: MonitorMetrics,
    /// Whether running in degraded mode
    pub(super) degraded_mode: bool,
}

impl CollectionLoop {
    /// Create a new collection loop
    pub fn new(
        sources: Vec<Arc<dyn MetricSource>>,
        service: Arc<MonitorService>,
        config: CollectionConfig,
    ) -> Self {
        Self {
            sources,
            service,
            config,
            metrics: MonitorMetrics::new(),
            degraded_mode: false,
        }
    }

    /// Run until a shutdown signal arrives
    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) {
        info!(
            interval_secs = self.config.interval.as_secs(),
            sources = self.sources.len(),
            "Starting metric collection loop"
        );

        let mut cycle_count = 0u64;

        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.current_interval()) => {
                    let start = Instant::now();
                    let results = self.collect_all().await;
                    let elapsed = start.elapsed();
                    cycle_count += 1;

                    if cycle_count % 10 == 0 {
                        debug!(
                            points = results.point_count,
                            errors = results.error_count,
                            elapsed_ms = elapsed.as_millis() as u64,
                            degraded = self.degraded_mode,
                            "Collection cycle complete"
                        );
                    }

                    self.report_source_health(&results).await;
                    self.check_cycle_duration(elapsed);
                }
                _ = shutdown.recv() => {
                    info!(cycles = cycle_count, "Shutting down metric collection loop");
                    break;
                }
            }
        }
    }

    /// Get the current collection interval (accounting for degraded mode)
    pub(super) fn current_interval(&self) -> Duration {
        let base = if self.degraded_mode {
            self.config.degraded_interval
        } else {
            self.config.interval
        };

        // Add jitter so replicas do not poll in lockstep
        let jitter_ms = rand_jitter(self.config.jitter.as_millis() as u64);
        base + Duration::from_millis(jitter_ms)
    }

    /// Poll every source for every monitored model and ingest the points
    pub(super) async fn collect_all(&self) -> CollectionResults {
        let mut results = CollectionResults::default();

        let models = self.service.monitored_models().await;
        for model_id in &models {
            for source in &self.sources {
                results.attempts += 1;
                match source.collect(model_id).await {
                    Ok(points) => {
                        for point in points {
                            if point.model_id != *model_id {
                                debug!(
                                    source = %source.name(),
                                    expected = %model_id,
                                    got = %point.model_id,
                                    "Ignoring point for another model"
                                );
                                continue;
                            }
                            self.service
                                .ingest(&point.model_id, &point.feature, point.value, point.timestamp);
                            results.point_count += 1;
                        }
                    }
                    Err(e) => {
                        results.error_count += 1;
                        self.metrics.inc_collection_errors();
                        warn!(
                            source = %source.name(),
                            model_id = %model_id,
                            error = %e,
                            "Failed to collect metrics"
                        );
                    }
                }
            }
        }

        for source in &self.sources {
            source.retain_models(&models);
        }

        results
    }

    /// Mark the collector degraded while every source is failing
    pub(super) async fn report_source_health(&self, results: &CollectionResults) {
        let registry = self.service.health_registry();
        if results.attempts > 0 && results.error_count == results.attempts {
            registry
                .set_degraded(Component::Collector, "all metric sources failing")
                .await;
        } else if results.attempts > 0 {
            registry.set_healthy(Component::Collector).await;
        }
    }

    /// Switch in or out of degraded mode based on cycle duration
    pub(super) fn check_cycle_duration(&mut self, cycle_duration: Duration) {
        let threshold = self.config.slow_cycle_threshold;

        if cycle_duration > threshold && !self.degraded_mode {
            warn!(
                elapsed_ms = cycle_duration.as_millis() as u64,
                "Entering degraded mode due to slow collection"
            );
            self.degraded_mode = true;
        } else if cycle_duration < threshold / 2 && self.degraded_mode {
            info!("Exiting degraded mode, collection performance improved");
            self.degraded_mode = false;
        }
    }
}

/// Results from a collection cycle
#[derive(Debug, Default)]
pub(super) struct CollectionResults {
    pub(super) attempts: usize,
    pub(super) point_count: usize,
    pub(super) error_count: usize,
}

/// Random jitter between 0 and max_ms, derived from the clock's sub-second nanos
fn rand_jitter(max_ms: u64) -> u64 {
    if max_ms == 0 {
        return 0;
    }

    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos() as u64;

    now % max_ms
}

/// Builder for creating the collection loop
pub struct CollectionLoopBuilder {
    sources: Vec<Arc<dyn MetricSource>>,
    service: Option<Arc<MonitorService>>,
    config: CollectionConfig,
}

impl CollectionLoopBuilder {
    /// Create a new builder with default configuration
    pub fn new() -> Self {
        Self {
            sources: Vec::new(),
            service: None,
            config: CollectionConfig::default(),
        }
    }

    /// Add a metric source
    pub fn source(mut self, source: Arc<dyn MetricSource>) -> Self {
        self.sources.push(source);
        self
    }

    /// Set the service receiving collected points
    pub fn service(mut self, service: Arc<MonitorService>) -> Self {
        self.service = Some(service);
        self
    }

    /// Set the collection interval
    pub fn interval(mut self, interval: Duration) -> Self {
        self.config.interval = interval;
        self
    }

    /// Set the jitter duration
    pub fn jitter(mut self, jitter: Duration) -> Self {
        self.config.jitter = jitter;
        self
    }

    /// Set the degraded mode interval
    pub fn degraded_interval(mut self, interval: Duration) -> Self {
        self.config.degraded_interval = interval;
        self
    }

    /// Set the cycle duration above which degraded mode starts
    pub fn slow_cycle_threshold(mut self, threshold: Duration) -> Self {
        self.config.slow_cycle_threshold = threshold;
        self
    }

    /// Build the collection loop
    pub fn build(self) -> Result<CollectionLoop> {
        let service = self
            .service
            .ok_or_else(|| anyhow::anyhow!("Monitor service is required"))?;
        if self.sources.is_empty() {
            anyhow::bail!("At least one metric source is required");
        }

        Ok(CollectionLoop::new(self.sources, service, self.config))
    }
}

impl Default for CollectionLoopBuilder {
    fn default() -> Self {
        Self::new()
    }
}
