//! Driftwatch agent - drift monitoring for deployed ML models
//!
//! Receives performance metrics over HTTP, evaluates drift on a schedule
//! and exposes status, alerts, reports, health and Prometheus metrics.

use anyhow::Result;
use monitor_lib::{
    collector::{CollectionLoopBuilder, PushSource},
    health::{Component, HealthRegistry},
    MonitorEvent, MonitorService, StructuredLogger,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod api;
mod config;

const AGENT_VERSION: &str = env!("CARGO_PKG_VERSION");
const EVENT_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting driftwatch-agent");

    // Load configuration
    let config = config::AgentConfig::load()?;
    let monitor_config = config.monitor_config()?;
    info!(
        instance = %config.instance,
        algorithm = %monitor_config.model_defaults.algorithm,
        tick_interval_secs = config.tick_interval_secs,
        "Agent configured"
    );

    // Initialize health registry
    let health_registry = HealthRegistry::new();
    health_registry.register_all(&Component::ALL).await;

    let logger = StructuredLogger::new(&config.instance);
    logger.log_startup(AGENT_VERSION, config.api_port);

    let (service, events) = MonitorService::new(monitor_config, health_registry.clone());
    let events_handle = tokio::spawn(consume_events(events));

    // Buffered ingest path drained by the collection loop
    let push = Arc::new(
        PushSource::new("http-push").with_capacity(config.push_queue_capacity),
    );
    let collection_config = config.collection_config();
    let collection = CollectionLoopBuilder::new()
        .source(push.clone())
        .service(service.clone())
        .interval(collection_config.interval)
        .jitter(collection_config.jitter)
        .degraded_interval(collection_config.degraded_interval)
        .build()?;

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let collection_handle = tokio::spawn(collection.run(shutdown_rx));

    let app_state = Arc::new(api::AppState::new(
        health_registry.clone(),
        service.clone(),
        push,
    ));

    // Mark agent as ready after initialization
    health_registry.set_ready(true).await;

    // Start API, health and metrics server
    let api_registry = health_registry.clone();
    let api_port = config.api_port;
    let api_handle = tokio::spawn(async move {
        if let Err(e) = api::serve(api_port, app_state).await {
            error!(error = %e, "API server failed");
            api_registry
                .set_unhealthy(Component::Api, e.to_string())
                .await;
        }
    });

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    logger.log_shutdown("SIGINT received");
    health_registry.set_ready(false).await;

    let _ = shutdown_tx.send(());
    if let Err(e) = collection_handle.await {
        error!(error = %e, "Collection loop task failed");
    }

    service.shutdown().await;
    api_handle.abort();
    let _ = api_handle.await;
    drop(service);

    // The event channel closes once the last service handle is gone
    if tokio::time::timeout(EVENT_DRAIN_TIMEOUT, events_handle)
        .await
        .is_err()
    {
        info!("Event stream still open at exit");
    }

    info!("Shutdown complete");
    Ok(())
}

/// Drain monitor events until the service is dropped
///
/// Drift evaluations and alerts are already logged by the service; this
/// is the hand-off point for forwarding them elsewhere.
async fn consume_events(mut events: mpsc::Receiver<MonitorEvent>) {
    let mut evaluations = 0u64;
    let mut alerts = 0u64;

    while let Some(event) = events.recv().await {
        match event {
            MonitorEvent::DriftEvaluated { model_id, result } => {
                evaluations += 1;
                debug!(
                    model_id = %model_id,
                    feature = %result.feature,
                    is_drift = result.is_drift,
                    "Drift evaluation event"
                );
            }
            MonitorEvent::AlertRaised(alert) => {
                alerts += 1;
                debug!(
                    model_id = %alert.model_id,
                    feature = %alert.feature,
                    severity = %alert.severity,
                    "Alert event"
                );
            }
        }
    }

    info!(evaluations, alerts, "Monitor event stream closed");
}
