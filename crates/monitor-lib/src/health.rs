//! Agent health behind `/healthz` and `/readyz`
//!
//! Tracks the three long-running parts of the agent and the models whose
//! evaluation could not keep up with the tick. A lagging model degrades the
//! monitor loop; it never makes the agent unready.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Long-running parts of the agent
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Component {
    /// Scheduler dispatching per-model evaluations
    MonitorLoop,
    /// Loop draining metric sources into the service
    Collector,
    /// HTTP listener
    Api,
}

impl Component {
    pub const ALL: [Component; 3] = [Component::MonitorLoop, Component::Collector, Component::Api];

    pub fn as_str(&self) -> &'static str {
        match self {
            Component::MonitorLoop => "monitor_loop",
            Component::Collector => "collector",
            Component::Api => "api",
        }
    }
}

impl std::fmt::Display for Component {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Health status, ordered from best to worst
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentStatus {
    Healthy,
    /// Still serving, with reduced guarantees
    Degraded,
    Unhealthy,
}

impl ComponentStatus {
    pub fn is_operational(&self) -> bool {
        *self != ComponentStatus::Unhealthy
    }
}

/// Health of one component
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub status: ComponentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// When the component entered its current status
    pub since: DateTime<Utc>,
}

/// Body of `/healthz`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Worst status over all components
    pub status: ComponentStatus,
    pub components: BTreeMap<String, ComponentHealth>,
    /// Models skipped on the last tick because they were still evaluating
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub lagging_models: Vec<String>,
}

/// Body of `/readyz`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessResponse {
    pub ready: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Default)]
struct RegistryState {
    components: BTreeMap<Component, ComponentHealth>,
    lagging: BTreeSet<String>,
    ready: bool,
}

impl RegistryState {
    /// Move a component to `status`; `since` only changes on a transition
    fn transition(&mut self, component: Component, status: ComponentStatus, reason: Option<String>) {
        let now = Utc::now();
        let entry = self.components.entry(component).or_insert(ComponentHealth {
            status,
            reason: None,
            since: now,
        });
        if entry.status != status {
            entry.since = now;
        }
        entry.status = status;
        entry.reason = reason;
    }
}

/// Shared health state of the agent
#[derive(Debug, Clone, Default)]
pub struct HealthRegistry {
    state: Arc<RwLock<RegistryState>>,
}

impl HealthRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a component, starting healthy
    pub async fn register(&self, component: Component) {
        self.register_all(&[component]).await;
    }

    pub async fn register_all(&self, components: &[Component]) {
        let mut state = self.state.write().await;
        for component in components {
            state.transition(*component, ComponentStatus::Healthy, None);
        }
    }

    /// Current status of one component, `None` if it is not tracked
    pub async fn status_of(&self, component: Component) -> Option<ComponentStatus> {
        self.state.read().await.components.get(&component).map(|h| h.status)
    }

    pub async fn set_healthy(&self, component: Component) {
        self.state
            .write()
            .await
            .transition(component, ComponentStatus::Healthy, None);
    }

    pub async fn set_degraded(&self, component: Component, reason: impl Into<String>) {
        self.state
            .write()
            .await
            .transition(component, ComponentStatus::Degraded, Some(reason.into()));
    }

    pub async fn set_unhealthy(&self, component: Component, reason: impl Into<String>) {
        self.state
            .write()
            .await
            .transition(component, ComponentStatus::Unhealthy, Some(reason.into()));
    }

    /// Record the models skipped on a tick
    ///
    /// A non-empty set degrades the monitor loop; an empty one restores it
    /// unless something else made it unhealthy.
    pub async fn report_lagging(&self, models: &[String]) {
        let mut state = self.state.write().await;
        state.lagging = models.iter().cloned().collect();

        if state.lagging.is_empty() {
            let degraded = state
                .components
                .get(&Component::MonitorLoop)
                .is_some_and(|h| h.status == ComponentStatus::Degraded);
            if degraded {
                state.transition(Component::MonitorLoop, ComponentStatus::Healthy, None);
            }
        } else {
            let reason = format!(
                "evaluation falling behind for {}",
                state.lagging.iter().cloned().collect::<Vec<_>>().join(", ")
            );
            state.transition(Component::MonitorLoop, ComponentStatus::Degraded, Some(reason));
        }
    }

    /// Models skipped on the last tick, sorted
    pub async fn lagging_models(&self) -> Vec<String> {
        self.state.read().await.lagging.iter().cloned().collect()
    }

    /// Mark the agent initialised (or shutting down)
    pub async fn set_ready(&self, ready: bool) {
        self.state.write().await.ready = ready;
    }

    pub async fn health(&self) -> HealthResponse {
        let state = self.state.read().await;
        let status = state
            .components
            .values()
            .map(|h| h.status)
            .max()
            .unwrap_or(ComponentStatus::Healthy);

        HealthResponse {
            status,
            components: state
                .components
                .iter()
                .map(|(component, health)| (component.as_str().to_string(), health.clone()))
                .collect(),
            lagging_models: state.lagging.iter().cloned().collect(),
        }
    }

    /// Ready once initialised and while no component is unhealthy
    pub async fn readiness(&self) -> ReadinessResponse {
        let state = self.state.read().await;
        if !state.ready {
            return ReadinessResponse {
                ready: false,
                reason: Some("agent not initialised".to_string()),
            };
        }

        let failed = state
            .components
            .iter()
            .find(|(_, h)| h.status == ComponentStatus::Unhealthy);
        match failed {
            Some((component, health)) => ReadinessResponse {
                ready: false,
                reason: Some(match &health.reason {
                    Some(reason) => format!("{} unhealthy: {}", component, reason),
                    None => format!("{} unhealthy", component),
                }),
            },
            None => ReadinessResponse {
                ready: true,
                reason: None,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_empty_registry_is_healthy_but_not_ready() {
        let registry = HealthRegistry::new();
        let health = registry.health().await;

        assert_eq!(health.status, ComponentStatus::Healthy);
        assert!(health.components.is_empty());
        assert!(!registry.readiness().await.ready);
        assert_eq!(registry.status_of(Component::Api).await, None);
    }

    #[tokio::test]
    async fn test_lagging_models_degrade_monitor_loop() {
        let registry = HealthRegistry::new();
        registry.register_all(&Component::ALL).await;
        registry.set_ready(true).await;

        registry
            .report_lagging(&["model-b".to_string(), "model-a".to_string()])
            .await;

        let health = registry.health().await;
        assert_eq!(health.status, ComponentStatus::Degraded);
        assert_eq!(health.lagging_models, vec!["model-a", "model-b"]);
        let monitor_loop = &health.components["monitor_loop"];
        assert_eq!(
            monitor_loop.reason.as_deref(),
            Some("evaluation falling behind for model-a, model-b")
        );
        // Degraded is still ready
        assert!(registry.readiness().await.ready);

        registry.report_lagging(&[]).await;
        assert_eq!(registry.health().await.status, ComponentStatus::Healthy);
        assert!(registry.lagging_models().await.is_empty());
    }

    #[tokio::test]
    async fn test_caught_up_does_not_mask_failure() {
        let registry = HealthRegistry::new();
        registry.register(Component::MonitorLoop).await;
        registry
            .set_unhealthy(Component::MonitorLoop, "scheduler exited")
            .await;

        registry.report_lagging(&[]).await;
        assert_eq!(
            registry.status_of(Component::MonitorLoop).await,
            Some(ComponentStatus::Unhealthy)
        );
    }

    #[tokio::test]
    async fn test_since_only_moves_on_transition() {
        let registry = HealthRegistry::new();
        registry.register(Component::Collector).await;
        registry
            .set_degraded(Component::Collector, "all metric sources failing")
            .await;
        let first = registry.health().await.components["collector"].since;

        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        registry
            .set_degraded(Component::Collector, "all metric sources failing")
            .await;
        assert_eq!(registry.health().await.components["collector"].since, first);

        registry.set_healthy(Component::Collector).await;
        assert!(registry.health().await.components["collector"].since >= first);
    }

    #[tokio::test]
    async fn test_unhealthy_component_blocks_readiness() {
        let registry = HealthRegistry::new();
        registry.register_all(&[Component::Api, Component::Collector]).await;
        registry.set_ready(true).await;

        registry.set_unhealthy(Component::Api, "listener closed").await;

        let health = registry.health().await;
        assert_eq!(health.status, ComponentStatus::Unhealthy);
        assert!(!health.status.is_operational());

        let readiness = registry.readiness().await;
        assert!(!readiness.ready);
        assert_eq!(readiness.reason.as_deref(), Some("api unhealthy: listener closed"));
    }

    #[test]
    fn test_wire_names() {
        assert_eq!(serde_json::to_string(&Component::MonitorLoop).unwrap(), "\"monitor_loop\"");
        assert_eq!(serde_json::to_string(&ComponentStatus::Degraded).unwrap(), "\"degraded\"");
        assert!(ComponentStatus::Degraded < ComponentStatus::Unhealthy);
    }
}
