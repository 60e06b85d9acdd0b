//! HTTP API for drift monitoring, health checks and Prometheus metrics

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Duration, Utc};
use monitor_lib::{
    collector::PushSource,
    health::HealthRegistry,
    Algorithm, DriftError, MetricPoint, ModelConfig, MonitorAck, MonitorService,
};
use prometheus::{Encoder, TextEncoder};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub health_registry: HealthRegistry,
    pub service: Arc<MonitorService>,
    /// Buffered ingest path, drained by the collection loop
    pub push: Arc<PushSource>,
}

impl AppState {
    pub fn new(
        health_registry: HealthRegistry,
        service: Arc<MonitorService>,
        push: Arc<PushSource>,
    ) -> Self {
        Self {
            health_registry,
            service,
            push,
        }
    }
}

/// Error returned by API handlers as `{"error": ...}`
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
        }
    }
}

impl From<DriftError> for ApiError {
    fn from(e: DriftError) -> Self {
        let status = match e {
            DriftError::InvalidAlgorithm(_) => StatusCode::BAD_REQUEST,
            DriftError::InsufficientData { .. } | DriftError::NotReady { .. } => {
                StatusCode::CONFLICT
            }
            DriftError::ComputationFailure { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        };
        Self {
            status,
            message: e.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(serde_json::json!({ "error": self.message })),
        )
            .into_response()
    }
}

/// Wire form of a model's monitoring configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfigBody {
    pub drift_threshold: f64,
    pub check_interval_secs: i64,
    pub algorithm: Algorithm,
}

impl From<&ModelConfig> for ModelConfigBody {
    fn from(config: &ModelConfig) -> Self {
        Self {
            drift_threshold: config.drift_threshold,
            check_interval_secs: config.check_interval.num_seconds(),
            algorithm: config.algorithm,
        }
    }
}

/// Partial configuration; missing fields keep their current or default value
#[derive(Debug, Default, Deserialize)]
pub struct MonitoringRequest {
    pub drift_threshold: Option<f64>,
    pub check_interval_secs: Option<i64>,
    pub algorithm: Option<String>,
}

impl MonitoringRequest {
    fn into_config(self, defaults: ModelConfig) -> Result<ModelConfig, ApiError> {
        let mut config = defaults;
        if let Some(threshold) = self.drift_threshold {
            if !(threshold > 0.0 && threshold < 1.0) {
                return Err(ApiError::bad_request(format!(
                    "drift_threshold must be in (0, 1), got {}",
                    threshold
                )));
            }
            config.drift_threshold = threshold;
        }
        if let Some(secs) = self.check_interval_secs {
            if secs <= 0 {
                return Err(ApiError::bad_request("check_interval_secs must be positive"));
            }
            config.check_interval = Duration::seconds(secs);
        }
        if let Some(name) = self.algorithm {
            config.algorithm = name.parse::<Algorithm>()?;
        }
        Ok(config)
    }
}

#[derive(Debug, Serialize)]
struct MonitoringResponse {
    model_id: String,
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    config: Option<ModelConfigBody>,
}

#[derive(Debug, Deserialize)]
pub struct IngestRequest {
    pub points: Vec<MetricPoint>,
}

/// One value on the buffered path; the model comes from the URL
#[derive(Debug, Deserialize)]
pub struct QueuedValue {
    pub feature: String,
    pub value: f64,
    pub timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
pub struct QueueRequest {
    pub points: Vec<QueuedValue>,
}

#[derive(Debug, Default, Deserialize)]
pub struct DriftCheckRequest {
    pub feature: Option<String>,
    pub algorithm: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ReportQuery {
    #[serde(default = "default_report_hours")]
    pub hours: i64,
}

fn default_report_hours() -> i64 {
    24
}

/// 503 only once a component is unhealthy; lagging models keep it at 200
async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.health_registry.health().await;

    let status_code = if health.status.is_operational() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(health))
}

/// 200 once initialised with no unhealthy component
async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let readiness = state.health_registry.readiness().await;

    let status_code = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(readiness))
}

/// Prometheus metrics endpoint
async fn metrics() -> Response {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        warn!(error = %e, "Failed to encode metrics");
        return (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response();
    }

    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        buffer,
    )
        .into_response()
}

/// Ingest a batch of points immediately
async fn ingest(
    State(state): State<Arc<AppState>>,
    Json(request): Json<IngestRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if let Some(bad) = request
        .points
        .iter()
        .find(|p| p.model_id.is_empty() || p.feature.is_empty())
    {
        return Err(ApiError::bad_request(format!(
            "point at {} has an empty model_id or feature",
            bad.timestamp
        )));
    }

    for point in &request.points {
        state
            .service
            .ingest(&point.model_id, &point.feature, point.value, point.timestamp);
    }

    Ok(Json(serde_json::json!({ "accepted": request.points.len() })))
}

/// Queue points for the next collection cycle
async fn queue_metrics(
    State(state): State<Arc<AppState>>,
    Path(model_id): Path<String>,
    Json(request): Json<QueueRequest>,
) -> Result<impl IntoResponse, ApiError> {
    // Queues are only drained for monitored models
    if !state.service.is_monitored(&model_id).await {
        return Err(ApiError::not_found(format!("model {} is not monitored", model_id)));
    }

    let now = Utc::now();
    let count = request.points.len();
    state.push.push_batch(request.points.into_iter().map(|p| {
        MetricPoint::new(&model_id, p.feature, p.value, p.timestamp.unwrap_or(now))
    }));

    let pending = state.push.pending(&model_id);

    Ok((
        StatusCode::ACCEPTED,
        Json(serde_json::json!({
            "model_id": model_id,
            "queued": count,
            "pending": pending,
        })),
    ))
}

async fn list_models(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(serde_json::json!({ "models": state.service.monitored_models().await }))
}

async fn start_monitoring(
    State(state): State<Arc<AppState>>,
    Path(model_id): Path<String>,
    body: Option<Json<MonitoringRequest>>,
) -> Result<impl IntoResponse, ApiError> {
    let request = body.map(|Json(r)| r).unwrap_or_default();
    let config = request.into_config(state.service.default_model_config())?;

    let response = match state.service.start_monitoring(&model_id, config.clone()).await {
        MonitorAck::AlreadyActive { config } => (
            StatusCode::OK,
            MonitoringResponse {
                model_id,
                status: "already_active",
                config: Some((&config).into()),
            },
        ),
        _ => {
            info!(model_id = %model_id, "Monitoring started via API");
            (
                StatusCode::CREATED,
                MonitoringResponse {
                    model_id,
                    status: "started",
                    config: Some((&config).into()),
                },
            )
        }
    };

    Ok((response.0, Json(response.1)))
}

async fn update_monitoring(
    State(state): State<Arc<AppState>>,
    Path(model_id): Path<String>,
    Json(request): Json<MonitoringRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let current = state
        .service
        .monitoring_config(&model_id)
        .await
        .ok_or_else(|| ApiError::not_found(format!("model {} is not monitored", model_id)))?;

    let config = request.into_config(current)?;
    match state.service.update_config(&model_id, config.clone()).await {
        MonitorAck::Updated => Ok(Json(MonitoringResponse {
            model_id,
            status: "updated",
            config: Some((&config).into()),
        })),
        _ => Err(ApiError::not_found(format!("model {} is not monitored", model_id))),
    }
}

async fn stop_monitoring(
    State(state): State<Arc<AppState>>,
    Path(model_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    match state.service.stop_monitoring(&model_id).await {
        MonitorAck::Stopped => {
            let dropped = state.push.discard(&model_id);
            if dropped > 0 {
                debug!(model_id = %model_id, dropped = dropped, "Discarded queued points");
            }
            Ok(Json(MonitoringResponse {
            model_id,
                status: "stopped",
                config: None,
            }))
        }
        _ => Err(ApiError::not_found(format!("model {} is not monitored", model_id))),
    }
}

async fn model_status(
    State(state): State<Arc<AppState>>,
    Path(model_id): Path<String>,
) -> impl IntoResponse {
    Json(state.service.get_status(&model_id).await)
}

async fn model_health(
    State(state): State<Arc<AppState>>,
    Path(model_id): Path<String>,
) -> impl IntoResponse {
    let score = state.service.get_health_score(&model_id).await;
    Json(serde_json::json!({ "model_id": model_id, "health_score": score }))
}

async fn drift_check(
    State(state): State<Arc<AppState>>,
    Path(model_id): Path<String>,
    body: Option<Json<DriftCheckRequest>>,
) -> Result<impl IntoResponse, ApiError> {
    let request = body.map(|Json(r)| r).unwrap_or_default();
    let feature = request.feature.as_deref();

    let results = match request.algorithm.as_deref() {
        Some(algorithm) => {
            state
                .service
                .manual_drift_check_with(&model_id, feature, algorithm)
                .await?
        }
        None => state.service.manual_drift_check(&model_id, feature).await?,
    };

    Ok(Json(serde_json::json!({
        "model_id": model_id,
        "drift_detected": results.iter().any(|r| r.is_drift),
        "results": results,
    })))
}

async fn model_alerts(
    State(state): State<Arc<AppState>>,
    Path(model_id): Path<String>,
) -> impl IntoResponse {
    Json(state.service.active_alerts(&model_id).await)
}

async fn model_report(
    State(state): State<Arc<AppState>>,
    Path(model_id): Path<String>,
    Query(query): Query<ReportQuery>,
) -> Result<impl IntoResponse, ApiError> {
    if query.hours <= 0 {
        return Err(ApiError::bad_request("hours must be positive"));
    }
    let report = state
        .service
        .generate_report(&model_id, Duration::hours(query.hours))
        .await;
    Ok(Json(report))
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .route("/api/v1/ingest", post(ingest))
        .route("/api/v1/models", get(list_models))
        .route(
            "/api/v1/models/:model_id/monitoring",
            post(start_monitoring)
                .put(update_monitoring)
                .delete(stop_monitoring),
        )
        .route("/api/v1/models/:model_id/metrics", post(queue_metrics))
        .route("/api/v1/models/:model_id/status", get(model_status))
        .route("/api/v1/models/:model_id/health", get(model_health))
        .route("/api/v1/models/:model_id/drift-check", post(drift_check))
        .route("/api/v1/models/:model_id/alerts", get(model_alerts))
        .route("/api/v1/models/:model_id/report", get(model_report))
        .with_state(state)
}

/// Start the API server
pub async fn serve(port: u16, state: Arc<AppState>) -> anyhow::Result<()> {
    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", port);
    info!(addr = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{Method, Request};
    use monitor_lib::{health::Component, BaselineConfig, MonitorConfig};
    use serde_json::Value;
    use tower::ServiceExt;

    fn test_state() -> Arc<AppState> {
        let registry = HealthRegistry::new();
        let config = MonitorConfig::default()
            .with_tick_interval(std::time::Duration::from_secs(3600))
            .with_baseline(BaselineConfig::default().with_min_span(Duration::zero()));
        let (service, _events) = MonitorService::new(config, registry.clone());
        Arc::new(AppState::new(registry, service, Arc::new(PushSource::new("api"))))
    }

    async fn send(state: &Arc<AppState>, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(json) => {
                builder = builder.header("content-type", "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };

        let response = create_router(state.clone())
            .oneshot(builder.body(body).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, json)
    }

    fn accuracy_points(model_id: &str, n: usize, value: impl Fn(usize) -> f64) -> Value {
        let start = Utc::now() - Duration::minutes(n as i64 + 1);
        let points: Vec<Value> = (0..n)
            .map(|i| {
                serde_json::json!({
                    "model_id": model_id,
                    "feature": "accuracy",
                    "value": value(i),
                    "timestamp": start + Duration::minutes(i as i64),
                })
            })
            .collect();
        serde_json::json!({ "points": points })
    }

    #[tokio::test]
    async fn test_healthz_degraded_still_ok() {
        let state = test_state();
        state.health_registry.register(Component::Collector).await;
        state
            .health_registry
            .set_degraded(Component::Collector, "all metric sources failing")
            .await;

        let (status, body) = send(&state, Method::GET, "/healthz", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "degraded");
        assert!(body.get("lagging_models").is_none());
    }

    #[tokio::test]
    async fn test_healthz_lists_lagging_models() {
        let state = test_state();
        state.health_registry.register_all(&Component::ALL).await;
        state
            .health_registry
            .report_lagging(&["fraud-v2".to_string()])
            .await;

        let (status, body) = send(&state, Method::GET, "/healthz", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["lagging_models"], serde_json::json!(["fraud-v2"]));
        assert_eq!(body["components"]["monitor_loop"]["status"], "degraded");

        state
            .health_registry
            .set_unhealthy(Component::Api, "listener closed")
            .await;
        let (status, _) = send(&state, Method::GET, "/healthz", None).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_readyz_follows_ready_flag() {
        let state = test_state();

        let (status, _) = send(&state, Method::GET, "/readyz", None).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

        state.health_registry.set_ready(true).await;
        let (status, body) = send(&state, Method::GET, "/readyz", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["ready"], true);
    }

    #[tokio::test]
    async fn test_metrics_endpoint_exposes_monitor_metrics() {
        let state = test_state();
        state.service.ingest("m", "accuracy", 0.9, Utc::now());

        let response = create_router(state)
            .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let text = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(text.contains("driftwatch_points_ingested_total"));
    }

    #[tokio::test]
    async fn test_monitoring_lifecycle() {
        let state = test_state();
        let uri = "/api/v1/models/fraud-v2/monitoring";

        let (status, body) = send(
            &state,
            Method::POST,
            uri,
            Some(serde_json::json!({ "drift_threshold": 0.01, "algorithm": "psi" })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["status"], "started");
        assert_eq!(body["config"]["algorithm"], "psi");
        assert_eq!(body["config"]["check_interval_secs"], 900);

        let (status, body) = send(&state, Method::POST, uri, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "already_active");
        assert_eq!(body["config"]["drift_threshold"], 0.01);

        let (status, body) = send(
            &state,
            Method::PUT,
            uri,
            Some(serde_json::json!({ "check_interval_secs": 60 })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["config"]["check_interval_secs"], 60);

        let (_, body) = send(&state, Method::GET, "/api/v1/models", None).await;
        assert_eq!(body["models"], serde_json::json!(["fraud-v2"]));

        let (status, _) = send(&state, Method::DELETE, uri, None).await;
        assert_eq!(status, StatusCode::OK);
        let (status, body) = send(&state, Method::DELETE, uri, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body["error"].as_str().unwrap().contains("fraud-v2"));
    }

    #[tokio::test]
    async fn test_invalid_monitoring_config_is_rejected() {
        let state = test_state();
        let uri = "/api/v1/models/m/monitoring";

        let (status, _) = send(
            &state,
            Method::POST,
            uri,
            Some(serde_json::json!({ "algorithm": "wasserstein" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(
            &state,
            Method::POST,
            uri,
            Some(serde_json::json!({ "drift_threshold": 1.5 })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(!state.service.is_monitored("m").await);

        let (status, _) = send(&state, Method::PUT, uri, Some(serde_json::json!({}))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_ingest_then_status() {
        let state = test_state();
        let (status, body) = send(
            &state,
            Method::POST,
            "/api/v1/ingest",
            Some(accuracy_points("m", 4, |_| 0.9)),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["accepted"], 4);

        let (status, body) = send(&state, Method::GET, "/api/v1/models/m/status", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["monitoring_active"], false);
        assert!((body["metrics"]["accuracy"].as_f64().unwrap() - 0.9).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_ingest_rejects_empty_identifiers() {
        let state = test_state();
        let (status, _) = send(
            &state,
            Method::POST,
            "/api/v1/ingest",
            Some(accuracy_points("", 2, |_| 0.9)),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_queued_metrics_wait_for_collection() {
        let state = test_state();
        let queue = || {
            Some(serde_json::json!({
                "points": [
                    { "feature": "latency_ms", "value": 120.0 },
                    { "feature": "latency_ms", "value": 130.0 },
                ]
            }))
        };

        // Nothing would ever drain a queue for an unmonitored model
        let (status, body) = send(&state, Method::POST, "/api/v1/models/m/metrics", queue()).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body["error"].is_string());
        assert_eq!(state.push.pending("m"), 0);

        send(&state, Method::POST, "/api/v1/models/m/monitoring", None).await;
        let (status, body) = send(&state, Method::POST, "/api/v1/models/m/metrics", queue()).await;
        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(body["queued"], 2);
        assert_eq!(state.push.pending("m"), 2);
        assert_eq!(state.service.baseline().len("m", "latency_ms"), 0);

        // Stopping drops whatever is still queued
        let (status, _) = send(&state, Method::DELETE, "/api/v1/models/m/monitoring", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(state.push.pending("m"), 0);
    }

    #[tokio::test]
    async fn test_drift_check_endpoint() {
        let state = test_state();
        // Stable baseline followed by a sharp drop
        send(
            &state,
            Method::POST,
            "/api/v1/ingest",
            Some(accuracy_points("m", 200, |i| if i < 150 { 0.92 + (i % 5) as f64 * 0.002 } else { 0.70 + (i % 5) as f64 * 0.002 })),
        )
        .await;

        let (status, body) = send(
            &state,
            Method::POST,
            "/api/v1/models/m/drift-check",
            Some(serde_json::json!({ "feature": "accuracy" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["drift_detected"], true);
        assert_eq!(body["results"][0]["algorithm"], "ks_test");
        assert_eq!(body["results"][0]["reference_stats"]["n"], 150);
        assert_eq!(body["results"][0]["current_stats"]["n"], 50);

        let (status, body) = send(
            &state,
            Method::POST,
            "/api/v1/models/m/drift-check",
            Some(serde_json::json!({ "algorithm": "wasserstein" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].is_string());
    }

    #[tokio::test]
    async fn test_drift_check_without_data_is_empty() {
        let state = test_state();
        let (status, body) = send(&state, Method::POST, "/api/v1/models/unknown/drift-check", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["results"], serde_json::json!([]));
        assert_eq!(body["drift_detected"], false);
    }

    #[tokio::test]
    async fn test_health_alerts_and_report() {
        let state = test_state();

        let (_, body) = send(&state, Method::GET, "/api/v1/models/m/health", None).await;
        assert_eq!(body["health_score"], 50.0);

        let (status, body) = send(&state, Method::GET, "/api/v1/models/m/alerts", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, serde_json::json!([]));

        send(
            &state,
            Method::POST,
            "/api/v1/ingest",
            Some(accuracy_points("m", 30, |_| 0.9)),
        )
        .await;
        let (status, body) = send(&state, Method::GET, "/api/v1/models/m/report?hours=2", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["model_id"], "m");
        assert_eq!(body["period_hours"], 2);
        assert_eq!(body["total_points"], 30);

        let (status, _) = send(&state, Method::GET, "/api/v1/models/m/report?hours=0", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
