//! API client for communicating with the driftwatch agent

use anyhow::{Context, Result};
use reqwest::{Client, RequestBuilder};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::HashMap;
use url::Url;

/// API client for the driftwatch agent
pub struct ApiClient {
    client: Client,
    base_url: Url,
}

impl ApiClient {
    /// Create a new API client
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        let base_url = Url::parse(base_url).context("Invalid API URL")?;

        Ok(Self { client, base_url })
    }

    fn url(&self, path: &str) -> Result<Url> {
        self.base_url.join(path).context("Invalid path")
    }

    /// Make a GET request
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let request = self.client.get(self.url(path)?);
        Self::send(request).await
    }

    /// Make a POST request with JSON body
    pub async fn post<T: DeserializeOwned, B: Serialize>(&self, path: &str, body: &B) -> Result<T> {
        let request = self.client.post(self.url(path)?).json(body);
        Self::send(request).await
    }

    /// Make a DELETE request
    pub async fn delete<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let request = self.client.delete(self.url(path)?);
        Self::send(request).await
    }

    async fn send<T: DeserializeOwned>(request: RequestBuilder) -> Result<T> {
        let response = request.send().await.context("Failed to send request")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorResponse>(&body)
                .map(|e| e.error)
                .unwrap_or(body);
            anyhow::bail!("API error ({}): {}", status, message);
        }

        response.json().await.context("Failed to parse response")
    }
}

// API response types

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelStatus {
    pub model_id: String,
    pub timestamp: String,
    pub metrics: HashMap<String, f64>,
    pub active_alert_count: usize,
    pub last_drift_check: Option<String>,
    pub drift_detected: bool,
    pub monitoring_active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelHealth {
    pub model_id: String,
    pub health_score: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelList {
    pub models: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MonitoringRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub drift_threshold: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub check_interval_secs: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub algorithm: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    pub drift_threshold: f64,
    pub check_interval_secs: i64,
    pub algorithm: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitoringResponse {
    pub model_id: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config: Option<ModelConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DriftCheckRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feature: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub algorithm: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriftResult {
    pub feature: String,
    pub algorithm: String,
    pub drift_score: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub p_value: Option<f64>,
    pub is_drift: bool,
    pub threshold: f64,
    pub reference_stats: SampleStats,
    pub current_stats: SampleStats,
    pub effect_size: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SampleStats {
    pub mean: f64,
    pub std: f64,
    pub n: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriftCheckResponse {
    pub model_id: String,
    pub drift_detected: bool,
    pub results: Vec<DriftResult>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThresholdBreach {
    pub feature: String,
    pub value: f64,
    pub threshold: f64,
    pub n: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub model_id: String,
    #[serde(default = "drift_kind")]
    pub kind: String,
    pub feature: String,
    pub severity: String,
    pub message: String,
    pub recommendation: String,
    pub created_at: String,
    #[serde(default)]
    pub drift_result: Option<DriftResult>,
    #[serde(default)]
    pub breach: Option<ThresholdBreach>,
}

fn drift_kind() -> String {
    "drift".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureSummary {
    pub mean: f64,
    pub std: f64,
    pub trend: f64,
    pub n: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitoringReport {
    pub model_id: String,
    pub period_hours: i64,
    pub total_points: usize,
    pub performance_summary: HashMap<String, FeatureSummary>,
    pub alerts: Vec<Alert>,
    pub health_score: f64,
    pub recommendations: Vec<String>,
    pub generated_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}
