//! Model lifecycle and status commands

use anyhow::Result;
use colored::Colorize;
use tabled::Tabled;

use super::model_path;
use crate::client::{
    ApiClient, ModelHealth, ModelList, ModelStatus, MonitoringRequest, MonitoringResponse,
};
use crate::output::{
    color_flag, color_health, format_timestamp, print_heading, print_info, print_json, print_rows,
    print_success, print_warning, OutputFormat,
};

/// Row for the per-feature metrics table
#[derive(Tabled)]
struct MetricRow {
    #[tabled(rename = "Feature")]
    feature: String,
    #[tabled(rename = "Recent Mean")]
    mean: String,
}

#[derive(Tabled)]
struct ModelRow {
    #[tabled(rename = "Model")]
    model_id: String,
}

/// List monitored models
pub async fn list_models(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let result: ModelList = client.get("api/v1/models").await?;

    match format {
        OutputFormat::Json => print_json(&result)?,
        OutputFormat::Table => {
            let rows = result
                .models
                .into_iter()
                .map(|model_id| ModelRow { model_id })
                .collect();
            print_rows(rows, "No models are monitored");
        }
    }

    Ok(())
}

/// Show the status of one model
pub async fn show_status(client: &ApiClient, model_id: &str, format: OutputFormat) -> Result<()> {
    let status: ModelStatus = client.get(&model_path(model_id, "status")).await?;

    match format {
        OutputFormat::Json => print_json(&status)?,
        OutputFormat::Table => {
            print_heading(&format!("Model {}", status.model_id));
            let monitoring = if status.monitoring_active {
                "active".green()
            } else {
                "inactive".dimmed()
            };
            println!("Monitoring:             {}", monitoring);
            println!("Drift detected:         {}", color_flag(status.drift_detected));
            println!("Active alerts:          {}", status.active_alert_count);
            println!(
                "Last drift check:       {}",
                status
                    .last_drift_check
                    .as_deref()
                    .map(format_timestamp)
                    .unwrap_or_else(|| "never".to_string())
            );
            println!();

            let mut rows: Vec<MetricRow> = status
                .metrics
                .iter()
                .map(|(feature, mean)| MetricRow {
                    feature: feature.clone(),
                    mean: format!("{:.4}", mean),
                })
                .collect();
            rows.sort_by(|a, b| a.feature.cmp(&b.feature));
            print_rows(rows, "No recent metrics");
        }
    }

    Ok(())
}

/// Show the health score of one model
pub async fn show_health(client: &ApiClient, model_id: &str, format: OutputFormat) -> Result<()> {
    let health: ModelHealth = client.get(&model_path(model_id, "health")).await?;

    match format {
        OutputFormat::Json => print_json(&health)?,
        OutputFormat::Table => {
            println!(
                "{} {} / 100",
                format!("Health of {}:", health.model_id).bold(),
                color_health(health.health_score)
            );
        }
    }

    Ok(())
}

/// Start monitoring a model
pub async fn start_monitoring(
    client: &ApiClient,
    model_id: &str,
    request: MonitoringRequest,
    format: OutputFormat,
) -> Result<()> {
    let response: MonitoringResponse = client
        .post(&model_path(model_id, "monitoring"), &request)
        .await?;

    match format {
        OutputFormat::Json => print_json(&response)?,
        OutputFormat::Table => {
            if response.status == "already_active" {
                print_warning(&format!(
                    "{} is already monitored; configuration unchanged",
                    response.model_id
                ));
            } else {
                print_success(&format!("Monitoring started for {}", response.model_id));
            }
            if let Some(config) = &response.config {
                print_info(&format!(
                    "algorithm={} threshold={} check_interval={}s",
                    config.algorithm, config.drift_threshold, config.check_interval_secs
                ));
            }
        }
    }

    Ok(())
}

/// Stop monitoring a model
pub async fn stop_monitoring(client: &ApiClient, model_id: &str, format: OutputFormat) -> Result<()> {
    let response: MonitoringResponse = client.delete(&model_path(model_id, "monitoring")).await?;

    match format {
        OutputFormat::Json => print_json(&response)?,
        OutputFormat::Table => {
            print_success(&format!("Monitoring stopped for {}", response.model_id));
        }
    }

    Ok(())
}
