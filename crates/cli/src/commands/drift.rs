//! Drift check, alert and report commands

use anyhow::Result;
use colored::Colorize;
use tabled::Tabled;

use super::model_path;
use crate::client::{Alert, ApiClient, DriftCheckRequest, DriftCheckResponse, MonitoringReport};
use crate::output::{
    color_flag, color_health, color_severity, format_p_value, format_timestamp, print_heading,
    print_info, print_json, print_rows, OutputFormat,
};

/// Row for drift check results
#[derive(Tabled)]
struct DriftRow {
    #[tabled(rename = "Feature")]
    feature: String,
    #[tabled(rename = "Algorithm")]
    algorithm: String,
    #[tabled(rename = "Score")]
    score: String,
    #[tabled(rename = "p-value")]
    p_value: String,
    #[tabled(rename = "Effect")]
    effect_size: String,
    #[tabled(rename = "Ref Mean")]
    reference_mean: String,
    #[tabled(rename = "Cur Mean")]
    current_mean: String,
    #[tabled(rename = "Drift")]
    drift: String,
}

/// Row for alert listings
#[derive(Tabled)]
struct AlertRow {
    #[tabled(rename = "Time")]
    created_at: String,
    #[tabled(rename = "Kind")]
    kind: String,
    #[tabled(rename = "Feature")]
    feature: String,
    #[tabled(rename = "Severity")]
    severity: String,
    #[tabled(rename = "Recommendation")]
    recommendation: String,
}

/// Row for per-feature report summaries
#[derive(Tabled)]
struct SummaryRow {
    #[tabled(rename = "Feature")]
    feature: String,
    #[tabled(rename = "Mean")]
    mean: String,
    #[tabled(rename = "Std")]
    std: String,
    #[tabled(rename = "Trend")]
    trend: String,
    #[tabled(rename = "Points")]
    n: usize,
}

fn alert_rows(alerts: &[Alert]) -> Vec<AlertRow> {
    alerts
        .iter()
        .map(|a| AlertRow {
            created_at: format_timestamp(&a.created_at),
            kind: a.kind.clone(),
            feature: a.feature.clone(),
            severity: color_severity(&a.severity),
            recommendation: a.recommendation.clone(),
        })
        .collect()
}

/// Run a drift check now
pub async fn run_check(
    client: &ApiClient,
    model_id: &str,
    request: DriftCheckRequest,
    format: OutputFormat,
) -> Result<()> {
    let response: DriftCheckResponse = client
        .post(&model_path(model_id, "drift-check"), &request)
        .await?;

    match format {
        OutputFormat::Json => print_json(&response)?,
        OutputFormat::Table => {
            print_heading(&format!("Drift check for {}", response.model_id));
            let rows = response
                .results
                .iter()
                .map(|r| DriftRow {
                    feature: r.feature.clone(),
                    algorithm: r.algorithm.clone(),
                    score: format!("{:.4}", r.drift_score),
                    p_value: format_p_value(r.p_value),
                    effect_size: format!("{:.2}", r.effect_size),
                    reference_mean: format!("{:.4}", r.reference_stats.mean),
                    current_mean: format!("{:.4}", r.current_stats.mean),
                    drift: color_flag(r.is_drift),
                })
                .collect();
            print_rows(rows, "No features had enough data to evaluate");
            println!();
            println!("Drift detected: {}", color_flag(response.drift_detected));
        }
    }

    Ok(())
}

/// List active alerts
pub async fn show_alerts(client: &ApiClient, model_id: &str, format: OutputFormat) -> Result<()> {
    let alerts: Vec<Alert> = client.get(&model_path(model_id, "alerts")).await?;

    match format {
        OutputFormat::Json => print_json(&alerts)?,
        OutputFormat::Table => print_rows(alert_rows(&alerts), "No active alerts"),
    }

    Ok(())
}

/// Show a monitoring report
pub async fn show_report(
    client: &ApiClient,
    model_id: &str,
    hours: i64,
    format: OutputFormat,
) -> Result<()> {
    let path = format!("{}?hours={}", model_path(model_id, "report"), hours);
    let report: MonitoringReport = client.get(&path).await?;

    match format {
        OutputFormat::Json => print_json(&report)?,
        OutputFormat::Table => {
            print_heading(&format!("Monitoring report for {}", report.model_id));
            println!("Period:                 last {}h", report.period_hours);
            println!("Points:                 {}", report.total_points);
            println!("Health score:           {}", color_health(report.health_score));
            println!(
                "Generated:              {}",
                format_timestamp(&report.generated_at).dimmed()
            );
            println!();

            println!("{}", "Performance".bold());
            let mut rows: Vec<SummaryRow> = report
                .performance_summary
                .iter()
                .map(|(feature, s)| SummaryRow {
                    feature: feature.clone(),
                    mean: format!("{:.4}", s.mean),
                    std: format!("{:.4}", s.std),
                    trend: format!("{:+.2}", s.trend),
                    n: s.n,
                })
                .collect();
            rows.sort_by(|a, b| a.feature.cmp(&b.feature));
            print_rows(rows, "No data in period");
            println!();

            println!("{}", "Alerts".bold());
            print_rows(alert_rows(&report.alerts), "No alerts in period");
            println!();

            println!("{}", "Recommendations".bold());
            for recommendation in &report.recommendations {
                print_info(recommendation);
            }
        }
    }

    Ok(())
}
