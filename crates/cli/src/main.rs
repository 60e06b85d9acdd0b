//! Driftwatch CLI
//!
//! A command-line tool for starting and stopping model monitoring, running
//! drift checks and viewing alerts, health scores and reports.

mod client;
mod commands;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use client::{DriftCheckRequest, MonitoringRequest};
use commands::{drift, models};

/// Driftwatch CLI
#[derive(Parser)]
#[command(name = "driftctl")]
#[command(author, version, about = "CLI for the Driftwatch model drift monitor", long_about = None)]
pub struct Cli {
    /// API endpoint URL (can also be set via DRIFTWATCH_API_URL env var)
    #[arg(long, env = "DRIFTWATCH_API_URL", default_value = "http://localhost:8080")]
    pub api_url: String,

    /// Output format
    #[arg(long, short, default_value = "table")]
    pub format: output::OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List monitored models
    List,

    /// Show a model's status and recent metric averages
    Status {
        /// Model identifier
        model_id: String,
    },

    /// Show a model's 0-100 health score
    Health {
        /// Model identifier
        model_id: String,
    },

    /// Run a drift check now
    Check {
        /// Model identifier
        model_id: String,

        /// Check only this feature
        #[arg(long)]
        feature: Option<String>,

        /// Drift algorithm (ks_test or psi); defaults to the model's
        #[arg(long)]
        algorithm: Option<String>,
    },

    /// Start monitoring a model
    Start {
        /// Model identifier
        model_id: String,

        /// Significance level for drift
        #[arg(long)]
        threshold: Option<f64>,

        /// Seconds between scheduled drift checks
        #[arg(long)]
        interval: Option<i64>,

        /// Drift algorithm (ks_test or psi)
        #[arg(long)]
        algorithm: Option<String>,
    },

    /// Stop monitoring a model
    Stop {
        /// Model identifier
        model_id: String,
    },

    /// List a model's active alerts
    Alerts {
        /// Model identifier
        model_id: String,
    },

    /// Show a monitoring report
    Report {
        /// Model identifier
        model_id: String,

        /// Report period in hours
        #[arg(long, default_value = "24")]
        hours: i64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize client
    let client = client::ApiClient::new(&cli.api_url)?;

    // Execute command
    match cli.command {
        Commands::List => models::list_models(&client, cli.format).await?,
        Commands::Status { model_id } => {
            models::show_status(&client, &model_id, cli.format).await?;
        }
        Commands::Health { model_id } => {
            models::show_health(&client, &model_id, cli.format).await?;
        }
        Commands::Check {
            model_id,
            feature,
            algorithm,
        } => {
            let request = DriftCheckRequest { feature, algorithm };
            drift::run_check(&client, &model_id, request, cli.format).await?;
        }
        Commands::Start {
            model_id,
            threshold,
            interval,
            algorithm,
        } => {
            let request = MonitoringRequest {
                drift_threshold: threshold,
                check_interval_secs: interval,
                algorithm,
            };
            models::start_monitoring(&client, &model_id, request, cli.format).await?;
        }
        Commands::Stop { model_id } => {
            models::stop_monitoring(&client, &model_id, cli.format).await?;
        }
        Commands::Alerts { model_id } => {
            drift::show_alerts(&client, &model_id, cli.format).await?;
        }
        Commands::Report { model_id, hours } => {
            drift::show_report(&client, &model_id, hours, cli.format).await?;
        }
    }

    Ok(())
}
