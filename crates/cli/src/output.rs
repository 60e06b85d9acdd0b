//! Output formatting utilities

use anyhow::Result;
use clap::ValueEnum;
use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

/// Output format for CLI commands
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
    /// Table format (default)
    #[default]
    Table,
    /// JSON format
    Json,
}

/// Print any response as pretty JSON
pub fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Print rows as a rounded table, or a notice when there are none
pub fn print_rows<T: Tabled>(rows: Vec<T>, empty_message: &str) {
    if rows.is_empty() {
        println!("{}", empty_message.yellow());
        return;
    }
    println!("{}", Table::new(rows).with(Style::rounded()));
}

/// Print a section heading
pub fn print_heading(title: &str) {
    println!("{}", title.bold());
    println!("{}", "=".repeat(50));
}

/// Print a success message
pub fn print_success(message: &str) {
    println!("{} {}", "✓".green().bold(), message);
}

/// Print a warning message
pub fn print_warning(message: &str) {
    println!("{} {}", "⚠".yellow().bold(), message);
}

/// Print an info message
pub fn print_info(message: &str) {
    println!("{} {}", "ℹ".blue().bold(), message);
}

/// Color a severity tier
pub fn color_severity(severity: &str) -> String {
    match severity.to_uppercase().as_str() {
        "CRITICAL" => severity.red().bold().to_string(),
        "HIGH" => severity.red().to_string(),
        "MEDIUM" => severity.yellow().to_string(),
        "LOW" => severity.blue().to_string(),
        _ => severity.to_string(),
    }
}

/// Color a 0-100 health score
pub fn color_health(score: f64) -> String {
    let formatted = format!("{:.1}", score);
    if score >= 80.0 {
        formatted.green().to_string()
    } else if score >= 60.0 {
        formatted.yellow().to_string()
    } else {
        formatted.red().to_string()
    }
}

/// Yes/no flag, red when set
pub fn color_flag(flag: bool) -> String {
    if flag {
        "yes".red().bold().to_string()
    } else {
        "no".green().to_string()
    }
}

/// Format an optional p-value
pub fn format_p_value(p_value: Option<f64>) -> String {
    match p_value {
        Some(p) if p < 0.0001 => format!("{:.2e}", p),
        Some(p) => format!("{:.4}", p),
        None => "n/a".to_string(),
    }
}

/// Format an RFC 3339 timestamp for display
pub fn format_timestamp(ts: &str) -> String {
    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(ts) {
        dt.format("%Y-%m-%d %H:%M:%S").to_string()
    } else {
        ts.to_string()
    }
}
