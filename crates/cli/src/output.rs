//! Output formatting utilities

use clap::ValueEnum;
use colored::Colorize;
use serde::Serialize;

/// Output format for CLI commands
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
    /// Table format (default)
    #[default]
    Table,
    /// JSON format
    Json,
}

/// Print any serializable value as pretty JSON
pub fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
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

/// Format a metric value; columns absent from a log row show as `-`
pub fn format_metric(value: f64) -> String {
    if value.is_nan() {
        "-".to_string()
    } else {
        value.to_string()
    }
}

/// Format a ratio as a percentage
pub fn format_percent(ratio: f64) -> String {
    format!("{:.1}%", ratio * 100.0)
}

/// Color a verdict label, including unrecognized labels
pub fn color_verdict(label: &str) -> String {
    match label {
        "FaultDetected" | "Fault Detected" => label.red().bold().to_string(),
        "NoFault" | "No Fault" => label.green().to_string(),
        _ => label.yellow().to_string(),
    }
}
