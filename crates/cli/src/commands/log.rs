//! Result log commands
//!
//! Read-only views over the detector's result log, the same data the
//! dashboard renders.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use colored::Colorize;
use detector_lib::sink::{read_log, LogEntry, LogReadReport};
use serde::Serialize;
use tabled::Tabled;

use crate::output::{
    color_verdict, format_metric, format_percent, print_info, print_json, print_warning,
    OutputFormat,
};

/// Row for the log table
#[derive(Tabled)]
struct LogRow {
    #[tabled(rename = "Timestamp")]
    timestamp: String,
    #[tabled(rename = "Result")]
    result: String,
    #[tabled(rename = "Provider")]
    provider: String,
    #[tabled(rename = "Metrics")]
    metrics: String,
}

impl From<&LogEntry> for LogRow {
    fn from(entry: &LogEntry) -> Self {
        Self {
            timestamp: format_timestamp(&entry.timestamp),
            result: color_verdict(&entry.result),
            provider: entry.provider.clone().unwrap_or_else(|| "-".to_string()),
            metrics: entry
                .metrics
                .iter()
                .map(|v| format_metric(*v))
                .collect::<Vec<_>>()
                .join(", "),
        }
    }
}

/// Per-provider counts
#[derive(Debug, Default, Clone, PartialEq, Serialize)]
pub struct ProviderSummary {
    pub total: usize,
    pub faults: usize,
}

/// Aggregate view of a log
#[derive(Debug, Default, Clone, PartialEq, Serialize)]
pub struct LogSummary {
    pub total: usize,
    pub faults: usize,
    pub no_faults: usize,
    /// Rows whose verdict label was not recognized
    pub unknown: usize,
    pub skipped: usize,
    pub first: Option<DateTime<Utc>>,
    pub last: Option<DateTime<Utc>>,
    pub by_provider: BTreeMap<String, ProviderSummary>,
}

impl LogSummary {
    pub fn fault_rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.faults as f64 / self.total as f64
        }
    }
}

pub fn summarize(report: &LogReadReport) -> LogSummary {
    let mut summary = LogSummary {
        skipped: report.skipped,
        ..Default::default()
    };

    for entry in &report.entries {
        summary.total += 1;
        match entry.verdict {
            Some(v) if v.is_fault() => summary.faults += 1,
            Some(_) => summary.no_faults += 1,
            None => summary.unknown += 1,
        }

        let provider = entry.provider.clone().unwrap_or_else(|| "unknown".to_string());
        let counts = summary.by_provider.entry(provider).or_default();
        counts.total += 1;
        if entry.is_fault() {
            counts.faults += 1;
        }

        summary.first = Some(summary.first.map_or(entry.timestamp, |t| t.min(entry.timestamp)));
        summary.last = Some(summary.last.map_or(entry.timestamp, |t| t.max(entry.timestamp)));
    }
    summary
}

fn load(path: &Path) -> Result<LogReadReport> {
    let report = read_log(path)
        .with_context(|| format!("Failed to read result log {}", path.display()))?;
    Ok(report)
}

fn warn_skipped(report: &LogReadReport) {
    if report.skipped > 0 {
        print_warning(&format!(
            "{} malformed row(s) skipped",
            report.skipped
        ));
    }
}

/// Show log entries, most recent last
pub fn show_log(
    path: &Path,
    faults_only: bool,
    limit: Option<usize>,
    format: OutputFormat,
) -> Result<()> {
    let report = load(path)?;

    let selected: Vec<&LogEntry> = report
        .entries
        .iter()
        .filter(|e| !faults_only || e.is_fault())
        .collect();
    let start = limit.map_or(0, |n| selected.len().saturating_sub(n));
    let selected = &selected[start..];

    match format {
        OutputFormat::Json => print_json(selected)?,
        OutputFormat::Table => {
            if selected.is_empty() {
                print_warning("No results found");
            } else {
                let rows: Vec<LogRow> = selected.iter().map(|e| LogRow::from(*e)).collect();
                let table = tabled::Table::new(rows)
                    .with(tabled::settings::Style::rounded())
                    .to_string();
                println!("{}", table);
                println!("\nShowing {} of {} results", selected.len(), report.entries.len());
            }
            warn_skipped(&report);
        }
    }
    Ok(())
}

/// Show the most recent verdict
pub fn show_latest(path: &Path, format: OutputFormat) -> Result<()> {
    let report = load(path)?;
    let Some(entry) = report.entries.last() else {
        print_warning("Result log has no entries");
        return Ok(());
    };

    match format {
        OutputFormat::Json => print_json(entry)?,
        OutputFormat::Table => {
            println!("{}", "Latest Result".bold());
            println!("{}", "=".repeat(50));
            println!("Timestamp:  {}", format_timestamp(&entry.timestamp));
            println!("Result:     {}", color_verdict(&entry.result));
            println!(
                "Provider:   {}",
                entry.provider.as_deref().unwrap_or("-").cyan()
            );
            println!();
            println!("{}", "Metrics".bold());
            println!("{}", "-".repeat(50));
            for (i, value) in entry.metrics.iter().enumerate() {
                println!("m{:<2}        {}", i + 1, format_metric(*value));
            }
        }
    }
    Ok(())
}

/// Show verdict counts over the whole log
pub fn show_summary(path: &Path, format: OutputFormat) -> Result<()> {
    let report = load(path)?;
    let summary = summarize(&report);

    match format {
        OutputFormat::Json => print_json(&summary)?,
        OutputFormat::Table => {
            println!("{}", "Result Log Summary".bold());
            println!("{}", "=".repeat(50));
            println!("Results:     {}", summary.total);
            println!("Faults:      {}", summary.faults.to_string().red());
            println!("No fault:    {}", summary.no_faults.to_string().green());
            if summary.unknown > 0 {
                println!("Unknown:     {}", summary.unknown.to_string().yellow());
            }
            println!("Fault rate:  {}", format_percent(summary.fault_rate()));
            if let (Some(first), Some(last)) = (summary.first, summary.last) {
                println!("First:       {}", format_timestamp(&first));
                println!("Last:        {}", format_timestamp(&last));
            }

            if !summary.by_provider.is_empty() {
                println!();
                println!("{}", "By Provider".bold());
                println!("{}", "-".repeat(50));
                for (provider, counts) in &summary.by_provider {
                    println!(
                        "{:<10} {} results, {} faults",
                        provider.cyan(),
                        counts.total,
                        counts.faults
                    );
                }
            }

            if summary.total == 0 {
                print_info("The detector appends one row per run");
            }
            warn_skipped(&report);
        }
    }
    Ok(())
}

fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.format("%Y-%m-%d %H:%M:%S%.3f").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use detector_lib::sink::parse_log;

    const LOG: &str = "\
timestamp,result,m1,m2,m3,m4,m5,m6,m7,m8,m9,m10,platform
2025-04-01T12:00:00.000Z,NoFault,0,0,0,0,0,0,0,0,0,0,AWS
2025-04-01T12:05:00.000Z,FaultDetected,1,2,10,50,0,0,0,0,0,0,AWS
2025-04-01T11:55:00.000Z,Fault Detected,0,0,0,0,0,0,3,0,0,7,Azure
garbage,NoFault,0,0,0,0,0,0,0,0,0,0,GCP
2025-04-01T12:10:00.000Z,Maybe,0,0,0
";

    #[test]
    fn test_summarize_counts() {
        let summary = summarize(&parse_log(LOG));
        assert_eq!(summary.total, 4);
        assert_eq!(summary.faults, 2);
        assert_eq!(summary.no_faults, 1);
        assert_eq!(summary.unknown, 1);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.fault_rate(), 0.5);
    }

    #[test]
    fn test_summarize_providers_and_range() {
        let summary = summarize(&parse_log(LOG));
        assert_eq!(
            summary.by_provider.get("AWS"),
            Some(&ProviderSummary {
                total: 2,
                faults: 1
            })
        );
        assert_eq!(summary.by_provider["Azure"].faults, 1);
        assert_eq!(summary.by_provider["unknown"].total, 1);
        assert_eq!(
            format_timestamp(&summary.first.unwrap()),
            "2025-04-01 11:55:00.000"
        );
        assert_eq!(
            format_timestamp(&summary.last.unwrap()),
            "2025-04-01 12:10:00.000"
        );
    }

    #[test]
    fn test_empty_summary() {
        let summary = summarize(&parse_log(""));
        assert_eq!(summary.total, 0);
        assert_eq!(summary.fault_rate(), 0.0);
        assert!(summary.first.is_none());
    }

    #[test]
    fn test_row_formats_missing_metrics() {
        let report = parse_log("2025-04-01T12:00:00.000Z,NoFault,1,2,GCP\n");
        colored::control::set_override(false);
        let row = LogRow::from(&report.entries[0]);
        assert_eq!(row.provider, "GCP");
        assert!(row.metrics.starts_with("1, 2, -"));
    }
}
