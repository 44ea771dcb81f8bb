//! Result log reader, as used by the dashboard
//!
//! A header row may or may not be present, older rows carry fewer metric
//! columns, and rows with a timestamp that does not parse are dropped
//! rather than failing the read.

use crate::error::{DetectorError, Result};
use crate::models::{Verdict, LOG_METRIC_SLOTS};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::Path;
use tracing::debug;

/// One parsed log row
#[derive(Debug, Clone, Serialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    /// Verdict label exactly as written
    pub result: String,
    pub verdict: Option<Verdict>,
    /// Metric slots; columns missing from the row are NaN
    pub metrics: [f64; LOG_METRIC_SLOTS],
    pub provider: Option<String>,
}

impl LogEntry {
    pub fn is_fault(&self) -> bool {
        self.verdict.map(|v| v.is_fault()).unwrap_or(false)
    }
}

/// Outcome of reading a whole log
#[derive(Debug, Clone, Default)]
pub struct LogReadReport {
    pub entries: Vec<LogEntry>,
    /// Rows dropped because of an unparseable timestamp or missing fields
    pub skipped: usize,
    pub had_header: bool,
}

/// The first line is a header iff its first field is literally `timestamp`
pub fn is_header(line: &str) -> bool {
    line.split(',').next().map(str::trim) == Some("timestamp")
}

/// Parse the full text of a log file
pub fn parse_log(text: &str) -> LogReadReport {
    let mut report = LogReadReport::default();
    let mut lines = text.lines().peekable();

    if let Some(first) = lines.peek() {
        if is_header(first) {
            report.had_header = true;
            lines.next();
        }
    }

    for line in lines {
        if line.trim().is_empty() {
            continue;
        }
        match parse_line(line) {
            Some(entry) => report.entries.push(entry),
            None => {
                debug!(line, "Skipping unparseable log row");
                report.skipped += 1;
            }
        }
    }
    report
}

/// Read and parse a log file.
///
/// Bytes that are not UTF-8 become replacement characters, so a corrupted
/// row fails to parse and is counted as skipped.
pub fn read_log(path: impl AsRef<Path>) -> Result<LogReadReport> {
    let path = path.as_ref();
    let bytes = std::fs::read(path).map_err(|e| DetectorError::io(path, e))?;
    Ok(parse_log(&String::from_utf8_lossy(&bytes)))
}

/// Parse one data row; `None` if the timestamp is unusable
pub fn parse_line(line: &str) -> Option<LogEntry> {
    let fields: Vec<&str> = line.split(',').map(str::trim).collect();
    if fields.len() < 2 {
        return None;
    }

    let timestamp = DateTime::parse_from_rfc3339(fields[0])
        .ok()?
        .with_timezone(&Utc);
    let result = fields[1].to_string();
    let verdict = Verdict::from_label(&result);

    let mut rest = &fields[2..];
    let mut provider = None;
    if let Some((last, head)) = rest.split_last() {
        if !last.is_empty() && last.parse::<f64>().is_err() {
            provider = Some(last.to_string());
            rest = head;
        }
    }

    let mut metrics = [f64::NAN; LOG_METRIC_SLOTS];
    for (slot, field) in metrics.iter_mut().zip(rest.iter()) {
        *slot = field.parse::<f64>().unwrap_or(f64::NAN);
    }

    Some(LogEntry {
        timestamp,
        result,
        verdict,
        metrics,
        provider,
    })
}
