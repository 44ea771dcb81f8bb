//! Metrics sample sources
//!
//! Provider collectors live outside this crate; they hand over one sample per
//! collection cycle as a JSON object of metric name to number. This module
//! reads that object from a file or standard input.


use crate::error::{DetectorError, Result};
use crate::models::MetricsSample;
use serde_json::Value;
use std::io::Read;
use std::path::PathBuf;
use tracing::debug;

/// Argument value that selects standard input
pub const STDIN_ARG: &str = "-";

/// Source of one metrics sample per call
pub trait MetricsSource {
    /// Read the next sample
    fn collect(&mut self) -> Result<MetricsSample>;

    /// Human-readable origin, used in logs and errors
    fn origin(&self) -> String;
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Input {
    Stdin,
    File(PathBuf),
}

/// Reads a JSON metrics object from a file or stdin
#[derive(Debug, Clone)]
pub struct JsonSource {
    input: Input,
}

impl JsonSource {
    pub fn stdin() -> Self {
        Self { input: Input::Stdin }
    }

    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        Self {
            input: Input::File(path.into()),
        }
    }

    /// `-` means stdin, anything else is a file path
    pub fn from_arg(arg: &str) -> Self {
        if arg == STDIN_ARG {
            Self::stdin()
        } else {
            Self::from_path(arg)
        }
    }

    pub fn is_stdin(&self) -> bool {
        self.input == Input::Stdin
    }
}

impl MetricsSource for JsonSource {
    fn collect(&mut self) -> Result<MetricsSample> {
        let origin = self.origin();
        let text = match &self.input {
            Input::Stdin => {
                let mut buf = String::new();
                std::io::stdin()
                    .read_to_string(&mut buf)
                    .map_err(|e| DetectorError::invalid_sample(&origin, e))?;
                buf
            }
            Input::File(path) => std::fs::read_to_string(path)
                .map_err(|e| DetectorError::invalid_sample(&origin, e))?,
        };
        parse_sample(&text, &origin)
    }

    fn origin(&self) -> String {
        match &self.input {
            Input::Stdin => "stdin".to_string(),
            Input::File(path) => path.display().to_string(),
        }
    }
}

/// Parse a JSON object into a sample.
///
/// Numbers are taken as-is and numeric strings are parsed. `null` and any
/// other value count as "not observed" and are left out of the sample.
pub fn parse_sample(text: &str, origin: &str) -> Result<MetricsSample> {
    let value: Value =
        serde_json::from_str(text).map_err(|e| DetectorError::invalid_sample(origin, e))?;

    let Value::Object(map) = value else {
        return Err(DetectorError::invalid_sample(
            origin,
            "expected a JSON object of metric name to number",
        ));
    };

    let sample = map
        .into_iter()
        .filter_map(|(name, value)| {
            let number = match &value {
                Value::Number(n) => n.as_f64(),
                Value::String(s) => s.trim().parse::<f64>().ok(),
                _ => None,
            };
            if number.is_none() {
                debug!(metric = %name, value = %value, "Ignoring non-numeric metric");
            }
            number.map(|n| (name, n))
        })
        .collect::<MetricsSample>();

    debug!(origin, metrics = sample.len(), "Metrics sample parsed");
    Ok(sample)
}
