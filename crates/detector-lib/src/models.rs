//! Core data models for the fault detector

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Number of slots in the model-facing feature vector
pub const FEATURE_COUNT: usize = 9;

/// Number of metric slots in the legacy result log layout
pub const LOG_METRIC_SLOTS: usize = 10;

/// Raw metrics reported by a provider collector for one collection cycle.
///
/// Keys are provider-specific metric names. A key that is absent was not
/// observed, which is different from a key observed as zero.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MetricsSample(BTreeMap<String, f64>);

impl MetricsSample {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert
    pub fn with(mut self, name: impl Into<String>, value: f64) -> Self {
        self.0.insert(name.into(), value);
        self
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.0.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }
}

impl<K: Into<String>> FromIterator<(K, f64)> for MetricsSample {
    fn from_iter<I: IntoIterator<Item = (K, f64)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}

/// Named slots of the feature vector, in model input order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FeatureSlot {
    Duration,
    MaxMemoryUsed,
    Invocations,
    Errors,
    Throttles,
    ConcurrentExecutions,
    CpuTime,
    ExecutionCount,
    ExecutionTimes,
}

impl FeatureSlot {
    /// All slots in model input order
    pub const ALL: [FeatureSlot; FEATURE_COUNT] = [
        FeatureSlot::Duration,
        FeatureSlot::MaxMemoryUsed,
        FeatureSlot::Invocations,
        FeatureSlot::Errors,
        FeatureSlot::Throttles,
        FeatureSlot::ConcurrentExecutions,
        FeatureSlot::CpuTime,
        FeatureSlot::ExecutionCount,
        FeatureSlot::ExecutionTimes,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            FeatureSlot::Duration => "Duration",
            FeatureSlot::MaxMemoryUsed => "MaxMemoryUsed",
            FeatureSlot::Invocations => "Invocations",
            FeatureSlot::Errors => "Errors",
            FeatureSlot::Throttles => "Throttles",
            FeatureSlot::ConcurrentExecutions => "ConcurrentExecutions",
            FeatureSlot::CpuTime => "CpuTime",
            FeatureSlot::ExecutionCount => "ExecutionCount",
            FeatureSlot::ExecutionTimes => "ExecutionTimes",
        }
    }
}

impl fmt::Display for FeatureSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Provider-agnostic feature vector for model inference
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    pub duration: f64,
    pub max_memory_used: f64,
    pub invocations: f64,
    pub errors: f64,
    pub throttles: f64,
    pub concurrent_executions: f64,
    pub cpu_time: f64,
    pub execution_count: f64,
    pub execution_times: f64,
}

impl FeatureVector {
    /// Values in model input order
    pub fn as_array(&self) -> [f64; FEATURE_COUNT] {
        [
            self.duration,
            self.max_memory_used,
            self.invocations,
            self.errors,
            self.throttles,
            self.concurrent_executions,
            self.cpu_time,
            self.execution_count,
            self.execution_times,
        ]
    }

    pub fn from_array(values: [f64; FEATURE_COUNT]) -> Self {
        Self {
            duration: values[0],
            max_memory_used: values[1],
            invocations: values[2],
            errors: values[3],
            throttles: values[4],
            concurrent_executions: values[5],
            cpu_time: values[6],
            execution_count: values[7],
            execution_times: values[8],
        }
    }

    pub fn get(&self, slot: FeatureSlot) -> f64 {
        match slot {
            FeatureSlot::Duration => self.duration,
            FeatureSlot::MaxMemoryUsed => self.max_memory_used,
            FeatureSlot::Invocations => self.invocations,
            FeatureSlot::Errors => self.errors,
            FeatureSlot::Throttles => self.throttles,
            FeatureSlot::ConcurrentExecutions => self.concurrent_executions,
            FeatureSlot::CpuTime => self.cpu_time,
            FeatureSlot::ExecutionCount => self.execution_count,
            FeatureSlot::ExecutionTimes => self.execution_times,
        }
    }

    pub(crate) fn set(&mut self, slot: FeatureSlot, value: f64) {
        let field = match slot {
            FeatureSlot::Duration => &mut self.duration,
            FeatureSlot::MaxMemoryUsed => &mut self.max_memory_used,
            FeatureSlot::Invocations => &mut self.invocations,
            FeatureSlot::Errors => &mut self.errors,
            FeatureSlot::Throttles => &mut self.throttles,
            FeatureSlot::ConcurrentExecutions => &mut self.concurrent_executions,
            FeatureSlot::CpuTime => &mut self.cpu_time,
            FeatureSlot::ExecutionCount => &mut self.execution_count,
            FeatureSlot::ExecutionTimes => &mut self.execution_times,
        };
        *field = value;
    }

    pub fn len(&self) -> usize {
        FEATURE_COUNT
    }

    pub fn is_empty(&self) -> bool {
        false
    }
}

/// Serverless platform a sample was collected from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Provider {
    #[serde(rename = "AWS")]
    Aws,
    #[serde(rename = "Azure")]
    Azure,
    #[serde(rename = "GCP")]
    Gcp,
}

impl Provider {
    /// Tag written to the result log
    pub fn tag(&self) -> &'static str {
        match self {
            Provider::Aws => "AWS",
            Provider::Azure => "Azure",
            Provider::Gcp => "GCP",
        }
    }

    /// Provider metric carried in the tenth log slot.
    ///
    /// These are reported by the provider's collector but have no slot in
    /// the feature vector, so the model never sees them.
    pub fn auxiliary_metric(&self) -> Option<&'static str> {
        match self {
            Provider::Aws => None,
            Provider::Azure => Some("Requests"),
            Provider::Gcp => Some("execution_failures"),
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl FromStr for Provider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "aws" | "lambda" => Ok(Provider::Aws),
            "azure" => Ok(Provider::Azure),
            "gcp" | "google" => Ok(Provider::Gcp),
            other => Err(format!("unknown provider '{}'", other)),
        }
    }
}

/// Model-native output label.
///
/// Isolation-forest style detectors return `-1` for outliers and `1` for
/// inliers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RawVerdict {
    Outlier,
    Inlier,
}

impl RawVerdict {
    pub fn from_label(label: i64) -> Option<Self> {
        match label {
            -1 => Some(RawVerdict::Outlier),
            1 => Some(RawVerdict::Inlier),
            _ => None,
        }
    }

    pub fn label(&self) -> i64 {
        match self {
            RawVerdict::Outlier => -1,
            RawVerdict::Inlier => 1,
        }
    }
}

/// User-facing fault verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Verdict {
    NoFault,
    FaultDetected,
}

impl Verdict {
    pub fn label(&self) -> &'static str {
        match self {
            Verdict::NoFault => "NoFault",
            Verdict::FaultDetected => "FaultDetected",
        }
    }

    /// Parse a log label, including the spaced labels of older log files
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim() {
            "NoFault" | "No Fault" => Some(Verdict::NoFault),
            "FaultDetected" | "Fault Detected" => Some(Verdict::FaultDetected),
            _ => None,
        }
    }

    pub fn is_fault(&self) -> bool {
        matches!(self, Verdict::FaultDetected)
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One line of the result log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultRecord {
    pub timestamp: DateTime<Utc>,
    pub verdict: Verdict,
    pub features: FeatureVector,
    /// Tenth log slot, see [`Provider::auxiliary_metric`]
    pub auxiliary: f64,
    pub provider: Provider,
}

impl ResultRecord {
    /// Metric values in legacy log slot order
    pub fn log_slots(&self) -> [f64; LOG_METRIC_SLOTS] {
        let mut slots = [0.0; LOG_METRIC_SLOTS];
        slots[..FEATURE_COUNT].copy_from_slice(&self.features.as_array());
        slots[FEATURE_COUNT] = self.auxiliary;
        slots
    }
}
