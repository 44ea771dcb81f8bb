//! Cross-provider feature normalization
//!
//! Maps a provider metrics sample onto the fixed nine-slot feature vector.
//! Every slot is resolved through [`FEATURE_SOURCES`]; a metric the provider
//! did not report is filled with [`MISSING_VALUE`] so that one absent metric
//! never aborts an inference.

use crate::models::{FeatureSlot, FeatureVector, MetricsSample, Provider, FEATURE_COUNT};
use tracing::debug;

/// Value used for every metric that was not observed
pub const MISSING_VALUE: f64 = 0.0;

/// Source metric name for each feature slot, in model input order.
///
/// AWS reports the first six, Azure reports `CpuTime`, GCP reports the two
/// `execution_*` metrics under their short label.
pub const FEATURE_SOURCES: [(FeatureSlot, &str); FEATURE_COUNT] = [
    (FeatureSlot::Duration, "Duration"),
    (FeatureSlot::MaxMemoryUsed, "MaxMemoryUsed"),
    (FeatureSlot::Invocations, "Invocations"),
    (FeatureSlot::Errors, "Errors"),
    (FeatureSlot::Throttles, "Throttles"),
    (FeatureSlot::ConcurrentExecutions, "ConcurrentExecutions"),
    (FeatureSlot::CpuTime, "CpuTime"),
    (FeatureSlot::ExecutionCount, "execution_count"),
    (FeatureSlot::ExecutionTimes, "execution_times"),
];

/// Build the feature vector for a sample. Total over all samples.
pub fn normalize(sample: &MetricsSample) -> FeatureVector {
    let mut features = FeatureVector::default();
    for (slot, key) in FEATURE_SOURCES {
        features.set(slot, lookup(sample, key));
    }
    features
}

/// Value of the provider's auxiliary metric, or [`MISSING_VALUE`]
pub fn auxiliary_value(sample: &MetricsSample, provider: Provider) -> f64 {
    provider
        .auxiliary_metric()
        .map(|key| lookup(sample, key))
        .unwrap_or(MISSING_VALUE)
}

fn lookup(sample: &MetricsSample, key: &str) -> f64 {
    match sample.get(key) {
        None => MISSING_VALUE,
        Some(value) if value.is_finite() && value >= 0.0 => value,
        Some(value) => {
            debug!(metric = key, value, "Discarding non-finite or negative metric");
            MISSING_VALUE
        }
    }
}
