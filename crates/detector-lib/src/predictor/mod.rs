//! Anomaly scoring engine

mod features;
mod forest;
mod inference;
mod loader;

pub use features::{auxiliary_value, normalize, FEATURE_SOURCES, MISSING_VALUE};
pub use forest::{average_path_length, IsolationForest, IsolationTree, TreeNode};
pub use inference::{OnnxLoadError, OnnxModel};
pub use loader::{load_model, sha256_hex, ModelArtifact, ModelFormat};

use crate::error::{DetectorError, Result};
use crate::models::{FeatureVector, RawVerdict};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::{debug, warn};

/// Soft latency budget for a single inference
const MAX_INFERENCE_MS: u128 = 5;

/// Trait for trained outlier detectors.
///
/// The pipeline only ever asks a model to label one vector; training and
/// model internals stay behind this seam.
pub trait AnomalyModel: Send + Sync {
    /// Number of input features the model was trained on
    fn input_dim(&self) -> usize;

    /// Label a vector of exactly [`AnomalyModel::input_dim`] values
    fn predict(&self, features: &[f64]) -> Result<RawVerdict>;

    /// Model family, used in logs and metrics
    fn kind(&self) -> &str;
}

/// Scores feature vectors with a single loaded model
pub struct AnomalyScorer {
    model: Box<dyn AnomalyModel>,
    inference_count: AtomicU64,
    slow_inference_count: AtomicU64,
}

impl AnomalyScorer {
    pub fn new(model: Box<dyn AnomalyModel>) -> Self {
        Self {
            model,
            inference_count: AtomicU64::new(0),
            slow_inference_count: AtomicU64::new(0),
        }
    }

    /// Load the artifact once and wrap it
    pub fn from_artifact(artifact: &ModelArtifact) -> Result<Self> {
        Ok(Self::new(load_model(artifact)?))
    }

    pub fn input_dim(&self) -> usize {
        self.model.input_dim()
    }

    pub fn model_kind(&self) -> &str {
        self.model.kind()
    }

    pub fn score(&self, features: &FeatureVector) -> Result<RawVerdict> {
        self.score_values(&features.as_array())
    }

    /// Score a raw vector. The width is checked before the model is touched.
    pub fn score_values(&self, values: &[f64]) -> Result<RawVerdict> {
        let expected = self.model.input_dim();
        if values.len() != expected {
            return Err(DetectorError::SchemaMismatch {
                expected,
                got: values.len(),
            });
        }

        let start = Instant::now();
        let raw = self.model.predict(values)?;
        let elapsed = start.elapsed();
        self.inference_count.fetch_add(1, Ordering::Relaxed);

        if elapsed.as_millis() > MAX_INFERENCE_MS {
            self.slow_inference_count.fetch_add(1, Ordering::Relaxed);
            warn!(elapsed_ms = elapsed.as_millis(), "Inference exceeded {}ms target", MAX_INFERENCE_MS);
        } else {
            debug!(elapsed_us = elapsed.as_micros(), label = raw.label(), "Inference completed");
        }

        Ok(raw)
    }

    pub fn stats(&self) -> InferenceStats {
        InferenceStats {
            total_inferences: self.inference_count.load(Ordering::Relaxed),
            slow_inferences: self.slow_inference_count.load(Ordering::Relaxed),
        }
    }
}

/// Inference statistics
#[derive(Debug, Clone)]
pub struct InferenceStats {
    pub total_inferences: u64,
    pub slow_inferences: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FEATURE_COUNT;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    struct CountingModel {
        dim: usize,
        label: RawVerdict,
        calls: Arc<AtomicUsize>,
    }

    impl AnomalyModel for CountingModel {
        fn input_dim(&self) -> usize {
            self.dim
        }

        fn predict(&self, _features: &[f64]) -> Result<RawVerdict> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.label)
        }

        fn kind(&self) -> &str {
            "counting"
        }
    }

    fn scorer(dim: usize, label: RawVerdict) -> (AnomalyScorer, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let model = CountingModel {
            dim,
            label,
            calls: calls.clone(),
        };
        (AnomalyScorer::new(Box::new(model)), calls)
    }

    #[test]
    fn test_matching_width_reaches_model() {
        let (scorer, calls) = scorer(FEATURE_COUNT, RawVerdict::Outlier);
        let raw = scorer.score(&FeatureVector::default()).unwrap();
        assert_eq!(raw, RawVerdict::Outlier);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(scorer.stats().total_inferences, 1);
    }

    #[test]
    fn test_stale_model_width_is_schema_mismatch() {
        let (scorer, calls) = scorer(12, RawVerdict::Inlier);
        let err = scorer.score(&FeatureVector::default()).unwrap_err();
        match err {
            DetectorError::SchemaMismatch { expected, got } => {
                assert_eq!(expected, 12);
                assert_eq!(got, FEATURE_COUNT);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_wrong_width_vectors_never_call_model() {
        let (scorer, calls) = scorer(FEATURE_COUNT, RawVerdict::Inlier);
        for width in [0usize, 1, 8, 10, 32] {
            let values = vec![1.0; width];
            let err = scorer.score_values(&values).unwrap_err();
            assert!(err.is_schema_mismatch(), "width {width}");
        }
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(scorer.stats().total_inferences, 0);
    }
}
