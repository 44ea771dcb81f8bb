//! Error types for the fault detection pipeline

use std::path::PathBuf;

use thiserror::Error;

/// Errors surfaced by the detection pipeline.
///
/// Missing metrics are not represented here: the normalizer zero-fills them.
/// Alert transport failures are not represented either, they are logged and
/// dropped by the dispatcher.
#[derive(Debug, Error)]
pub enum DetectorError {
    /// Feature vector width does not match the model's trained input width
    #[error("Schema mismatch: model expects {expected} features, received {got}")]
    SchemaMismatch { expected: usize, got: usize },

    /// Model artifact could not be read, verified or decoded
    #[error("Failed to load model from {path}: {reason}")]
    ModelLoad { path: PathBuf, reason: String },

    /// The model failed while scoring a vector
    #[error("Inference failed: {0}")]
    Inference(String),

    /// The durable result log could not be read or written
    #[error("Result log I/O failure on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A metrics sample could not be read or is not a JSON object of numbers
    #[error("Invalid metrics sample from {origin}: {reason}")]
    InvalidSample { origin: String, reason: String },

    /// Invalid configuration value
    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl DetectorError {
    pub(crate) fn model_load(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        DetectorError::ModelLoad {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        DetectorError::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn invalid_sample(origin: impl Into<String>, reason: impl ToString) -> Self {
        DetectorError::InvalidSample {
            origin: origin.into(),
            reason: reason.to_string(),
        }
    }

    /// Whether this error means the model and the feature schema disagree
    pub fn is_schema_mismatch(&self) -> bool {
        matches!(self, DetectorError::SchemaMismatch { .. })
    }
}

/// Result type for detection operations.
pub type Result<T> = std::result::Result<T, DetectorError>;
