//! Model artifact loading
//!
//! The artifact is read fully into memory once at startup, optionally
//! checked against a SHA-256 digest, and decoded according to its format.

use super::forest::IsolationForest;
use super::inference::{OnnxLoadError, OnnxModel};
use super::AnomalyModel;
use crate::error::{DetectorError, Result};
use crate::models::FEATURE_COUNT;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::info;

/// Serialized model family
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelFormat {
    /// Pick from the file extension: `.onnx` is ONNX, anything else a forest
    #[default]
    Auto,
    Onnx,
    Forest,
}

impl ModelFormat {
    /// Resolve `Auto` against a path
    pub fn resolve(self, path: &Path) -> ModelFormat {
        match self {
            ModelFormat::Auto => {
                let is_onnx = path
                    .extension()
                    .and_then(|e| e.to_str())
                    .map(|e| e.eq_ignore_ascii_case("onnx"))
                    .unwrap_or(false);
                if is_onnx {
                    ModelFormat::Onnx
                } else {
                    ModelFormat::Forest
                }
            }
            other => other,
        }
    }
}

impl fmt::Display for ModelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelFormat::Auto => write!(f, "auto"),
            ModelFormat::Onnx => write!(f, "onnx"),
            ModelFormat::Forest => write!(f, "forest"),
        }
    }
}

impl FromStr for ModelFormat {
    type Err = DetectorError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(ModelFormat::Auto),
            "onnx" => Ok(ModelFormat::Onnx),
            "forest" | "json" => Ok(ModelFormat::Forest),
            other => Err(DetectorError::Config(format!("unknown model format '{}'", other))),
        }
    }
}

/// Location and expectations for a model artifact
#[derive(Debug, Clone)]
pub struct ModelArtifact {
    pub path: PathBuf,
    pub format: ModelFormat,
    /// Input width for ONNX graphs; forests carry their own
    pub input_dim: usize,
    /// Expected SHA-256 of the artifact bytes, hex encoded
    pub sha256: Option<String>,
}

impl ModelArtifact {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            format: ModelFormat::Auto,
            input_dim: FEATURE_COUNT,
            sha256: None,
        }
    }

    pub fn with_format(mut self, format: ModelFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_input_dim(mut self, input_dim: usize) -> Self {
        self.input_dim = input_dim;
        self
    }

    pub fn with_sha256(mut self, digest: impl Into<String>) -> Self {
        self.sha256 = Some(digest.into());
        self
    }
}

/// Compute the hex SHA-256 of `data`
pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Read, verify and decode a model artifact
pub fn load_model(artifact: &ModelArtifact) -> Result<Box<dyn AnomalyModel>> {
    let path = &artifact.path;
    let bytes = std::fs::read(path).map_err(|e| DetectorError::model_load(path, e))?;

    let checksum = sha256_hex(&bytes);
    if let Some(expected) = &artifact.sha256 {
        if !expected.trim().eq_ignore_ascii_case(&checksum) {
            return Err(DetectorError::model_load(
                path,
                format!("checksum mismatch: expected {}, got {}", expected.trim(), checksum),
            ));
        }
    }

    let format = artifact.format.resolve(path);
    let model: Box<dyn AnomalyModel> = match format {
        ModelFormat::Onnx => Box::new(
            OnnxModel::from_bytes(&bytes, artifact.input_dim).map_err(|e| match e {
                OnnxLoadError::WidthMismatch {
                    declared,
                    configured,
                } => DetectorError::SchemaMismatch {
                    expected: declared,
                    got: configured,
                },
                OnnxLoadError::Graph(reason) => DetectorError::model_load(path, reason),
            })?,
        ),
        _ => Box::new(
            IsolationForest::from_json(&bytes).map_err(|e| DetectorError::model_load(path, e))?,
        ),
    };

    info!(
        path = %path.display(),
        format = %format,
        kind = model.kind(),
        input_dim = model.input_dim(),
        size = bytes.len(),
        checksum = %checksum,
        "Model loaded"
    );

    Ok(model)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    const FOREST_JSON: &str = r#"{
        "n_features": 9,
        "max_samples": 256,
        "offset": -0.5,
        "trees": [{ "nodes": [
            { "kind": "split", "feature": 3, "threshold": 20.0, "left": 1, "right": 2 },
            { "kind": "leaf", "n_samples": 255 },
            { "kind": "leaf", "n_samples": 1 }
        ] }]
    }"#;

    fn write_forest(dir: &TempDir) -> PathBuf {
        let path = dir.path().join("ai_fault_detector.json");
        fs::write(&path, FOREST_JSON).unwrap();
        path
    }

    #[test]
    fn test_compute_checksum() {
        let checksum = sha256_hex(b"test model weights");
        assert_eq!(checksum.len(), 64);
        assert_eq!(checksum, sha256_hex(b"test model weights"));
    }

    #[test]
    fn test_format_resolution() {
        assert_eq!(ModelFormat::Auto.resolve(Path::new("m.onnx")), ModelFormat::Onnx);
        assert_eq!(ModelFormat::Auto.resolve(Path::new("m.ONNX")), ModelFormat::Onnx);
        assert_eq!(ModelFormat::Auto.resolve(Path::new("m.json")), ModelFormat::Forest);
        assert_eq!(ModelFormat::Onnx.resolve(Path::new("m.json")), ModelFormat::Onnx);
        assert_eq!("JSON".parse::<ModelFormat>().unwrap(), ModelFormat::Forest);
        assert!("pickle".parse::<ModelFormat>().is_err());
    }

    #[test]
    fn test_load_forest() {
        let dir = TempDir::new().unwrap();
        let path = write_forest(&dir);
        let model = load_model(&ModelArtifact::new(&path)).unwrap();
        assert_eq!(model.kind(), "isolation_forest");
        assert_eq!(model.input_dim(), 9);
    }

    #[test]
    fn test_missing_artifact_is_model_load_error() {
        let dir = TempDir::new().unwrap();
        let err = load_model(&ModelArtifact::new(dir.path().join("missing.json"))).err().unwrap();
        assert!(matches!(err, DetectorError::ModelLoad { .. }));
    }

    #[test]
    fn test_corrupt_artifact_is_model_load_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("corrupt.json");
        fs::write(&path, b"{\"n_features\": ").unwrap();
        let err = load_model(&ModelArtifact::new(&path)).err().unwrap();
        assert!(matches!(err, DetectorError::ModelLoad { .. }));
    }

    #[test]
    fn test_checksum_verification() {
        let dir = TempDir::new().unwrap();
        let path = write_forest(&dir);
        let good = sha256_hex(FOREST_JSON.as_bytes()).to_uppercase();

        assert!(load_model(&ModelArtifact::new(&path).with_sha256(good)).is_ok());

        let err = load_model(&ModelArtifact::new(&path).with_sha256("00".repeat(32))).err().unwrap();
        assert!(err.to_string().contains("checksum mismatch"));
    }

    #[test]
    fn test_stale_onnx_width_is_schema_mismatch() {
        use prost::Message;
        use tract_onnx::pb;
        use tract_onnx::pb::tensor_shape_proto::{dimension::Value, Dimension};

        // Identity graph pinned to twelve features
        let dims = [1, 12].map(|d| Dimension {
            value: Some(Value::DimValue(d)),
            ..Default::default()
        });
        let tensor_type = pb::type_proto::Tensor {
            elem_type: pb::tensor_proto::DataType::Float as i32,
            shape: Some(pb::TensorShapeProto { dim: dims.to_vec() }),
        };
        let graph = pb::GraphProto {
            node: vec![pb::NodeProto {
                input: vec!["X".to_string()],
                output: vec!["label".to_string()],
                op_type: "Identity".to_string(),
                ..Default::default()
            }],
            input: vec![pb::ValueInfoProto {
                name: "X".to_string(),
                r#type: Some(pb::TypeProto {
                    value: Some(pb::type_proto::Value::TensorType(tensor_type)),
                    ..Default::default()
                }),
                ..Default::default()
            }],
            output: vec![pb::ValueInfoProto {
                name: "label".to_string(),
                ..Default::default()
            }],
            ..Default::default()
        };
        let model = pb::ModelProto {
            ir_version: 8,
            opset_import: vec![pb::OperatorSetIdProto {
                domain: String::new(),
                version: 13,
            }],
            graph: Some(graph),
            ..Default::default()
        };

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("stale.onnx");
        fs::write(&path, model.encode_to_vec()).unwrap();

        let err = load_model(&ModelArtifact::new(&path)).err().unwrap();
        assert!(
            matches!(
                err,
                DetectorError::SchemaMismatch {
                    expected: 12,
                    got: 9
                }
            ),
            "{:?}",
            err
        );
        assert!(load_model(&ModelArtifact::new(&path).with_input_dim(12)).is_ok());
    }

    #[test]
    fn test_forced_onnx_format_rejects_json() {
        let dir = TempDir::new().unwrap();
        let path = write_forest(&dir);
        let artifact = ModelArtifact::new(&path).with_format(ModelFormat::Onnx);
        assert!(matches!(
            load_model(&artifact),
            Err(DetectorError::ModelLoad { .. })
        ));
    }
}
