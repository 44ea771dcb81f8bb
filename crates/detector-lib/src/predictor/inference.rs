//! ONNX inference using tract
//!
//! Runs detectors exported to ONNX (for example an isolation forest
//! converted from scikit-learn). The first graph output must be the label
//! tensor: `-1` for outliers, `1` for inliers.

use super::AnomalyModel;
use crate::error::{DetectorError, Result};
use crate::models::RawVerdict;
use thiserror::Error;
use tract_onnx::prelude::*;
use tract_onnx::tract_hir::infer::Factoid;

type TractModel = SimplePlan<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

/// Reasons an ONNX artifact cannot be turned into a runnable detector
#[derive(Debug, Error)]
pub enum OnnxLoadError {
    #[error("{0}")]
    Graph(String),

    /// The graph was exported for a different feature count than configured
    #[error("graph declares {declared} input features, configured for {configured}")]
    WidthMismatch { declared: usize, configured: usize },
}

/// ONNX-backed outlier detector
pub struct OnnxModel {
    plan: TractModel,
    input_dim: usize,
}

impl std::fmt::Debug for OnnxModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OnnxModel")
            .field("input_dim", &self.input_dim)
            .finish()
    }
}

/// Last dimension of the first input, when the graph pins it to a number
fn declared_width(model: &InferenceModel) -> Option<usize> {
    let fact = model.input_fact(0).ok()?;
    if fact.shape.is_open() {
        return None;
    }
    let last = fact.shape.dims().last()?.concretize()?;
    last.as_i64().and_then(|d| usize::try_from(d).ok())
}

impl OnnxModel {
    /// Parse and optimize a graph whose input is a `[1, input_dim]` f32 tensor.
    ///
    /// A graph that pins its feature axis to another width is rejected; a
    /// symbolic or missing feature axis takes `input_dim`.
    pub fn from_bytes(
        model_bytes: &[u8],
        input_dim: usize,
    ) -> std::result::Result<Self, OnnxLoadError> {
        let graph_err =
            |what: &str, e: TractError| OnnxLoadError::Graph(format!("{}: {}", what, e));
        let model = tract_onnx::onnx()
            .model_for_read(&mut std::io::Cursor::new(model_bytes))
            .map_err(|e| graph_err("Failed to parse ONNX model", e))?;

        if let Some(declared) = declared_width(&model) {
            if declared != input_dim {
                return Err(OnnxLoadError::WidthMismatch {
                    declared,
                    configured: input_dim,
                });
            }
        }

        let plan = model
            .with_input_fact(0, f32::fact([1, input_dim]).into())
            .map_err(|e| graph_err("Failed to set input shape", e))?
            .into_optimized()
            .map_err(|e| graph_err("Failed to optimize model", e))?
            .into_runnable()
            .map_err(|e| graph_err("Failed to create runnable model", e))?;
        Ok(Self { plan, input_dim })
    }

    fn to_tensor(&self, features: &[f64]) -> Result<Tensor> {
        let data: Vec<f32> = features.iter().map(|v| *v as f32).collect();
        let array = tract_ndarray::Array2::from_shape_vec((1, self.input_dim), data)
            .map_err(|e| DetectorError::Inference(e.to_string()))?;
        Ok(array.into())
    }

    fn first_label(output: &Tensor) -> Result<i64> {
        let labels = output
            .cast_to::<i64>()
            .map_err(|e| DetectorError::Inference(format!("label tensor: {}", e)))?;
        let view = labels
            .to_array_view::<i64>()
            .map_err(|e| DetectorError::Inference(format!("label tensor: {}", e)))?;
        view.iter()
            .next()
            .copied()
            .ok_or_else(|| DetectorError::Inference("empty label tensor".to_string()))
    }
}

impl AnomalyModel for OnnxModel {
    fn input_dim(&self) -> usize {
        self.input_dim
    }

    fn predict(&self, features: &[f64]) -> Result<RawVerdict> {
        let input = self.to_tensor(features)?;
        let result = self
            .plan
            .run(tvec!(input.into()))
            .map_err(|e| DetectorError::Inference(e.to_string()))?;
        let output = result
            .first()
            .ok_or_else(|| DetectorError::Inference("No output from model".to_string()))?;

        let label = Self::first_label(output)?;
        RawVerdict::from_label(label)
            .ok_or_else(|| DetectorError::Inference(format!("unexpected label {}", label)))
    }

    fn kind(&self) -> &str {
        "onnx"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prost::Message;
    use tract_onnx::pb;
    use tract_onnx::pb::tensor_shape_proto::{dimension, Dimension};

    fn dim(value: dimension::Value) -> Dimension {
        Dimension {
            value: Some(value),
            ..Default::default()
        }
    }

    /// `X[batch, width] -> Sign -> Cast(int64)`, so each label is the sign of
    /// the first feature
    fn sign_graph(batch: dimension::Value, width: dimension::Value) -> Vec<u8> {
        let input = pb::ValueInfoProto {
            name: "X".to_string(),
            r#type: Some(pb::TypeProto {
                value: Some(pb::type_proto::Value::TensorType(pb::type_proto::Tensor {
                    elem_type: pb::tensor_proto::DataType::Float as i32,
                    shape: Some(pb::TensorShapeProto {
                        dim: vec![dim(batch), dim(width)],
                    }),
                })),
                ..Default::default()
            }),
            ..Default::default()
        };
        let sign = pb::NodeProto {
            input: vec!["X".to_string()],
            output: vec!["signed".to_string()],
            op_type: "Sign".to_string(),
            ..Default::default()
        };
        let cast = pb::NodeProto {
            input: vec!["signed".to_string()],
            output: vec!["label".to_string()],
            op_type: "Cast".to_string(),
            attribute: vec![pb::AttributeProto {
                name: "to".to_string(),
                r#type: pb::attribute_proto::AttributeType::Int as i32,
                i: pb::tensor_proto::DataType::Int64 as i32 as i64,
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
            graph: Some(pb::GraphProto {
                name: "sign".to_string(),
                node: vec![sign, cast],
                input: vec![input],
                output: vec![pb::ValueInfoProto {
                    name: "label".to_string(),
                    ..Default::default()
                }],
                ..Default::default()
            }),
            ..Default::default()
        };
        model.encode_to_vec()
    }

    fn fixed_graph(width: i64) -> Vec<u8> {
        sign_graph(dimension::Value::DimValue(1), dimension::Value::DimValue(width))
    }

    #[test]
    fn test_garbage_bytes_are_rejected() {
        let err = OnnxModel::from_bytes(b"definitely not a protobuf graph", 9).unwrap_err();
        assert!(matches!(err, OnnxLoadError::Graph(_)));
        assert!(err.to_string().starts_with("Failed to"), "{}", err);
    }

    #[test]
    fn test_declared_width_must_match_configured_width() {
        let err = OnnxModel::from_bytes(&fixed_graph(12), 9).unwrap_err();
        assert!(
            matches!(
                err,
                OnnxLoadError::WidthMismatch {
                    declared: 12,
                    configured: 9
                }
            ),
            "{:?}",
            err
        );
    }

    #[test]
    fn test_matching_declared_width_loads() {
        let model = OnnxModel::from_bytes(&fixed_graph(9), 9).unwrap();
        assert_eq!(model.input_dim(), 9);
        assert_eq!(model.kind(), "onnx");
    }

    #[test]
    fn test_symbolic_width_takes_configured_width() {
        let bytes = sign_graph(
            dimension::Value::DimParam("N".to_string()),
            dimension::Value::DimParam("F".to_string()),
        );
        let model = OnnxModel::from_bytes(&bytes, 7).unwrap();
        assert_eq!(model.input_dim(), 7);
        assert_eq!(model.predict(&[-1.0; 7]).unwrap(), RawVerdict::Outlier);
    }

    #[test]
    fn test_negative_label_is_outlier() {
        let model = OnnxModel::from_bytes(&fixed_graph(9), 9).unwrap();
        let mut features = [0.0; 9];
        features[0] = -3.5;
        assert_eq!(model.predict(&features).unwrap(), RawVerdict::Outlier);
    }

    #[test]
    fn test_positive_label_is_inlier() {
        let model = OnnxModel::from_bytes(&fixed_graph(9), 9).unwrap();
        let mut features = [0.0; 9];
        features[0] = 42.0;
        assert_eq!(model.predict(&features).unwrap(), RawVerdict::Inlier);
    }

    #[test]
    fn test_unexpected_label_is_inference_error() {
        let model = OnnxModel::from_bytes(&fixed_graph(9), 9).unwrap();
        let err = model.predict(&[0.0; 9]).unwrap_err();
        match err {
            DetectorError::Inference(reason) => {
                assert!(reason.contains("unexpected label 0"), "{}", reason)
            }
            other => panic!("expected inference error, got {:?}", other),
        }
    }

    #[test]
    fn test_to_tensor_shape() {
        let model = OnnxModel::from_bytes(&fixed_graph(3), 3).unwrap();
        let tensor = model.to_tensor(&[1.0, 2.5, -4.0]).unwrap();
        assert_eq!(tensor.shape(), &[1, 3]);
        assert_eq!(tensor.as_slice::<f32>().unwrap(), &[1.0, 2.5, -4.0]);
        assert!(matches!(model.to_tensor(&[1.0]), Err(DetectorError::Inference(_))));
    }

    #[test]
    fn test_first_label_reads_first_element() {
        let labels = tensor1(&[-1i64, 1, 1]);
        assert_eq!(OnnxModel::first_label(&labels).unwrap(), -1);

        let floats = tensor1(&[1.0f32]);
        assert_eq!(OnnxModel::first_label(&floats).unwrap(), 1);

        let empty = tensor1::<i64>(&[]);
        assert!(matches!(
            OnnxModel::first_label(&empty),
            Err(DetectorError::Inference(_))
        ));
    }
}
