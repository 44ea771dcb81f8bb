//! Isolation forest evaluation
//!
//! Evaluates a forest trained offline and exported as JSON. Each tree
//! isolates points with random axis-aligned splits; a point that is isolated
//! after few splits (short average path) is an outlier.
//!
//! Scoring follows the usual definition:
//! `s(x) = 2^(-E[h(x)] / c(max_samples))`, decision `-s(x) - offset`,
//! negative decision means outlier.

use super::AnomalyModel;
use crate::error::{DetectorError, Result};
use crate::models::RawVerdict;
use serde::{Deserialize, Serialize};

/// Euler-Mascheroni constant, used to approximate harmonic numbers
const EULER_GAMMA: f64 = 0.577_215_664_901_532_9;

/// Decision offset used when contamination was left on "auto" at training time
const DEFAULT_OFFSET: f64 = -0.5;

fn default_offset() -> f64 {
    DEFAULT_OFFSET
}

/// Average path length of an unsuccessful BST search over `n` points
pub fn average_path_length(n: usize) -> f64 {
    match n {
        0 | 1 => 0.0,
        2 => 1.0,
        _ => {
            let n = n as f64;
            2.0 * ((n - 1.0).ln() + EULER_GAMMA) - 2.0 * (n - 1.0) / n
        }
    }
}

/// A node of an isolation tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TreeNode {
    /// `x[feature] <= threshold` goes left, everything else right
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
    /// Terminal node holding the number of training samples that reached it
    Leaf { n_samples: usize },
}

/// One isolation tree, nodes stored in a flat arena with the root at index 0
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IsolationTree {
    nodes: Vec<TreeNode>,
}

impl IsolationTree {
    pub fn new(nodes: Vec<TreeNode>) -> Self {
        Self { nodes }
    }

    /// Depth of the leaf reached by `x`, adjusted for the leaf's unsplit samples
    pub fn path_length(&self, x: &[f64]) -> Result<f64> {
        let mut index = 0;
        let mut depth = 0usize;
        loop {
            let node = self.nodes.get(index).ok_or_else(|| {
                DetectorError::Inference(format!("tree has no node {}", index))
            })?;
            match node {
                TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    let value = x.get(*feature).ok_or_else(|| {
                        DetectorError::Inference(format!("split on missing feature {}", feature))
                    })?;
                    let next = if value <= threshold { *left } else { *right };
                    if next <= index {
                        return Err(DetectorError::Inference(format!(
                            "node {} points back to node {}",
                            index, next
                        )));
                    }
                    index = next;
                    depth += 1;
                }
                TreeNode::Leaf { n_samples } => {
                    return Ok(depth as f64 + average_path_length(*n_samples));
                }
            }
        }
    }

    /// Children must point forward in the arena, which rules out cycles
    fn validate(&self, n_features: usize) -> std::result::Result<(), String> {
        if self.nodes.is_empty() {
            return Err("tree has no nodes".to_string());
        }
        for (index, node) in self.nodes.iter().enumerate() {
            if let TreeNode::Split {
                feature,
                threshold,
                left,
                right,
            } = node
            {
                if *feature >= n_features {
                    return Err(format!(
                        "node {} splits on feature {} but the model has {} features",
                        index, feature, n_features
                    ));
                }
                if threshold.is_nan() {
                    return Err(format!("node {} has a NaN threshold", index));
                }
                for child in [*left, *right] {
                    if child <= index || child >= self.nodes.len() {
                        return Err(format!("node {} has invalid child {}", index, child));
                    }
                }
            }
        }
        Ok(())
    }
}

/// Wire shape of a forest artifact, checked before it becomes a model
#[derive(Deserialize)]
struct ForestDocument {
    n_features: usize,
    max_samples: usize,
    #[serde(default = "default_offset")]
    offset: f64,
    trees: Vec<IsolationTree>,
}

impl TryFrom<ForestDocument> for IsolationForest {
    type Error = String;

    fn try_from(doc: ForestDocument) -> std::result::Result<Self, String> {
        IsolationForest::new(doc.n_features, doc.max_samples, doc.offset, doc.trees)
    }
}

/// Isolation forest trained offline on normal operating metrics.
///
/// Only constructed through [`IsolationForest::new`] or deserialization,
/// both of which validate the tree structure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "ForestDocument")]
pub struct IsolationForest {
    /// Input dimensionality seen at training time
    n_features: usize,
    /// Sub-sample size used to grow each tree
    max_samples: usize,
    /// Decision offset derived from the training contamination
    offset: f64,
    trees: Vec<IsolationTree>,
}

impl IsolationForest {
    pub fn new(
        n_features: usize,
        max_samples: usize,
        offset: f64,
        trees: Vec<IsolationTree>,
    ) -> std::result::Result<Self, String> {
        let forest = Self {
            n_features,
            max_samples,
            offset,
            trees,
        };
        forest.validate()?;
        Ok(forest)
    }

    /// Decode and validate a JSON artifact
    pub fn from_json(bytes: &[u8]) -> std::result::Result<Self, String> {
        serde_json::from_slice(bytes).map_err(|e| format!("invalid forest JSON: {}", e))
    }

    fn validate(&self) -> std::result::Result<(), String> {
        if self.n_features == 0 {
            return Err("n_features must be positive".to_string());
        }
        if self.max_samples < 2 {
            return Err(format!("max_samples must be at least 2, got {}", self.max_samples));
        }
        if !self.offset.is_finite() {
            return Err("offset must be finite".to_string());
        }
        if self.trees.is_empty() {
            return Err("forest has no trees".to_string());
        }
        for (i, tree) in self.trees.iter().enumerate() {
            tree.validate(self.n_features)
                .map_err(|e| format!("tree {}: {}", i, e))?;
        }
        Ok(())
    }

    pub fn offset(&self) -> f64 {
        self.offset
    }

    /// Mean path length across all trees
    pub fn mean_path_length(&self, x: &[f64]) -> Result<f64> {
        if self.trees.is_empty() {
            return Err(DetectorError::Inference("forest has no trees".to_string()));
        }
        let mut total = 0.0;
        for tree in &self.trees {
            total += tree.path_length(x)?;
        }
        Ok(total / self.trees.len() as f64)
    }

    /// Opposite of the anomaly score; lower is more abnormal
    pub fn score_samples(&self, x: &[f64]) -> Result<f64> {
        let normalizer = average_path_length(self.max_samples);
        Ok(-(2f64.powf(-self.mean_path_length(x)? / normalizer)))
    }

    /// Negative values are outliers
    pub fn decision_function(&self, x: &[f64]) -> Result<f64> {
        Ok(self.score_samples(x)? - self.offset)
    }
}

impl AnomalyModel for IsolationForest {
    fn input_dim(&self) -> usize {
        self.n_features
    }

    fn predict(&self, features: &[f64]) -> Result<RawVerdict> {
        if features.len() != self.n_features {
            return Err(DetectorError::SchemaMismatch {
                expected: self.n_features,
                got: features.len(),
            });
        }
        let decision = self.decision_function(features)?;
        if decision.is_nan() {
            return Err(DetectorError::Inference("decision is NaN".to_string()));
        }
        if decision < 0.0 {
            Ok(RawVerdict::Outlier)
        } else {
            Ok(RawVerdict::Inlier)
        }
    }

    fn kind(&self) -> &str {
        "isolation_forest"
    }
}
