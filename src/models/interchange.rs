//! Portable tree-ensemble interchange format.
//!
//! A fitted forest is written as a self-describing JSON document holding the
//! feature order, the traversal rule and every tree as a flat pre-order node
//! array. Any runtime that walks `row[feature] <= threshold ? left : right`
//! reproduces the scores of the in-process model.

use super::isolation_forest::raw_score;
use super::tree::DecisionTree;
use crate::error::ModelError;
use ndarray::ArrayView1;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Format tag stored in every document
pub const FORMAT: &str = "tree-ensemble-json/v1";

/// Traversal rule shared by all trees in a document
pub const TRAVERSAL: &str = "left_if_less_or_equal";

/// Fitted ensemble in portable form
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "model_type", rename_all = "snake_case")]
pub enum InterchangeModel {
    /// Probability = mean of leaf values (weighted fraud fraction)
    RandomForestClassifier {
        n_features: usize,
        trees: Vec<DecisionTree>,
    },
    /// Raw score = `-2^(-mean(leaf values) / c(max_samples))`, higher is more normal
    IsolationForest {
        n_features: usize,
        max_samples: usize,
        offset: f64,
        trees: Vec<DecisionTree>,
    },
}

impl InterchangeModel {
    pub fn n_features(&self) -> usize {
        match self {
            InterchangeModel::RandomForestClassifier { n_features, .. }
            | InterchangeModel::IsolationForest { n_features, .. } => *n_features,
        }
    }

    pub fn trees(&self) -> &[DecisionTree] {
        match self {
            InterchangeModel::RandomForestClassifier { trees, .. }
            | InterchangeModel::IsolationForest { trees, .. } => trees,
        }
    }

    /// Mean leaf value over all trees
    pub fn mean_leaf_value(&self, row: ArrayView1<'_, f32>) -> f64 {
        let trees = self.trees();
        if trees.is_empty() {
            return 0.0;
        }
        trees.iter().map(|t| t.predict(row)).sum::<f64>() / trees.len() as f64
    }

    /// Score one row exactly as the originating model does
    pub fn score_row(&self, row: ArrayView1<'_, f32>) -> Result<f64, ModelError> {
        if row.len() != self.n_features() {
            return Err(ModelError::ShapeMismatch {
                expected: self.n_features(),
                got: row.len(),
            });
        }
        let mean = self.mean_leaf_value(row);
        Ok(match self {
            InterchangeModel::RandomForestClassifier { .. } => mean,
            InterchangeModel::IsolationForest { max_samples, .. } => raw_score(mean, *max_samples),
        })
    }

    pub fn validate(&self) -> Result<(), ModelError> {
        if self.trees().is_empty() {
            return Err(ModelError::InvalidParameter(
                "ensemble has no trees".to_string(),
            ));
        }
        self.trees()
            .iter()
            .try_for_each(|tree| tree.validate(self.n_features()))
    }
}

/// Self-describing document written to disk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterchangeDocument {
    pub format: String,
    /// Column order the trees index into
    pub feature_names: Vec<String>,
    pub traversal: String,
    pub model: InterchangeModel,
}

impl InterchangeDocument {
    pub fn new(feature_names: Vec<String>, model: InterchangeModel) -> Self {
        Self {
            format: FORMAT.to_string(),
            feature_names,
            traversal: TRAVERSAL.to_string(),
            model,
        }
    }

    pub fn validate(&self) -> Result<(), ModelError> {
        if self.format != FORMAT || self.traversal != TRAVERSAL {
            return Err(ModelError::Unsupported(format!(
                "document format {} / traversal {}",
                self.format, self.traversal
            )));
        }
        if self.feature_names.len() != self.model.n_features() {
            return Err(ModelError::ShapeMismatch {
                expected: self.model.n_features(),
                got: self.feature_names.len(),
            });
        }
        self.model.validate()
    }
}

/// Serializer capability for fitted models
pub trait InterchangeWriter {
    /// File extension (without dot) of produced artifacts
    fn extension(&self) -> &str;

    fn encode(&self, document: &InterchangeDocument) -> Result<Vec<u8>, ModelError>;

    fn write(&self, document: &InterchangeDocument, path: &Path) -> Result<(), ModelError> {
        let bytes = self.encode(document)?;
        fs::write(path, bytes)?;
        Ok(())
    }
}

/// Compact JSON encoding of [`InterchangeDocument`]
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonInterchange;

impl InterchangeWriter for JsonInterchange {
    fn extension(&self) -> &str {
        "json"
    }

    fn encode(&self, document: &InterchangeDocument) -> Result<Vec<u8>, ModelError> {
        Ok(serde_json::to_vec(document)?)
    }
}

/// Read and validate a document written by [`JsonInterchange`]
pub fn read_document(path: &Path) -> Result<InterchangeDocument, ModelError> {
    let bytes = fs::read(path)?;
    let document: InterchangeDocument = serde_json::from_slice(&bytes)?;
    document.validate()?;
    Ok(document)
}
