//! Artifact bundle data structures consumed by the scoring service

use crate::error::TrainError;
use crate::feature_extractor::FEATURE_SPEC;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Type tag of the unsupervised model
pub const UNSUPERVISED_TYPE: &str = "iforest";

/// Ranking depth named by the `*_at_10pct` keys of `metrics.json`
pub const REPORTED_TOP_K: f64 = 0.10;

/// Tolerance for the importance weights summing to one
pub const IMPORTANCE_TOLERANCE: f64 = 1e-6;

/// Versioned training metadata written as `metadata.json`.
///
/// Absent model paths serialize as `null` so consumers can detect degraded exports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelMetadata {
    /// `"v"` + UTC timestamp `YYYYMMDDHHMMSS`
    pub model_version: String,

    /// Supervised model file name, relative to the bundle directory
    pub rf_model_path: Option<String>,

    /// Anomaly detector file name, relative to the bundle directory
    pub unsup_model_path: Option<String>,

    pub unsupervised_type: String,

    /// Column order every matrix and vector below follows
    pub feature_spec: Vec<String>,

    pub feature_means: Vec<f64>,

    /// Sample standard deviations; never zero
    pub feature_stds: Vec<f64>,

    /// Normalized mean absolute attribution per feature
    pub shap_importance: Vec<f64>,

    /// Mean of the detector's raw training scores (higher = more normal)
    pub if_mean: f64,

    /// Standard deviation of the detector's raw training scores
    pub if_std: f64,
}

impl ModelMetadata {
    /// Check the contract the scoring service relies on
    pub fn validate(&self) -> Result<(), TrainError> {
        let contract = |msg: String| -> Result<(), TrainError> { Err(TrainError::Contract(msg)) };

        if self.feature_spec.len() != FEATURE_SPEC.len()
            || self
                .feature_spec
                .iter()
                .zip(FEATURE_SPEC.iter())
                .any(|(a, b)| a != b)
        {
            return contract("feature_spec does not match the feature schema".to_string());
        }

        let n = self.feature_spec.len();
        for (name, values) in [
            ("feature_means", &self.feature_means),
            ("feature_stds", &self.feature_stds),
            ("shap_importance", &self.shap_importance),
        ] {
            if values.len() != n {
                return contract(format!("{} has {} entries, expected {}", name, values.len(), n));
            }
            if values.iter().any(|v| !v.is_finite()) {
                return contract(format!("{} contains non-finite values", name));
            }
        }

        if self.feature_stds.iter().any(|&s| s == 0.0) {
            return contract("feature_stds contains a zero entry".to_string());
        }
        if self.shap_importance.iter().any(|&w| w < 0.0) {
            return contract("shap_importance contains a negative weight".to_string());
        }
        let total: f64 = self.shap_importance.iter().sum();
        if (total - 1.0).abs() > IMPORTANCE_TOLERANCE {
            return contract(format!("shap_importance sums to {}", total));
        }
        if !self.if_mean.is_finite() || !(self.if_std.is_finite() && self.if_std > 0.0) {
            return contract(format!(
                "invalid detector normalization (mean {}, std {})",
                self.if_mean, self.if_std
            ));
        }
        if self.unsupervised_type != UNSUPERVISED_TYPE {
            return contract(format!("unknown unsupervised_type {}", self.unsupervised_type));
        }
        Ok(())
    }

    /// Load and validate a `metadata.json` file
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let metadata: Self = serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        metadata.validate()?;
        Ok(metadata)
    }
}

/// Evaluation report written as `metrics.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsReport {
    pub rf: ClassifierMetrics,
}

/// Test-partition metrics of the supervised classifier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifierMetrics {
    /// `null` when the test partition holds a single class
    pub roc_auc: Option<f64>,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    /// `[[tn, fp], [fn, tp]]`
    pub confusion_matrix: [[u64; 2]; 2],
    /// Precision/recall@k at `evaluation.top_k`, which is [`REPORTED_TOP_K`] when exporting
    pub precision_at_10pct: f64,
    pub recall_at_10pct: f64,
}

impl ClassifierMetrics {
    pub fn total(&self) -> u64 {
        self.confusion_matrix.iter().flatten().sum()
    }
}
