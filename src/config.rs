//! Configuration management for the claim fraud trainer

use crate::error::TrainError;
use crate::types::artifact::REPORTED_TOP_K;
use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Default location of the optional configuration file
pub const DEFAULT_CONFIG_PATH: &str = "config/trainer.toml";

/// Feature subsampling strategy for each split of the supervised forest
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum MaxFeatures {
    /// `ceil(sqrt(n_features))` candidate features per split
    #[default]
    Sqrt,
    /// `ceil(log2(n_features))` candidate features per split
    Log2,
    /// Every feature is a candidate
    All,
}

impl MaxFeatures {
    /// Number of candidate features for a matrix with `n_features` columns
    pub fn resolve(self, n_features: usize) -> usize {
        let k = match self {
            MaxFeatures::Sqrt => (n_features as f64).sqrt().ceil() as usize,
            MaxFeatures::Log2 => (n_features as f64).log2().ceil() as usize,
            MaxFeatures::All => n_features,
        };
        k.clamp(1, n_features.max(1))
    }
}

/// Class imbalance compensation
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ClassWeight {
    /// Weight each class by `n_samples / (2 * n_class_samples)`
    #[default]
    Balanced,
    /// Unit weight for every sample
    None,
}

/// Main application configuration
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub simulation: SimulationConfig,
    pub split: SplitConfig,
    pub classifier: ClassifierConfig,
    pub detector: DetectorConfig,
    pub evaluation: EvaluationConfig,
    pub export: ExportConfig,
    pub capabilities: CapabilitiesConfig,
    pub logging: LoggingConfig,
}

/// Synthetic dataset configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Number of claims to generate
    pub count: usize,
    /// Target share of fraudulent claims
    pub fraud_rate: f64,
    /// Seed of the run generator (simulation, then shuffling)
    pub seed: u64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            count: 5000,
            fraud_rate: 0.15,
            seed: 42,
        }
    }
}

/// Train/test partition configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SplitConfig {
    /// Share of records assigned to the training partition
    pub train_fraction: f64,
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self {
            train_fraction: crate::split::DEFAULT_TRAIN_FRACTION,
        }
    }
}

/// Supervised forest hyperparameters
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Number of trees in the ensemble
    pub n_estimators: usize,
    /// Maximum tree depth (unbounded when absent)
    pub max_depth: Option<usize>,
    /// Minimum samples a node needs to be split
    pub min_samples_split: usize,
    pub max_features: MaxFeatures,
    pub class_weight: ClassWeight,
    pub seed: u64,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            n_estimators: 200,
            max_depth: None,
            min_samples_split: 2,
            max_features: MaxFeatures::Sqrt,
            class_weight: ClassWeight::Balanced,
            seed: 42,
        }
    }
}

/// Unsupervised isolation forest hyperparameters
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    pub n_estimators: usize,
    /// Rows drawn (without replacement) to grow each tree
    pub max_samples: usize,
    /// Expected share of anomalies; fixes the decision offset
    pub contamination: f64,
    pub seed: u64,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            n_estimators: 200,
            max_samples: 256,
            contamination: 0.1,
            seed: 42,
        }
    }
}

/// Evaluation configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EvaluationConfig {
    /// Probability threshold for the binary metrics
    pub threshold: f64,
    /// Fraction of the test partition used by precision/recall@k
    pub top_k: f64,
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            threshold: 0.5,
            top_k: 0.10,
        }
    }
}

/// Artifact export configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    /// Write the bundle at all; a disabled export still trains and evaluates
    pub enabled: bool,
    /// Directory receiving the artifact bundle
    pub output_dir: PathBuf,
    /// Number of leading records written to the sample CSV
    pub sample_rows: usize,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            output_dir: PathBuf::from("models"),
            sample_rows: 100,
        }
    }
}

/// Optional capabilities; disabling one injects an unset handle
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CapabilitiesConfig {
    /// Serialize models to the interchange format
    pub interchange_export: bool,
    /// Compute tree-path feature attributions
    pub attribution: bool,
}

impl Default for CapabilitiesConfig {
    fn default() -> Self {
        Self {
            interchange_export: true,
            attribution: true,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Log format (json, pretty)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

impl AppConfig {
    /// Load configuration from a specific path layered with `CLAIM_TRAINER__*` variables.
    ///
    /// A missing file is not an error; every field falls back to its default.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config = Config::builder()
            .add_source(File::from(path.as_ref()).required(false))
            .add_source(
                Environment::with_prefix("CLAIM_TRAINER")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to build configuration")?;

        config
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }

    /// Reject values the pipeline cannot run with
    pub fn validate(&self) -> std::result::Result<(), TrainError> {
        let invalid = |msg: String| -> std::result::Result<(), TrainError> {
            Err(TrainError::InvalidConfig(msg))
        };

        if self.simulation.count == 0 {
            return invalid("simulation.count must be positive".to_string());
        }
        if !(0.0..=1.0).contains(&self.simulation.fraud_rate) {
            return invalid(format!(
                "simulation.fraud_rate must be within [0, 1], got {}",
                self.simulation.fraud_rate
            ));
        }
        if !(self.split.train_fraction > 0.0 && self.split.train_fraction < 1.0) {
            return invalid(format!(
                "split.train_fraction must be within (0, 1), got {}",
                self.split.train_fraction
            ));
        }
        let train_rows = (self.split.train_fraction * self.simulation.count as f64).floor();
        if train_rows < 1.0 {
            return invalid(format!(
                "simulation.count {} leaves no training rows at split.train_fraction {}",
                self.simulation.count, self.split.train_fraction
            ));
        }
        if !(0.0..=1.0).contains(&self.evaluation.threshold) {
            return invalid(format!(
                "evaluation.threshold must be within [0, 1], got {}",
                self.evaluation.threshold
            ));
        }
        if !(self.evaluation.top_k > 0.0 && self.evaluation.top_k <= 1.0) {
            return invalid(format!(
                "evaluation.top_k must be within (0, 1], got {}",
                self.evaluation.top_k
            ));
        }
        if self.export.enabled && (self.evaluation.top_k - REPORTED_TOP_K).abs() > f64::EPSILON {
            return invalid(format!(
                "evaluation.top_k must be {} when exporting, got {}",
                REPORTED_TOP_K, self.evaluation.top_k
            ));
        }
        if !(self.detector.contamination > 0.0 && self.detector.contamination <= 0.5) {
            return invalid(format!(
                "detector.contamination must be within (0, 0.5], got {}",
                self.detector.contamination
            ));
        }
        if self.classifier.n_estimators == 0 || self.detector.n_estimators == 0 {
            return invalid("n_estimators must be positive".to_string());
        }
        if self.detector.max_samples < 2 {
            return invalid("detector.max_samples must be at least 2".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.simulation.count, 5000);
        assert_eq!(config.simulation.fraud_rate, 0.15);
        assert_eq!(config.split.train_fraction, 0.8);
        assert_eq!(config.classifier.n_estimators, 200);
        assert_eq!(config.classifier.class_weight, ClassWeight::Balanced);
        assert_eq!(config.detector.contamination, 0.1);
        assert_eq!(config.evaluation.top_k, 0.10);
        assert_eq!(config.export.sample_rows, 100);
        assert!(config.capabilities.attribution);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_max_features_resolution() {
        assert_eq!(MaxFeatures::Sqrt.resolve(15), 4);
        assert_eq!(MaxFeatures::Log2.resolve(15), 4);
        assert_eq!(MaxFeatures::All.resolve(15), 15);
        assert_eq!(MaxFeatures::Sqrt.resolve(1), 1);
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig::load_from_path(dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.simulation.seed, 42);
        assert_eq!(config.export.output_dir, PathBuf::from("models"));
    }

    #[test]
    fn test_partial_file_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trainer.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            "[simulation]\ncount = 1000\n\n[classifier]\nn_estimators = 25\nmax_depth = 8\n\n[capabilities]\nattribution = false"
        )
        .unwrap();

        let config = AppConfig::load_from_path(&path).unwrap();
        assert_eq!(config.simulation.count, 1000);
        assert_eq!(config.simulation.fraud_rate, 0.15);
        assert_eq!(config.classifier.n_estimators, 25);
        assert_eq!(config.classifier.max_depth, Some(8));
        assert!(!config.capabilities.attribution);
        assert!(config.capabilities.interchange_export);
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut config = AppConfig::default();
        config.simulation.fraud_rate = 1.2;
        assert!(matches!(config.validate(), Err(TrainError::InvalidConfig(_))));

        let mut config = AppConfig::default();
        config.evaluation.top_k = 0.0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.simulation.count = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.evaluation.threshold = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_custom_top_k_only_without_export() {
        let mut config = AppConfig::default();
        config.evaluation.top_k = 0.05;
        assert!(matches!(config.validate(), Err(TrainError::InvalidConfig(_))));

        config.export.enabled = false;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation_requires_training_rows() {
        let mut config = AppConfig::default();
        config.simulation.count = 1;
        assert!(matches!(config.validate(), Err(TrainError::InvalidConfig(_))));

        // floor(0.8 * 2) = 1 training row
        config.simulation.count = 2;
        assert!(config.validate().is_ok());
    }
}
