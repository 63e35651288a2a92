//! Training orchestration: capability wiring and model fitting.
//!
//! The classifier and detector are opaque [`TrainableScorer`]s. The orchestrator
//! only feeds each one the right partition and collects its outputs.

use crate::config::AppConfig;
use crate::error::{Result, TrainError};
use crate::feature_extractor::FeatureExtractor;
use crate::models::{
    FeatureAttributor, InterchangeWriter, IsolationForest, JsonInterchange, RandomForestClassifier,
    TrainableScorer, TreePathAttributor,
};
use crate::split::TrainTestSplit;
use crate::types::Dataset;
use ndarray::Array2;
use serde::Serialize;
use tracing::{info, warn};

/// Added to the detector score standard deviation
pub const SCORE_STD_EPSILON: f64 = 1e-9;

/// Capability handles injected into a run; any of them may be unset
#[derive(Default)]
pub struct Capabilities {
    pub classifier: Option<Box<dyn TrainableScorer>>,
    pub detector: Option<Box<dyn TrainableScorer>>,
    pub serializer: Option<Box<dyn InterchangeWriter>>,
    pub attributor: Option<Box<dyn FeatureAttributor>>,
}

impl Capabilities {
    /// Default capabilities, with the optional ones switched by configuration
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            classifier: Some(Box::new(RandomForestClassifier::new(config.classifier.clone()))),
            detector: Some(Box::new(IsolationForest::new(config.detector.clone()))),
            serializer: config
                .capabilities
                .interchange_export
                .then(|| Box::new(JsonInterchange) as Box<dyn InterchangeWriter>),
            attributor: config
                .capabilities
                .attribution
                .then(|| Box::new(TreePathAttributor) as Box<dyn FeatureAttributor>),
        }
    }

    /// Check availability once, before any work is done.
    ///
    /// Missing classifier or detector is fatal; missing optional capabilities are
    /// reported and degrade to their fallbacks later.
    pub fn resolve(self) -> Result<ResolvedCapabilities> {
        let classifier = self
            .classifier
            .ok_or(TrainError::MissingCapability("supervised classifier"))?;
        let detector = self
            .detector
            .ok_or(TrainError::MissingCapability("anomaly detector"))?;

        if self.serializer.is_none() {
            warn!("Interchange serializer unavailable, model paths will be recorded as null");
        }
        if self.attributor.is_none() {
            warn!("Attribution capability unavailable, feature importance will be uniform");
        }

        info!(
            classifier = classifier.name(),
            detector = detector.name(),
            serializer = ?self.serializer.as_ref().map(|s| s.extension()),
            attributor = ?self.attributor.as_ref().map(|a| a.name()),
            "Capabilities resolved"
        );

        Ok(ResolvedCapabilities {
            classifier,
            detector,
            serializer: self.serializer,
            attributor: self.attributor,
        })
    }
}

/// Capabilities after the startup check
pub struct ResolvedCapabilities {
    pub classifier: Box<dyn TrainableScorer>,
    pub detector: Box<dyn TrainableScorer>,
    pub serializer: Option<Box<dyn InterchangeWriter>>,
    pub attributor: Option<Box<dyn FeatureAttributor>>,
}

/// Mean and standard deviation of the detector's raw training scores.
///
/// Raw scores are higher for more normal records. A consumer computes an
/// anomaly measure as `-(raw - mean) / std`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScoreNormalization {
    pub mean: f64,
    pub std: f64,
}

impl ScoreNormalization {
    /// Population statistics plus [`SCORE_STD_EPSILON`] on the std
    pub fn from_scores(scores: &[f64]) -> Self {
        if scores.is_empty() {
            return Self {
                mean: 0.0,
                std: SCORE_STD_EPSILON,
            };
        }
        let n = scores.len() as f64;
        let mean = scores.iter().sum::<f64>() / n;
        let variance = scores.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / n;
        Self {
            mean,
            std: variance.sqrt() + SCORE_STD_EPSILON,
        }
    }
}

/// Which training rows the detector learned from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectorTrainingSet {
    /// Rows of the train partition labeled legitimate
    Negatives,
    /// Whole train partition (no legitimate rows available)
    FullPartition,
}

/// Outputs collected from both models
#[derive(Debug)]
pub struct TrainingOutcome {
    /// Train partition matrix, in schema column order
    pub train_features: Array2<f32>,
    pub test_labels: Vec<u8>,
    /// Classifier fraud probability per test record
    pub test_probabilities: Vec<f64>,
    pub detector_training_set: DetectorTrainingSet,
    pub detector_rows: usize,
    pub detector_normalization: ScoreNormalization,
}

/// Fits the classifier and detector on the train partition
pub struct TrainingOrchestrator<'a> {
    extractor: &'a FeatureExtractor,
}

impl<'a> TrainingOrchestrator<'a> {
    pub fn new(extractor: &'a FeatureExtractor) -> Self {
        Self { extractor }
    }

    pub fn train(
        &self,
        capabilities: &mut ResolvedCapabilities,
        dataset: &Dataset,
        split: &TrainTestSplit,
    ) -> Result<TrainingOutcome> {
        let train_features = self.extractor.matrix(dataset, &split.train);
        let train_labels = dataset.labels_at(&split.train);
        let test_features = self.extractor.matrix(dataset, &split.test);
        let test_labels = dataset.labels_at(&split.test);

        let classifier = capabilities.classifier.as_mut();
        classifier.fit(train_features.view(), Some(&train_labels))?;
        let test_probabilities = classifier.score(test_features.view())?;
        info!(
            model = classifier.name(),
            train_rows = train_labels.len(),
            test_rows = test_labels.len(),
            "Classifier trained"
        );

        let negatives: Vec<usize> = split
            .train
            .iter()
            .copied()
            .filter(|&i| !dataset.records()[i].is_fraud())
            .collect();
        let (detector_rows, detector_training_set) = if negatives.is_empty() {
            warn!(
                "Train partition has no legitimate claims, fitting detector on all training rows"
            );
            (split.train.clone(), DetectorTrainingSet::FullPartition)
        } else {
            (negatives, DetectorTrainingSet::Negatives)
        };

        let detector = capabilities.detector.as_mut();
        let detector_features = self.extractor.matrix(dataset, &detector_rows);
        detector.fit(detector_features.view(), None)?;

        // Normalization is computed over the whole train partition
        let train_scores = detector.score(train_features.view())?;
        let detector_normalization = ScoreNormalization::from_scores(&train_scores);
        info!(
            model = detector.name(),
            rows = detector_rows.len(),
            training_set = ?detector_training_set,
            if_mean = detector_normalization.mean,
            if_std = detector_normalization.std,
            "Detector trained (raw score: higher = more normal)"
        );

        Ok(TrainingOutcome {
            train_features,
            test_labels,
            test_probabilities,
            detector_training_set,
            detector_rows: detector_rows.len(),
            detector_normalization,
        })
    }
}
