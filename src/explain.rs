//! Global feature importance from per-record attributions.
//!
//! Importance is the mean absolute attribution per feature normalized to sum to
//! one. Any failure of the attribution capability degrades to uniform weights.

use crate::models::{FeatureAttributor, TrainableScorer};
use crate::types::artifact::IMPORTANCE_TOLERANCE;
use ndarray::{ArrayView2, Axis};
use serde::Serialize;
use tracing::{info, warn};

/// Added to the normalization denominator
pub const NORMALIZATION_EPSILON: f64 = 1e-8;

/// Where the exported weights came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportanceSource {
    Attribution,
    UniformFallback,
}

/// Normalized per-feature weights
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureImportance {
    pub weights: Vec<f64>,
    pub source: ImportanceSource,
}

impl FeatureImportance {
    /// `1 / n_features` for every feature
    pub fn uniform(n_features: usize) -> Self {
        let weight = if n_features == 0 {
            0.0
        } else {
            1.0 / n_features as f64
        };
        Self {
            weights: vec![weight; n_features],
            source: ImportanceSource::UniformFallback,
        }
    }

    pub fn is_fallback(&self) -> bool {
        self.source == ImportanceSource::UniformFallback
    }
}

/// Aggregates attributions of the supervised model over the training rows
pub struct ExplainabilityAggregator<'a> {
    attributor: Option<&'a dyn FeatureAttributor>,
}

impl<'a> ExplainabilityAggregator<'a> {
    pub fn new(attributor: Option<&'a dyn FeatureAttributor>) -> Self {
        Self { attributor }
    }

    pub fn importance(
        &self,
        model: &dyn TrainableScorer,
        features: ArrayView2<'_, f32>,
    ) -> FeatureImportance {
        let n_features = features.ncols();

        let Some(attributor) = self.attributor else {
            warn!("Attribution capability unavailable, using uniform feature importance");
            return FeatureImportance::uniform(n_features);
        };

        let attributions = match attributor.attribute(model, features) {
            Ok(values) => values,
            Err(e) => {
                warn!(
                    attributor = attributor.name(),
                    model = model.name(),
                    error = %e,
                    "Attribution failed, using uniform feature importance"
                );
                return FeatureImportance::uniform(n_features);
            }
        };

        if attributions.dim() != features.dim() {
            warn!(
                expected = ?features.dim(),
                got = ?attributions.dim(),
                "Attribution shape mismatch, using uniform feature importance"
            );
            return FeatureImportance::uniform(n_features);
        }

        let Some(mean_abs) = attributions.mapv(f64::abs).mean_axis(Axis(0)) else {
            warn!("No rows to attribute, using uniform feature importance");
            return FeatureImportance::uniform(n_features);
        };

        // Weights sum to total / (total + epsilon); small totals would miss one
        let total = mean_abs.sum();
        if !total.is_finite()
            || total <= NORMALIZATION_EPSILON
            || NORMALIZATION_EPSILON / (total + NORMALIZATION_EPSILON) > IMPORTANCE_TOLERANCE
        {
            warn!(total, "Degenerate attributions, using uniform feature importance");
            return FeatureImportance::uniform(n_features);
        }

        let denominator = total + NORMALIZATION_EPSILON;
        let weights: Vec<f64> = mean_abs.iter().map(|v| v / denominator).collect();
        info!(
            attributor = attributor.name(),
            rows = features.nrows(),
            "Feature importance computed"
        );

        FeatureImportance {
            weights,
            source: ImportanceSource::Attribution,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClassifierConfig;
    use crate::error::ModelError;
    use crate::models::{RandomForestClassifier, TreePathAttributor};
    use ndarray::Array2;

    struct FailingAttributor;

    impl FeatureAttributor for FailingAttributor {
        fn name(&self) -> &str {
            "failing"
        }

        fn attribute(
            &self,
            _model: &dyn TrainableScorer,
            _features: ArrayView2<'_, f32>,
        ) -> Result<Array2<f64>, ModelError> {
            Err(ModelError::Unsupported("failing".to_string()))
        }
    }

    /// Returns the wrong number of columns
    struct NarrowAttributor;

    impl FeatureAttributor for NarrowAttributor {
        fn name(&self) -> &str {
            "narrow"
        }

        fn attribute(
            &self,
            _model: &dyn TrainableScorer,
            features: ArrayView2<'_, f32>,
        ) -> Result<Array2<f64>, ModelError> {
            Ok(Array2::ones((features.nrows(), 1)))
        }
    }

    /// Attributions in tiny units, e.g. probabilities scaled by 1e-6
    struct SmallUnitAttributor(f64);

    impl FeatureAttributor for SmallUnitAttributor {
        fn name(&self) -> &str {
            "small_unit"
        }

        fn attribute(
            &self,
            _model: &dyn TrainableScorer,
            features: ArrayView2<'_, f32>,
        ) -> Result<Array2<f64>, ModelError> {
            Ok(Array2::from_elem(features.dim(), self.0))
        }
    }

    fn fitted() -> (RandomForestClassifier, Array2<f32>) {
        let features = Array2::from_shape_fn((60, 5), |(i, j)| ((i * 5 + j * 3) % 13) as f32);
        let labels: Vec<u8> = (0..60).map(|i| u8::from((i * 5) % 13 > 7)).collect();
        let mut forest = RandomForestClassifier::new(ClassifierConfig {
            n_estimators: 10,
            ..ClassifierConfig::default()
        });
        forest.fit(features.view(), Some(&labels)).unwrap();
        (forest, features)
    }

    fn assert_uniform(importance: &FeatureImportance, n: usize) {
        assert!(importance.is_fallback());
        assert_eq!(importance.weights.len(), n);
        assert!(importance
            .weights
            .iter()
            .all(|w| (w - 1.0 / n as f64).abs() < 1e-12));
    }

    #[test]
    fn test_attribution_weights_normalized() {
        let (forest, features) = fitted();
        let attributor = TreePathAttributor;
        let importance = ExplainabilityAggregator::new(Some(&attributor))
            .importance(&forest, features.view());

        assert_eq!(importance.source, ImportanceSource::Attribution);
        assert_eq!(importance.weights.len(), 5);
        assert!(importance.weights.iter().all(|&w| w >= 0.0));
        assert!((importance.weights.iter().sum::<f64>() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_missing_capability_is_uniform() {
        let (forest, features) = fitted();
        let importance = ExplainabilityAggregator::new(None).importance(&forest, features.view());
        assert_uniform(&importance, 5);
    }

    #[test]
    fn test_failing_capability_is_uniform() {
        let (forest, features) = fitted();
        let attributor = FailingAttributor;
        let importance = ExplainabilityAggregator::new(Some(&attributor))
            .importance(&forest, features.view());
        assert_uniform(&importance, 5);
    }

    #[test]
    fn test_wrong_shape_is_uniform() {
        let (forest, features) = fitted();
        let attributor = NarrowAttributor;
        let importance = ExplainabilityAggregator::new(Some(&attributor))
            .importance(&forest, features.view());
        assert_uniform(&importance, 5);
    }

    #[test]
    fn test_small_total_is_uniform() {
        let (forest, features) = fitted();
        // 5 features at 1e-6 each: total 5e-6 would leave the weights summing to ~0.998
        let attributor = SmallUnitAttributor(1e-6);
        let importance = ExplainabilityAggregator::new(Some(&attributor))
            .importance(&forest, features.view());
        assert_uniform(&importance, 5);
    }

    #[test]
    fn test_large_enough_total_is_kept() {
        let (forest, features) = fitted();
        let attributor = SmallUnitAttributor(0.01);
        let importance = ExplainabilityAggregator::new(Some(&attributor))
            .importance(&forest, features.view());
        assert_eq!(importance.source, ImportanceSource::Attribution);
        assert!((importance.weights.iter().sum::<f64>() - 1.0).abs() <= IMPORTANCE_TOLERANCE);
    }
}
