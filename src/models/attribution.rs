//! Per-record feature attribution for tree ensembles.
//!
//! [`TreePathAttributor`] decomposes each tree prediction along the decision
//! path: every split credits `value(child) - value(parent)` to its feature, so
//! `root value + sum(contributions) == leaf value`. Ensemble attributions are
//! the mean over trees.

use super::interchange::InterchangeModel;
use super::TrainableScorer;
use crate::error::ModelError;
use ndarray::{Array1, Array2, ArrayView1, ArrayView2};

/// Explainer capability: one contribution per (row, feature)
pub trait FeatureAttributor {
    fn name(&self) -> &str;

    fn attribute(
        &self,
        model: &dyn TrainableScorer,
        features: ArrayView2<'_, f32>,
    ) -> Result<Array2<f64>, ModelError>;
}

/// Path-decomposition attributor for the supervised forest
#[derive(Debug, Clone, Copy, Default)]
pub struct TreePathAttributor;

impl TreePathAttributor {
    /// Expected model output before any split (mean root value)
    pub fn bias(model: &InterchangeModel) -> f64 {
        let trees = model.trees();
        if trees.is_empty() {
            return 0.0;
        }
        trees
            .iter()
            .map(|t| t.nodes.first().map_or(0.0, |n| n.value))
            .sum::<f64>()
            / trees.len() as f64
    }

    fn attribute_row(model: &InterchangeModel, row: ArrayView1<'_, f32>) -> Array1<f64> {
        let mut contributions = Array1::<f64>::zeros(model.n_features());
        let trees = model.trees();

        for tree in trees {
            let path = tree.decision_path(row);
            for pair in path.windows(2) {
                let parent = &tree.nodes[pair[0]];
                let child = &tree.nodes[pair[1]];
                if let Some(feature) = parent.feature {
                    contributions[feature] += child.value - parent.value;
                }
            }
        }

        if !trees.is_empty() {
            contributions /= trees.len() as f64;
        }
        contributions
    }
}

impl FeatureAttributor for TreePathAttributor {
    fn name(&self) -> &str {
        "tree_path"
    }

    fn attribute(
        &self,
        model: &dyn TrainableScorer,
        features: ArrayView2<'_, f32>,
    ) -> Result<Array2<f64>, ModelError> {
        let ensemble = model.to_interchange()?;
        if !matches!(ensemble, InterchangeModel::RandomForestClassifier { .. }) {
            return Err(ModelError::Unsupported(format!(
                "{} attribution for {}",
                self.name(),
                model.name()
            )));
        }
        if features.ncols() != ensemble.n_features() {
            return Err(ModelError::ShapeMismatch {
                expected: ensemble.n_features(),
                got: features.ncols(),
            });
        }

        let mut out = Array2::<f64>::zeros((features.nrows(), ensemble.n_features()));
        for (row, mut target) in features.rows().into_iter().zip(out.rows_mut()) {
            target.assign(&Self::attribute_row(&ensemble, row));
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ClassifierConfig, DetectorConfig};
    use crate::models::{IsolationForest, RandomForestClassifier};

    fn fitted_forest() -> (RandomForestClassifier, Array2<f32>) {
        // Column 3 is constant and can never be split on
        let features = Array2::from_shape_fn((80, 4), |(i, j)| {
            if j == 3 {
                1.0
            } else {
                ((i * 11 + j * 7) % 23) as f32
            }
        });
        let labels: Vec<u8> = (0..80).map(|i| u8::from((i * 11) % 23 > 14)).collect();
        let mut forest = RandomForestClassifier::new(ClassifierConfig {
            n_estimators: 12,
            ..ClassifierConfig::default()
        });
        forest.fit(features.view(), Some(&labels)).unwrap();
        (forest, features)
    }

    #[test]
    fn test_contributions_sum_to_prediction() {
        let (forest, features) = fitted_forest();
        let attributions = TreePathAttributor.attribute(&forest, features.view()).unwrap();
        let bias = TreePathAttributor::bias(&forest.to_interchange().unwrap());
        let predictions = forest.score(features.view()).unwrap();

        assert_eq!(attributions.dim(), (80, 4));
        for (row, prediction) in attributions.rows().into_iter().zip(predictions) {
            assert!((bias + row.sum() - prediction).abs() < 1e-9);
        }
    }

    #[test]
    fn test_constant_feature_gets_no_credit() {
        let (forest, features) = fitted_forest();
        let attributions = TreePathAttributor.attribute(&forest, features.view()).unwrap();
        assert!(attributions.column(3).iter().all(|&v| v == 0.0));
        assert!(attributions.iter().any(|&v| v != 0.0));
    }

    #[test]
    fn test_detector_is_unsupported() {
        let features = Array2::from_shape_fn((40, 2), |(i, j)| (i + j) as f32);
        let mut detector = IsolationForest::new(DetectorConfig {
            n_estimators: 5,
            max_samples: 16,
            ..DetectorConfig::default()
        });
        detector.fit(features.view(), None).unwrap();
        assert!(matches!(
            TreePathAttributor.attribute(&detector, features.view()),
            Err(ModelError::Unsupported(_))
        ));
    }

    #[test]
    fn test_unfitted_model_errors() {
        let forest = RandomForestClassifier::new(ClassifierConfig::default());
        let features = Array2::<f32>::zeros((3, 4));
        assert!(TreePathAttributor.attribute(&forest, features.view()).is_err());
    }
}
