//! Tree-ensemble models, their interchange format and feature attribution

pub mod attribution;
pub mod interchange;
pub mod isolation_forest;
pub mod random_forest;
pub mod tree;

pub use attribution::{FeatureAttributor, TreePathAttributor};
pub use interchange::{InterchangeDocument, InterchangeModel, InterchangeWriter, JsonInterchange};
pub use isolation_forest::IsolationForest;
pub use random_forest::RandomForestClassifier;
pub use tree::{DecisionTree, TreeNode};

use crate::error::ModelError;
use ndarray::ArrayView2;

/// A model that can be fitted on a feature matrix and then score rows.
///
/// Supervised implementations require `labels`; unsupervised ones ignore them.
pub trait TrainableScorer {
    fn name(&self) -> &str;

    fn fit(
        &mut self,
        features: ArrayView2<'_, f32>,
        labels: Option<&[u8]>,
    ) -> Result<(), ModelError>;

    /// One score per row. Orientation is model specific and documented by the implementor.
    fn score(&self, features: ArrayView2<'_, f32>) -> Result<Vec<f64>, ModelError>;

    /// Portable description of the fitted model
    fn to_interchange(&self) -> Result<InterchangeModel, ModelError> {
        Err(ModelError::Unsupported(format!(
            "{} has no interchange representation",
            self.name()
        )))
    }
}
