//! Isolation Forest anomaly detector
//!
//! Anomalies are easier to isolate and thus have shorter path lengths in
//! randomly split trees. `score` returns the raw score `-2^(-E[h(x)] / c(psi))`:
//! values lie in [-1, 0] and HIGHER MEANS MORE NORMAL. Consumers that want an
//! "anomalous is high" measure must negate or standardize-and-negate it.

use super::interchange::InterchangeModel;
use super::tree::{DecisionTree, TreeNode};
use super::TrainableScorer;
use crate::config::DetectorConfig;
use crate::error::ModelError;
use ndarray::{ArrayView1, ArrayView2};
use rand::rngs::StdRng;
use rand::seq::index;
use rand::{Rng, SeedableRng};
use tracing::debug;

const NAME: &str = "isolation_forest";
const EULER_GAMMA: f64 = 0.577_215_664_901_532_9;

/// Score returned when trees were grown on a single row and path lengths carry no signal
const DEGENERATE_SCORE: f64 = -0.5;

/// Expected path length of an unsuccessful BST search over `n` points, `c(n)`.
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

/// Raw isolation score for a mean path length over trees grown on `max_samples` rows
pub fn raw_score(mean_path_length: f64, max_samples: usize) -> f64 {
    let norm = average_path_length(max_samples);
    if norm <= 0.0 {
        return DEGENERATE_SCORE;
    }
    -(2.0_f64.powf(-mean_path_length / norm))
}

/// Isolation Forest trained on (preferably) legitimate claims
#[derive(Debug, Clone)]
pub struct IsolationForest {
    config: DetectorConfig,
    trees: Vec<DecisionTree>,
    n_features: usize,
    /// Rows per tree actually used, `min(max_samples, n_rows)`
    max_samples: usize,
    /// Raw score below which a record is flagged anomalous
    offset: f64,
}

impl IsolationForest {
    pub fn new(config: DetectorConfig) -> Self {
        Self {
            config,
            trees: Vec::new(),
            n_features: 0,
            max_samples: 0,
            offset: 0.0,
        }
    }

    pub fn is_fitted(&self) -> bool {
        !self.trees.is_empty()
    }

    /// Decision offset fixed by the contamination parameter
    pub fn offset(&self) -> f64 {
        self.offset
    }

    /// Flag rows whose raw score falls below the contamination offset
    pub fn predict_anomaly(&self, features: ArrayView2<'_, f32>) -> Result<Vec<bool>, ModelError> {
        Ok(self
            .score(features)?
            .into_iter()
            .map(|s| s < self.offset)
            .collect())
    }

    fn mean_path_length(&self, row: ArrayView1<'_, f32>) -> f64 {
        let total: f64 = self.trees.iter().map(|t| t.predict(row)).sum();
        total / self.trees.len() as f64
    }

    /// Grow one isolation tree over `samples`; leaf values hold `depth + c(leaf_size)`.
    fn build_tree<R: Rng + ?Sized>(
        &self,
        features: &ArrayView2<'_, f32>,
        samples: Vec<usize>,
        max_depth: usize,
        rng: &mut R,
    ) -> DecisionTree {
        let mut nodes = vec![TreeNode::leaf(0.0, 0.0)];
        let mut stack = vec![(0usize, samples, 0usize)];

        while let Some((node_idx, samples, depth)) = stack.pop() {
            let size = samples.len();
            let leaf = TreeNode::leaf(depth as f64 + average_path_length(size), size as f64);

            if depth >= max_depth || size <= 1 {
                nodes[node_idx] = leaf;
                continue;
            }

            // Randomly select feature
            let feature = rng.gen_range(0..self.n_features);
            let (min_val, max_val) = samples.iter().fold((f32::MAX, f32::MIN), |(lo, hi), &i| {
                let v = features[[i, feature]];
                (lo.min(v), hi.max(v))
            });

            // If all values are the same, make a leaf
            if max_val <= min_val {
                nodes[node_idx] = leaf;
                continue;
            }

            let threshold = rng.gen_range(min_val..max_val);
            let (left, right): (Vec<usize>, Vec<usize>) = samples
                .iter()
                .copied()
                .partition(|&i| features[[i, feature]] <= threshold);

            let left_idx = nodes.len();
            nodes.push(TreeNode::leaf(0.0, 0.0));
            let right_idx = nodes.len();
            nodes.push(TreeNode::leaf(0.0, 0.0));

            nodes[node_idx] = TreeNode {
                feature: Some(feature),
                threshold,
                left: left_idx,
                right: right_idx,
                value: 0.0,
                cover: size as f64,
            };

            stack.push((right_idx, right, depth + 1));
            stack.push((left_idx, left, depth + 1));
        }

        DecisionTree { nodes }
    }
}

/// Linear-interpolated percentile of `values` (`q` in [0, 100])
fn percentile(values: &[f64], q: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let rank = (q / 100.0).clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    sorted[lo] + (sorted[hi] - sorted[lo]) * (rank - lo as f64)
}

impl TrainableScorer for IsolationForest {
    fn name(&self) -> &str {
        NAME
    }

    /// Labels are ignored; the caller chooses which rows the detector learns from.
    fn fit(
        &mut self,
        features: ArrayView2<'_, f32>,
        _labels: Option<&[u8]>,
    ) -> Result<(), ModelError> {
        let (n_rows, n_features) = features.dim();
        if n_rows == 0 || n_features == 0 {
            return Err(ModelError::EmptyInput(NAME.to_string()));
        }
        if self.config.n_estimators == 0 {
            return Err(ModelError::InvalidParameter(
                "n_estimators must be positive".to_string(),
            ));
        }
        if !(self.config.contamination > 0.0 && self.config.contamination <= 0.5) {
            return Err(ModelError::InvalidParameter(format!(
                "contamination must be within (0, 0.5], got {}",
                self.config.contamination
            )));
        }

        self.n_features = n_features;
        self.max_samples = self.config.max_samples.min(n_rows).max(1);
        let max_depth = (self.max_samples as f64).log2().ceil().max(0.0) as usize;
        let mut rng = StdRng::seed_from_u64(self.config.seed);

        let trees: Vec<DecisionTree> = (0..self.config.n_estimators)
            .map(|_| {
                let sample = index::sample(&mut rng, n_rows, self.max_samples).into_vec();
                self.build_tree(&features, sample, max_depth, &mut rng)
            })
            .collect();
        self.trees = trees;

        let training_scores = self.score(features)?;
        self.offset = percentile(&training_scores, 100.0 * self.config.contamination);

        debug!(
            model = NAME,
            trees = self.trees.len(),
            max_samples = self.max_samples,
            offset = self.offset,
            "Isolation forest fitted"
        );
        Ok(())
    }

    fn score(&self, features: ArrayView2<'_, f32>) -> Result<Vec<f64>, ModelError> {
        if !self.is_fitted() {
            return Err(ModelError::NotFitted(NAME.to_string()));
        }
        if features.ncols() != self.n_features {
            return Err(ModelError::ShapeMismatch {
                expected: self.n_features,
                got: features.ncols(),
            });
        }

        Ok(features
            .rows()
            .into_iter()
            .map(|row| raw_score(self.mean_path_length(row), self.max_samples))
            .collect())
    }

    fn to_interchange(&self) -> Result<InterchangeModel, ModelError> {
        if !self.is_fitted() {
            return Err(ModelError::NotFitted(NAME.to_string()));
        }
        Ok(InterchangeModel::IsolationForest {
            n_features: self.n_features,
            max_samples: self.max_samples,
            offset: self.offset,
            trees: self.trees.clone(),
        })
    }
}
