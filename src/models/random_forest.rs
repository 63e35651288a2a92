//! Supervised random forest classifier.
//!
//! Bootstrap-aggregated CART trees grown with weighted Gini impurity. Class
//! weights compensate the fraud/legitimate imbalance; bootstrap multiplicity is
//! folded into the sample weights. Each leaf stores the weighted fraud fraction
//! of the samples that reached it, and the forest probability is the mean of
//! those leaf values.

use super::interchange::InterchangeModel;
use super::tree::{DecisionTree, TreeNode};
use super::TrainableScorer;
use crate::config::{ClassWeight, ClassifierConfig};
use crate::error::ModelError;
use ndarray::ArrayView2;
use rand::rngs::StdRng;
use rand::seq::index;
use rand::{Rng, SeedableRng};
use std::cmp::Ordering;
use tracing::debug;

const NAME: &str = "random_forest";

/// Random forest producing a per-record fraud probability
#[derive(Debug, Clone)]
pub struct RandomForestClassifier {
    config: ClassifierConfig,
    trees: Vec<DecisionTree>,
    n_features: usize,
}

/// Split candidate found for a node
struct Split {
    feature: usize,
    threshold: f32,
    impurity: f64,
}

impl RandomForestClassifier {
    pub fn new(config: ClassifierConfig) -> Self {
        Self {
            config,
            trees: Vec::new(),
            n_features: 0,
        }
    }

    pub fn is_fitted(&self) -> bool {
        !self.trees.is_empty()
    }

    pub fn trees(&self) -> &[DecisionTree] {
        &self.trees
    }

    /// Per-class weights `[legitimate, fraud]`
    fn class_weights(&self, labels: &[u8]) -> [f64; 2] {
        match self.config.class_weight {
            ClassWeight::None => [1.0, 1.0],
            ClassWeight::Balanced => {
                let n = labels.len() as f64;
                let positives = labels.iter().filter(|&&y| y == 1).count() as f64;
                let negatives = n - positives;
                let weight = |count: f64| if count > 0.0 { n / (2.0 * count) } else { 0.0 };
                [weight(negatives), weight(positives)]
            }
        }
    }

    fn build_tree<R: Rng + ?Sized>(
        &self,
        features: &ArrayView2<'_, f32>,
        labels: &[u8],
        weights: &[f64],
        samples: Vec<usize>,
        rng: &mut R,
    ) -> DecisionTree {
        let mut nodes = vec![TreeNode::leaf(0.0, 0.0)];
        let mut stack = vec![(0usize, samples, 0usize)];
        let candidates = self.config.max_features.resolve(self.n_features);

        while let Some((node_idx, samples, depth)) = stack.pop() {
            let (w0, w1) = class_totals(labels, weights, &samples);
            let cover = w0 + w1;
            let value = if cover > 0.0 { w1 / cover } else { 0.0 };
            nodes[node_idx] = TreeNode::leaf(value, cover);

            let depth_reached = self.config.max_depth.map_or(false, |d| depth >= d);
            let pure = w0 == 0.0 || w1 == 0.0;
            if depth_reached || pure || samples.len() < self.config.min_samples_split.max(2) {
                continue;
            }

            let feature_order = index::sample(rng, self.n_features, candidates).into_vec();
            let Some(split) = best_split(features, labels, weights, &samples, &feature_order) else {
                continue;
            };

            let (left, right): (Vec<usize>, Vec<usize>) = samples
                .iter()
                .copied()
                .partition(|&i| features[[i, split.feature]] <= split.threshold);

            let left_idx = nodes.len();
            nodes.push(TreeNode::leaf(0.0, 0.0));
            let right_idx = nodes.len();
            nodes.push(TreeNode::leaf(0.0, 0.0));

            let node = &mut nodes[node_idx];
            node.feature = Some(split.feature);
            node.threshold = split.threshold;
            node.left = left_idx;
            node.right = right_idx;

            stack.push((right_idx, right, depth + 1));
            stack.push((left_idx, left, depth + 1));
        }

        DecisionTree { nodes }
    }
}

/// Weighted class totals `(legitimate, fraud)` over `samples`
fn class_totals(labels: &[u8], weights: &[f64], samples: &[usize]) -> (f64, f64) {
    samples.iter().fold((0.0, 0.0), |(w0, w1), &i| {
        if labels[i] == 1 {
            (w0, w1 + weights[i])
        } else {
            (w0 + weights[i], w1)
        }
    })
}

fn gini(w0: f64, w1: f64) -> f64 {
    let total = w0 + w1;
    if total <= 0.0 {
        return 0.0;
    }
    let p0 = w0 / total;
    let p1 = w1 / total;
    1.0 - p0 * p0 - p1 * p1
}

/// Lowest weighted child impurity over the candidate features, if any split separates the node.
fn best_split(
    features: &ArrayView2<'_, f32>,
    labels: &[u8],
    weights: &[f64],
    samples: &[usize],
    feature_order: &[usize],
) -> Option<Split> {
    let (total0, total1) = class_totals(labels, weights, samples);
    let total = total0 + total1;
    let mut best: Option<Split> = None;
    let mut sorted = samples.to_vec();

    for &feature in feature_order {
        sorted.sort_by(|&a, &b| {
            features[[a, feature]]
                .partial_cmp(&features[[b, feature]])
                .unwrap_or(Ordering::Equal)
        });

        let (mut left0, mut left1) = (0.0, 0.0);
        for pos in 0..sorted.len() - 1 {
            let i = sorted[pos];
            if labels[i] == 1 {
                left1 += weights[i];
            } else {
                left0 += weights[i];
            }

            let current = features[[i, feature]];
            let next = features[[sorted[pos + 1], feature]];
            if next <= current {
                continue;
            }

            let left_weight = left0 + left1;
            let right0 = total0 - left0;
            let right1 = total1 - left1;
            let right_weight = right0 + right1;
            let impurity =
                (left_weight * gini(left0, left1) + right_weight * gini(right0, right1)) / total;

            if best.as_ref().map_or(true, |b| impurity < b.impurity) {
                let mut threshold = current + (next - current) / 2.0;
                if threshold >= next {
                    threshold = current;
                }
                best = Some(Split {
                    feature,
                    threshold,
                    impurity,
                });
            }
        }
    }

    best
}

impl TrainableScorer for RandomForestClassifier {
    fn name(&self) -> &str {
        NAME
    }

    fn fit(
        &mut self,
        features: ArrayView2<'_, f32>,
        labels: Option<&[u8]>,
    ) -> Result<(), ModelError> {
        let labels = labels.ok_or_else(|| ModelError::MissingLabels(NAME.to_string()))?;
        let (n_rows, n_features) = features.dim();
        if n_rows == 0 || n_features == 0 {
            return Err(ModelError::EmptyInput(NAME.to_string()));
        }
        if labels.len() != n_rows {
            return Err(ModelError::ShapeMismatch {
                expected: n_rows,
                got: labels.len(),
            });
        }
        if self.config.n_estimators == 0 {
            return Err(ModelError::InvalidParameter(
                "n_estimators must be positive".to_string(),
            ));
        }

        self.n_features = n_features;
        let class_weights = self.class_weights(labels);
        let mut rng = StdRng::seed_from_u64(self.config.seed);
        let mut trees = Vec::with_capacity(self.config.n_estimators);

        for _ in 0..self.config.n_estimators {
            let mut draws = vec![0u32; n_rows];
            for _ in 0..n_rows {
                draws[rng.gen_range(0..n_rows)] += 1;
            }
            let weights: Vec<f64> = draws
                .iter()
                .zip(labels)
                .map(|(&d, &y)| d as f64 * class_weights[usize::from(y == 1)])
                .collect();
            let samples: Vec<usize> = (0..n_rows).filter(|&i| draws[i] > 0).collect();

            trees.push(self.build_tree(&features, labels, &weights, samples, &mut rng));
        }

        debug!(
            model = NAME,
            trees = trees.len(),
            max_depth = trees.iter().map(|t| t.depth()).max().unwrap_or(0),
            class_weights = ?class_weights,
            "Random forest fitted"
        );
        self.trees = trees;
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

        let n_trees = self.trees.len() as f64;
        Ok(features
            .rows()
            .into_iter()
            .map(|row| self.trees.iter().map(|t| t.predict(row)).sum::<f64>() / n_trees)
            .collect())
    }

    fn to_interchange(&self) -> Result<InterchangeModel, ModelError> {
        if !self.is_fitted() {
            return Err(ModelError::NotFitted(NAME.to_string()));
        }
        Ok(InterchangeModel::RandomForestClassifier {
            n_features: self.n_features,
            trees: self.trees.clone(),
        })
    }
}
