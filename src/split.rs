//! Train/test partitioning of a generated dataset

use rand::seq::SliceRandom;
use rand::Rng;
use serde::Serialize;

/// Default share of records assigned to the training partition
pub const DEFAULT_TRAIN_FRACTION: f64 = 0.8;

/// Record indices of the two partitions.
///
/// Built once per run; the index sets are disjoint and together cover `0..count`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrainTestSplit {
    pub train: Vec<usize>,
    pub test: Vec<usize>,
}

impl TrainTestSplit {
    /// Shuffle `0..count` with `rng` and cut at `floor(train_fraction * count)`.
    pub fn new<R: Rng + ?Sized>(count: usize, train_fraction: f64, rng: &mut R) -> Self {
        let mut indices: Vec<usize> = (0..count).collect();
        indices.shuffle(rng);

        let cut = ((train_fraction.clamp(0.0, 1.0) * count as f64).floor() as usize).min(count);
        let test = indices.split_off(cut);

        Self {
            train: indices,
            test,
        }
    }

    pub fn train_len(&self) -> usize {
        self.train.len()
    }

    pub fn test_len(&self) -> usize {
        self.test.len()
    }
}
