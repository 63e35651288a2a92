//! Evaluation metrics for the supervised classifier on the test partition.

use crate::config::EvaluationConfig;
use crate::error::ModelError;
use crate::types::ClassifierMetrics;
use tracing::{info, warn};

/// Confusion matrix `[[tn, fp], [fn, tp]]` for predictions `score >= threshold`
pub fn confusion_matrix(labels: &[u8], scores: &[f64], threshold: f64) -> [[u64; 2]; 2] {
    let mut matrix = [[0u64; 2]; 2];
    for (&label, &score) in labels.iter().zip(scores) {
        let actual = usize::from(label == 1);
        let predicted = usize::from(score >= threshold);
        matrix[actual][predicted] += 1;
    }
    matrix
}

fn ratio(numerator: u64, denominator: u64) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

/// Precision, recall and F1 of the positive class; zero when undefined
pub fn precision_recall_f1(matrix: &[[u64; 2]; 2]) -> (f64, f64, f64) {
    let [[_, fp], [fn_, tp]] = *matrix;
    let precision = ratio(tp, tp + fp);
    let recall = ratio(tp, tp + fn_);
    let f1 = if precision + recall > 0.0 {
        2.0 * precision * recall / (precision + recall)
    } else {
        0.0
    };
    (precision, recall, f1)
}

/// Area under the ROC curve via the rank-sum statistic, with average ranks for ties.
///
/// `None` when the labels hold a single class.
pub fn roc_auc(labels: &[u8], scores: &[f64]) -> Option<f64> {
    let positives = labels.iter().filter(|&&y| y == 1).count();
    let negatives = labels.len() - positives;
    if positives == 0 || negatives == 0 {
        return None;
    }

    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| scores[a].total_cmp(&scores[b]));

    let mut positive_rank_sum = 0.0;
    let mut start = 0;
    while start < order.len() {
        let mut end = start;
        while end + 1 < order.len() && scores[order[end + 1]] == scores[order[start]] {
            end += 1;
        }
        // 1-based ranks start+1..=end+1 share their mean
        let rank = (start + end) as f64 / 2.0 + 1.0;
        let positives = order[start..=end].iter().filter(|&&i| labels[i] == 1).count();
        positive_rank_sum += rank * positives as f64;
        start = end + 1;
    }

    let p = positives as f64;
    let n = negatives as f64;
    Some((positive_rank_sum - p * (p + 1.0) / 2.0) / (p * n))
}

/// Precision and recall over the top `max(1, floor(n * k))` records by descending score.
///
/// Equal scores keep their original order, so results are reproducible.
pub fn precision_recall_at_k(labels: &[u8], scores: &[f64], k: f64) -> (f64, f64) {
    let n = labels.len().min(scores.len());
    if n == 0 {
        return (0.0, 0.0);
    }

    let m = ((n as f64 * k).floor() as usize).max(1).min(n);
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| scores[b].total_cmp(&scores[a]));

    let selected = order[..m].iter().filter(|&&i| labels[i] == 1).count();
    let total_positives = labels[..n].iter().filter(|&&y| y == 1).count();

    (
        selected as f64 / m as f64,
        selected as f64 / total_positives.max(1) as f64,
    )
}

/// Computes the test-partition report from labels and predicted probabilities
#[derive(Debug, Clone)]
pub struct Evaluator {
    threshold: f64,
    top_k: f64,
}

impl Evaluator {
    pub fn new(config: &EvaluationConfig) -> Self {
        Self {
            threshold: config.threshold,
            top_k: config.top_k,
        }
    }

    pub fn evaluate(
        &self,
        labels: &[u8],
        probabilities: &[f64],
    ) -> Result<ClassifierMetrics, ModelError> {
        if labels.len() != probabilities.len() {
            return Err(ModelError::ShapeMismatch {
                expected: labels.len(),
                got: probabilities.len(),
            });
        }

        let matrix = confusion_matrix(labels, probabilities, self.threshold);
        let (precision, recall, f1) = precision_recall_f1(&matrix);
        let auc = roc_auc(labels, probabilities);
        if auc.is_none() {
            warn!(
                records = labels.len(),
                "Test partition holds a single class, ROC-AUC is undefined and recorded as null"
            );
        }
        let (precision_at_k, recall_at_k) =
            precision_recall_at_k(labels, probabilities, self.top_k);

        Ok(ClassifierMetrics {
            roc_auc: auc,
            precision,
            recall,
            f1,
            confusion_matrix: matrix,
            precision_at_10pct: precision_at_k,
            recall_at_10pct: recall_at_k,
        })
    }
}

/// Print the evaluation summary box
pub fn print_summary(metrics: &ClassifierMetrics) {
    let [[tn, fp], [fn_, tp]] = metrics.confusion_matrix;
    let auc = metrics
        .roc_auc
        .map(|v| format!("{:.4}", v))
        .unwrap_or_else(|| "n/a".to_string());

    info!("╔══════════════════════════════════════════════════════════════╗");
    info!("║              CLAIM FRAUD CLASSIFIER - EVALUATION             ║");
    info!("╠══════════════════════════════════════════════════════════════╣");
    info!("║ ROC-AUC: {:>8}  │  F1: {:>6.4}                              ║", auc, metrics.f1);
    info!(
        "║ Precision: {:>6.4}  │  Recall: {:>6.4}                         ║",
        metrics.precision, metrics.recall
    );
    info!(
        "║ Precision@k: {:>6.4}  │  Recall@k: {:>6.4}                     ║",
        metrics.precision_at_10pct, metrics.recall_at_10pct
    );
    info!("╠══════════════════════════════════════════════════════════════╣");
    info!("║ Confusion Matrix:          pred legit     pred fraud         ║");
    info!("║   actual legit:           {:>10}     {:>10}         ║", tn, fp);
    info!("║   actual fraud:           {:>10}     {:>10}         ║", fn_, tp);
    info!("╚══════════════════════════════════════════════════════════════╝");
}
