//! Feature schema for claim fraud models.
//!
//! `FEATURE_SPEC` fixes the column order of every matrix handed to a model and of
//! every per-feature statistic persisted in the artifact metadata. Scoring
//! consumers rebuild their input vectors from this exact order.

use crate::types::claim::{ClaimRecord, Dataset};
use ndarray::Array2;

/// Number of model input features
pub const NUM_FEATURES: usize = 15;

/// Ordered feature names shared by training and scoring
pub const FEATURE_SPEC: [&str; NUM_FEATURES] = [
    "claim_amount",
    "amount_over_expected_ratio",
    "num_claims_last_6mo_by_patient",
    "num_claims_last_6mo_by_provider",
    "avg_claim_amount_by_provider",
    "billing_code_variability_score",
    "distinct_billing_codes_count",
    "time_between_service_and_claim",
    "token_age_seconds",
    "service_token_reuse_flag",
    "patient_hash_reuse_flag",
    "provider_risk_score",
    "semantic_text_diff",
    "is_new_provider_flag",
    "claim_weekday_hour",
];

/// Feature extractor that turns claim records into model input rows.
///
/// Rows are produced in `FEATURE_SPEC` order.
pub struct FeatureExtractor;

impl FeatureExtractor {
    /// Create a new feature extractor.
    pub fn new() -> Self {
        Self
    }

    /// Extract the full-precision feature values of a claim.
    pub fn extract_f64(&self, claim: &ClaimRecord) -> [f64; NUM_FEATURES] {
        [
            claim.claim_amount,
            claim.amount_over_expected_ratio,
            claim.num_claims_last_6mo_by_patient as f64,
            claim.num_claims_last_6mo_by_provider as f64,
            claim.avg_claim_amount_by_provider,
            claim.billing_code_variability_score,
            claim.distinct_billing_codes_count as f64,
            claim.time_between_service_and_claim as f64,
            claim.token_age_seconds as f64,
            claim.service_token_reuse_flag as f64,
            claim.patient_hash_reuse_flag as f64,
            claim.provider_risk_score,
            claim.semantic_text_diff,
            claim.is_new_provider_flag as f64,
            claim.claim_weekday_hour as f64,
        ]
    }

    /// Build an `n × NUM_FEATURES` matrix from the records at `indices`, in order.
    pub fn matrix(&self, dataset: &Dataset, indices: &[usize]) -> Array2<f32> {
        let records = dataset.records();
        let mut matrix = Array2::<f32>::zeros((indices.len(), NUM_FEATURES));
        for (row, &idx) in indices.iter().enumerate() {
            for (col, value) in self.extract_f64(&records[idx]).iter().enumerate() {
                matrix[[row, col]] = *value as f32;
            }
        }
        matrix
    }

    /// Per-feature mean and sample standard deviation over the whole dataset.
    ///
    /// A zero (or undefined) standard deviation is replaced with 1 so consumers
    /// can always divide by it.
    pub fn column_stats(&self, dataset: &Dataset) -> (Vec<f64>, Vec<f64>) {
        let n = dataset.len();
        let mut means = vec![0.0; NUM_FEATURES];
        let mut stds = vec![1.0; NUM_FEATURES];
        if n == 0 {
            return (means, stds);
        }

        for claim in dataset.records() {
            for (sum, value) in means.iter_mut().zip(self.extract_f64(claim)) {
                *sum += value;
            }
        }
        for mean in &mut means {
            *mean /= n as f64;
        }

        if n > 1 {
            let mut squares = vec![0.0; NUM_FEATURES];
            for claim in dataset.records() {
                for (col, value) in self.extract_f64(claim).iter().enumerate() {
                    squares[col] += (value - means[col]).powi(2);
                }
            }
            for (std, sq) in stds.iter_mut().zip(squares) {
                let s = (sq / (n - 1) as f64).sqrt();
                *std = if s == 0.0 || !s.is_finite() { 1.0 } else { s };
            }
        }

        (means, stds)
    }

    /// Get the number of features produced.
    pub fn feature_count(&self) -> usize {
        NUM_FEATURES
    }

    /// Get feature names in schema order.
    pub fn feature_names(&self) -> Vec<String> {
        FEATURE_SPEC.iter().map(|s| s.to_string()).collect()
    }
}

impl Default for FeatureExtractor {
    fn default() -> Self {
        Self::new()
    }
}
