//! Claim record and dataset structures for the synthetic fraud simulator

use serde::{Deserialize, Serialize};

/// One synthetic insurance claim with its fraud label
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClaimRecord {
    /// Billed amount of this claim
    pub claim_amount: f64,

    /// Claim amount relative to the provider's average (floored denominator)
    pub amount_over_expected_ratio: f64,

    /// Prior claims filed by the same patient in the last six months
    pub num_claims_last_6mo_by_patient: u32,

    /// Prior claims filed by the same provider in the last six months
    pub num_claims_last_6mo_by_provider: u32,

    /// Average claim amount billed by the provider
    pub avg_claim_amount_by_provider: f64,

    /// Distinct billing codes over total billing code uses
    pub billing_code_variability_score: f64,

    /// Number of distinct billing codes on the claim
    pub distinct_billing_codes_count: u32,

    /// Seconds elapsed between service and claim submission
    pub time_between_service_and_claim: u32,

    /// Age of the service token in seconds
    pub token_age_seconds: u32,

    /// 1 when the service token was already used by another claim
    pub service_token_reuse_flag: u8,

    /// 1 when the patient credential hash was seen on another claim
    pub patient_hash_reuse_flag: u8,

    /// Provider risk score in [0, 1)
    pub provider_risk_score: f64,

    /// Semantic distance of the claim text to the patient's history, in [0, 1)
    pub semantic_text_diff: f64,

    /// 1 when the provider has fewer than three prior claims
    pub is_new_provider_flag: u8,

    /// Weekday * 24 + hour of claim submission
    pub claim_weekday_hour: u32,

    /// Fraud label (1 = fraud, 0 = legitimate)
    pub label: u8,
}

impl ClaimRecord {
    /// Whether the record is labeled fraudulent
    pub fn is_fraud(&self) -> bool {
        self.label == 1
    }
}

/// Ordered collection of generated claims
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    records: Vec<ClaimRecord>,
}

impl Dataset {
    pub fn new(records: Vec<ClaimRecord>) -> Self {
        Self { records }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[ClaimRecord] {
        &self.records
    }

    /// Labels in record order
    pub fn labels(&self) -> Vec<u8> {
        self.records.iter().map(|r| r.label).collect()
    }

    /// Labels for a subset of record indices, in the given order
    pub fn labels_at(&self, indices: &[usize]) -> Vec<u8> {
        indices.iter().map(|&i| self.records[i].label).collect()
    }

    /// Number of fraudulent records
    pub fn positive_count(&self) -> usize {
        self.records.iter().filter(|r| r.is_fraud()).count()
    }

    /// Realized fraud rate (0.0 for an empty dataset)
    pub fn fraud_rate(&self) -> f64 {
        if self.records.is_empty() {
            0.0
        } else {
            self.positive_count() as f64 / self.records.len() as f64
        }
    }

    /// First `n` records (fewer if the dataset is smaller)
    pub fn head(&self, n: usize) -> &[ClaimRecord] {
        &self.records[..n.min(self.records.len())]
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn sample_claim(label: u8) -> ClaimRecord {
        ClaimRecord {
            claim_amount: 42_000.0,
            amount_over_expected_ratio: 1.05,
            num_claims_last_6mo_by_patient: 1,
            num_claims_last_6mo_by_provider: 8,
            avg_claim_amount_by_provider: 40_000.0,
            billing_code_variability_score: 0.5,
            distinct_billing_codes_count: 2,
            time_between_service_and_claim: 86_400,
            token_age_seconds: 3_600,
            service_token_reuse_flag: 0,
            patient_hash_reuse_flag: 0,
            provider_risk_score: 0.2,
            semantic_text_diff: 0.4,
            is_new_provider_flag: 0,
            claim_weekday_hour: 33,
            label,
        }
    }

    #[test]
    fn test_claim_serialization() {
        let claim = sample_claim(1);

        let json = serde_json::to_string(&claim).unwrap();
        let deserialized: ClaimRecord = serde_json::from_str(&json).unwrap();

        assert_eq!(claim, deserialized);
        assert!(deserialized.is_fraud());
    }

    #[test]
    fn test_dataset_counts() {
        let dataset = Dataset::new(vec![
            sample_claim(0),
            sample_claim(1),
            sample_claim(0),
            sample_claim(1),
        ]);

        assert_eq!(dataset.len(), 4);
        assert_eq!(dataset.positive_count(), 2);
        assert!((dataset.fraud_rate() - 0.5).abs() < 1e-12);
        assert_eq!(dataset.labels_at(&[3, 0]), vec![1, 0]);
        assert_eq!(dataset.head(10).len(), 4);
        assert_eq!(Dataset::default().fraud_rate(), 0.0);
    }
}
