//! Deterministic synthetic claim generator.
//!
//! Draws every base feature column from a caller-owned RNG, derives the ratio and
//! new-provider features, injects fraud labels through four independent patterns
//! and finally calibrates the label count to `round(fraud_rate * count)`.
//! The same RNG state always yields the same dataset.

use crate::error::SimulationError;
use crate::types::claim::{ClaimRecord, Dataset};
use rand::rngs::StdRng;
use rand::seq::index;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal, Poisson};
use serde::Serialize;
use tracing::{debug, info};

const AMOUNT_MEAN: f64 = 40_000.0;
const AMOUNT_STD: f64 = 15_000.0;
const AMOUNT_MIN: f64 = 1_000.0;
const AMOUNT_MAX: f64 = 250_000.0;
const PROVIDER_NOISE_STD: f64 = 5_000.0;
/// Floor applied to the provider average before dividing by it
const EXPECTED_AMOUNT_FLOOR: f64 = 1_000.0;
const PATIENT_CLAIMS_LAMBDA: f64 = 1.5;
const PROVIDER_CLAIMS_LAMBDA: f64 = 8.0;
const MAX_BILLING_USES: u32 = 9;
const MAX_SERVICE_DELAY_SECS: u32 = 90 * 24 * 3600;
const MAX_TOKEN_AGE_SECS: u32 = 7 * 24 * 3600;
const SERVICE_REUSE_PROB: f64 = 0.05;
const HASH_REUSE_PROB: f64 = 0.03;
const NEW_PROVIDER_THRESHOLD: u32 = 3;
const WEEK_HOURS: u32 = 7 * 24;

/// Independent rule that proposes fraud labels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FraudPattern {
    /// Amount far above the provider's usual amount, or a very large claim
    InflatedBilling,
    /// Service token already used by another claim
    TokenReuse,
    /// Claim from a high-risk provider
    ProviderRisk,
    /// Patient filing many claims in a short window
    TemporalBurst,
}

impl FraudPattern {
    /// Evaluation order; each pattern consumes one acceptance draw per record
    pub const ALL: [FraudPattern; 4] = [
        FraudPattern::InflatedBilling,
        FraudPattern::TokenReuse,
        FraudPattern::ProviderRisk,
        FraudPattern::TemporalBurst,
    ];

    /// Probability that a matching record is actually labeled fraud
    pub fn acceptance_probability(self) -> f64 {
        match self {
            FraudPattern::InflatedBilling => 0.6,
            FraudPattern::TokenReuse => 0.7,
            FraudPattern::ProviderRisk => 0.4,
            FraudPattern::TemporalBurst => 0.3,
        }
    }

    /// Whether the record matches this pattern's predicate
    pub fn matches(self, claim: &ClaimRecord) -> bool {
        match self {
            FraudPattern::InflatedBilling => {
                claim.amount_over_expected_ratio > 1.5 || claim.claim_amount > 100_000.0
            }
            FraudPattern::TokenReuse => claim.service_token_reuse_flag == 1,
            FraudPattern::ProviderRisk => claim.provider_risk_score > 0.8,
            FraudPattern::TemporalBurst => claim.num_claims_last_6mo_by_patient > 5,
        }
    }
}

/// Bookkeeping of one simulation, logged after generation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimulationSummary {
    pub count: usize,
    pub target_rate: f64,
    /// Records labeled by each pattern (a record may be counted by several)
    pub pattern_hits: Vec<(FraudPattern, usize)>,
    /// Positives after the union of all patterns, before calibration
    pub rule_positives: usize,
    pub flipped_to_positive: usize,
    pub flipped_to_negative: usize,
    pub final_positives: usize,
}

/// Synthetic claim generator for a fixed size and target fraud rate
#[derive(Debug, Clone)]
pub struct ClaimSimulator {
    count: usize,
    fraud_rate: f64,
}

impl ClaimSimulator {
    pub fn new(count: usize, fraud_rate: f64) -> Result<Self, SimulationError> {
        if !(0.0..=1.0).contains(&fraud_rate) {
            return Err(SimulationError::InvalidFraudRate(fraud_rate));
        }
        Ok(Self { count, fraud_rate })
    }

    /// Number of positives the calibrated dataset will hold
    pub fn target_positives(&self) -> usize {
        ((self.fraud_rate * self.count as f64).round() as usize).min(self.count)
    }

    /// Generate a labeled dataset, advancing `rng`.
    pub fn generate<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
    ) -> Result<(Dataset, SimulationSummary), SimulationError> {
        let mut records = self.draw_base_records(rng)?;

        let mut pattern_hits = Vec::with_capacity(FraudPattern::ALL.len());
        for pattern in FraudPattern::ALL {
            let p = pattern.acceptance_probability();
            let mut hits = 0;
            for claim in records.iter_mut() {
                let accepted = rng.gen::<f64>() < p;
                if accepted && pattern.matches(claim) {
                    claim.label = 1;
                    hits += 1;
                }
            }
            pattern_hits.push((pattern, hits));
        }

        let rule_positives = records.iter().filter(|c| c.is_fraud()).count();
        let (flipped_to_positive, flipped_to_negative) =
            calibrate_labels(&mut records, self.target_positives(), rng);
        let final_positives = records.iter().filter(|c| c.is_fraud()).count();

        let summary = SimulationSummary {
            count: self.count,
            target_rate: self.fraud_rate,
            pattern_hits,
            rule_positives,
            flipped_to_positive,
            flipped_to_negative,
            final_positives,
        };

        info!(
            count = summary.count,
            rule_positives = summary.rule_positives,
            flipped_to_positive = summary.flipped_to_positive,
            flipped_to_negative = summary.flipped_to_negative,
            final_positives = summary.final_positives,
            "Synthetic claims generated"
        );
        for (pattern, hits) in &summary.pattern_hits {
            debug!(pattern = ?pattern, hits = *hits, "Fraud pattern applied");
        }

        Ok((Dataset::new(records), summary))
    }

    /// Draw base columns one at a time and assemble unlabeled records.
    fn draw_base_records<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
    ) -> Result<Vec<ClaimRecord>, SimulationError> {
        let n = self.count;
        let amount_dist = Normal::new(AMOUNT_MEAN, AMOUNT_STD)
            .map_err(|e| SimulationError::Distribution(e.to_string()))?;
        let noise_dist = Normal::new(0.0, PROVIDER_NOISE_STD)
            .map_err(|e| SimulationError::Distribution(e.to_string()))?;
        let patient_dist = Poisson::new(PATIENT_CLAIMS_LAMBDA)
            .map_err(|e| SimulationError::Distribution(e.to_string()))?;
        let provider_dist = Poisson::new(PROVIDER_CLAIMS_LAMBDA)
            .map_err(|e| SimulationError::Distribution(e.to_string()))?;

        let amounts: Vec<f64> = (0..n)
            .map(|_| amount_dist.sample(rng).clamp(AMOUNT_MIN, AMOUNT_MAX))
            .collect();
        let provider_avg: Vec<f64> = amounts.iter().map(|a| a + noise_dist.sample(rng)).collect();
        let patient_claims: Vec<u32> = (0..n).map(|_| patient_dist.sample(rng) as u32).collect();
        let provider_claims: Vec<u32> = (0..n).map(|_| provider_dist.sample(rng) as u32).collect();
        let billing_total: Vec<u32> = (0..n)
            .map(|_| rng.gen_range(1..=MAX_BILLING_USES))
            .collect();
        let distinct_codes: Vec<u32> = billing_total
            .iter()
            .map(|&t| rng.gen_range(1..=t))
            .collect();
        let time_between: Vec<u32> = (0..n)
            .map(|_| rng.gen_range(0..MAX_SERVICE_DELAY_SECS))
            .collect();
        let token_age: Vec<u32> = (0..n).map(|_| rng.gen_range(0..MAX_TOKEN_AGE_SECS)).collect();
        let service_reuse: Vec<u8> = (0..n)
            .map(|_| rng.gen_bool(SERVICE_REUSE_PROB) as u8)
            .collect();
        let hash_reuse: Vec<u8> = (0..n).map(|_| rng.gen_bool(HASH_REUSE_PROB) as u8).collect();
        let provider_risk: Vec<f64> = (0..n).map(|_| rng.gen::<f64>()).collect();
        let semantic_diff: Vec<f64> = (0..n).map(|_| rng.gen::<f64>()).collect();
        let weekday_hour: Vec<u32> = (0..n).map(|_| rng.gen_range(0..WEEK_HOURS)).collect();

        let records = (0..n)
            .map(|i| ClaimRecord {
                claim_amount: amounts[i],
                amount_over_expected_ratio: amounts[i] / provider_avg[i].max(EXPECTED_AMOUNT_FLOOR),
                num_claims_last_6mo_by_patient: patient_claims[i],
                num_claims_last_6mo_by_provider: provider_claims[i],
                avg_claim_amount_by_provider: provider_avg[i],
                billing_code_variability_score: distinct_codes[i] as f64
                    / billing_total[i].max(1) as f64,
                distinct_billing_codes_count: distinct_codes[i],
                time_between_service_and_claim: time_between[i],
                token_age_seconds: token_age[i],
                service_token_reuse_flag: service_reuse[i],
                patient_hash_reuse_flag: hash_reuse[i],
                provider_risk_score: provider_risk[i],
                semantic_text_diff: semantic_diff[i],
                is_new_provider_flag: (provider_claims[i] < NEW_PROVIDER_THRESHOLD) as u8,
                claim_weekday_hour: weekday_hour[i],
                label: 0,
            })
            .collect();

        Ok(records)
    }
}

/// Flip labels uniformly at random until exactly `target` records are positive.
///
/// Draws from the negative pool when short of the target and from the positive
/// pool when above it; the draw never exceeds the pool size. Returns
/// `(flipped_to_positive, flipped_to_negative)`.
pub fn calibrate_labels<R: Rng + ?Sized>(
    records: &mut [ClaimRecord],
    target: usize,
    rng: &mut R,
) -> (usize, usize) {
    let current = records.iter().filter(|c| c.is_fraud()).count();
    if current == target {
        return (0, 0);
    }

    let (source_label, new_label, requested) = if current < target {
        (0u8, 1u8, target - current)
    } else {
        (1u8, 0u8, current - target)
    };

    let pool: Vec<usize> = records
        .iter()
        .enumerate()
        .filter(|(_, c)| c.label == source_label)
        .map(|(i, _)| i)
        .collect();
    let amount = requested.min(pool.len());
    if amount == 0 {
        return (0, 0);
    }

    for pick in index::sample(rng, pool.len(), amount).iter() {
        records[pool[pick]].label = new_label;
    }

    if new_label == 1 {
        (amount, 0)
    } else {
        (0, amount)
    }
}

/// Generate `count` claims at `fraud_rate` from a fresh generator seeded with `seed`.
pub fn simulate(count: usize, fraud_rate: f64, seed: u64) -> Result<Dataset, SimulationError> {
    let mut rng = StdRng::seed_from_u64(seed);
    let (dataset, _) = ClaimSimulator::new(count, fraud_rate)?.generate(&mut rng)?;
    Ok(dataset)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::claim::tests::sample_claim;
    use proptest::prelude::*;

    #[test]
    fn test_simulation_is_deterministic() {
        let first = simulate(500, 0.15, 42).unwrap();
        let second = simulate(500, 0.15, 42).unwrap();
        assert_eq!(first, second);

        let other = simulate(500, 0.15, 7).unwrap();
        assert_ne!(first, other);
    }

    #[test]
    fn test_reference_scenario_positive_count() {
        let dataset = simulate(1000, 0.15, 42).unwrap();
        assert_eq!(dataset.len(), 1000);
        assert_eq!(dataset.positive_count(), 150);
    }

    #[test]
    fn test_derived_features_are_consistent() {
        let dataset = simulate(300, 0.2, 3).unwrap();
        for claim in dataset.records() {
            assert!((AMOUNT_MIN..=AMOUNT_MAX).contains(&claim.claim_amount));
            let expected = claim.claim_amount / claim.avg_claim_amount_by_provider.max(1_000.0);
            assert_eq!(claim.amount_over_expected_ratio, expected);
            assert_eq!(
                claim.is_new_provider_flag == 1,
                claim.num_claims_last_6mo_by_provider < 3
            );
            assert!(claim.distinct_billing_codes_count >= 1);
            assert!(claim.billing_code_variability_score > 0.0);
            assert!(claim.billing_code_variability_score <= 1.0);
            assert!(claim.claim_weekday_hour < 168);
            assert!(claim.label <= 1);
        }
    }

    #[test]
    fn test_rate_near_one_selects_whole_pool() {
        let dataset = simulate(50, 1.0, 11).unwrap();
        assert_eq!(dataset.positive_count(), 50);

        let dataset = simulate(50, 0.995, 11).unwrap();
        assert_eq!(dataset.positive_count(), 50); // round(49.75) = 50
    }

    #[test]
    fn test_zero_rate_and_tiny_counts() {
        assert_eq!(simulate(40, 0.0, 5).unwrap().positive_count(), 0);
        // round(0.15 * 3) = 0
        assert_eq!(simulate(3, 0.15, 5).unwrap().positive_count(), 0);
        assert!(simulate(0, 0.15, 5).unwrap().is_empty());
    }

    #[test]
    fn test_invalid_rate_rejected() {
        assert!(matches!(
            simulate(10, 1.5, 1),
            Err(SimulationError::InvalidFraudRate(_))
        ));
        assert!(simulate(10, -0.1, 1).is_err());
    }

    #[test]
    fn test_calibration_clamps_to_pool() {
        let mut records = vec![sample_claim(0), sample_claim(1), sample_claim(0)];
        let mut rng = StdRng::seed_from_u64(1);

        // Asking for more positives than records exist flips only the negatives
        let flipped = calibrate_labels(&mut records, 10, &mut rng);
        assert_eq!(flipped, (2, 0));
        assert!(records.iter().all(|c| c.is_fraud()));

        let flipped = calibrate_labels(&mut records, 1, &mut rng);
        assert_eq!(flipped, (0, 2));
        assert_eq!(records.iter().filter(|c| c.is_fraud()).count(), 1);

        assert_eq!(calibrate_labels(&mut records, 1, &mut rng), (0, 0));
    }

    #[test]
    fn test_summary_accounts_for_flips() {
        let mut rng = StdRng::seed_from_u64(42);
        let (dataset, summary) = ClaimSimulator::new(800, 0.1)
            .unwrap()
            .generate(&mut rng)
            .unwrap();

        assert_eq!(summary.final_positives, dataset.positive_count());
        assert_eq!(
            summary.rule_positives + summary.flipped_to_positive - summary.flipped_to_negative,
            summary.final_positives
        );
        assert_eq!(summary.pattern_hits.len(), 4);
        let max_hits = summary.pattern_hits.iter().map(|(_, h)| *h).max().unwrap();
        assert!(summary.rule_positives >= max_hits);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(48))]

        #[test]
        fn calibrated_count_matches_target(
            n in 20usize..400,
            rate in 0.05f64..=0.5,
            seed in any::<u64>(),
        ) {
            let dataset = simulate(n, rate, seed).unwrap();
            let target = (rate * n as f64).round() as i64;
            let realized = dataset.positive_count() as i64;
            prop_assert!((realized - target).abs() <= 1, "realized={} target={}", realized, target);
        }
    }
}
