//! Amount-band rule evaluator.

use serde::{Deserialize, Serialize};

use riskgate_core::error::{Result, RiskGateError};
use riskgate_core::TransactionRequest;

use super::policy::FusionPolicy;
use super::source::{RuleEvaluator, RuleOutcome};

/// Adds `score_delta` when `amount > min_amount`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AmountBand {
    pub name: String,
    pub min_amount: f64,
    pub score_delta: f64,
}

/// The `rules` config section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuleSetConfig {
    #[serde(default = "default_base_score")]
    pub base_score: f64,
    #[serde(default = "default_bands")]
    pub bands: Vec<AmountBand>,
}

fn default_base_score() -> f64 {
    0.3
}

fn default_bands() -> Vec<AmountBand> {
    vec![
        AmountBand { name: "high_amount".into(), min_amount: 1000.0, score_delta: 0.3 },
        AmountBand { name: "very_high_amount".into(), min_amount: 5000.0, score_delta: 0.4 },
    ]
}

impl Default for RuleSetConfig {
    fn default() -> Self {
        Self { base_score: default_base_score(), bands: default_bands() }
    }
}

impl RuleSetConfig {
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.base_score) {
            return Err(RiskGateError::BadRequest(format!(
                "rules.base_score must be within [0, 1] (got {})",
                self.base_score
            )));
        }
        for b in &self.bands {
            if b.name.trim().is_empty() {
                return Err(RiskGateError::BadRequest("rules.bands[].name must not be empty".into()));
            }
            if !b.min_amount.is_finite() || !b.score_delta.is_finite() {
                return Err(RiskGateError::BadRequest(format!("rules.bands[{}] has non-finite values", b.name)));
            }
        }
        Ok(())
    }
}

pub struct AmountBandRules {
    cfg: RuleSetConfig,
    review_threshold: f64,
    reject_threshold: f64,
}

impl AmountBandRules {
    pub fn new(cfg: RuleSetConfig, policy: &FusionPolicy) -> Self {
        Self {
            cfg,
            review_threshold: policy.review_threshold,
            reject_threshold: policy.reject_threshold,
        }
    }
}

impl RuleEvaluator for AmountBandRules {
    fn evaluate_rules(&self, req: &TransactionRequest) -> Result<RuleOutcome> {
        if !req.amount.is_finite() {
            return Err(RiskGateError::RuleEvaluationFailed(format!("non-finite amount {}", req.amount)));
        }

        let mut score = self.cfg.base_score;
        let mut triggered = Vec::new();
        for band in &self.cfg.bands {
            if req.amount > band.min_amount {
                score += band.score_delta;
                triggered.push(band.name.clone());
            }
        }
        let score = score.clamp(0.0, 1.0);

        tracing::debug!(txid=%req.transaction_id, score, rules=?triggered, "rules evaluated");
        Ok(RuleOutcome {
            score,
            decision: riskgate_core::Decision::from_score(score, self.review_threshold, self.reject_threshold),
            triggered,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use riskgate_core::Decision;

    fn req(amount: f64) -> TransactionRequest {
        serde_json::from_value(serde_json::json!({
            "transactionId": "t1",
            "userId": "u1",
            "eventTimestamp": 0,
            "amount": amount,
        }))
        .unwrap()
    }

    fn rules() -> AmountBandRules {
        AmountBandRules::new(RuleSetConfig::default(), &FusionPolicy::default())
    }

    #[test]
    fn small_amount_approves_at_base_score() {
        let out = rules().evaluate_rules(&req(20.0)).unwrap();
        assert_eq!(out.score, 0.3);
        assert_eq!(out.decision, Decision::Approve);
        assert!(out.triggered.is_empty());
    }

    #[test]
    fn high_amount_reviews() {
        let out = rules().evaluate_rules(&req(1500.0)).unwrap();
        assert!((out.score - 0.6).abs() < 1e-9);
        assert_eq!(out.decision, Decision::Review);
        assert_eq!(out.triggered, vec!["high_amount"]);
    }

    #[test]
    fn very_high_amount_is_clamped_and_rejected() {
        let out = rules().evaluate_rules(&req(9000.0)).unwrap();
        assert!(out.score <= 1.0);
        assert_eq!(out.decision, Decision::Reject);
        assert_eq!(out.triggered, vec!["high_amount", "very_high_amount"]);
    }
}
