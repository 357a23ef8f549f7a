//! In-process inference client.
//!
//! Scores a transaction with a small logistic model over the request amount
//! and a few well-known attributes. Used when no remote model endpoint is
//! wired in; any `InferenceClient` can replace it.

use async_trait::async_trait;
use tokio::time::Instant;

use riskgate_core::error::{Result, RiskGateError};
use riskgate_core::{Decision, TransactionRequest};

use super::policy::FusionPolicy;
use super::source::{InferenceClient, ModelOutcome};

const ATTR_TXN_COUNT_24H: &str = "txn_count_24h";
const ATTR_ACCOUNT_AGE_DAYS: &str = "account_age_days";

const BIAS: f64 = -4.2;
const W_LOG_AMOUNT: f64 = 0.55;
const W_TXN_COUNT: f64 = 0.12;
const W_ACCOUNT_AGE: f64 = -0.004;

pub struct HeuristicInferenceClient {
    review_threshold: f64,
    reject_threshold: f64,
}

impl HeuristicInferenceClient {
    pub fn new(policy: &FusionPolicy) -> Self {
        Self {
            review_threshold: policy.review_threshold,
            reject_threshold: policy.reject_threshold,
        }
    }

    fn numeric(req: &TransactionRequest, name: &str) -> Option<f64> {
        req.attribute(name).and_then(|v| v.as_f64()).filter(|v| v.is_finite())
    }

    fn score(req: &TransactionRequest) -> (f64, Vec<String>) {
        let mut reasons = Vec::new();
        let mut z = BIAS + W_LOG_AMOUNT * req.amount.max(0.0).ln_1p();
        if req.amount > 2000.0 {
            reasons.push("large_amount".to_string());
        }

        if let Some(count) = Self::numeric(req, ATTR_TXN_COUNT_24H) {
            z += W_TXN_COUNT * count.max(0.0);
            if count >= 10.0 {
                reasons.push("high_velocity".to_string());
            }
        }
        if let Some(age) = Self::numeric(req, ATTR_ACCOUNT_AGE_DAYS) {
            z += W_ACCOUNT_AGE * age.clamp(0.0, 3650.0);
            if age < 30.0 {
                reasons.push("new_account".to_string());
            }
        }

        (1.0 / (1.0 + (-z).exp()), reasons)
    }
}

#[async_trait]
impl InferenceClient for HeuristicInferenceClient {
    async fn infer(&self, req: &TransactionRequest, deadline: Instant) -> Result<ModelOutcome> {
        if Instant::now() >= deadline {
            return Err(RiskGateError::ModelUnavailable("deadline exceeded before inference".into()));
        }
        let (score, reasons) = Self::score(req);
        Ok(ModelOutcome {
            score,
            decision: Decision::from_score(score, self.review_threshold, self.reject_threshold),
            reasons,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn req(amount: f64, attrs: serde_json::Value) -> TransactionRequest {
        serde_json::from_value(serde_json::json!({
            "transactionId": "t1",
            "userId": "u1",
            "eventTimestamp": 0,
            "amount": amount,
            "attributes": attrs,
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn score_grows_with_amount_and_velocity() {
        let client = HeuristicInferenceClient::new(&FusionPolicy::default());
        let deadline = Instant::now() + Duration::from_secs(1);

        let low = client.infer(&req(20.0, serde_json::json!({})), deadline).await.unwrap();
        let high = client
            .infer(&req(8000.0, serde_json::json!({"txn_count_24h": 15, "account_age_days": 3})), deadline)
            .await
            .unwrap();

        assert!(low.score < high.score);
        assert_eq!(low.decision, Decision::Approve);
        assert!((0.0..=1.0).contains(&high.score));
        assert_eq!(high.reasons, vec!["large_amount", "high_velocity", "new_account"]);
    }

    #[tokio::test]
    async fn expired_deadline_is_unavailable() {
        let client = HeuristicInferenceClient::new(&FusionPolicy::default());
        let err = client.infer(&req(20.0, serde_json::json!({})), Instant::now()).await.unwrap_err();
        assert_eq!(err.client_code().as_str(), "UNAVAILABLE");
    }
}
