//! Decision orchestrator: runs the rule and model paths, applies fallback and
//! fuses the scores into one `EvaluationResult`.
//!
//! `evaluate` never fails. Source errors and timeouts are folded into the
//! result's `reasons` / `fallback_used` / `model_used`; anything that escapes
//! (including a panic) becomes the fail-to-review result.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant as StdInstant;

use chrono::Utc;
use futures_util::FutureExt;

use riskgate_core::error::{Result, RiskGateError};
use riskgate_core::model::evaluation::{reasons as tag, SAFE_DEFAULT_SCORE};
use riskgate_core::{Decision, EvaluationResult, Fallback, ModelUsed, TransactionRequest};

use super::policy::{FusionMode, FusionPolicy};
use super::source::{InferenceClient, ModelOutcome, RuleEvaluator, RuleOutcome};
use crate::obs::RiskMetrics;

const MOCK_DEBUG_INFO: &str = "mock evaluation, no downstream sources called";

pub struct DecisionOrchestrator {
    rules: Arc<dyn RuleEvaluator>,
    model: Arc<dyn InferenceClient>,
    metrics: Arc<RiskMetrics>,
}

enum Failure {
    Error,
    Timeout,
}

impl Failure {
    fn as_str(&self) -> &'static str {
        match self {
            Failure::Error => "error",
            Failure::Timeout => "timeout",
        }
    }
}

impl DecisionOrchestrator {
    pub fn new(rules: Arc<dyn RuleEvaluator>, model: Arc<dyn InferenceClient>, metrics: Arc<RiskMetrics>) -> Self {
        Self { rules, model, metrics }
    }

    /// Evaluate `req` under `policy`. Never fails: errors and panics become a
    /// REVIEW at the safe default score.
    ///
    /// `policy.review_threshold` / `reject_threshold` only classify fused
    /// HYBRID scores. A result scored by a single source (fallback, the other
    /// source failed, or a `*_only` mode) keeps the decision that source
    /// computed with its own thresholds, so the two can disagree when the
    /// sources were built with different cut-offs than `policy`.
    pub async fn evaluate(&self, req: &TransactionRequest, policy: &FusionPolicy) -> EvaluationResult {
        let started = StdInstant::now();

        let result = match AssertUnwindSafe(self.evaluate_inner(req, policy)).catch_unwind().await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => {
                tracing::error!(txid=%req.transaction_id, error=%e, "evaluation failed, defaulting to review");
                EvaluationResult::evaluation_error(&req.transaction_id, e.to_string())
            }
            Err(panic) => {
                let cause = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "panic during evaluation".to_string());
                tracing::error!(txid=%req.transaction_id, cause=%cause, "evaluation panicked, defaulting to review");
                EvaluationResult::evaluation_error(&req.transaction_id, cause)
            }
        };

        let used = result.model_used.as_str();
        self.metrics
            .evaluations
            .inc(&[("decision", result.decision.as_str()), ("model_used", used)]);
        self.metrics
            .evaluation_duration
            .observe(&[("model_used", used)], started.elapsed());
        tracing::info!(
            txid=%result.transaction_id,
            decision=%result.decision.as_str(),
            score=result.risk_score,
            model_used=used,
            latency_ms=started.elapsed().as_millis() as u64,
            "evaluation completed"
        );
        result
    }

    async fn evaluate_inner(&self, req: &TransactionRequest, policy: &FusionPolicy) -> Result<EvaluationResult> {
        policy.validate()?;
        if policy.mock_mode {
            return Ok(mock_evaluation(req));
        }

        let (rule, model) = tokio::join!(self.run_rules(req, policy), self.run_model(req, policy));

        let mut reasons = Vec::new();
        let rule = match rule {
            Some(Ok(outcome)) => Some(outcome),
            Some(Err(e)) => {
                tracing::warn!(txid=%req.transaction_id, error=%e, "rule evaluation failed");
                reasons.push(tag::RULES_FAILED.to_string());
                None
            }
            None => None,
        };

        let mut fallback_used = None;
        let model = match model {
            Some(Ok(outcome)) => {
                tracing::debug!(txid=%req.transaction_id, score=outcome.score, reasons=?outcome.reasons, "model evaluated");
                Some((outcome.score, outcome.decision))
            }
            Some(Err(e)) => match (&rule, policy.enable_fallback) {
                (Some(r), true) => {
                    tracing::info!(txid=%req.transaction_id, error=%e, "model unavailable, falling back to rules");
                    self.metrics.fallbacks.inc(&[("kind", Fallback::ModelToRules.as_str())]);
                    fallback_used = Some(Fallback::ModelToRules);
                    reasons.push(tag::MODEL_FALLBACK_TO_RULES.to_string());
                    Some((r.score, r.decision))
                }
                _ => {
                    tracing::warn!(txid=%req.transaction_id, error=%e, "model unavailable, no fallback");
                    reasons.push(tag::MODEL_FAILED.to_string());
                    None
                }
            },
            None => None,
        };

        let (risk_score, decision, model_used) = match policy.mode {
            FusionMode::Hybrid => match (&rule, model) {
                (Some(r), Some((model_score, _))) => {
                    let score = policy.fuse(r.score, model_score);
                    reasons.push(tag::HYBRID_DECISION.to_string());
                    (score, policy.decide(score), ModelUsed::Hybrid)
                }
                (None, Some((score, decision))) => (score, decision, ModelUsed::Model),
                (Some(r), None) => (r.score, r.decision, ModelUsed::Rules),
                (None, None) => (SAFE_DEFAULT_SCORE, Decision::Review, ModelUsed::Rules),
            },
            FusionMode::ModelOnly => match model {
                Some((score, decision)) => (score, decision, ModelUsed::Model),
                None => (SAFE_DEFAULT_SCORE, Decision::Review, ModelUsed::Model),
            },
            FusionMode::RulesOnly => match &rule {
                Some(r) => (r.score, r.decision, ModelUsed::Rules),
                None => (SAFE_DEFAULT_SCORE, Decision::Review, ModelUsed::Rules),
            },
        };

        if !(0.0..=1.0).contains(&risk_score) {
            return Err(RiskGateError::EvaluationError(format!("fused score out of range: {risk_score}")));
        }

        Ok(EvaluationResult {
            transaction_id: req.transaction_id.clone(),
            decision,
            risk_score,
            reasons,
            rules_triggered: rule.map(|r| r.triggered).unwrap_or_default(),
            model_used,
            fallback_used,
            processed_at: Utc::now(),
            debug_info: None,
        })
    }

    /// Rule path on a blocking worker under its own timeout. A timed-out
    /// worker is abandoned, not joined.
    async fn run_rules(&self, req: &TransactionRequest, policy: &FusionPolicy) -> Option<Result<RuleOutcome>> {
        if !policy.mode.runs_rules() {
            return None;
        }
        let rules = Arc::clone(&self.rules);
        let owned = req.clone();
        let task = tokio::task::spawn_blocking(move || rules.evaluate_rules(&owned));

        let outcome = match tokio::time::timeout(policy.rule_timeout(), task).await {
            Ok(Ok(Ok(outcome))) if (0.0..=1.0).contains(&outcome.score) => Ok(outcome),
            Ok(Ok(Ok(outcome))) => Err((
                Failure::Error,
                RiskGateError::RuleEvaluationFailed(format!("invalid rule score {}", outcome.score)),
            )),
            Ok(Ok(Err(e))) => Err((Failure::Error, e)),
            Ok(Err(join)) => Err((Failure::Error, RiskGateError::RuleEvaluationFailed(format!("rule worker failed: {join}")))),
            Err(_) => Err((
                Failure::Timeout,
                RiskGateError::RuleEvaluationFailed(format!("timed out after {}ms", policy.rule_timeout_ms)),
            )),
        };
        Some(outcome.map_err(|(kind, e)| self.source_failed("rules", kind, e)))
    }

    /// Model path under its own deadline, independent of the rule budget.
    async fn run_model(&self, req: &TransactionRequest, policy: &FusionPolicy) -> Option<Result<ModelOutcome>> {
        if !policy.mode.runs_model() {
            return None;
        }
        let deadline = tokio::time::Instant::now() + policy.model_timeout();

        let outcome = match tokio::time::timeout_at(deadline, self.model.infer(req, deadline)).await {
            Ok(Ok(outcome)) if (0.0..=1.0).contains(&outcome.score) => Ok(outcome),
            Ok(Ok(outcome)) => Err((
                Failure::Error,
                RiskGateError::ModelUnavailable(format!("invalid model score {}", outcome.score)),
            )),
            Ok(Err(e)) => Err((Failure::Error, e)),
            Err(_) => Err((
                Failure::Timeout,
                RiskGateError::ModelUnavailable(format!("timed out after {}ms", policy.model_timeout_ms)),
            )),
        };
        Some(outcome.map_err(|(kind, e)| self.source_failed("model", kind, e)))
    }

    fn source_failed(&self, source: &str, kind: Failure, e: RiskGateError) -> RiskGateError {
        self.metrics
            .source_failures
            .inc(&[("source", source), ("kind", kind.as_str())]);
        e
    }
}

/// Amount-only evaluation used in mock mode.
fn mock_evaluation(req: &TransactionRequest) -> EvaluationResult {
    let (decision, risk_score, reason) = if req.amount > 5000.0 {
        (Decision::Reject, 0.75, "very_high_amount_mock")
    } else if req.amount > 1000.0 {
        (Decision::Review, 0.55, "high_amount_mock")
    } else {
        (Decision::Approve, 0.15, "normal_amount_mock")
    };
    tracing::debug!(txid=%req.transaction_id, "mock evaluation");

    EvaluationResult {
        transaction_id: req.transaction_id.clone(),
        decision,
        risk_score,
        reasons: vec![reason.to_string()],
        rules_triggered: Vec::new(),
        model_used: ModelUsed::Mock,
        fallback_used: None,
        processed_at: Utc::now(),
        debug_info: Some(MOCK_DEBUG_INFO.to_string()),
    }
}
