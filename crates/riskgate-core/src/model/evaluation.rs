//! Evaluation result (one per request, immutable once produced).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Final risk decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Decision {
    Approve,
    Review,
    Reject,
}

impl Decision {
    /// Threshold mapping shared by every path that derives a decision from a
    /// numeric score: `>= reject` rejects, `>= review` reviews, else approve.
    pub fn from_score(score: f64, review_threshold: f64, reject_threshold: f64) -> Self {
        if score >= reject_threshold {
            Decision::Reject
        } else if score >= review_threshold {
            Decision::Review
        } else {
            Decision::Approve
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Decision::Approve => "APPROVE",
            Decision::Review => "REVIEW",
            Decision::Reject => "REJECT",
        }
    }
}

/// Which source produced the final score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelUsed {
    Rules,
    Model,
    Hybrid,
    Mock,
    Error,
}

impl ModelUsed {
    pub fn as_str(self) -> &'static str {
        match self {
            ModelUsed::Rules => "rules",
            ModelUsed::Model => "model",
            ModelUsed::Hybrid => "hybrid",
            ModelUsed::Mock => "mock",
            ModelUsed::Error => "error",
        }
    }
}

/// Degraded-signal substitution applied during evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Fallback {
    ModelToRules,
}

impl Fallback {
    pub fn as_str(self) -> &'static str {
        match self {
            Fallback::ModelToRules => "model_to_rules",
        }
    }
}

/// Diagnostic reason tags appended by the orchestrator.
pub mod reasons {
    pub const RULES_FAILED: &str = "rules_failed";
    pub const MODEL_FAILED: &str = "model_failed";
    pub const MODEL_FALLBACK_TO_RULES: &str = "model_fallback_to_rules";
    pub const HYBRID_DECISION: &str = "hybrid_decision";
    pub const EVALUATION_ERROR: &str = "evaluation_error";
}

/// Safe-default score used whenever no source produced one.
pub const SAFE_DEFAULT_SCORE: f64 = 0.5;

/// Decision-bearing output of the orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationResult {
    pub transaction_id: String,
    pub decision: Decision,
    /// Final score in [0, 1].
    pub risk_score: f64,
    /// Ordered diagnostic tags.
    pub reasons: Vec<String>,
    pub rules_triggered: Vec<String>,
    pub model_used: ModelUsed,
    pub fallback_used: Option<Fallback>,
    pub processed_at: DateTime<Utc>,
    pub debug_info: Option<String>,
}

impl EvaluationResult {
    /// Fail-to-review result for an unrecoverable evaluation error.
    pub fn evaluation_error(transaction_id: &str, cause: impl Into<String>) -> Self {
        Self {
            transaction_id: transaction_id.to_string(),
            decision: Decision::Review,
            risk_score: SAFE_DEFAULT_SCORE,
            reasons: vec![reasons::EVALUATION_ERROR.to_string()],
            rules_triggered: Vec::new(),
            model_used: ModelUsed::Error,
            fallback_used: None,
            processed_at: Utc::now(),
            debug_info: Some(cause.into()),
        }
    }

    /// True when the evaluation itself failed (not merely degraded).
    pub fn is_error(&self) -> bool {
        self.model_used == ModelUsed::Error
    }

    /// True when no source produced a score and the decision is the safe
    /// default: the source named by `model_used` is also tagged as failed.
    pub fn is_unscored(&self) -> bool {
        let tagged = |tag: &str| self.reasons.iter().any(|r| r == tag);
        match self.model_used {
            ModelUsed::Rules => tagged(reasons::RULES_FAILED),
            ModelUsed::Model => tagged(reasons::MODEL_FAILED),
            ModelUsed::Error => true,
            ModelUsed::Hybrid | ModelUsed::Mock => false,
        }
    }
}
