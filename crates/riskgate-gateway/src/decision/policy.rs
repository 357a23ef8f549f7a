//! Fusion policy (the `orchestrator` config section).

use std::time::Duration;

use serde::{Deserialize, Serialize};

use riskgate_core::error::{Result, RiskGateError};
use riskgate_core::Decision;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FusionMode {
    #[default]
    Hybrid,
    RulesOnly,
    ModelOnly,
}

impl FusionMode {
    pub fn runs_rules(self) -> bool {
        self != FusionMode::ModelOnly
    }

    pub fn runs_model(self) -> bool {
        self != FusionMode::RulesOnly
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FusionPolicy {
    #[serde(default)]
    pub mode: FusionMode,
    #[serde(default = "default_model_weight")]
    pub model_weight: f64,
    #[serde(default = "default_rule_weight")]
    pub rule_weight: f64,
    #[serde(default = "default_review_threshold")]
    pub review_threshold: f64,
    #[serde(default = "default_reject_threshold")]
    pub reject_threshold: f64,
    #[serde(default = "default_true")]
    pub enable_fallback: bool,
    #[serde(default = "default_rule_timeout_ms")]
    pub rule_timeout_ms: u64,
    #[serde(default = "default_model_timeout_ms")]
    pub model_timeout_ms: u64,
    /// Amount-only evaluation; neither source is called.
    #[serde(default)]
    pub mock_mode: bool,
}

fn default_model_weight() -> f64 {
    0.7
}
fn default_rule_weight() -> f64 {
    0.3
}
fn default_review_threshold() -> f64 {
    0.5
}
fn default_reject_threshold() -> f64 {
    0.7
}
fn default_true() -> bool {
    true
}
fn default_rule_timeout_ms() -> u64 {
    1000
}
fn default_model_timeout_ms() -> u64 {
    3000
}

impl Default for FusionPolicy {
    fn default() -> Self {
        Self {
            mode: FusionMode::default(),
            model_weight: default_model_weight(),
            rule_weight: default_rule_weight(),
            review_threshold: default_review_threshold(),
            reject_threshold: default_reject_threshold(),
            enable_fallback: true,
            rule_timeout_ms: default_rule_timeout_ms(),
            model_timeout_ms: default_model_timeout_ms(),
            mock_mode: false,
        }
    }
}

impl FusionPolicy {
    pub fn validate(&self) -> Result<()> {
        let bad = |msg: String| Err(RiskGateError::BadRequest(format!("orchestrator.{msg}")));

        for (name, w) in [("model_weight", self.model_weight), ("rule_weight", self.rule_weight)] {
            if !(0.0..=1.0).contains(&w) {
                return bad(format!("{name} must be within [0, 1] (got {w})"));
            }
        }
        if (self.model_weight + self.rule_weight - 1.0).abs() > 1e-9 {
            return bad(format!(
                "model_weight + rule_weight must equal 1 (got {} + {})",
                self.model_weight, self.rule_weight
            ));
        }
        if !(0.0..=1.0).contains(&self.review_threshold) || !(0.0..=1.0).contains(&self.reject_threshold) {
            return bad("thresholds must be within [0, 1]".into());
        }
        if self.review_threshold >= self.reject_threshold {
            return bad(format!(
                "review_threshold ({}) must be below reject_threshold ({})",
                self.review_threshold, self.reject_threshold
            ));
        }
        if self.rule_timeout_ms == 0 || self.model_timeout_ms == 0 {
            return bad("rule_timeout_ms and model_timeout_ms must be >= 1".into());
        }
        Ok(())
    }

    pub fn rule_timeout(&self) -> Duration {
        Duration::from_millis(self.rule_timeout_ms)
    }

    pub fn model_timeout(&self) -> Duration {
        Duration::from_millis(self.model_timeout_ms)
    }

    pub fn decide(&self, score: f64) -> Decision {
        Decision::from_score(score, self.review_threshold, self.reject_threshold)
    }

    /// Weighted blend `model * model_weight + rule * rule_weight`.
    ///
    /// Written as an interpolation from the rule score so that identical
    /// inputs (model fell back to rules) return the rule score bit for bit.
    pub fn fuse(&self, rule_score: f64, model_score: f64) -> f64 {
        rule_score + (model_score - rule_score) * self.model_weight
    }
}
