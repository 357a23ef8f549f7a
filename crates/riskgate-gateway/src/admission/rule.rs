//! Admission rule definitions (flow + degrade).

use serde::{Deserialize, Serialize};

use riskgate_core::error::{Result, RiskGateError};

/// What a rule measures.
///
/// `Qps`/`Concurrency` are flow (rate) rules; `ErrorRatio`/`SlowRatio` are
/// degrade (circuit breaker) rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleKind {
    Qps,
    Concurrency,
    ErrorRatio,
    SlowRatio,
}

impl RuleKind {
    pub fn is_flow(self) -> bool {
        matches!(self, RuleKind::Qps | RuleKind::Concurrency)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RuleKind::Qps => "qps",
            RuleKind::Concurrency => "concurrency",
            RuleKind::ErrorRatio => "error_ratio",
            RuleKind::SlowRatio => "slow_ratio",
        }
    }
}

/// Control behavior for `qps` rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlStrategy {
    #[default]
    DirectReject,
    WarmUp,
    Queueing,
}

/// One admission rule. Identified by `id`; several rules may target the same
/// resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AdmissionRule {
    /// Stable id. Empty ids are filled as `{resource}:{kind}`.
    #[serde(default)]
    pub id: String,
    pub resource: String,
    pub kind: RuleKind,
    /// qps: passes per stat window. concurrency: max in-flight.
    /// error_ratio / slow_ratio: trip ratio in (0, 1].
    pub threshold: f64,
    #[serde(default)]
    pub strategy: ControlStrategy,
    #[serde(default = "default_stat_window_ms")]
    pub stat_window_ms: u64,
    #[serde(default = "default_recovery_window_ms")]
    pub recovery_window_ms: u64,
    #[serde(default = "default_min_sample_count")]
    pub min_sample_count: u32,
    /// A completed call slower than this counts as slow.
    #[serde(default = "default_slow_rt_ms")]
    pub slow_rt_ms: u64,
    #[serde(default = "default_warm_up_period_ms")]
    pub warm_up_period_ms: u64,
    /// Warm-up starts at `threshold / cold_factor`.
    #[serde(default = "default_cold_factor")]
    pub cold_factor: u32,
    #[serde(default = "default_max_queueing_ms")]
    pub max_queueing_ms: u64,
    /// Bounded wait for a concurrency slot.
    #[serde(default = "default_max_acquire_wait_ms")]
    pub max_acquire_wait_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

fn default_stat_window_ms() -> u64 {
    1000
}
fn default_recovery_window_ms() -> u64 {
    10_000
}
fn default_min_sample_count() -> u32 {
    5
}
fn default_slow_rt_ms() -> u64 {
    3000
}
fn default_warm_up_period_ms() -> u64 {
    10_000
}
fn default_cold_factor() -> u32 {
    3
}
fn default_max_queueing_ms() -> u64 {
    500
}
fn default_max_acquire_wait_ms() -> u64 {
    10
}

impl AdmissionRule {
    /// Rule with defaults for everything but the identifying fields.
    pub fn new(resource: impl Into<String>, kind: RuleKind, threshold: f64) -> Self {
        let mut rule = Self {
            id: String::new(),
            resource: resource.into(),
            kind,
            threshold,
            strategy: ControlStrategy::default(),
            stat_window_ms: default_stat_window_ms(),
            recovery_window_ms: default_recovery_window_ms(),
            min_sample_count: default_min_sample_count(),
            slow_rt_ms: default_slow_rt_ms(),
            warm_up_period_ms: default_warm_up_period_ms(),
            cold_factor: default_cold_factor(),
            max_queueing_ms: default_max_queueing_ms(),
            max_acquire_wait_ms: default_max_acquire_wait_ms(),
            description: None,
        };
        rule.normalize();
        rule
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_strategy(mut self, strategy: ControlStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Fill derived fields (currently the default id).
    pub fn normalize(&mut self) {
        if self.id.trim().is_empty() {
            self.id = format!("{}:{}", self.resource, self.kind.as_str());
        }
    }

    pub fn validate(&self) -> Result<()> {
        let bad = |msg: String| Err(RiskGateError::BadRequest(format!("rule {}: {msg}", self.id)));

        if self.resource.trim().is_empty() {
            return bad("resource must not be empty".into());
        }
        if !self.threshold.is_finite() || self.threshold <= 0.0 {
            return bad(format!("threshold must be > 0 (got {})", self.threshold));
        }
        if self.stat_window_ms == 0 {
            return bad("stat_window_ms must be >= 1".into());
        }

        match self.kind {
            RuleKind::Qps => match self.strategy {
                ControlStrategy::WarmUp => {
                    if self.cold_factor < 2 {
                        return bad("cold_factor must be >= 2".into());
                    }
                    if self.warm_up_period_ms == 0 {
                        return bad("warm_up_period_ms must be >= 1".into());
                    }
                }
                ControlStrategy::Queueing | ControlStrategy::DirectReject => {}
            },
            RuleKind::Concurrency => {
                if self.threshold < 1.0 {
                    return bad(format!("concurrency threshold must be >= 1 (got {})", self.threshold));
                }
                if self.strategy != ControlStrategy::DirectReject {
                    return bad("concurrency rules only support direct_reject".into());
                }
            }
            RuleKind::ErrorRatio | RuleKind::SlowRatio => {
                if self.threshold > 1.0 {
                    return bad(format!("ratio threshold must be <= 1 (got {})", self.threshold));
                }
                if self.min_sample_count == 0 {
                    return bad("min_sample_count must be >= 1".into());
                }
                if self.recovery_window_ms == 0 {
                    return bad("recovery_window_ms must be >= 1".into());
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_id_is_resource_and_kind() {
        let r = AdmissionRule::new("/v1/evaluate", RuleKind::Qps, 10.0);
        assert_eq!(r.id, "/v1/evaluate:qps");
        assert!(r.validate().is_ok());
    }

    #[test]
    fn ratio_above_one_rejected() {
        let r = AdmissionRule::new("r", RuleKind::ErrorRatio, 1.5);
        assert!(r.validate().is_err());
    }

    #[test]
    fn concurrency_cannot_warm_up() {
        let r = AdmissionRule::new("r", RuleKind::Concurrency, 4.0)
            .with_strategy(ControlStrategy::WarmUp);
        assert!(r.validate().is_err());
    }
}
