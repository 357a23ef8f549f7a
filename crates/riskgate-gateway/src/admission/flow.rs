//! Flow (rate) control for `qps` rules.
//!
//! Each controller is checked in two phases: `probe` decides without side
//! effects, `commit_pass` / `record_block` update state. The caller commits
//! only after every rule on the resource agreed, so a request rejected by a
//! later rule never consumes quota from an earlier one.

use super::rule::{AdmissionRule, ControlStrategy};
use super::window::SlidingWindow;

#[derive(Debug, Default)]
struct FlowBucket {
    pass: u64,
    block: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FlowVerdict {
    /// Admit after waiting `wait_ms` (non-zero only for queueing).
    Pass { wait_ms: u64 },
    Block,
}

#[derive(Debug)]
pub(crate) struct QpsController {
    rule: AdmissionRule,
    window: SlidingWindow<FlowBucket>,
    // warm-up
    warm_started_ms: Option<u64>,
    last_pass_ms: Option<u64>,
    // queueing: virtual time of the last scheduled pass
    latest_passed_ms: Option<f64>,
}

impl QpsController {
    pub(crate) fn new(rule: AdmissionRule) -> Self {
        Self {
            window: SlidingWindow::new(rule.stat_window_ms),
            rule,
            warm_started_ms: None,
            last_pass_ms: None,
            latest_passed_ms: None,
        }
    }

    pub(crate) fn rule(&self) -> &AdmissionRule {
        &self.rule
    }

    pub(crate) fn passed(&self, now_ms: u64) -> u64 {
        self.window.live(now_ms).map(|b| b.pass).sum()
    }

    #[cfg(test)]
    pub(crate) fn blocked(&self, now_ms: u64) -> u64 {
        self.window.live(now_ms).map(|b| b.block).sum()
    }

    pub(crate) fn probe(&self, now_ms: u64) -> FlowVerdict {
        match self.rule.strategy {
            ControlStrategy::DirectReject => self.check_count(now_ms, self.rule.threshold),
            ControlStrategy::WarmUp => self.check_count(now_ms, self.warm_threshold(now_ms)),
            ControlStrategy::Queueing => self.check_queue(now_ms),
        }
    }

    pub(crate) fn commit_pass(&mut self, now_ms: u64, verdict: FlowVerdict) {
        self.window.current(now_ms).pass += 1;

        match self.rule.strategy {
            ControlStrategy::DirectReject => {}
            ControlStrategy::WarmUp => {
                if self.is_cold(now_ms) {
                    self.warm_started_ms = Some(now_ms);
                }
                self.last_pass_ms = Some(now_ms);
            }
            ControlStrategy::Queueing => {
                let wait_ms = match verdict {
                    FlowVerdict::Pass { wait_ms } => wait_ms,
                    FlowVerdict::Block => 0,
                };
                self.latest_passed_ms = Some(match self.latest_passed_ms {
                    Some(latest) if wait_ms > 0 => latest + self.cost_ms(),
                    _ => now_ms as f64,
                });
            }
        }
    }

    pub(crate) fn record_block(&mut self, now_ms: u64) {
        self.window.current(now_ms).block += 1;
    }

    fn check_count(&self, now_ms: u64, allowed: f64) -> FlowVerdict {
        if (self.passed(now_ms) + 1) as f64 > allowed {
            FlowVerdict::Block
        } else {
            FlowVerdict::Pass { wait_ms: 0 }
        }
    }

    /// Idle for a full warm-up period (or never used) means cold.
    fn is_cold(&self, now_ms: u64) -> bool {
        match (self.warm_started_ms, self.last_pass_ms) {
            (Some(_), Some(last)) => now_ms.saturating_sub(last) >= self.rule.warm_up_period_ms,
            _ => true,
        }
    }

    /// Allowed passes per window: ramps linearly from `threshold / cold_factor`
    /// (at least 1) to `threshold` over `warm_up_period_ms` after a cold start.
    pub(crate) fn warm_threshold(&self, now_ms: u64) -> f64 {
        let full = self.rule.threshold;
        let cold = (full / f64::from(self.rule.cold_factor.max(1))).max(1.0).min(full);

        let started = match self.warm_started_ms {
            Some(s) if !self.is_cold(now_ms) => s,
            _ => now_ms,
        };
        let period = self.rule.warm_up_period_ms.max(1) as f64;
        let progress = (now_ms.saturating_sub(started) as f64 / period).min(1.0);

        cold + (full - cold) * progress
    }

    /// Spacing between admitted requests to stay at `threshold` per window.
    fn cost_ms(&self) -> f64 {
        self.window.interval_ms() as f64 / self.rule.threshold
    }

    fn check_queue(&self, now_ms: u64) -> FlowVerdict {
        let Some(latest) = self.latest_passed_ms else {
            return FlowVerdict::Pass { wait_ms: 0 };
        };
        let expected = latest + self.cost_ms();
        let now = now_ms as f64;
        if expected <= now {
            return FlowVerdict::Pass { wait_ms: 0 };
        }
        let wait_ms = (expected - now).ceil() as u64;
        if wait_ms > self.rule.max_queueing_ms {
            FlowVerdict::Block
        } else {
            FlowVerdict::Pass { wait_ms }
        }
    }
}
