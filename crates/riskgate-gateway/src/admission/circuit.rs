//! Circuit breaker for degrade (`error_ratio` / `slow_ratio`) rules.
//!
//! ```text
//! CLOSED --(samples >= min && ratio >= threshold)--> OPEN
//! OPEN --(recovery window elapsed, next request)--> HALF_OPEN (one trial)
//! HALF_OPEN --(trial ok)--> CLOSED
//! HALF_OPEN --(trial error or slow)--> OPEN (openedAt reset)
//! ```

use serde::Serialize;

use super::rule::{AdmissionRule, RuleKind};
use super::window::SlidingWindow;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(self) -> &'static str {
        match self {
            CircuitState::Closed => "CLOSED",
            CircuitState::Open => "OPEN",
            CircuitState::HalfOpen => "HALF_OPEN",
        }
    }

    /// Ordering used to report the most restrictive of several breakers.
    pub(crate) fn severity(self) -> u8 {
        match self {
            CircuitState::Closed => 0,
            CircuitState::HalfOpen => 1,
            CircuitState::Open => 2,
        }
    }
}

#[derive(Debug, Default)]
struct OutcomeBucket {
    total: u64,
    errors: u64,
    slow: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Probe {
    Pass,
    /// Recovery window elapsed; this request would be the half-open trial.
    Trial,
    Block,
}

#[derive(Debug)]
pub(crate) struct CircuitBreaker {
    rule: AdmissionRule,
    state: CircuitState,
    opened_at_ms: u64,
    trial_outstanding: bool,
    window: SlidingWindow<OutcomeBucket>,
}

impl CircuitBreaker {
    pub(crate) fn new(rule: AdmissionRule) -> Self {
        Self {
            window: SlidingWindow::new(rule.stat_window_ms),
            rule,
            state: CircuitState::Closed,
            opened_at_ms: 0,
            trial_outstanding: false,
        }
    }

    pub(crate) fn rule(&self) -> &AdmissionRule {
        &self.rule
    }

    pub(crate) fn state(&self) -> CircuitState {
        self.state
    }

    pub(crate) fn opened_at_ms(&self) -> Option<u64> {
        (self.state != CircuitState::Closed).then_some(self.opened_at_ms)
    }

    pub(crate) fn probe(&self, now_ms: u64) -> Probe {
        match self.state {
            CircuitState::Closed => Probe::Pass,
            CircuitState::Open => {
                let recovered = now_ms.saturating_sub(self.opened_at_ms) >= self.rule.recovery_window_ms;
                if recovered && !self.trial_outstanding {
                    Probe::Trial
                } else {
                    Probe::Block
                }
            }
            CircuitState::HalfOpen => Probe::Block,
        }
    }

    /// OPEN -> HALF_OPEN; the caller's request becomes the single trial.
    pub(crate) fn begin_trial(&mut self) {
        self.state = CircuitState::HalfOpen;
        self.trial_outstanding = true;
    }

    /// Record a finished call. Returns the new state on a transition.
    pub(crate) fn on_complete(&mut self, now_ms: u64, failed: bool, rt_ms: u64, was_trial: bool) -> Option<CircuitState> {
        let slow = rt_ms > self.rule.slow_rt_ms;

        match self.state {
            CircuitState::HalfOpen if was_trial => {
                self.trial_outstanding = false;
                if failed || slow {
                    self.trip(now_ms);
                    Some(CircuitState::Open)
                } else {
                    self.state = CircuitState::Closed;
                    self.window.reset();
                    Some(CircuitState::Closed)
                }
            }
            // stragglers admitted before the trip do not vote
            CircuitState::HalfOpen | CircuitState::Open => None,
            CircuitState::Closed => {
                let b = self.window.current(now_ms);
                b.total += 1;
                b.errors += u64::from(failed);
                b.slow += u64::from(slow);

                if self.should_trip(now_ms) {
                    self.trip(now_ms);
                    Some(CircuitState::Open)
                } else {
                    None
                }
            }
        }
    }

    fn should_trip(&self, now_ms: u64) -> bool {
        let (mut total, mut errors, mut slow) = (0u64, 0u64, 0u64);
        for b in self.window.live(now_ms) {
            total += b.total;
            errors += b.errors;
            slow += b.slow;
        }
        if total < u64::from(self.rule.min_sample_count) || total == 0 {
            return false;
        }
        let hits = match self.rule.kind {
            RuleKind::SlowRatio => slow,
            _ => errors,
        };
        hits as f64 / total as f64 >= self.rule.threshold
    }

    fn trip(&mut self, now_ms: u64) {
        self.state = CircuitState::Open;
        self.opened_at_ms = now_ms;
        self.trial_outstanding = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker() -> CircuitBreaker {
        let mut rule = AdmissionRule::new("r", RuleKind::ErrorRatio, 0.5);
        rule.min_sample_count = 5;
        rule.recovery_window_ms = 10_000;
        CircuitBreaker::new(rule)
    }

    #[test]
    fn trips_only_after_min_samples() {
        let mut b = breaker();
        for _ in 0..3 {
            assert_eq!(b.on_complete(0, true, 1, false), None);
        }
        assert_eq!(b.on_complete(0, false, 1, false), None);
        assert_eq!(b.on_complete(0, false, 1, false), Some(CircuitState::Open));
        assert_eq!(b.probe(9_999), Probe::Block);
        assert_eq!(b.probe(10_000), Probe::Trial);
    }

    #[test]
    fn slow_trial_reopens() {
        let mut b = breaker();
        for _ in 0..5 {
            b.on_complete(0, true, 1, false);
        }
        b.begin_trial();
        assert_eq!(b.probe(20_000), Probe::Block);
        let slow_rt = b.rule().slow_rt_ms + 1;
        assert_eq!(b.on_complete(20_000, false, slow_rt, true), Some(CircuitState::Open));
        assert_eq!(b.opened_at_ms(), Some(20_000));
        assert_eq!(b.probe(29_999), Probe::Block);
    }

    #[test]
    fn slow_ratio_counts_latency() {
        let mut rule = AdmissionRule::new("r", RuleKind::SlowRatio, 0.5);
        rule.min_sample_count = 2;
        rule.slow_rt_ms = 100;
        let mut b = CircuitBreaker::new(rule);
        assert_eq!(b.on_complete(0, false, 150, false), None);
        assert_eq!(b.on_complete(0, false, 10, false), Some(CircuitState::Open));
    }
}
