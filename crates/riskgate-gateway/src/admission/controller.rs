//! Per-resource admission: flow gating, concurrency slots and circuit breaking.
//!
//! State lives in an arena keyed by resource (`DashMap<String, Arc<ResourceState>>`),
//! created lazily on first traffic. All counters and transitions of one
//! resource are guarded by that resource's mutex; unrelated resources never
//! contend. Rule changes reach the arena through the versioned snapshot: a
//! state rebuilds its controllers when it sees a newer version, keeping the
//! ones whose rule did not change.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::Notify;

use riskgate_core::error::RiskGateError;

use super::circuit::{CircuitBreaker, CircuitState, Probe};
use super::clock::Clock;
use super::flow::{FlowVerdict, QpsController};
use super::rule::RuleKind;
use super::store::{ResourceRules, RuleSnapshot, RuleStore};
use crate::obs::RiskMetrics;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockReason {
    RateLimited,
    CircuitOpen,
}

impl BlockReason {
    pub fn as_str(self) -> &'static str {
        match self {
            BlockReason::RateLimited => "rate_limited",
            BlockReason::CircuitOpen => "circuit_open",
        }
    }
}

impl std::fmt::Display for BlockReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Typed admission rejection.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{reason}: resource={resource} rule={rule_id}")]
pub struct Blocked {
    pub reason: BlockReason,
    pub resource: String,
    pub rule_id: String,
}

impl From<Blocked> for RiskGateError {
    fn from(b: Blocked) -> Self {
        match b.reason {
            BlockReason::RateLimited => RiskGateError::RateLimited { resource: b.resource, rule_id: b.rule_id },
            BlockReason::CircuitOpen => RiskGateError::CircuitOpen { resource: b.resource, rule_id: b.rule_id },
        }
    }
}

/// Outcome of the guarded call, fed back to the circuit breakers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallOutcome {
    Success,
    Error,
}

/// Operator view of one breaker.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CircuitStatus {
    pub resource: String,
    pub rule_id: String,
    pub kind: RuleKind,
    pub state: CircuitState,
    pub opened_at_ms: Option<u64>,
}

#[derive(Debug, Clone, PartialEq)]
struct ConcurrencyLimit {
    rule_id: String,
    max_inflight: u32,
    max_wait_ms: u64,
}

#[derive(Debug, Default)]
struct ResourceInner {
    version: u64,
    qps: Vec<QpsController>,
    breakers: Vec<CircuitBreaker>,
    concurrency: Option<ConcurrencyLimit>,
}

/// Gate passed: how long to queue and which breakers this entry is the trial for.
struct Pass {
    wait_ms: u64,
    trials: Vec<String>,
}

impl ResourceInner {
    /// Adopt a newer rule snapshot. Controllers whose rule is unchanged keep
    /// their windows and circuit state.
    fn sync(&mut self, version: u64, rules: &ResourceRules) {
        if self.version >= version {
            return;
        }
        self.version = version;

        let mut old_qps = std::mem::take(&mut self.qps);
        self.qps = rules
            .flow
            .iter()
            .filter(|r| r.kind == RuleKind::Qps)
            .map(|r| match old_qps.iter().position(|c| c.rule() == r) {
                Some(i) => old_qps.swap_remove(i),
                None => QpsController::new(r.clone()),
            })
            .collect();

        let mut old_breakers = std::mem::take(&mut self.breakers);
        self.breakers = rules
            .degrade
            .iter()
            .map(|r| match old_breakers.iter().position(|b| b.rule() == r) {
                Some(i) => old_breakers.swap_remove(i),
                None => CircuitBreaker::new(r.clone()),
            })
            .collect();

        self.concurrency = rules
            .flow
            .iter()
            .filter(|r| r.kind == RuleKind::Concurrency)
            .min_by(|a, b| a.threshold.total_cmp(&b.threshold))
            .map(|r| ConcurrencyLimit {
                rule_id: r.id.clone(),
                max_inflight: r.threshold.floor() as u32,
                max_wait_ms: r.max_acquire_wait_ms,
            });
    }

    /// Cheap pre-check so an open circuit rejects before any slot is taken.
    fn open_circuit(&self, now_ms: u64) -> Option<String> {
        self.breakers
            .iter()
            .find(|b| b.probe(now_ms) == Probe::Block)
            .map(|b| b.rule().id.clone())
    }

    /// Probe every rule, then commit only if all agree.
    fn gate(&mut self, now_ms: u64) -> Result<Pass, (BlockReason, String)> {
        let mut trials = Vec::new();
        for b in &self.breakers {
            match b.probe(now_ms) {
                Probe::Pass => {}
                Probe::Trial => trials.push(b.rule().id.clone()),
                Probe::Block => return Err((BlockReason::CircuitOpen, b.rule().id.clone())),
            }
        }

        let mut verdicts = Vec::with_capacity(self.qps.len());
        for c in &mut self.qps {
            match c.probe(now_ms) {
                FlowVerdict::Block => {
                    c.record_block(now_ms);
                    return Err((BlockReason::RateLimited, c.rule().id.clone()));
                }
                v => verdicts.push(v),
            }
        }

        let mut wait_ms = 0;
        for (c, v) in self.qps.iter_mut().zip(verdicts) {
            if let FlowVerdict::Pass { wait_ms: w } = v {
                wait_ms = wait_ms.max(w);
            }
            c.commit_pass(now_ms, v);
        }
        for b in &mut self.breakers {
            if trials.iter().any(|id| *id == b.rule().id) {
                b.begin_trial();
            }
        }
        Ok(Pass { wait_ms, trials })
    }
}

struct ResourceState {
    resource: String,
    inner: Mutex<ResourceInner>,
    inflight: AtomicU32,
    released: Notify,
}

impl ResourceState {
    fn new(resource: &str) -> Self {
        Self {
            resource: resource.to_string(),
            inner: Mutex::new(ResourceInner::default()),
            inflight: AtomicU32::new(0),
            released: Notify::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ResourceInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn try_acquire(&self, max_inflight: u32) -> bool {
        self.inflight
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| (n < max_inflight).then_some(n + 1))
            .is_ok()
    }

    /// Take a concurrency slot, waiting at most `max_wait` for one to free up.
    async fn acquire(self: &Arc<Self>, limit: &ConcurrencyLimit) -> Option<SlotPermit> {
        let deadline = tokio::time::Instant::now() + Duration::from_millis(limit.max_wait_ms);
        loop {
            let notified = self.released.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.try_acquire(limit.max_inflight) {
                return Some(SlotPermit { state: Arc::clone(self) });
            }
            if tokio::time::timeout_at(deadline, notified.as_mut()).await.is_err() {
                return self
                    .try_acquire(limit.max_inflight)
                    .then(|| SlotPermit { state: Arc::clone(self) });
            }
        }
    }

    fn release(&self) {
        self.inflight.fetch_sub(1, Ordering::AcqRel);
        self.released.notify_one();
    }
}

/// Held concurrency slot; released on drop.
struct SlotPermit {
    state: Arc<ResourceState>,
}

impl Drop for SlotPermit {
    fn drop(&mut self) {
        self.state.release();
    }
}

pub struct AdmissionController {
    rules: Arc<RuleStore>,
    clock: Arc<dyn Clock>,
    metrics: Arc<RiskMetrics>,
    states: DashMap<String, Arc<ResourceState>>,
}

impl AdmissionController {
    pub fn new(rules: Arc<RuleStore>, clock: Arc<dyn Clock>, metrics: Arc<RiskMetrics>) -> Self {
        Self { rules, clock, metrics, states: DashMap::new() }
    }

    pub fn rules(&self) -> &Arc<RuleStore> {
        &self.rules
    }

    /// Gate one call to `resource`.
    ///
    /// The returned entry must be completed with the call's outcome; dropping
    /// it uncompleted records an error. Suspends only for a queueing wait or
    /// a concurrency slot, both bounded by the rule.
    pub async fn admit(&self, resource: &str) -> Result<AdmissionEntry, Blocked> {
        let snapshot = self.rules.snapshot();
        let Some(rules) = snapshot.for_resource(resource) else {
            self.metrics.admission.inc(&[("resource", resource), ("outcome", "pass")]);
            return Ok(AdmissionEntry { resource: resource.to_string(), guard: None });
        };
        let state = self.state_for(resource);

        let concurrency = {
            let mut inner = state.lock();
            inner.sync(snapshot.version, rules);
            if let Some(rule_id) = inner.open_circuit(self.clock.now_ms()) {
                return Err(self.blocked(BlockReason::CircuitOpen, resource, rule_id));
            }
            inner.concurrency.clone()
        };

        let slot = match &concurrency {
            Some(limit) => match state.acquire(limit).await {
                Some(permit) => Some(permit),
                None => return Err(self.blocked(BlockReason::RateLimited, resource, limit.rule_id.clone())),
            },
            None => None,
        };

        let now = self.clock.now_ms();
        let pass = {
            let mut inner = state.lock();
            inner.gate(now)
        };
        let pass = match pass {
            Ok(pass) => pass,
            // `slot` drops here and frees the concurrency permit
            Err((reason, rule_id)) => return Err(self.blocked(reason, resource, rule_id)),
        };

        for rule_id in &pass.trials {
            tracing::info!(resource=%resource, rule=%rule_id, "circuit half-open, admitting trial");
            self.metrics
                .circuit_transitions
                .inc(&[("resource", resource), ("rule", rule_id), ("to", CircuitState::HalfOpen.as_str())]);
        }
        self.metrics.admission.inc(&[("resource", resource), ("outcome", "pass")]);
        self.metrics.inflight.inc(&[("resource", resource)]);

        let entry = AdmissionEntry {
            resource: resource.to_string(),
            guard: Some(EntryGuard {
                state,
                clock: Arc::clone(&self.clock),
                metrics: Arc::clone(&self.metrics),
                started_ms: now + pass.wait_ms,
                trials: pass.trials,
                _slot: slot,
            }),
        };

        if pass.wait_ms > 0 {
            tracing::debug!(resource=%resource, wait_ms = pass.wait_ms, "queueing for rate slot");
            tokio::time::sleep(Duration::from_millis(pass.wait_ms)).await;
        }
        Ok(entry)
    }

    /// Most restrictive breaker state for `resource`; `None` when it has no
    /// degrade rules.
    pub fn circuit_state(&self, resource: &str) -> Option<CircuitState> {
        let snapshot = self.rules.snapshot();
        let rules = snapshot.for_resource(resource)?;
        if rules.degrade.is_empty() {
            return None;
        }
        let Some(state) = self.states.get(resource).map(|s| Arc::clone(s.value())) else {
            return Some(CircuitState::Closed);
        };
        let mut inner = state.lock();
        inner.sync(snapshot.version, rules);
        inner.breakers.iter().map(|b| b.state()).max_by_key(|s| s.severity())
    }

    /// Every breaker on every resource that has seen traffic.
    pub fn circuits(&self) -> Vec<CircuitStatus> {
        let snapshot = self.rules.snapshot();
        let states: Vec<Arc<ResourceState>> = self.states.iter().map(|s| Arc::clone(s.value())).collect();

        let mut out = Vec::new();
        for state in states {
            let Some(rules) = snapshot.for_resource(&state.resource) else { continue };
            let mut inner = state.lock();
            inner.sync(snapshot.version, rules);
            out.extend(inner.breakers.iter().map(|b| CircuitStatus {
                resource: state.resource.clone(),
                rule_id: b.rule().id.clone(),
                kind: b.rule().kind,
                state: b.state(),
                opened_at_ms: b.opened_at_ms(),
            }));
        }
        out.sort_by(|a, b| (&a.resource, &a.rule_id).cmp(&(&b.resource, &b.rule_id)));
        out
    }

    /// Drop state for resources that no longer have any rule.
    pub fn prune(&self) {
        let snapshot: Arc<RuleSnapshot> = self.rules.snapshot();
        self.states.retain(|resource, _| snapshot.for_resource(resource).is_some());
    }

    fn state_for(&self, resource: &str) -> Arc<ResourceState> {
        if let Some(s) = self.states.get(resource) {
            return Arc::clone(s.value());
        }
        let entry = self
            .states
            .entry(resource.to_string())
            .or_insert_with(|| Arc::new(ResourceState::new(resource)));
        Arc::clone(entry.value())
    }

    fn blocked(&self, reason: BlockReason, resource: &str, rule_id: String) -> Blocked {
        tracing::debug!(resource=%resource, rule=%rule_id, reason=%reason, "admission blocked");
        self.metrics.admission.inc(&[("resource", resource), ("outcome", reason.as_str())]);
        Blocked { reason, resource: resource.to_string(), rule_id }
    }
}

/// Admitted call. Complete it with the call's outcome.
pub struct AdmissionEntry {
    resource: String,
    guard: Option<EntryGuard>,
}

struct EntryGuard {
    state: Arc<ResourceState>,
    clock: Arc<dyn Clock>,
    metrics: Arc<RiskMetrics>,
    started_ms: u64,
    trials: Vec<String>,
    _slot: Option<SlotPermit>,
}

impl AdmissionEntry {
    pub fn resource(&self) -> &str {
        &self.resource
    }

    pub fn complete(mut self, outcome: CallOutcome) {
        if let Some(guard) = self.guard.take() {
            guard.finish(outcome);
        }
    }
}

impl Drop for AdmissionEntry {
    fn drop(&mut self) {
        if let Some(guard) = self.guard.take() {
            guard.finish(CallOutcome::Error);
        }
    }
}

impl EntryGuard {
    fn finish(self, outcome: CallOutcome) {
        let now = self.clock.now_ms();
        let rt_ms = now.saturating_sub(self.started_ms);
        let failed = outcome == CallOutcome::Error;
        let resource = self.state.resource.as_str();

        let mut transitions = Vec::new();
        {
            let mut inner = self.state.lock();
            for b in &mut inner.breakers {
                let was_trial = self.trials.iter().any(|id| *id == b.rule().id);
                if let Some(to) = b.on_complete(now, failed, rt_ms, was_trial) {
                    transitions.push((b.rule().id.clone(), to));
                }
            }
        }

        for (rule_id, to) in transitions {
            match to {
                CircuitState::Open => tracing::warn!(resource=%resource, rule=%rule_id, "circuit opened"),
                _ => tracing::info!(resource=%resource, rule=%rule_id, to = to.as_str(), "circuit transition"),
            }
            self.metrics
                .circuit_transitions
                .inc(&[("resource", resource), ("rule", &rule_id), ("to", to.as_str())]);
        }
        self.metrics.inflight.dec(&[("resource", resource)]);
    }
}
