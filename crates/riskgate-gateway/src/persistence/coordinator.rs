//! Persistence coordinator: records a finished evaluation without ever
//! affecting it.
//!
//! - sync: one write attempt before returning; failure is logged
//! - async: a background task with bounded retries and doubling backoff
//!
//! A duplicate create counts as done, so a retried or repeated record of the
//! same transaction converges on one transaction row and one decision row.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;

use riskgate_core::error::{Result, RiskGateError};
use riskgate_core::{EvaluationResult, TransactionRequest};

use super::store::{DecisionRecord, TransactionRecord, TransactionStore};
use crate::obs::RiskMetrics;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PersistenceMode {
    Sync,
    #[default]
    Async,
}

impl PersistenceMode {
    pub fn as_str(self) -> &'static str {
        match self {
            PersistenceMode::Sync => "sync",
            PersistenceMode::Async => "async",
        }
    }
}

/// The `persistence` config section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PersistenceConfig {
    #[serde(default)]
    pub mode: PersistenceMode,
    /// Bound on each store call of one write attempt (both modes).
    #[serde(default = "default_sync_timeout_ms")]
    pub sync_timeout_ms: u64,
    /// Total attempts in async mode.
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,
    /// Delay before the first retry; doubles after each failure.
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
}

fn default_sync_timeout_ms() -> u64 {
    3000
}
fn default_retry_attempts() -> u32 {
    3
}
fn default_retry_backoff_ms() -> u64 {
    100
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            mode: PersistenceMode::default(),
            sync_timeout_ms: default_sync_timeout_ms(),
            retry_attempts: default_retry_attempts(),
            retry_backoff_ms: default_retry_backoff_ms(),
        }
    }
}

impl PersistenceConfig {
    pub fn validate(&self) -> Result<()> {
        if self.sync_timeout_ms == 0 {
            return Err(RiskGateError::BadRequest("persistence.sync_timeout_ms must be >= 1".into()));
        }
        if !(1..=10).contains(&self.retry_attempts) {
            return Err(RiskGateError::BadRequest(
                "persistence.retry_attempts must be between 1 and 10".into(),
            ));
        }
        Ok(())
    }
}

/// What `record` did.
#[derive(Debug)]
pub enum Recorded {
    /// Sync write finished.
    Written,
    /// Sync write failed or timed out; already logged.
    Failed(RiskGateError),
    /// Async write handed to a background task.
    Scheduled(JoinHandle<()>),
}

#[derive(Clone)]
pub struct PersistenceCoordinator {
    store: Arc<dyn TransactionStore>,
    cfg: PersistenceConfig,
    metrics: Arc<RiskMetrics>,
}

impl PersistenceCoordinator {
    pub fn new(store: Arc<dyn TransactionStore>, cfg: PersistenceConfig, metrics: Arc<RiskMetrics>) -> Self {
        Self { store, cfg, metrics }
    }

    pub fn config(&self) -> &PersistenceConfig {
        &self.cfg
    }

    pub fn store(&self) -> &Arc<dyn TransactionStore> {
        &self.store
    }

    /// Record `result` for `req`. The result is only read.
    pub async fn record(&self, req: &TransactionRequest, result: &EvaluationResult, mode: PersistenceMode) -> Recorded {
        let tx = TransactionRecord::from_request(req);
        let decision = DecisionRecord::from_result(result);

        match mode {
            PersistenceMode::Sync => match self.attempt(&tx, &decision, mode).await {
                Ok(()) => {
                    tracing::debug!(txid=%tx.transaction_id, "transaction persisted (sync)");
                    Recorded::Written
                }
                Err(e) => {
                    tracing::error!(txid=%tx.transaction_id, error=%e, "persistence failed (sync), decision unaffected");
                    Recorded::Failed(e)
                }
            },
            PersistenceMode::Async => {
                let this = self.clone();
                let handle = tokio::spawn(async move { this.write_with_retry(tx, decision).await });
                Recorded::Scheduled(handle)
            }
        }
    }

    async fn write_with_retry(&self, tx: TransactionRecord, decision: DecisionRecord) {
        let mode = PersistenceMode::Async;
        let mut backoff = Duration::from_millis(self.cfg.retry_backoff_ms);

        for attempt in 1..=self.cfg.retry_attempts {
            match self.attempt(&tx, &decision, mode).await {
                Ok(()) => {
                    tracing::debug!(txid=%tx.transaction_id, attempt, "transaction persisted (async)");
                    return;
                }
                Err(e) if attempt < self.cfg.retry_attempts => {
                    tracing::debug!(txid=%tx.transaction_id, attempt, error=%e, "persistence attempt failed, retrying");
                    tokio::time::sleep(backoff).await;
                    backoff = backoff.saturating_mul(2);
                }
                Err(e) => {
                    tracing::error!(txid=%tx.transaction_id, attempts = attempt, error=%e, "persistence failed (async), giving up");
                }
            }
        }
    }

    /// One attempt: create (duplicate tolerated) and decision upsert run
    /// concurrently, each bounded by `sync_timeout_ms`, so a hung create never
    /// keeps the decision row from being written.
    async fn attempt(&self, tx: &TransactionRecord, decision: &DecisionRecord, mode: PersistenceMode) -> Result<()> {
        let budget = Duration::from_millis(self.cfg.sync_timeout_ms);
        let (created, updated) = tokio::join!(
            tokio::time::timeout(budget, self.store.create(tx.clone())),
            tokio::time::timeout(budget, self.store.update_decision(&decision.transaction_id, decision.clone())),
        );

        let created = match created {
            Ok(Ok(_)) => {
                self.count(mode, "create", "ok");
                Ok(())
            }
            Ok(Err(RiskGateError::AlreadyExists(_))) => {
                self.count(mode, "create", "duplicate");
                Ok(())
            }
            Ok(Err(e)) => {
                self.count(mode, "create", "failed");
                Err(e.to_string())
            }
            Err(_) => {
                self.count(mode, "create", "timeout");
                Err(format!("create timed out after {}ms", self.cfg.sync_timeout_ms))
            }
        };

        let updated = match updated {
            Ok(Ok(())) => {
                self.count(mode, "update_decision", "ok");
                Ok(())
            }
            Ok(Err(e)) => {
                self.count(mode, "update_decision", "failed");
                Err(e.to_string())
            }
            Err(_) => {
                self.count(mode, "update_decision", "timeout");
                Err(format!("update_decision timed out after {}ms", self.cfg.sync_timeout_ms))
            }
        };

        created.and(updated).map_err(RiskGateError::PersistenceFailed)
    }

    fn count(&self, mode: PersistenceMode, op: &str, outcome: &str) {
        self.metrics
            .persistence
            .inc(&[("mode", mode.as_str()), ("op", op), ("outcome", outcome)]);
    }
}
