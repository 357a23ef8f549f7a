#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use riskgate_core::error::{Result, RiskGateError};
use riskgate_core::{Decision, EvaluationResult, ModelUsed, TransactionRequest};
use riskgate_gateway::obs::RiskMetrics;
use riskgate_gateway::persistence::{
    DecisionRecord, InMemoryStore, PersistenceConfig, PersistenceCoordinator, PersistenceMode, Recorded,
    TransactionRecord, TransactionStore,
};

/// Wraps the in-memory store; the first `fail_creates` creates fail and every
/// create sleeps for `delay`.
struct FlakyStore {
    inner: InMemoryStore,
    fail_creates: usize,
    delay: Duration,
    creates: AtomicUsize,
}

impl FlakyStore {
    fn new(fail_creates: usize, delay: Duration) -> Arc<Self> {
        Arc::new(Self { inner: InMemoryStore::new(), fail_creates, delay, creates: AtomicUsize::new(0) })
    }
}

#[async_trait]
impl TransactionStore for FlakyStore {
    async fn create(&self, record: TransactionRecord) -> Result<TransactionRecord> {
        let n = self.creates.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        if n < self.fail_creates {
            return Err(RiskGateError::PersistenceFailed("db connection reset".into()));
        }
        self.inner.create(record).await
    }

    async fn update_decision(&self, transaction_id: &str, record: DecisionRecord) -> Result<()> {
        self.inner.update_decision(transaction_id, record).await
    }

    async fn transaction(&self, transaction_id: &str) -> Result<TransactionRecord> {
        self.inner.transaction(transaction_id).await
    }

    async fn decision(&self, transaction_id: &str) -> Result<Option<DecisionRecord>> {
        self.inner.decision(transaction_id).await
    }
}

fn request() -> TransactionRequest {
    serde_json::from_value(serde_json::json!({
        "transactionId": "tx-42",
        "userId": "user-7",
        "eventTimestamp": 1_700_000_000_000i64,
        "amount": 250.0,
        "currency": "EUR",
        "attributes": { "merchant_id": "m-1" },
    }))
    .unwrap()
}

fn result() -> EvaluationResult {
    EvaluationResult {
        transaction_id: "tx-42".into(),
        decision: Decision::Review,
        risk_score: 0.62,
        reasons: vec!["hybrid_decision".into()],
        rules_triggered: vec!["high_amount".into()],
        model_used: ModelUsed::Hybrid,
        fallback_used: None,
        processed_at: chrono::Utc::now(),
        debug_info: None,
    }
}

fn coordinator(store: Arc<dyn TransactionStore>, cfg: PersistenceConfig) -> (PersistenceCoordinator, Arc<RiskMetrics>) {
    let metrics = Arc::new(RiskMetrics::default());
    (PersistenceCoordinator::new(store, cfg, metrics.clone()), metrics)
}

fn sync_cfg() -> PersistenceConfig {
    PersistenceConfig { mode: PersistenceMode::Sync, ..PersistenceConfig::default() }
}

#[tokio::test]
async fn sync_record_is_idempotent() {
    let store = Arc::new(InMemoryStore::new());
    let (c, metrics) = coordinator(store.clone(), sync_cfg());

    assert!(matches!(c.record(&request(), &result(), PersistenceMode::Sync).await, Recorded::Written));
    assert!(matches!(c.record(&request(), &result(), PersistenceMode::Sync).await, Recorded::Written));

    assert_eq!(store.transaction_count(), 1);
    assert_eq!(store.decision_count(), 1);
    assert_eq!(store.transaction("tx-42").await.unwrap().merchant_id, "m-1");
    let decision = store.decision("tx-42").await.unwrap().unwrap();
    assert_eq!(decision.decision, Decision::Review);
    assert_eq!(decision.risk_score, 0.62);
    assert_eq!(
        metrics.persistence.get(&[("mode", "sync"), ("op", "create"), ("outcome", "duplicate")]),
        1
    );
}

#[tokio::test]
async fn sync_failure_is_reported_not_propagated() {
    let store = FlakyStore::new(usize::MAX, Duration::ZERO);
    let (c, metrics) = coordinator(store.clone(), sync_cfg());
    let res = result();
    let before = res.clone();

    let recorded = c.record(&request(), &res, PersistenceMode::Sync).await;
    assert!(matches!(recorded, Recorded::Failed(RiskGateError::PersistenceFailed(_))));
    assert_eq!(res, before);

    // the decision upsert is still attempted
    assert!(store.decision("tx-42").await.unwrap().is_some());
    assert_eq!(store.inner.transaction_count(), 0);
    assert_eq!(
        metrics.persistence.get(&[("mode", "sync"), ("op", "create"), ("outcome", "failed")]),
        1
    );
}

#[tokio::test]
async fn sync_write_is_bounded_by_timeout() {
    let store = FlakyStore::new(0, Duration::from_millis(500));
    let cfg = PersistenceConfig { sync_timeout_ms: 20, ..sync_cfg() };
    let (c, metrics) = coordinator(store, cfg);

    let started = std::time::Instant::now();
    let recorded = c.record(&request(), &result(), PersistenceMode::Sync).await;
    assert!(matches!(recorded, Recorded::Failed(_)));
    assert!(started.elapsed() < Duration::from_millis(400));
    assert_eq!(
        metrics.persistence.get(&[("mode", "sync"), ("op", "create"), ("outcome", "timeout")]),
        1
    );
}

#[tokio::test]
async fn hung_create_still_writes_decision() {
    let store = FlakyStore::new(0, Duration::from_secs(60));
    let cfg = PersistenceConfig { sync_timeout_ms: 50, ..sync_cfg() };
    let (c, metrics) = coordinator(store.clone(), cfg);

    let started = std::time::Instant::now();
    let recorded = c.record(&request(), &result(), PersistenceMode::Sync).await;
    assert!(matches!(&recorded, Recorded::Failed(RiskGateError::PersistenceFailed(msg)) if msg.contains("create timed out")));
    assert!(started.elapsed() < Duration::from_millis(400));

    let decision = store.inner.decision("tx-42").await.unwrap().expect("decision written");
    assert_eq!(decision.risk_score, 0.62);
    assert_eq!(store.inner.transaction_count(), 0);
    assert_eq!(
        metrics.persistence.get(&[("mode", "sync"), ("op", "update_decision"), ("outcome", "ok")]),
        1
    );
}

#[tokio::test]
async fn async_record_retries_until_success() {
    let store = FlakyStore::new(2, Duration::ZERO);
    let cfg = PersistenceConfig { retry_backoff_ms: 1, ..PersistenceConfig::default() };
    let (c, _) = coordinator(store.clone(), cfg);

    let Recorded::Scheduled(handle) = c.record(&request(), &result(), PersistenceMode::Async).await else {
        panic!("async mode must schedule");
    };
    handle.await.unwrap();

    assert_eq!(store.creates.load(Ordering::SeqCst), 3);
    assert_eq!(store.inner.transaction_count(), 1);
    assert_eq!(store.inner.decision_count(), 1);
}

#[tokio::test]
async fn async_record_gives_up_after_configured_attempts() {
    let store = FlakyStore::new(usize::MAX, Duration::ZERO);
    let cfg = PersistenceConfig { retry_attempts: 4, retry_backoff_ms: 1, ..PersistenceConfig::default() };
    let (c, metrics) = coordinator(store.clone(), cfg);

    let Recorded::Scheduled(handle) = c.record(&request(), &result(), PersistenceMode::Async).await else {
        panic!("async mode must schedule");
    };
    handle.await.unwrap();

    assert_eq!(store.creates.load(Ordering::SeqCst), 4);
    assert_eq!(store.inner.transaction_count(), 0);
    assert_eq!(
        metrics.persistence.get(&[("mode", "async"), ("op", "create"), ("outcome", "failed")]),
        4
    );
}

#[test]
fn retry_attempts_are_bounded() {
    let cfg = PersistenceConfig { retry_attempts: 0, ..PersistenceConfig::default() };
    assert!(cfg.validate().is_err());
    let cfg = PersistenceConfig { retry_attempts: 11, ..PersistenceConfig::default() };
    assert!(cfg.validate().is_err());
    assert!(PersistenceConfig::default().validate().is_ok());
}
