//! Shared application state for the risk gateway.
//!
//! Built once at startup from `GatewayConfig`. Returns `Result` so `main`
//! can report a bad rule set or rules file instead of panicking.

use std::sync::Arc;

use riskgate_core::error::{Result, RiskGateError};

use crate::admission::{AdmissionController, AdmissionRule, Clock, MonotonicClock, RuleStore};
use crate::config::{self, GatewayConfig};
use crate::decision::{AmountBandRules, DecisionOrchestrator, HeuristicInferenceClient, InferenceClient, RuleEvaluator};
use crate::obs::RiskMetrics;
use crate::persistence::{InMemoryStore, PersistenceCoordinator, TransactionStore};
use crate::pipeline::RiskPipeline;

#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    cfg: GatewayConfig,
    admission: Arc<AdmissionController>,
    pipeline: RiskPipeline,
    store: Arc<dyn TransactionStore>,
    metrics: Arc<RiskMetrics>,
    /// Serializes writers of `admission.rules_file` (they share one tmp path).
    rules_file_lock: tokio::sync::Mutex<()>,
}

/// Replaceable collaborators. `AppState::new` fills in the local defaults.
pub struct Components {
    pub rules: Arc<dyn RuleEvaluator>,
    pub model: Arc<dyn InferenceClient>,
    pub store: Arc<dyn TransactionStore>,
    pub clock: Arc<dyn Clock>,
}

impl AppState {
    pub fn new(cfg: GatewayConfig) -> Result<Self> {
        let components = Components {
            rules: Arc::new(AmountBandRules::new(cfg.rules.clone(), &cfg.orchestrator)),
            model: Arc::new(HeuristicInferenceClient::new(&cfg.orchestrator)),
            store: Arc::new(InMemoryStore::new()),
            clock: Arc::new(MonotonicClock::new()),
        };
        Self::with_components(cfg, components)
    }

    pub fn with_components(cfg: GatewayConfig, c: Components) -> Result<Self> {
        let metrics = Arc::new(RiskMetrics::default());

        let rules = initial_rules(&cfg)?;
        tracing::info!(rules = rules.len(), "admission rules loaded");
        let store = Arc::new(RuleStore::new(rules)?);
        let admission = Arc::new(AdmissionController::new(store, c.clock, Arc::clone(&metrics)));

        let orchestrator = DecisionOrchestrator::new(c.rules, c.model, Arc::clone(&metrics));
        let persistence = PersistenceCoordinator::new(Arc::clone(&c.store), cfg.persistence.clone(), Arc::clone(&metrics));
        let pipeline = RiskPipeline::new(Arc::clone(&admission), orchestrator, persistence, cfg.orchestrator.clone());

        Ok(Self {
            inner: Arc::new(AppStateInner {
                cfg,
                admission,
                pipeline,
                store: c.store,
                metrics,
                rules_file_lock: tokio::sync::Mutex::new(()),
            }),
        })
    }

    pub fn cfg(&self) -> &GatewayConfig {
        &self.inner.cfg
    }

    pub fn admission(&self) -> &Arc<AdmissionController> {
        &self.inner.admission
    }

    pub fn pipeline(&self) -> &RiskPipeline {
        &self.inner.pipeline
    }

    pub fn store(&self) -> &Arc<dyn TransactionStore> {
        &self.inner.store
    }

    pub fn metrics(&self) -> &Arc<RiskMetrics> {
        &self.inner.metrics
    }

    pub fn is_draining(&self) -> bool {
        self.inner.metrics.is_draining()
    }

    pub fn set_draining(&self) {
        self.inner.metrics.set_draining();
    }

    pub fn metrics_extra(&self) -> Vec<(&'static str, u64)> {
        let snapshot = self.inner.admission.rules().snapshot();
        vec![
            ("riskgate_admission_rule_version", snapshot.version),
            ("riskgate_admission_rules", snapshot.rules().len() as u64),
        ]
    }

    /// Write the current rule set to `admission.rules_file`, if configured.
    /// Concurrent callers write one at a time; each writes the rule set as of
    /// when it got the lock, so the last writer leaves the newest set.
    pub async fn persist_rules(&self) -> Result<()> {
        let Some(path) = &self.inner.cfg.admission.rules_file else {
            return Ok(());
        };
        let _guard = self.inner.rules_file_lock.lock().await;
        config::save_rules_file(path, &self.inner.admission.rules().list()).await
    }

    /// Re-read `admission.rules_file` and publish it as the whole rule set.
    /// Returns the new snapshot version.
    pub fn reload_rules(&self) -> Result<u64> {
        let Some(path) = &self.inner.cfg.admission.rules_file else {
            return Err(RiskGateError::BadRequest("admission.rules_file is not configured".into()));
        };
        let rules = config::load_rules_file(path)?
            .ok_or_else(|| RiskGateError::NotFound(format!("rules file {path}")))?;
        let store = self.inner.admission.rules();
        store.replace_all(rules)?;
        self.inner.admission.prune();
        tracing::info!(path=%path, version = store.version(), "admission rules reloaded");
        Ok(store.version())
    }
}

fn initial_rules(cfg: &GatewayConfig) -> Result<Vec<AdmissionRule>> {
    if let Some(path) = &cfg.admission.rules_file {
        if let Some(rules) = config::load_rules_file(path)? {
            tracing::info!(path=%path, "admission rules taken from rules file");
            return Ok(rules);
        }
    }
    Ok(cfg.admission.rules.clone())
}
