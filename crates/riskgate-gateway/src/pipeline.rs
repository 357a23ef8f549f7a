//! The evaluate request path: validate → admit → evaluate → complete → record.
//!
//! Admission always precedes orchestration, which always precedes
//! persistence. Only admission blocks and invalid input surface as errors;
//! the evaluation itself always yields a result.

use std::sync::Arc;

use riskgate_core::error::Result;
use riskgate_core::{EvaluationResult, TransactionRequest};

use crate::admission::{AdmissionController, CallOutcome};
use crate::decision::{DecisionOrchestrator, FusionPolicy};
use crate::persistence::PersistenceCoordinator;

pub struct RiskPipeline {
    admission: Arc<AdmissionController>,
    orchestrator: DecisionOrchestrator,
    persistence: PersistenceCoordinator,
    policy: FusionPolicy,
}

impl RiskPipeline {
    pub fn new(
        admission: Arc<AdmissionController>,
        orchestrator: DecisionOrchestrator,
        persistence: PersistenceCoordinator,
        policy: FusionPolicy,
    ) -> Self {
        Self { admission, orchestrator, persistence, policy }
    }

    pub fn policy(&self) -> &FusionPolicy {
        &self.policy
    }

    pub async fn evaluate(&self, resource: &str, req: &TransactionRequest) -> Result<EvaluationResult> {
        req.validate()?;

        let entry = self.admission.admit(resource).await?;
        let result = self.orchestrator.evaluate(req, &self.policy).await;
        // a safe-default review is an outage of the evaluate path, not a success
        let outcome = if result.is_unscored() { CallOutcome::Error } else { CallOutcome::Success };
        entry.complete(outcome);

        // async writes detach; sync failures are logged by the coordinator
        let mode = self.persistence.config().mode;
        let _ = self.persistence.record(req, &result, mode).await;
        Ok(result)
    }
}
