//! Risk signal sources consumed by the orchestrator.

use async_trait::async_trait;
use tokio::time::Instant;

use riskgate_core::error::Result;
use riskgate_core::{Decision, TransactionRequest};

/// Output of the rule path.
#[derive(Debug, Clone, PartialEq)]
pub struct RuleOutcome {
    pub score: f64,
    pub decision: Decision,
    pub triggered: Vec<String>,
}

/// Output of the model path.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelOutcome {
    pub score: f64,
    pub decision: Decision,
    pub reasons: Vec<String>,
}

/// Local, deterministic rule evaluation. Called from a blocking worker.
pub trait RuleEvaluator: Send + Sync {
    fn evaluate_rules(&self, req: &TransactionRequest) -> Result<RuleOutcome>;
}

/// Model inference. Implementations should give up once `deadline` passes;
/// the orchestrator abandons the call at that point regardless.
#[async_trait]
pub trait InferenceClient: Send + Sync {
    async fn infer(&self, req: &TransactionRequest, deadline: Instant) -> Result<ModelOutcome>;
}
