//! Risk decision: signal sources, fusion policy and the orchestrator.

pub mod inference;
pub mod orchestrator;
pub mod policy;
pub mod rules;
pub mod source;

pub use inference::HeuristicInferenceClient;
pub use orchestrator::DecisionOrchestrator;
pub use policy::{FusionMode, FusionPolicy};
pub use rules::{AmountBand, AmountBandRules, RuleSetConfig};
pub use source::{InferenceClient, ModelOutcome, RuleEvaluator, RuleOutcome};
