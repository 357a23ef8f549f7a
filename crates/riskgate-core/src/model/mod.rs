//! Request/result model.
//!
//! - `transaction`: the immutable input handed to the pipeline.
//! - `evaluation`: the decision-bearing output produced once per request.
//!
//! Wire names are camelCase so that JSON produced by existing clients
//! (`transactionId`, `eventTimestamp`, ...) deserializes unchanged.

pub mod evaluation;
pub mod transaction;

pub use evaluation::{Decision, EvaluationResult, Fallback, ModelUsed};
pub use transaction::{AttrValue, TransactionRequest};
