//! riskgate core: transport-agnostic data model and error types.
//!
//! This crate defines the transaction/evaluation contracts and the error
//! surface shared by the gateway, the HTTP layer and downstream tooling. It
//! intentionally carries no async runtime so it can be reused in
//! offline evaluators.
//!
//! # Defensive guarantees
//! Panics, `unwrap`, and `expect` are compile-denied here
//! (`#![deny(clippy::panic, clippy::unwrap_used, clippy::expect_used)]`).
//! All fallible paths must surface as `RiskGateError`/`Result`.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod error;
pub mod model;

/// Shared result type.
pub use error::{Result, RiskGateError};
pub use model::{
    AttrValue, Decision, EvaluationResult, Fallback, ModelUsed, TransactionRequest,
};
