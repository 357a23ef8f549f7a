//! Shared error type across riskgate crates.

use thiserror::Error;

/// Client-facing error codes (stable API).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientCode {
    /// Invalid input / malformed request or config.
    BadRequest,
    /// Blocked by a flow (qps / concurrency) rule.
    RateLimited,
    /// Blocked by an open circuit breaker.
    CircuitOpen,
    /// Referenced entity does not exist.
    NotFound,
    /// Create collided with an existing key.
    AlreadyExists,
    /// Unsupported config version.
    UnsupportedVersion,
    /// A downstream capability failed or timed out.
    Unavailable,
    /// Internal server error.
    Internal,
}

impl ClientCode {
    /// String representation used in JSON responses.
    pub fn as_str(self) -> &'static str {
        match self {
            ClientCode::BadRequest => "BAD_REQUEST",
            ClientCode::RateLimited => "RATE_LIMITED",
            ClientCode::CircuitOpen => "CIRCUIT_OPEN",
            ClientCode::NotFound => "NOT_FOUND",
            ClientCode::AlreadyExists => "ALREADY_EXISTS",
            ClientCode::UnsupportedVersion => "UNSUPPORTED_VERSION",
            ClientCode::Unavailable => "UNAVAILABLE",
            ClientCode::Internal => "INTERNAL",
        }
    }
}

/// Shared result type.
pub type Result<T> = std::result::Result<T, RiskGateError>;

/// Unified error type used by core and gateway.
///
/// Only `RateLimited` and `CircuitOpen` ever reach a caller of the evaluate
/// path. The source/persistence variants are absorbed into the evaluation
/// result or the logs.
#[derive(Debug, Error)]
pub enum RiskGateError {
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("rate limited: resource={resource} rule={rule_id}")]
    RateLimited { resource: String, rule_id: String },
    #[error("circuit open: resource={resource} rule={rule_id}")]
    CircuitOpen { resource: String, rule_id: String },
    #[error("rule evaluation failed: {0}")]
    RuleEvaluationFailed(String),
    #[error("model unavailable: {0}")]
    ModelUnavailable(String),
    #[error("persistence failed: {0}")]
    PersistenceFailed(String),
    #[error("evaluation error: {0}")]
    EvaluationError(String),
    #[error("already exists: {0}")]
    AlreadyExists(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("unsupported config version")]
    UnsupportedVersion,
    #[error("internal: {0}")]
    Internal(String),
}

impl RiskGateError {
    /// Map internal error to a stable client-facing code.
    pub fn client_code(&self) -> ClientCode {
        match self {
            RiskGateError::BadRequest(_) => ClientCode::BadRequest,
            RiskGateError::RateLimited { .. } => ClientCode::RateLimited,
            RiskGateError::CircuitOpen { .. } => ClientCode::CircuitOpen,
            RiskGateError::RuleEvaluationFailed(_)
            | RiskGateError::ModelUnavailable(_)
            | RiskGateError::PersistenceFailed(_) => ClientCode::Unavailable,
            RiskGateError::AlreadyExists(_) => ClientCode::AlreadyExists,
            RiskGateError::NotFound(_) => ClientCode::NotFound,
            RiskGateError::UnsupportedVersion => ClientCode::UnsupportedVersion,
            RiskGateError::EvaluationError(_) | RiskGateError::Internal(_) => ClientCode::Internal,
        }
    }

    /// True for admission-layer rejections.
    pub fn is_blocked(&self) -> bool {
        matches!(
            self,
            RiskGateError::RateLimited { .. } | RiskGateError::CircuitOpen { .. }
        )
    }
}
