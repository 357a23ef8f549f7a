use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;

use riskgate_core::error::RiskGateError;
use riskgate_core::{EvaluationResult, TransactionRequest};

use super::ApiError;
use crate::app_state::AppState;

/// `POST /v1/transactions/evaluate`
pub async fn evaluate(
    State(state): State<AppState>,
    body: Result<Json<TransactionRequest>, JsonRejection>,
) -> Result<Json<EvaluationResult>, ApiError> {
    let Json(req) = body.map_err(|e| RiskGateError::BadRequest(e.body_text()))?;
    let result = state.pipeline().evaluate(&state.cfg().server.resource, &req).await?;
    Ok(Json(result))
}
