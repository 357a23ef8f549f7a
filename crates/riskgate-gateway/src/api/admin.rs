//! Admission rule administration. Changes publish a new snapshot immediately
//! and are mirrored to the rules file when one is configured.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::Json;
use serde::Serialize;

use riskgate_core::error::RiskGateError;

use super::ApiError;
use crate::admission::{AdmissionRule, CircuitStatus};
use crate::app_state::AppState;

#[derive(Debug, Serialize)]
pub struct RulesView {
    pub version: u64,
    pub rules: Vec<AdmissionRule>,
}

fn view(state: &AppState) -> RulesView {
    let snapshot = state.admission().rules().snapshot();
    RulesView { version: snapshot.version, rules: snapshot.rules().to_vec() }
}

/// After a change: drop orphaned resource state and persist the rule set.
async fn after_change(state: &AppState) {
    state.admission().prune();
    if let Err(e) = state.persist_rules().await {
        tracing::error!(error=%e, "failed to persist admission rules file");
    }
}

pub async fn list_rules(State(state): State<AppState>) -> Json<RulesView> {
    Json(view(&state))
}

pub async fn get_rule(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<AdmissionRule>, ApiError> {
    state
        .admission()
        .rules()
        .get(&id)
        .map(Json)
        .ok_or_else(|| RiskGateError::NotFound(format!("admission rule {id}")).into())
}

pub async fn upsert_rule(
    State(state): State<AppState>,
    body: Result<Json<AdmissionRule>, JsonRejection>,
) -> Result<Json<RulesView>, ApiError> {
    let Json(rule) = body.map_err(|e| RiskGateError::BadRequest(e.body_text()))?;
    state.admission().rules().upsert(rule)?;
    after_change(&state).await;
    Ok(Json(view(&state)))
}

pub async fn delete_rule(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<RulesView>, ApiError> {
    state.admission().rules().delete(&id)?;
    after_change(&state).await;
    Ok(Json(view(&state)))
}

/// Re-read the rules file and publish it whole. The file itself is left as is.
pub async fn reload_rules(State(state): State<AppState>) -> Result<Json<RulesView>, ApiError> {
    state.reload_rules()?;
    Ok(Json(view(&state)))
}

pub async fn circuits(State(state): State<AppState>) -> Json<Vec<CircuitStatus>> {
    Json(state.admission().circuits())
}
