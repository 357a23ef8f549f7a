//! Axum router wiring.

use axum::{routing::{get, post}, Router};

use crate::{api, app_state::AppState, ops};

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/v1/transactions/evaluate", post(api::evaluate::evaluate))
        .route("/v1/admission/rules", get(api::admin::list_rules).put(api::admin::upsert_rule))
        .route("/v1/admission/rules/reload", post(api::admin::reload_rules))
        .route("/v1/admission/rules/:id", get(api::admin::get_rule).delete(api::admin::delete_rule))
        .route("/v1/admission/circuits", get(api::admin::circuits))
        .route("/healthz", get(ops::healthz))
        .route("/readyz", get(ops::readyz))
        .route("/metrics", get(ops::metrics))
        .with_state(state)
}
