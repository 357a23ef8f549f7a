#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use std::path::PathBuf;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;

use riskgate_gateway::admission::{AdmissionRule, CallOutcome, CircuitState, RuleKind};
use riskgate_gateway::api::admin;
use riskgate_gateway::app_state::AppState;
use riskgate_gateway::config;

fn rules_path(name: &str) -> PathBuf {
    let path = std::env::temp_dir().join(format!("riskgate-{}-{name}.json", std::process::id()));
    let _ = std::fs::remove_file(&path);
    path
}

fn state_with_rules_file(path: &PathBuf) -> AppState {
    let yaml = format!(
        r#"
version: 1
admission:
  rules_file: "{}"
  rules:
    - {{ resource: "r", kind: qps, threshold: 100 }}
"#,
        path.display()
    );
    AppState::new(config::load_from_str(&yaml).unwrap()).unwrap()
}

#[tokio::test]
async fn upsert_and_delete_publish_new_versions() {
    let path = rules_path("upsert");
    let state = state_with_rules_file(&path);

    let Json(view) = admin::list_rules(State(state.clone())).await;
    assert_eq!(view.version, 1);
    assert_eq!(view.rules.len(), 1);

    let mut breaker = AdmissionRule::new("r", RuleKind::ErrorRatio, 0.5);
    breaker.min_sample_count = 1;
    let Json(view) = admin::upsert_rule(State(state.clone()), Ok(Json(breaker))).await.unwrap();
    assert_eq!(view.version, 2);
    assert_eq!(view.rules.len(), 2);

    let Json(rule) = admin::get_rule(State(state.clone()), Path("r:error_ratio".to_string())).await.unwrap();
    assert_eq!(rule.threshold, 0.5);

    let Json(view) = admin::delete_rule(State(state.clone()), Path("r:qps".to_string())).await.unwrap();
    assert_eq!(view.version, 3);
    assert_eq!(view.rules.len(), 1);

    // mirrored to the rules file
    let saved = config::load_rules_file(&path).unwrap().expect("rules file written");
    assert_eq!(saved.len(), 1);
    assert_eq!(saved[0].id, "r:error_ratio");
    let _ = std::fs::remove_file(&path);
}

#[tokio::test]
async fn unknown_rule_is_not_found() {
    let path = rules_path("missing");
    let state = state_with_rules_file(&path);

    let err = admin::get_rule(State(state.clone()), Path("nope".to_string())).await.unwrap_err();
    assert_eq!(err.into_response().status(), StatusCode::NOT_FOUND);

    let err = admin::delete_rule(State(state.clone()), Path("nope".to_string())).await.unwrap_err();
    assert_eq!(err.into_response().status(), StatusCode::NOT_FOUND);
    assert_eq!(state.admission().rules().version(), 1);
}

#[tokio::test]
async fn invalid_rule_is_bad_request() {
    let path = rules_path("invalid");
    let state = state_with_rules_file(&path);

    let bad = AdmissionRule::new("r", RuleKind::SlowRatio, 2.0);
    let err = admin::upsert_rule(State(state.clone()), Ok(Json(bad))).await.unwrap_err();
    assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);
    assert_eq!(state.admission().rules().version(), 1);
}

#[tokio::test]
async fn rules_file_overrides_config_at_startup() {
    let path = rules_path("startup");
    config::save_rules_file(&path, &[AdmissionRule::new("from-file", RuleKind::Qps, 5.0)])
        .await
        .unwrap();

    let state = state_with_rules_file(&path);
    let rules = state.admission().rules().list();
    assert_eq!(rules.len(), 1);
    assert_eq!(rules[0].resource, "from-file");
    let _ = std::fs::remove_file(&path);
}

#[tokio::test]
async fn reload_replaces_the_whole_rule_set() {
    let path = rules_path("reload");
    let state = state_with_rules_file(&path);
    assert!(state.reload_rules().is_err());

    config::save_rules_file(
        &path,
        &[
            AdmissionRule::new("a", RuleKind::Qps, 1.0),
            AdmissionRule::new("b", RuleKind::Concurrency, 2.0),
        ],
    )
    .await
    .unwrap();

    let Json(view) = admin::reload_rules(State(state.clone())).await.unwrap();
    assert_eq!(view.version, 2);
    let ids: Vec<_> = view.rules.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, vec!["a:qps", "b:concurrency"]);
    assert!(state.admission().rules().get("r:qps").is_none());
    let _ = std::fs::remove_file(&path);
}

#[tokio::test]
async fn deleting_breaker_prunes_circuit_state() {
    let path = rules_path("prune");
    let state = state_with_rules_file(&path);

    let mut breaker = AdmissionRule::new("b", RuleKind::ErrorRatio, 1.0);
    breaker.min_sample_count = 1;
    admin::upsert_rule(State(state.clone()), Ok(Json(breaker))).await.unwrap();

    state.admission().admit("b").await.unwrap().complete(CallOutcome::Error);
    assert_eq!(state.admission().circuit_state("b"), Some(CircuitState::Open));
    let Json(circuits) = admin::circuits(State(state.clone())).await;
    assert_eq!(circuits.len(), 1);
    assert_eq!(circuits[0].state, CircuitState::Open);

    admin::delete_rule(State(state.clone()), Path("b:error_ratio".to_string())).await.unwrap();
    let Json(circuits) = admin::circuits(State(state.clone())).await;
    assert!(circuits.is_empty());
    assert!(state.admission().circuit_state("b").is_none());
    assert!(state.admission().admit("b").await.is_ok());
    let _ = std::fs::remove_file(&path);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_persists_leave_a_complete_file() {
    let path = rules_path("concurrent");
    let state = state_with_rules_file(&path);
    for i in 0..5 {
        state
            .admission()
            .rules()
            .upsert(AdmissionRule::new(format!("r{i}"), RuleKind::Qps, 10.0))
            .unwrap();
    }

    let writes = (0..16).map(|_| {
        let state = state.clone();
        tokio::spawn(async move { state.persist_rules().await })
    });
    for res in futures_util::future::join_all(writes).await {
        res.unwrap().unwrap();
    }

    let saved = config::load_rules_file(&path).unwrap().expect("rules file written");
    assert_eq!(saved, state.admission().rules().list());
    assert_eq!(saved.len(), 6);
    assert!(!path.with_extension("json.tmp").exists());
    let _ = std::fs::remove_file(&path);
}
