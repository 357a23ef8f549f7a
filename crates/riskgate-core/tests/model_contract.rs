#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use riskgate_core::error::ClientCode;
use riskgate_core::{AttrValue, Decision, EvaluationResult, ModelUsed, TransactionRequest};

fn parse(v: serde_json::Value) -> Result<TransactionRequest, serde_json::Error> {
    serde_json::from_value(v)
}

#[test]
fn request_decodes_camel_case_wire_names() {
    let req = parse(serde_json::json!({
        "transactionId": "tx-1",
        "userId": "u-1",
        "eventTimestamp": 1_700_000_000_000i64,
        "amount": 12.5,
        "currency": "USD",
        "productCd": "W",
        "channel": "app",
        "attributes": { "merchant_id": "m-1", "device_score": 0.4 },
    }))
    .unwrap();

    assert_eq!(req.transaction_id, "tx-1");
    assert_eq!(req.product_code.as_deref(), Some("W"));
    assert_eq!(req.attribute("merchant_id"), Some(&AttrValue::Str("m-1".into())));
    assert_eq!(req.attribute("device_score").and_then(AttrValue::as_f64), Some(0.4));
    assert!(req.validate().is_ok());
}

#[test]
fn attributes_reject_non_scalar_values() {
    for bad in [serde_json::json!(true), serde_json::json!({"nested": 1}), serde_json::json!([1, 2])] {
        let res = parse(serde_json::json!({
            "transactionId": "tx-1",
            "userId": "u-1",
            "eventTimestamp": 1,
            "amount": 1.0,
            "attributes": { "x": bad },
        }));
        assert!(res.is_err());
    }
}

#[test]
fn unknown_fields_are_rejected() {
    let res = parse(serde_json::json!({
        "transactionId": "tx-1",
        "userId": "u-1",
        "eventTimestamp": 1,
        "amount": 1.0,
        "amout": 2.0,
    }));
    assert!(res.is_err());
}

#[test]
fn validate_requires_ids_and_positive_amount() {
    let base = serde_json::json!({
        "transactionId": "tx-1",
        "userId": "u-1",
        "eventTimestamp": 1,
        "amount": 1.0,
    });

    let mut no_tx = base.clone();
    no_tx["transactionId"] = serde_json::json!("  ");
    let err = parse(no_tx).unwrap().validate().unwrap_err();
    assert_eq!(err.client_code(), ClientCode::BadRequest);

    let mut zero = base.clone();
    zero["amount"] = serde_json::json!(0.0);
    assert!(parse(zero).unwrap().validate().is_err());

    let mut no_user = base;
    no_user["userId"] = serde_json::json!("");
    assert!(parse(no_user).unwrap().validate().is_err());
}

#[test]
fn decision_thresholds_are_inclusive() {
    assert_eq!(Decision::from_score(0.7, 0.5, 0.7), Decision::Reject);
    assert_eq!(Decision::from_score(0.5, 0.5, 0.7), Decision::Review);
    assert_eq!(Decision::from_score(0.49, 0.5, 0.7), Decision::Approve);
}

#[test]
fn evaluation_error_is_fail_to_review() {
    let r = EvaluationResult::evaluation_error("tx-1", "boom");
    assert_eq!(r.decision, Decision::Review);
    assert_eq!(r.risk_score, 0.5);
    assert_eq!(r.model_used, ModelUsed::Error);
    assert_eq!(r.reasons, vec!["evaluation_error"]);
    assert!(r.is_error());

    let v = serde_json::to_value(&r).unwrap();
    assert_eq!(v["decision"], "REVIEW");
    assert_eq!(v["modelUsed"], "error");
    assert_eq!(v["riskScore"], 0.5);
    assert_eq!(v["debugInfo"], "boom");
    assert!(v["fallbackUsed"].is_null());
}

#[test]
fn attr_display_drops_integral_fraction() {
    assert_eq!(AttrValue::Num(42.0).to_string(), "42");
    assert_eq!(AttrValue::Num(1.5).to_string(), "1.5");
    assert_eq!(AttrValue::Str("m".into()).to_string(), "m");
}

#[test]
fn unscored_results_are_the_ones_with_no_live_source() {
    let with = |model_used: ModelUsed, reasons: &[&str]| EvaluationResult {
        model_used,
        reasons: reasons.iter().map(|r| r.to_string()).collect(),
        ..EvaluationResult::evaluation_error("tx-1", "")
    };

    assert!(EvaluationResult::evaluation_error("tx-1", "boom").is_unscored());
    assert!(with(ModelUsed::Rules, &["rules_failed", "model_failed"]).is_unscored());
    assert!(with(ModelUsed::Rules, &["rules_failed"]).is_unscored());
    assert!(with(ModelUsed::Model, &["model_failed"]).is_unscored());

    // one source still scored the transaction
    assert!(!with(ModelUsed::Model, &["rules_failed"]).is_unscored());
    assert!(!with(ModelUsed::Rules, &["model_failed"]).is_unscored());
    assert!(!with(ModelUsed::Rules, &["model_fallback_to_rules"]).is_unscored());
    assert!(!with(ModelUsed::Hybrid, &["hybrid_decision"]).is_unscored());
    assert!(!with(ModelUsed::Mock, &["normal_amount_mock"]).is_unscored());
}
