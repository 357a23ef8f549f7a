//! Transaction store seam and the in-memory implementation.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use riskgate_core::error::{Result, RiskGateError};
use riskgate_core::{AttrValue, Decision, EvaluationResult, Fallback, ModelUsed, TransactionRequest};

pub const DEFAULT_MERCHANT: &str = "DEFAULT_MERCHANT";
const ATTR_MERCHANT_ID: &str = "merchant_id";

/// Persisted transaction row (created once per `transaction_id`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionRecord {
    pub transaction_id: String,
    pub user_id: String,
    pub merchant_id: String,
    pub event_timestamp: i64,
    pub amount: f64,
    pub currency: String,
    pub product_code: Option<String>,
    pub channel: String,
    pub attributes: BTreeMap<String, AttrValue>,
    pub created_at: DateTime<Utc>,
}

impl TransactionRecord {
    pub fn from_request(req: &TransactionRequest) -> Self {
        let merchant_id = req
            .attribute(ATTR_MERCHANT_ID)
            .map(|v| v.to_string())
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_MERCHANT.to_string());

        Self {
            transaction_id: req.transaction_id.clone(),
            user_id: req.user_id.clone(),
            merchant_id,
            event_timestamp: req.event_timestamp,
            amount: req.amount,
            currency: req.currency.clone(),
            product_code: req.product_code.clone(),
            channel: req.channel.clone(),
            attributes: req.attributes.clone(),
            created_at: Utc::now(),
        }
    }
}

/// Decision row, upserted by `transaction_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecisionRecord {
    pub transaction_id: String,
    pub decision: Decision,
    pub risk_score: f64,
    pub model_used: ModelUsed,
    pub fallback_used: Option<Fallback>,
    pub reasons: Vec<String>,
    pub rules_triggered: Vec<String>,
    pub processed_at: DateTime<Utc>,
}

impl DecisionRecord {
    pub fn from_result(result: &EvaluationResult) -> Self {
        Self {
            transaction_id: result.transaction_id.clone(),
            decision: result.decision,
            risk_score: result.risk_score,
            model_used: result.model_used,
            fallback_used: result.fallback_used,
            reasons: result.reasons.clone(),
            rules_triggered: result.rules_triggered.clone(),
            processed_at: result.processed_at,
        }
    }
}

#[async_trait]
pub trait TransactionStore: Send + Sync {
    /// Insert a new transaction. `AlreadyExists` when the id is taken.
    async fn create(&self, record: TransactionRecord) -> Result<TransactionRecord>;

    /// Insert or replace the decision for `transaction_id`. Does not require
    /// the transaction row to exist.
    async fn update_decision(&self, transaction_id: &str, record: DecisionRecord) -> Result<()>;

    async fn transaction(&self, transaction_id: &str) -> Result<TransactionRecord>;

    async fn decision(&self, transaction_id: &str) -> Result<Option<DecisionRecord>>;
}

#[derive(Default)]
pub struct InMemoryStore {
    transactions: DashMap<String, TransactionRecord>,
    decisions: DashMap<String, DecisionRecord>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn transaction_count(&self) -> usize {
        self.transactions.len()
    }

    pub fn decision_count(&self) -> usize {
        self.decisions.len()
    }
}

#[async_trait]
impl TransactionStore for InMemoryStore {
    async fn create(&self, record: TransactionRecord) -> Result<TransactionRecord> {
        match self.transactions.entry(record.transaction_id.clone()) {
            Entry::Occupied(_) => Err(RiskGateError::AlreadyExists(format!(
                "transaction {}",
                record.transaction_id
            ))),
            Entry::Vacant(v) => {
                v.insert(record.clone());
                Ok(record)
            }
        }
    }

    async fn update_decision(&self, transaction_id: &str, record: DecisionRecord) -> Result<()> {
        if record.transaction_id != transaction_id {
            return Err(RiskGateError::BadRequest(format!(
                "decision for {} written under {transaction_id}",
                record.transaction_id
            )));
        }
        self.decisions.insert(transaction_id.to_string(), record);
        Ok(())
    }

    async fn transaction(&self, transaction_id: &str) -> Result<TransactionRecord> {
        self.transactions
            .get(transaction_id)
            .map(|r| r.value().clone())
            .ok_or_else(|| RiskGateError::NotFound(format!("transaction {transaction_id}")))
    }

    async fn decision(&self, transaction_id: &str) -> Result<Option<DecisionRecord>> {
        Ok(self.decisions.get(transaction_id).map(|r| r.value().clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn req(attrs: serde_json::Value) -> TransactionRequest {
        serde_json::from_value(serde_json::json!({
            "transactionId": "t1",
            "userId": "u1",
            "eventTimestamp": 1,
            "amount": 10.0,
            "attributes": attrs,
        }))
        .unwrap()
    }

    #[test]
    fn merchant_id_from_attributes_or_default() {
        assert_eq!(TransactionRecord::from_request(&req(serde_json::json!({}))).merchant_id, DEFAULT_MERCHANT);
        assert_eq!(
            TransactionRecord::from_request(&req(serde_json::json!({"merchant_id": "m-9"}))).merchant_id,
            "m-9"
        );
        assert_eq!(
            TransactionRecord::from_request(&req(serde_json::json!({"merchant_id": 42}))).merchant_id,
            "42"
        );
    }

    #[tokio::test]
    async fn duplicate_create_is_already_exists() {
        let store = InMemoryStore::new();
        let rec = TransactionRecord::from_request(&req(serde_json::json!({})));
        store.create(rec.clone()).await.unwrap();
        let err = store.create(rec).await.unwrap_err();
        assert_eq!(err.client_code().as_str(), "ALREADY_EXISTS");
        assert_eq!(store.transaction_count(), 1);
    }

    #[tokio::test]
    async fn unknown_transaction_is_not_found() {
        let store = InMemoryStore::new();
        let err = store.transaction("nope").await.unwrap_err();
        assert_eq!(err.client_code().as_str(), "NOT_FOUND");
        assert!(store.decision("nope").await.unwrap().is_none());
    }
}
