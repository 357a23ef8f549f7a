//! Transaction request (immutable pipeline input).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{Result, RiskGateError};

/// Open-ended attribute value. Only numbers and strings are representable;
/// anything else is rejected at decode time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttrValue {
    Num(f64),
    Str(String),
}

impl AttrValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            AttrValue::Num(n) => Some(*n),
            AttrValue::Str(_) => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttrValue::Num(_) => None,
            AttrValue::Str(s) => Some(s),
        }
    }
}

impl std::fmt::Display for AttrValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            // integral values print without a trailing ".0" (ids arrive as numbers)
            AttrValue::Num(n) if n.fract() == 0.0 && n.abs() < 1e15 => write!(f, "{}", *n as i64),
            AttrValue::Num(n) => write!(f, "{n}"),
            AttrValue::Str(s) => f.write_str(s),
        }
    }
}

/// A transaction submitted for risk evaluation.
///
/// Created by the caller and never mutated afterwards; every stage borrows it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct TransactionRequest {
    /// Unique key; also the persistence idempotency key.
    pub transaction_id: String,
    pub user_id: String,
    /// Event time, epoch milliseconds.
    pub event_timestamp: i64,
    /// Positive amount in `currency` units.
    pub amount: f64,
    #[serde(default)]
    pub currency: String,
    #[serde(default, alias = "productCd")]
    pub product_code: Option<String>,
    #[serde(default)]
    pub channel: String,
    #[serde(default)]
    pub attributes: BTreeMap<String, AttrValue>,
}

impl TransactionRequest {
    /// Structural checks that do not depend on any rule content.
    pub fn validate(&self) -> Result<()> {
        if self.transaction_id.trim().is_empty() {
            return Err(RiskGateError::BadRequest("transactionId is required".into()));
        }
        if self.user_id.trim().is_empty() {
            return Err(RiskGateError::BadRequest("userId is required".into()));
        }
        if !self.amount.is_finite() || self.amount <= 0.0 {
            return Err(RiskGateError::BadRequest(format!(
                "amount must be a positive number (got {})",
                self.amount
            )));
        }
        Ok(())
    }

    pub fn attribute(&self, name: &str) -> Option<&AttrValue> {
        self.attributes.get(name)
    }
}
