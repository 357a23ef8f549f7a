//! HTTP handlers and the JSON error envelope.

pub mod admin;
pub mod evaluate;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use riskgate_core::error::{ClientCode, RiskGateError};

/// Handler error: a `RiskGateError` rendered as `{success:false, errorCode, ...}`.
#[derive(Debug)]
pub struct ApiError(pub RiskGateError);

impl From<RiskGateError> for ApiError {
    fn from(e: RiskGateError) -> Self {
        Self(e)
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ErrorBody {
    success: bool,
    error_code: &'static str,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    resource: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    rule_id: Option<String>,
}

pub fn status_for(code: ClientCode) -> StatusCode {
    match code {
        ClientCode::BadRequest | ClientCode::UnsupportedVersion => StatusCode::BAD_REQUEST,
        ClientCode::RateLimited => StatusCode::TOO_MANY_REQUESTS,
        ClientCode::CircuitOpen | ClientCode::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
        ClientCode::NotFound => StatusCode::NOT_FOUND,
        ClientCode::AlreadyExists => StatusCode::CONFLICT,
        ClientCode::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let code = self.0.client_code();
        let (resource, rule_id) = match &self.0 {
            RiskGateError::RateLimited { resource, rule_id } | RiskGateError::CircuitOpen { resource, rule_id } => {
                (Some(resource.clone()), Some(rule_id.clone()))
            }
            _ => (None, None),
        };
        let body = ErrorBody {
            success: false,
            error_code: code.as_str(),
            message: self.0.to_string(),
            resource,
            rule_id,
        };
        (status_for(code), Json(body)).into_response()
    }
}
