use axum::{
    body::Bytes,
    extract::State,
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Map, Value};

use crate::error::AppError;
use crate::services::ReconcileOutcome;
use crate::utils::sanitize::sanitize_json;
use crate::validation::amount_from_json;
use crate::AppState;

const AMOUNT_KEYS: [&str; 4] = ["transferAmount", "amount", "total", "money"];
const TEXT_KEYS: [&str; 2] = ["content", "description"];

fn ack() -> Response {
    (
        StatusCode::OK,
        Json(json!({ "success": true, "message": "Webhook received" })),
    )
        .into_response()
}

fn api_key_matches(headers: &HeaderMap, expected: &str) -> bool {
    headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Apikey "))
        .map(str::trim)
        == Some(expected)
}

fn raw_amount(payload: &Map<String, Value>) -> Option<&Value> {
    AMOUNT_KEYS
        .iter()
        .filter_map(|key| payload.get(*key))
        .find(|value| !value.is_null())
}

fn notice_text(payload: &Map<String, Value>) -> Option<String> {
    TEXT_KEYS
        .iter()
        .filter_map(|key| payload.get(*key))
        .filter_map(|value| match value {
            Value::String(text) => Some(text.trim().to_string()),
            Value::Number(number) => Some(number.to_string()),
            _ => None,
        })
        .find(|text| !text.is_empty())
}

/// Bank-transfer notice from the payment gateway.
///
/// Acknowledged with 200 whether or not a deposit matched, so the gateway
/// stops retrying. Only unparseable payloads get a 400.
pub async fn bank_notice(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if let Some(expected) = state.webhook_api_key.as_deref() {
        if !api_key_matches(&headers, expected) {
            tracing::warn!("Bank notice rejected: missing or wrong API key");
            return AppError::Unauthorized("Invalid webhook credentials".to_string())
                .into_response();
        }
    }

    let payload = match serde_json::from_slice::<Value>(&body) {
        Ok(Value::Object(map)) => map,
        Ok(_) => {
            tracing::warn!(bytes = body.len(), "Bank notice is not a JSON object");
            return AppError::BadRequest("Invalid JSON payload: expected an object".to_string())
                .into_response();
        }
        Err(e) => {
            tracing::warn!(bytes = body.len(), "Failed to parse bank notice: {}", e);
            return AppError::BadRequest(format!("Invalid JSON payload: {}", e)).into_response();
        }
    };

    let sanitized = sanitize_json(&Value::Object(payload.clone()));
    tracing::info!(payload = %sanitized, "Bank notice received");

    let (Some(text), Some(raw)) = (notice_text(&payload), raw_amount(&payload)) else {
        tracing::warn!("Bank notice missing content or amount; ignoring");
        return ack();
    };
    let Some(amount) = amount_from_json(raw) else {
        tracing::warn!("Bank notice amount is not a usable money value; ignoring");
        return ack();
    };

    match state.deposits.reconcile_from_notice(&amount, &text).await {
        Ok(ReconcileOutcome::Credited {
            transaction_id,
            user_id,
            ..
        }) => {
            tracing::info!(%transaction_id, %user_id, %amount, "Bank notice credited deposit");
            ack()
        }
        Ok(_) => ack(),
        Err(e) => {
            tracing::error!(error = %e, %amount, "Bank notice processing failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "success": false, "message": "Webhook processing failed" })),
            )
                .into_response()
        }
    }
}
