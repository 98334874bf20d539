use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::domain::{BankDetails, Invoice};
use crate::error::AppError;
use crate::middleware::AuthUser;
use crate::AppState;

pub async fn purchase_with_wallet(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(item_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let result = state.settlement.purchase_with_wallet(&user, item_id).await?;

    Ok(Json(json!({
        "success": true,
        "message": "Workflow purchased successfully",
        "wallet_balance": result.wallet_balance,
        "order": result.purchase,
        "invoice": result.invoice,
    })))
}

/// Bank details are optional; an empty body is accepted.
pub async fn purchase_with_bank_transfer(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(item_id): Path<Uuid>,
    payload: Option<Json<BankDetails>>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let details = payload.map(|Json(details)| details).unwrap_or_default();
    let purchase = state
        .settlement
        .purchase_with_bank_transfer(&user, item_id, details)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "message": "Order created, awaiting bank transfer",
            "order": purchase,
        })),
    ))
}

pub async fn list_orders(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> Result<Json<Value>, AppError> {
    let purchases = state.settlement.purchases_for(user.id).await?;
    Ok(Json(json!(purchases)))
}

pub async fn get_invoice(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(purchase_id): Path<Uuid>,
) -> Result<Json<Invoice>, AppError> {
    let invoice = state.settlement.invoice_for(user.id, purchase_id).await?;
    Ok(Json(invoice))
}
