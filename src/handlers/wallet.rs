use axum::{extract::State, Json};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::AppError;
use crate::middleware::AuthUser;
use crate::services::{DepositIntent, LastBankInfo};
use crate::validation::amount_from_json;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct InitDepositRequest {
    /// Number or numeric string.
    pub amount: Value,
    pub bank_name: Option<String>,
}

pub async fn get_wallet(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> Result<Json<Value>, AppError> {
    let wallet = state.wallets.get_or_create(user.id).await?;
    Ok(Json(json!({
        "id": wallet.id,
        "balance": wallet.balance,
        "total_deposited": wallet.total_deposited,
        "total_spent": wallet.total_spent,
        "updated_at": wallet.updated_at,
    })))
}

pub async fn list_transactions(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> Result<Json<Value>, AppError> {
    let transactions = state.wallets.transactions(user.id).await?;
    Ok(Json(json!(transactions)))
}

pub async fn last_bank_info(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> Result<Json<LastBankInfo>, AppError> {
    let info = state
        .wallets
        .last_bank_info(user.id)
        .await?
        .unwrap_or(LastBankInfo {
            bank_name: None,
            bank_account: None,
        });
    Ok(Json(info))
}

pub async fn init_deposit(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Json(payload): Json<InitDepositRequest>,
) -> Result<Json<DepositIntent>, AppError> {
    let amount = amount_from_json(&payload.amount)
        .ok_or_else(|| AppError::InvalidAmount("amount must be a number".to_string()))?;

    let intent = state
        .deposits
        .init_deposit(&user, amount, payload.bank_name)
        .await?;
    Ok(Json(intent))
}
