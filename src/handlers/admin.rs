use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::domain::{Purchase, PurchaseStatus};
use crate::error::AppError;
use crate::middleware::AdminUser;
use crate::ports::{DepositOverview, PurchaseOverview, PurchaseRecord};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct ActivateDepositRequest {
    pub transaction_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct UpdatePurchaseStatusRequest {
    pub status: PurchaseStatus,
}

#[derive(Debug, Deserialize)]
pub struct PurchaseSearch {
    /// Matches buyer name or workflow title.
    pub search: Option<String>,
}

pub async fn list_deposits(
    State(state): State<AppState>,
    AdminUser(_admin): AdminUser,
) -> Result<Json<Value>, AppError> {
    let deposits = state.deposits.list_deposits().await?;
    Ok(Json(json!(deposits)))
}

pub async fn deposit_overview(
    State(state): State<AppState>,
    AdminUser(_admin): AdminUser,
) -> Result<Json<DepositOverview>, AppError> {
    Ok(Json(state.deposits.overview().await?))
}

pub async fn reject_deposit(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Path(transaction_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let result = state.deposits.reject(transaction_id).await?;
    tracing::info!(admin_id = %admin.id, %transaction_id, "Admin rejected deposit");

    Ok(Json(json!({
        "success": true,
        "message": "Deposit transaction has been rejected",
        "transaction": result.transaction,
        "wallet": result.wallet,
    })))
}

pub async fn activate_deposit(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Json(payload): Json<ActivateDepositRequest>,
) -> Result<Json<Value>, AppError> {
    let result = state.deposits.admin_activate(payload.transaction_id).await?;
    tracing::info!(
        admin_id = %admin.id,
        transaction_id = %payload.transaction_id,
        "Admin activated deposit"
    );

    Ok(Json(json!({
        "success": true,
        "message": "Deposit activated",
        "transaction": result.transaction,
        "wallet": result.wallet,
    })))
}

pub async fn list_purchases(
    State(state): State<AppState>,
    AdminUser(_admin): AdminUser,
    Query(params): Query<PurchaseSearch>,
) -> Result<Json<Value>, AppError> {
    let purchases = state
        .settlement
        .list_purchases(params.search.as_deref())
        .await?;
    Ok(Json(json!({ "purchases": purchases })))
}

pub async fn purchase_overview(
    State(state): State<AppState>,
    AdminUser(_admin): AdminUser,
) -> Result<Json<PurchaseOverview>, AppError> {
    Ok(Json(state.settlement.purchase_overview().await?))
}

pub async fn purchase_detail(
    State(state): State<AppState>,
    AdminUser(_admin): AdminUser,
    Path(purchase_id): Path<Uuid>,
) -> Result<Json<PurchaseRecord>, AppError> {
    Ok(Json(state.settlement.purchase_detail(purchase_id).await?))
}

pub async fn update_purchase_status(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Path(purchase_id): Path<Uuid>,
    Json(payload): Json<UpdatePurchaseStatusRequest>,
) -> Result<Json<Purchase>, AppError> {
    let purchase = state
        .settlement
        .update_status(purchase_id, payload.status)
        .await?;
    tracing::info!(admin_id = %admin.id, %purchase_id, status = %purchase.status, "Admin updated purchase");
    Ok(Json(purchase))
}
