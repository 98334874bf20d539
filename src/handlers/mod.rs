pub mod admin;
pub mod notifications;
pub mod orders;
pub mod wallet;
pub mod webhook;
pub mod ws;

use crate::AppState;
use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};

/// Dependency health; 503 when a critical dependency is down.
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let report = state.health.check().await;

    let status_code = if report.is_healthy() {
        StatusCode::OK
    } else {
        tracing::warn!(status = %report.status, "Health check failed");
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(report))
}
