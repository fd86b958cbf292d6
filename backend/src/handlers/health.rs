//! Health check handlers

use axum::{extract::State, Json};
use serde::Serialize;

use crate::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub database: String,
}

/// Health check endpoint handler
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let timeout = state.config.store.operation_timeout();
    let ping = sqlx::query("SELECT 1").execute(&state.db);
    let database = match tokio::time::timeout(timeout, ping).await {
        Ok(Ok(_)) => "connected",
        Ok(Err(err)) => {
            tracing::warn!(error = %err, "Health check query failed");
            "disconnected"
        }
        Err(_) => "timeout",
    };

    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        database: database.to_string(),
    })
}
