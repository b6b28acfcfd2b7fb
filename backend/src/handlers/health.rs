//! Health check handlers

use axum::{extract::State, Json};
use serde::Serialize;
use shared::FieldScope;

use crate::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub database: String,
    pub trained_models: usize,
}

/// Health check endpoint handler
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    // Check storage connectivity
    let db_status = match state.fields.list_fields(FieldScope::All).await {
        Ok(_) => "connected".to_string(),
        Err(_) => "disconnected".to_string(),
    };
    let trained_models = state.prediction.status_all().map(|s| s.len()).unwrap_or(0);

    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        database: db_status,
        trained_models,
    })
}
