//! Route definitions for the Smart Irrigation Platform

use axum::{
    routing::{get, post},
    Router,
};

use crate::{handlers, AppState};

/// Create API routes
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/plant-types", get(handlers::list_plant_types))
        // Sensor and forecast feeds
        .nest("/fields", field_routes())
        // Per-field models
        .nest("/prediction", prediction_routes())
        // Pump decisions
        .nest("/irrigation", irrigation_routes())
}

fn field_routes() -> Router<AppState> {
    Router::new()
        .route("/:field_id/readings", post(handlers::record_reading))
        .route("/:field_id/forecasts", post(handlers::record_forecast))
}

fn prediction_routes() -> Router<AppState> {
    Router::new()
        .route("/train/:field_id", post(handlers::train_field_model))
        .route("/train-all", post(handlers::train_all_models))
        .route(
            "/rain/:field_id",
            get(handlers::predict_field_rain_latest).post(handlers::predict_field_rain),
        )
        .route("/rain-all", get(handlers::predict_all_fields))
        .route("/status", get(handlers::list_model_statuses))
        .route("/status/:field_id", get(handlers::get_model_status))
        .route("/registry/rebuild", post(handlers::rebuild_model_registry))
}

fn irrigation_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(handlers::decide_all_irrigation))
        .route("/:field_id", get(handlers::decide_field_irrigation))
}
