//! Smart Irrigation Platform backend
//!
//! Per-field forecast validation and irrigation decisions, served over HTTP.

use std::sync::Arc;

use axum::{routing::get, Router};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

pub mod config;
pub mod error;
pub mod external;
pub mod handlers;
pub mod ml;
pub mod routes;
pub mod scheduler;
pub mod services;
pub mod simulation;

pub use config::Config;
pub use error::{AppError, AppResult};

use services::{FieldRepository, IrrigationService, PredictionService};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub fields: Arc<dyn FieldRepository>,
    pub prediction: Arc<PredictionService>,
    pub irrigation: Arc<IrrigationService>,
    pub config: Arc<Config>,
}

/// Create the application router with all routes and middleware
pub fn create_app(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(root))
        .route("/health", get(health_check))
        .nest("/api/v1", routes::api_routes())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Root endpoint
async fn root() -> &'static str {
    "Smart Irrigation Platform API v1.0"
}

/// Health check endpoint
async fn health_check() -> &'static str {
    "OK"
}
