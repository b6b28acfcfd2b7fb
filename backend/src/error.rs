//! Error handling for the Smart Irrigation Platform
//!
//! Every variant carries a stable machine code so that HTTP bodies and
//! per-field batch slots report failures the same way.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use shared::FieldId;
use thiserror::Error;

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    // Data sufficiency / model lifecycle
    #[error("Field {field_id}: insufficient data ({found} rows, minimum {required})")]
    InsufficientData {
        field_id: FieldId,
        found: usize,
        required: usize,
    },

    #[error("No trained model for field {0}; train it first")]
    ModelNotFound(FieldId),

    #[error("No sensor data recorded for field {0}")]
    NoSensorData(FieldId),

    #[error("Training failed for field {field_id}: {message}")]
    TrainingFailure { field_id: FieldId, message: String },

    // External service errors
    #[error("Upstream forecast unavailable: {0}")]
    UpstreamForecastUnavailable(String),

    // Validation errors
    #[error("Validation error: {message}")]
    Validation { field: String, message: String },

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Storage error: {0}")]
    StorageError(String),

    // Database errors
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    // Internal errors
    #[error("Internal server error: {0}")]
    Internal(String),
}

impl AppError {
    /// Stable machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            AppError::InsufficientData { .. } => "INSUFFICIENT_DATA",
            AppError::ModelNotFound(_) => "MODEL_NOT_FOUND",
            AppError::NoSensorData(_) => "NO_SENSOR_DATA",
            AppError::TrainingFailure { .. } => "TRAINING_FAILURE",
            AppError::UpstreamForecastUnavailable(_) => "UPSTREAM_FORECAST_UNAVAILABLE",
            AppError::Validation { .. } | AppError::ValidationError(_) => "VALIDATION_ERROR",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::StorageError(_) => "STORAGE_ERROR",
            AppError::DatabaseError(_) => "DATABASE_ERROR",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            AppError::InsufficientData { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::ModelNotFound(_) | AppError::NoSensorData(_) | AppError::NotFound(_) => {
                StatusCode::NOT_FOUND
            }
            AppError::Validation { .. } | AppError::ValidationError(_) => StatusCode::BAD_REQUEST,
            AppError::UpstreamForecastUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::StorageError(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::TrainingFailure { .. } | AppError::DatabaseError(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

/// Error response structure
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

#[derive(Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            // Do not leak driver or internal details to callers
            AppError::DatabaseError(_) => "A database error occurred".to_string(),
            other => other.to_string(),
        };
        let field = match &self {
            AppError::Validation { field, .. } => Some(field.clone()),
            _ => None,
        };

        // Log the error for debugging
        tracing::error!("Error: {:?}", self);

        let body = ErrorResponse {
            error: ErrorDetail {
                code: self.code().to_string(),
                message,
                field,
            },
        };
        (status, Json(body)).into_response()
    }
}

/// Result type alias for services and handlers
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insufficient_data_message_includes_counts() {
        let err = AppError::InsufficientData {
            field_id: 7,
            found: 19,
            required: 20,
        };
        let msg = err.to_string();
        assert!(msg.contains("Field 7"));
        assert!(msg.contains("19 rows"));
        assert_eq!(err.code(), "INSUFFICIENT_DATA");
    }

    #[test]
    fn internal_errors_hide_details_behind_500() {
        let err = AppError::Internal("registry lock poisoned".to_string());
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.code(), "INTERNAL_ERROR");
    }

    #[test]
    fn missing_model_maps_to_not_found() {
        let err = AppError::ModelNotFound(3);
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
        assert_eq!(err.code(), "MODEL_NOT_FOUND");
    }
}
