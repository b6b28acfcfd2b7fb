//! HTTP handlers for the sensor and forecast feeds

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use shared::{FieldId, ForecastRecord, SensorReading};
use validator::Validate;

use crate::error::{AppError, AppResult};
use crate::AppState;

#[derive(Debug, Deserialize, Validate)]
pub struct RecordReadingInput {
    #[validate(range(min = 0.0, max = 100.0))]
    pub moisture: f64,
    pub temperature: f64,
    #[serde(default)]
    pub rain_observed: bool,
    pub timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct RecordForecastInput {
    pub forecast_timestamp: DateTime<Utc>,
    #[validate(range(min = 0.0, max = 100.0))]
    pub rain_probability: f64,
    #[validate(range(min = 0.0))]
    #[serde(default)]
    pub expected_rain_amount: f64,
}

/// Append a sensor reading to a field's history
pub async fn record_reading(
    State(state): State<AppState>,
    Path(field_id): Path<FieldId>,
    Json(input): Json<RecordReadingInput>,
) -> AppResult<StatusCode> {
    input
        .validate()
        .map_err(|e| AppError::ValidationError(e.to_string()))?;

    let reading = SensorReading::new(
        field_id,
        input.timestamp.unwrap_or_else(Utc::now),
        input.moisture,
        input.temperature,
        input.rain_observed,
    );
    state.fields.record_reading(&reading).await?;
    Ok(StatusCode::CREATED)
}

/// Append a forecast to a field's history
pub async fn record_forecast(
    State(state): State<AppState>,
    Path(field_id): Path<FieldId>,
    Json(input): Json<RecordForecastInput>,
) -> AppResult<StatusCode> {
    input
        .validate()
        .map_err(|e| AppError::ValidationError(e.to_string()))?;

    let forecast = ForecastRecord::new(
        field_id,
        input.forecast_timestamp,
        input.rain_probability,
        input.expected_rain_amount,
    );
    state.fields.record_forecast(&forecast).await?;
    Ok(StatusCode::CREATED)
}
