//! HTTP handlers for model training and forecast validation

use axum::{
    extract::{Path, State},
    Json,
};
use serde::Deserialize;
use shared::{BatchReport, CurrentConditions, FieldId, RainValidation};
use validator::Validate;

use crate::error::{AppError, AppResult};
use crate::ml::TrainingReport;
use crate::services::prediction::{ModelStatus, ModelStatusSummary};
use crate::AppState;

/// Current conditions supplied by the caller
#[derive(Debug, Deserialize, Validate)]
pub struct PredictionInput {
    #[validate(range(min = 0.0, max = 100.0))]
    pub moisture: f64,
    #[validate(range(min = -50.0, max = 70.0))]
    pub temperature: f64,
    #[validate(range(min = 0.0, max = 100.0))]
    pub rain_probability: Option<f64>,
    #[validate(range(min = 0.0))]
    pub expected_rain_amount: Option<f64>,
}

impl From<PredictionInput> for CurrentConditions {
    fn from(input: PredictionInput) -> Self {
        CurrentConditions {
            moisture: input.moisture,
            temperature: input.temperature,
            rain_probability: input.rain_probability,
            expected_rain_amount: input.expected_rain_amount,
        }
    }
}

/// Train one field's model
pub async fn train_field_model(
    State(state): State<AppState>,
    Path(field_id): Path<FieldId>,
) -> AppResult<Json<TrainingReport>> {
    let report = state.prediction.train(field_id).await?;
    Ok(Json(report))
}

/// Train every field's model
pub async fn train_all_models(State(state): State<AppState>) -> AppResult<Json<BatchReport<TrainingReport>>> {
    let report = state.prediction.train_all().await?;
    Ok(Json(report))
}

/// Validate caller-supplied conditions against the field's model
pub async fn predict_field_rain(
    State(state): State<AppState>,
    Path(field_id): Path<FieldId>,
    Json(input): Json<PredictionInput>,
) -> AppResult<Json<RainValidation>> {
    input
        .validate()
        .map_err(|e| AppError::ValidationError(e.to_string()))?;

    let validation = state.prediction.predict(field_id, &input.into()).await?;
    Ok(Json(validation))
}

/// Validate the latest stored conditions
pub async fn predict_field_rain_latest(
    State(state): State<AppState>,
    Path(field_id): Path<FieldId>,
) -> AppResult<Json<RainValidation>> {
    let validation = state.prediction.predict_latest(field_id).await?;
    Ok(Json(validation))
}

pub async fn predict_all_fields(State(state): State<AppState>) -> AppResult<Json<BatchReport<RainValidation>>> {
    let report = state.prediction.predict_all().await?;
    Ok(Json(report))
}

pub async fn get_model_status(
    State(state): State<AppState>,
    Path(field_id): Path<FieldId>,
) -> AppResult<Json<ModelStatus>> {
    let status = state.prediction.status(field_id)?;
    Ok(Json(status))
}

pub async fn list_model_statuses(State(state): State<AppState>) -> AppResult<Json<Vec<ModelStatusSummary>>> {
    let statuses = state.prediction.status_all()?;
    Ok(Json(statuses))
}

/// Regenerate the registry from stored artifacts
pub async fn rebuild_model_registry(State(state): State<AppState>) -> AppResult<Json<serde_json::Value>> {
    let rebuilt = state.prediction.rebuild_registry()?;
    Ok(Json(serde_json::json!({ "rebuilt": rebuilt })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_out_of_range_probability() {
        let input = PredictionInput {
            moisture: 40.0,
            temperature: 20.0,
            rain_probability: Some(140.0),
            expected_rain_amount: None,
        };
        assert!(input.validate().is_err());
    }

    #[test]
    fn accepts_missing_forecast() {
        let input = PredictionInput {
            moisture: 40.0,
            temperature: 20.0,
            rain_probability: None,
            expected_rain_amount: None,
        };
        assert!(input.validate().is_ok());
    }
}
