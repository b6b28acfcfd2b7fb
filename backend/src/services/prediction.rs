//! Prediction service: training, forecast validation and model status

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use shared::{BatchReport, CurrentConditions, FieldId, FieldOutcome, FieldScope, RainValidation, ReliabilitySummary};

use crate::config::MlConfig;
use crate::error::{AppError, AppResult};
use crate::ml::{rebuild_from_artifacts, ArtifactStore, ModelTrainer, RainValidator, Registry, TrainingReport};
use crate::services::field_data::FieldRepository;

/// Status of one field's model
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ModelStatus {
    pub field_id: FieldId,
    pub trained: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accuracy: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub f1_score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sample_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feature_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rain_ratio: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trained_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reliability: Option<ReliabilitySummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_size_kb: Option<f64>,
}

impl ModelStatus {
    fn untrained(field_id: FieldId, message: impl Into<String>) -> Self {
        Self {
            field_id,
            trained: false,
            message: Some(message.into()),
            accuracy: None,
            f1_score: None,
            sample_count: None,
            feature_count: None,
            rain_ratio: None,
            trained_at: None,
            reliability: None,
            model_size_kb: None,
        }
    }
}

/// Registry view used by `status_all`
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ModelStatusSummary {
    pub field_id: FieldId,
    /// Whether the artifact still exists
    pub trained: bool,
    pub accuracy: f64,
    pub f1_score: f64,
    pub sample_count: usize,
    pub trained_at: DateTime<Utc>,
    pub overall_hit_rate: f64,
    pub is_reliable: bool,
}

/// Invocation surface for per-field models
pub struct PredictionService {
    repo: Arc<dyn FieldRepository>,
    artifacts: Arc<dyn ArtifactStore>,
    registry: Arc<dyn Registry>,
    trainer: ModelTrainer,
    validator: RainValidator,
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

impl PredictionService {
    pub fn new(
        repo: Arc<dyn FieldRepository>,
        artifacts: Arc<dyn ArtifactStore>,
        registry: Arc<dyn Registry>,
        config: MlConfig,
    ) -> Self {
        let trainer = ModelTrainer::new(artifacts.clone(), registry.clone(), config);
        let validator = RainValidator::new(artifacts.clone());
        Self {
            repo,
            artifacts,
            registry,
            trainer,
            validator,
        }
    }

    /// Train one field from its full stored history
    pub async fn train(&self, field_id: FieldId) -> AppResult<TrainingReport> {
        if self.repo.get_field(field_id).await?.is_none() {
            return Err(AppError::NotFound(format!("field {}", field_id)));
        }

        let readings = self.repo.sensor_readings(field_id).await?;
        let forecasts = self.repo.forecasts(field_id).await?;

        let trainer = self.trainer.clone();
        tokio::task::spawn_blocking(move || trainer.train(field_id, &readings, &forecasts))
            .await
            .map_err(|e| AppError::TrainingFailure {
                field_id,
                message: format!("training task aborted: {}", e),
            })?
    }

    /// Train every field; one field's failure never aborts the batch
    pub async fn train_all(&self) -> AppResult<BatchReport<TrainingReport>> {
        let fields = self.repo.list_fields(FieldScope::All).await?;
        let mut outcomes = Vec::with_capacity(fields.len());

        for field in fields {
            let outcome = match self.train(field.id).await {
                Ok(report) => FieldOutcome::success(field.id, Some(field.name), report),
                Err(e) => {
                    tracing::warn!(field_id = field.id, error = %e, "training failed");
                    FieldOutcome::failure(field.id, Some(field.name), e.code(), e.to_string())
                }
            };
            outcomes.push(outcome);
        }

        let report = BatchReport::from_outcomes(outcomes);
        tracing::info!(
            total = report.total,
            succeeded = report.succeeded,
            failed = report.failed,
            "batch training finished"
        );
        Ok(report)
    }

    /// Validate the forecast in `conditions` against the field's model
    pub async fn predict(&self, field_id: FieldId, conditions: &CurrentConditions) -> AppResult<RainValidation> {
        self.validator.predict(field_id, conditions)
    }

    /// Validate using the latest stored reading and forecast
    pub async fn predict_latest(&self, field_id: FieldId) -> AppResult<RainValidation> {
        if !self.artifacts.exists(field_id) {
            return Err(AppError::ModelNotFound(field_id));
        }

        let now = Utc::now();
        let reading = self
            .repo
            .latest_reading(field_id)
            .await?
            .ok_or(AppError::NoSensorData(field_id))?;
        let forecast = self.repo.latest_forecast_before(field_id, now).await?;

        let conditions = CurrentConditions {
            moisture: reading.moisture,
            temperature: reading.temperature,
            rain_probability: forecast.as_ref().map(|f| f.rain_probability),
            expected_rain_amount: forecast.as_ref().map(|f| f.expected_rain_amount),
        };

        self.validator.predict_at(field_id, &conditions, now)
    }

    /// `predict_latest` for every field, failures isolated per field
    pub async fn predict_all(&self) -> AppResult<BatchReport<RainValidation>> {
        let fields = self.repo.list_fields(FieldScope::All).await?;
        let mut outcomes = Vec::with_capacity(fields.len());

        for field in fields {
            let outcome = match self.predict_latest(field.id).await {
                Ok(validation) => FieldOutcome::success(field.id, Some(field.name), validation),
                Err(e) => {
                    tracing::warn!(field_id = field.id, error = %e, "prediction failed");
                    FieldOutcome::failure(field.id, Some(field.name), e.code(), e.to_string())
                }
            };
            outcomes.push(outcome);
        }

        Ok(BatchReport::from_outcomes(outcomes))
    }

    pub fn status(&self, field_id: FieldId) -> AppResult<ModelStatus> {
        if !self.artifacts.exists(field_id) {
            return Ok(ModelStatus::untrained(field_id, "No model has been trained for this field yet"));
        }
        let Some(entry) = self.registry.get(field_id)? else {
            return Ok(ModelStatus::untrained(
                field_id,
                "Model file exists but has no registry entry; rebuild the registry",
            ));
        };
        let size = self.artifacts.size_bytes(field_id)?;

        Ok(ModelStatus {
            field_id,
            trained: true,
            message: None,
            accuracy: Some(entry.accuracy),
            f1_score: Some(entry.f1_score),
            sample_count: Some(entry.sample_count),
            feature_count: Some(entry.feature_count),
            rain_ratio: Some(entry.rain_ratio),
            trained_at: Some(entry.trained_at),
            reliability: Some(entry.reliability),
            model_size_kb: size.map(|b| round1(b as f64 / 1024.0)),
        })
    }

    pub fn status_all(&self) -> AppResult<Vec<ModelStatusSummary>> {
        Ok(self
            .registry
            .all()?
            .into_iter()
            .map(|(field_id, entry)| ModelStatusSummary {
                field_id,
                trained: self.artifacts.exists(field_id),
                accuracy: entry.accuracy,
                f1_score: entry.f1_score,
                sample_count: entry.sample_count,
                trained_at: entry.trained_at,
                overall_hit_rate: entry.reliability.overall_hit_rate,
                is_reliable: entry.reliability.is_reliable,
            })
            .collect())
    }

    /// Regenerate registry entries from stored artifacts
    pub fn rebuild_registry(&self) -> AppResult<usize> {
        rebuild_from_artifacts(self.artifacts.as_ref(), self.registry.as_ref())
    }
}
