//! Forecast Validator
//!
//! Runs a field's model on the current conditions and turns the external
//! forecast, the model's rain probability and the field's monthly hit rate
//! into a [`Verdict`] with a written rationale.

use std::sync::Arc;

use chrono::{DateTime, Datelike, Utc};
use shared::{CurrentConditions, FieldId, RainValidation, Verdict};

use super::artifact::{ArtifactStore, TrainedModel};
use super::features::{FeatureRow, TemporalFeatures};
use crate::error::{AppError, AppResult};

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

fn rationale(verdict: Verdict, forecast: f64, model: f64, month_hit_rate: f64) -> String {
    match verdict {
        Verdict::TrustWait => format!(
            "Forecast says rain ({forecast:.0}%) and this field's model agrees with a {model:.1}% \
             rain probability. Rain forecasts were confirmed {month_hit_rate:.0}% of the time this \
             month. Trust the forecast and hold irrigation."
        ),
        Verdict::DistrustIrrigate => format!(
            "Forecast says rain ({forecast:.0}%) but this field's model sees only a {model:.1}% \
             chance of real rain. Rain forecasts were confirmed {month_hit_rate:.0}% of the time \
             this month. Do not rely on it; irrigate defensively."
        ),
        Verdict::SurpriseRainCaution => format!(
            "Forecast is dry ({forecast:.0}%) but this field's model sees a {model:.1}% rain \
             probability. Unforecast rain has fallen here under similar conditions; irrigate with caution."
        ),
        Verdict::NormalSchedule => format!(
            "Neither the forecast ({forecast:.0}%) nor this field's model ({model:.1}%) expects rain. \
             Keep the normal irrigation schedule."
        ),
    }
}

/// Validate the forecast in `conditions` with an already loaded model
pub fn validate_with_model(model: &TrainedModel, conditions: &CurrentConditions, now: DateTime<Utc>) -> RainValidation {
    let forecast_probability = conditions.forecast_probability();

    let row = FeatureRow {
        moisture: conditions.moisture,
        temperature: conditions.temperature,
        temporal: TemporalFeatures::from_timestamp(now),
        rain_probability: forecast_probability,
        expected_rain_amount: conditions.forecast_amount(),
        recent_forecast_hit_rate: model.reliability.overall_hit_rate / 100.0,
    };

    let model_probability = round1(model.rain_probability(&row) * 100.0);
    let month = now.month();
    let month_hit_rate = model.reliability.hit_rate_for_month(month);
    let verdict = Verdict::resolve(forecast_probability, model_probability, month_hit_rate);

    RainValidation {
        field_id: model.field_id,
        forecast_rain_probability: forecast_probability,
        model_rain_probability: model_probability,
        month,
        month_hit_rate,
        overall_hit_rate: model.reliability.overall_hit_rate,
        forecast_reliable: model.reliability.is_reliable,
        verdict,
        rationale: rationale(verdict, forecast_probability, model_probability, month_hit_rate),
        model_accuracy: round1(model.accuracy * 100.0),
        trained_at: model.trained_at,
    }
}

/// Loads artifacts on demand and validates forecasts against them
#[derive(Clone)]
pub struct RainValidator {
    artifacts: Arc<dyn ArtifactStore>,
}

impl RainValidator {
    pub fn new(artifacts: Arc<dyn ArtifactStore>) -> Self {
        Self { artifacts }
    }

    pub fn predict(&self, field_id: FieldId, conditions: &CurrentConditions) -> AppResult<RainValidation> {
        self.predict_at(field_id, conditions, Utc::now())
    }

    /// Validate as of `now`, which drives the calendar features
    pub fn predict_at(
        &self,
        field_id: FieldId,
        conditions: &CurrentConditions,
        now: DateTime<Utc>,
    ) -> AppResult<RainValidation> {
        let model = self
            .artifacts
            .get(field_id)?
            .ok_or(AppError::ModelNotFound(field_id))?;

        let validation = validate_with_model(&model, conditions, now);
        tracing::debug!(
            field_id,
            verdict = %validation.verdict,
            forecast = validation.forecast_rain_probability,
            model = validation.model_rain_probability,
            "forecast validated"
        );
        Ok(validation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::artifact::InMemoryArtifactStore;

    #[test]
    fn missing_model_is_model_not_found() {
        let validator = RainValidator::new(Arc::new(InMemoryArtifactStore::new()));
        let conditions = CurrentConditions {
            moisture: 40.0,
            temperature: 20.0,
            rain_probability: Some(70.0),
            expected_rain_amount: Some(3.0),
        };

        let err = validator.predict(11, &conditions).unwrap_err();
        assert!(matches!(err, AppError::ModelNotFound(11)));
    }

    #[test]
    fn rationale_mentions_both_probabilities() {
        let text = rationale(Verdict::DistrustIrrigate, 75.0, 12.3, 40.0);
        assert!(text.contains("75%"));
        assert!(text.contains("12.3%"));
        assert!(text.contains("40%"));
    }
}
