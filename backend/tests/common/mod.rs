//! Shared fixtures for integration tests

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use shared::{Field, FieldId, ForecastRecord, HourlyForecastPoint, PlantThresholds, SensorReading};
use smart_irrigation_backend::{
    config::MlConfig,
    error::{AppError, AppResult},
    external::ForecastSource,
    ml::{InMemoryArtifactStore, InMemoryRegistry},
    services::{FieldRepository, InMemoryFieldRepository, IrrigationService, PredictionService},
    simulation::{simulate, Scenario, SimulationSpec},
};

/// Small ensemble so tests stay fast
pub fn fast_ml_config() -> MlConfig {
    MlConfig {
        n_estimators: 25,
        ..MlConfig::default()
    }
}

/// Simulated history ending two hours ago
pub fn history(field_id: FieldId, scenario: Scenario, thresholds: PlantThresholds, days: u32, seed: u64) -> (Vec<SensorReading>, Vec<ForecastRecord>) {
    let h = simulate(&SimulationSpec {
        field_id,
        scenario,
        thresholds,
        days,
        end: Utc::now() - Duration::hours(2),
        seed,
    });
    (h.readings, h.forecasts)
}

/// Hourly outlook with the same probability every hour around now
pub struct StaticForecast {
    pub probability: f64,
    pub precipitation_mm: f64,
}

impl StaticForecast {
    pub fn rainy() -> Self {
        Self {
            probability: 75.0,
            precipitation_mm: 3.0,
        }
    }

    pub fn dry() -> Self {
        Self {
            probability: 5.0,
            precipitation_mm: 0.0,
        }
    }
}

#[async_trait]
impl ForecastSource for StaticForecast {
    async fn hourly_outlook(&self, _field: &Field) -> AppResult<Vec<HourlyForecastPoint>> {
        let now = Utc::now();
        Ok((-1..24)
            .map(|h| HourlyForecastPoint {
                time: now + Duration::hours(h),
                rain_probability: self.probability,
                precipitation_mm: self.precipitation_mm,
            })
            .collect())
    }
}

/// Dry outlook except for a single rainy hour `hours_ahead` from now
pub struct RainAt {
    pub hours_ahead: i64,
}

#[async_trait]
impl ForecastSource for RainAt {
    async fn hourly_outlook(&self, _field: &Field) -> AppResult<Vec<HourlyForecastPoint>> {
        let now = Utc::now();
        Ok((0..24)
            .map(|h| {
                let rainy = h == self.hours_ahead;
                HourlyForecastPoint {
                    time: now + Duration::hours(h),
                    rain_probability: if rainy { 75.0 } else { 5.0 },
                    precipitation_mm: if rainy { 3.0 } else { 0.0 },
                }
            })
            .collect())
    }
}

/// Feed that always errors
pub struct FailingForecast;

#[async_trait]
impl ForecastSource for FailingForecast {
    async fn hourly_outlook(&self, _field: &Field) -> AppResult<Vec<HourlyForecastPoint>> {
        Err(AppError::UpstreamForecastUnavailable("connection refused".to_string()))
    }
}

/// Feed that never answers in time
pub struct HangingForecast;

#[async_trait]
impl ForecastSource for HangingForecast {
    async fn hourly_outlook(&self, _field: &Field) -> AppResult<Vec<HourlyForecastPoint>> {
        tokio::time::sleep(StdDuration::from_secs(30)).await;
        Ok(Vec::new())
    }
}

pub struct Harness {
    pub repo: Arc<InMemoryFieldRepository>,
    pub artifacts: Arc<InMemoryArtifactStore>,
    pub registry: Arc<InMemoryRegistry>,
    pub prediction: Arc<PredictionService>,
    pub irrigation: Arc<IrrigationService>,
}

impl Harness {
    pub fn new(forecast: Arc<dyn ForecastSource>) -> Self {
        let repo = Arc::new(InMemoryFieldRepository::new());
        let artifacts = Arc::new(InMemoryArtifactStore::new());
        let registry = Arc::new(InMemoryRegistry::new());
        let fields: Arc<dyn FieldRepository> = repo.clone();

        let prediction = Arc::new(PredictionService::new(
            fields.clone(),
            artifacts.clone(),
            registry.clone(),
            fast_ml_config(),
        ));
        let irrigation = Arc::new(IrrigationService::new(
            fields,
            forecast,
            prediction.clone(),
            StdDuration::from_millis(100),
        ));

        Self {
            repo,
            artifacts,
            registry,
            prediction,
            irrigation,
        }
    }

    /// Field with a history plus one final reading/forecast just before now
    pub fn seed_with_latest(
        &self,
        field: Field,
        (mut readings, mut forecasts): (Vec<SensorReading>, Vec<ForecastRecord>),
        moisture: f64,
        forecast_probability: Option<f64>,
    ) {
        let at: DateTime<Utc> = Utc::now() - Duration::minutes(1);
        readings.push(SensorReading::new(field.id, at, moisture, 22.0, false));
        if let Some(p) = forecast_probability {
            forecasts.push(ForecastRecord::new(field.id, at, p, 6.0));
        }
        self.repo.seed(field, readings, forecasts).unwrap();
    }
}
