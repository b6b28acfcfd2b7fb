//! Per-field model training

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shared::{FieldId, ForecastRecord, ReliabilitySummary, SensorReading};

use super::artifact::{ArtifactStore, TrainedModel, ARTIFACT_FORMAT_VERSION};
use super::features::build_training_dataset;
use super::forest::{ForestParams, RandomForest};
use super::metrics::{classification_report, stratified_split, ClassificationReport};
use super::registry::{Registry, RegistryEntry};
use super::reliability::estimate_reliability;
use crate::config::MlConfig;
use crate::error::{AppError, AppResult};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FeatureImportance {
    pub feature: String,
    pub importance: f64,
}

/// Outcome of one successful training run
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TrainingReport {
    pub field_id: FieldId,
    /// Held-out accuracy in `[0, 1]`, 4 decimals
    pub accuracy: f64,
    /// Held-out weighted F1 in `[0, 1]`, 4 decimals
    pub f1_score: f64,
    pub sample_count: usize,
    pub train_size: usize,
    pub test_size: usize,
    /// Descending by importance
    pub feature_importances: Vec<FeatureImportance>,
    pub reliability: ReliabilitySummary,
    pub classification_report: ClassificationReport,
    pub artifact_location: String,
    pub info: String,
    pub trained_at: DateTime<Utc>,
}

fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

/// Trains, evaluates and persists one model per field
#[derive(Clone)]
pub struct ModelTrainer {
    artifacts: Arc<dyn ArtifactStore>,
    registry: Arc<dyn Registry>,
    config: MlConfig,
}

impl ModelTrainer {
    pub fn new(artifacts: Arc<dyn ArtifactStore>, registry: Arc<dyn Registry>, config: MlConfig) -> Self {
        Self {
            artifacts,
            registry,
            config,
        }
    }

    fn forest_params(&self) -> ForestParams {
        ForestParams {
            n_estimators: self.config.n_estimators,
            max_depth: self.config.max_depth,
            min_samples_split: self.config.min_samples_split,
            min_samples_leaf: self.config.min_samples_leaf,
            seed: self.config.random_seed,
        }
    }

    /// Train the field's model and atomically replace its artifact
    ///
    /// On any failure the previous artifact and registry entry stay in place.
    pub fn train(
        &self,
        field_id: FieldId,
        readings: &[SensorReading],
        forecasts: &[ForecastRecord],
    ) -> AppResult<TrainingReport> {
        let dataset = build_training_dataset(field_id, readings, forecasts)?;
        let info = dataset.describe();
        tracing::info!(field_id, "{}", info);

        let split = stratified_split(&dataset.targets, self.config.test_ratio, self.config.random_seed);
        let select_rows = |idx: &[usize]| -> Vec<Vec<f64>> { idx.iter().map(|&i| dataset.rows[i].clone()).collect() };
        let select_targets = |idx: &[usize]| -> Vec<bool> { idx.iter().map(|&i| dataset.targets[i]).collect() };

        let x_train = select_rows(&split.train);
        let y_train = select_targets(&split.train);
        let x_test = select_rows(&split.test);
        let y_test = select_targets(&split.test);

        let classifier = RandomForest::fit(&x_train, &y_train, &self.forest_params()).map_err(|e| {
            AppError::TrainingFailure {
                field_id,
                message: e.to_string(),
            }
        })?;

        let y_pred: Vec<bool> = x_test.iter().map(|row| classifier.predict(row)).collect();
        let report = classification_report(&y_test, &y_pred);
        let accuracy = round4(report.accuracy);
        let f1_score = round4(report.weighted_f1);

        let mut feature_importances: Vec<FeatureImportance> = dataset
            .columns
            .iter()
            .zip(classifier.feature_importances())
            .map(|(feature, &importance)| FeatureImportance {
                feature: feature.clone(),
                importance: round4(importance),
            })
            .collect();
        feature_importances.sort_by(|a, b| b.importance.total_cmp(&a.importance));

        let reliability = estimate_reliability(field_id, readings, forecasts);
        let trained_at = Utc::now();

        let model = TrainedModel {
            format_version: ARTIFACT_FORMAT_VERSION,
            field_id,
            classifier,
            feature_columns: dataset.columns.clone(),
            reliability: reliability.clone(),
            accuracy,
            f1_score,
            sample_count: dataset.len(),
            rain_ratio: round4(dataset.rain_ratio()),
            trained_at,
        };

        self.artifacts.put(&model)?;
        self.registry.upsert(field_id, RegistryEntry::from(&model))?;

        tracing::info!(
            field_id,
            accuracy,
            f1_score,
            samples = dataset.len(),
            hit_rate = reliability.overall_hit_rate,
            "model trained"
        );

        Ok(TrainingReport {
            field_id,
            accuracy,
            f1_score,
            sample_count: dataset.len(),
            train_size: split.train.len(),
            test_size: split.test.len(),
            feature_importances,
            reliability,
            classification_report: report,
            artifact_location: self.artifacts.location(field_id),
            info,
            trained_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::artifact::InMemoryArtifactStore;
    use crate::ml::registry::InMemoryRegistry;
    use chrono::{Duration, TimeZone};

    fn history(field_id: FieldId, n: usize) -> (Vec<SensorReading>, Vec<ForecastRecord>) {
        let start = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        (0..n)
            .map(|i| {
                let ts = start + Duration::hours(6 * i as i64);
                let rain = i % 3 == 0;
                let probability = if rain { 75.0 } else { 15.0 };
                (
                    SensorReading::new(field_id, ts, 30.0 + (i % 7) as f64, 15.0 + (i % 5) as f64, rain),
                    ForecastRecord::new(field_id, ts, probability, if rain { 4.0 } else { 0.0 }),
                )
            })
            .unzip()
    }

    fn trainer() -> (ModelTrainer, Arc<InMemoryArtifactStore>, Arc<InMemoryRegistry>) {
        let artifacts = Arc::new(InMemoryArtifactStore::new());
        let registry = Arc::new(InMemoryRegistry::new());
        let config = MlConfig {
            n_estimators: 15,
            ..MlConfig::default()
        };
        (ModelTrainer::new(artifacts.clone(), registry.clone(), config), artifacts, registry)
    }

    #[test]
    fn trains_and_persists() {
        let (trainer, artifacts, registry) = trainer();
        let (readings, forecasts) = history(5, 60);

        let report = trainer.train(5, &readings, &forecasts).unwrap();

        assert_eq!(report.sample_count, 60);
        assert_eq!(report.train_size + report.test_size, 60);
        assert!((0.0..=1.0).contains(&report.accuracy));
        assert!(artifacts.exists(5));
        assert_eq!(registry.get(5).unwrap().unwrap().accuracy, report.accuracy);
    }

    #[test]
    fn failure_leaves_previous_artifact() {
        let (trainer, artifacts, _) = trainer();
        let (readings, forecasts) = history(5, 60);
        trainer.train(5, &readings, &forecasts).unwrap();
        let before = artifacts.get(5).unwrap().unwrap();

        let err = trainer.train(5, &readings[..10], &forecasts).unwrap_err();
        assert!(matches!(err, AppError::InsufficientData { found: 10, .. }));
        assert_eq!(artifacts.get(5).unwrap().unwrap(), before);
    }
}
