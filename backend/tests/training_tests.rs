//! Tests for per-field model training, persistence and batch training

mod common;

use std::sync::Arc;

use chrono::{TimeZone, Utc};
use common::{fast_ml_config, history, Harness, StaticForecast};
use shared::{CurrentConditions, Field, PlantThresholds};
use smart_irrigation_backend::{
    ml::{
        validate_with_model, ArtifactStore, FsArtifactStore, JsonFileRegistry, ModelTrainer, Registry,
        MIN_TRAINING_READINGS,
    },
    simulation::Scenario,
    AppError,
};

fn tomato() -> PlantThresholds {
    PlantThresholds::new(30.0, 70.0, 10.0, 6)
}

// =============================================================================
// Data sufficiency
// =============================================================================

mod sufficiency {
    use super::*;
    use shared::{ForecastRecord, SensorReading};

    fn trainer() -> ModelTrainer {
        let h = Harness::new(Arc::new(StaticForecast::dry()));
        ModelTrainer::new(h.artifacts.clone(), h.registry.clone(), fast_ml_config())
    }

    fn truncated(n: usize) -> (Vec<SensorReading>, Vec<ForecastRecord>) {
        let (mut readings, forecasts) = history(1, Scenario::Ideal, tomato(), 10, 3);
        readings.truncate(n);
        (readings, forecasts)
    }

    #[test]
    fn nineteen_readings_are_rejected() {
        let (readings, forecasts) = truncated(MIN_TRAINING_READINGS - 1);
        let err = trainer().train(1, &readings, &forecasts).unwrap_err();
        match err {
            AppError::InsufficientData { found, required, .. } => {
                assert_eq!(found, 19);
                assert_eq!(required, 20);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn twenty_readings_train() {
        let (readings, forecasts) = truncated(MIN_TRAINING_READINGS);
        let report = trainer().train(1, &readings, &forecasts).unwrap();
        assert_eq!(report.sample_count, 20);
        assert_eq!(report.train_size + report.test_size, 20);
    }

    #[test]
    fn other_fields_readings_do_not_count() {
        let (mut readings, forecasts) = truncated(MIN_TRAINING_READINGS - 1);
        let (foreign, _) = history(2, Scenario::Ideal, tomato(), 10, 3);
        readings.extend(foreign);
        assert!(matches!(
            trainer().train(1, &readings, &forecasts),
            Err(AppError::InsufficientData { found: 19, .. })
        ));
    }
}

// =============================================================================
// Determinism
// =============================================================================

mod determinism {
    use super::*;

    #[tokio::test]
    async fn identical_history_gives_identical_metrics() {
        let data = history(4, Scenario::ReliableForecast, tomato(), 20, 11);

        let mut reports = Vec::new();
        for _ in 0..2 {
            let h = Harness::new(Arc::new(StaticForecast::dry()));
            h.repo.seed(Field::new(4, "North", tomato()), data.0.clone(), data.1.clone()).unwrap();
            reports.push(h.prediction.train(4).await.unwrap());
        }

        assert_eq!(reports[0].accuracy, reports[1].accuracy);
        assert_eq!(reports[0].f1_score, reports[1].f1_score);
        assert_eq!(reports[0].feature_importances, reports[1].feature_importances);
    }

    #[test]
    fn importances_are_sorted_descending() {
        let h = Harness::new(Arc::new(StaticForecast::dry()));
        let trainer = ModelTrainer::new(h.artifacts.clone(), h.registry.clone(), fast_ml_config());
        let (readings, forecasts) = history(5, Scenario::ReliableForecast, tomato(), 15, 2);

        let report = trainer.train(5, &readings, &forecasts).unwrap();
        assert_eq!(report.feature_importances.len(), 14);
        for pair in report.feature_importances.windows(2) {
            assert!(pair[0].importance >= pair[1].importance);
        }
        assert!((0.0..=1.0).contains(&report.accuracy));
        assert!((0.0..=1.0).contains(&report.f1_score));
    }
}

// =============================================================================
// Persistence
// =============================================================================

mod persistence {
    use super::*;

    #[test]
    fn artifact_reloads_with_identical_predictions() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(FsArtifactStore::new(dir.path()).unwrap());
        let registry = Arc::new(JsonFileRegistry::in_dir(dir.path()));
        let trainer = ModelTrainer::new(store.clone(), registry, fast_ml_config());

        let (readings, forecasts) = history(8, Scenario::ReliableForecast, tomato(), 15, 5);
        trainer.train(8, &readings, &forecasts).unwrap();

        let before = store.get(8).unwrap().unwrap();
        let reopened = FsArtifactStore::new(dir.path()).unwrap();
        let after = reopened.get(8).unwrap().unwrap();
        assert_eq!(before, after);

        let now = Utc.with_ymd_and_hms(2024, 7, 14, 15, 0, 0).unwrap();
        for (moisture, probability) in [(20.0, 80.0), (45.0, 10.0), (60.0, 55.0)] {
            let conditions = CurrentConditions {
                moisture,
                temperature: 24.0,
                rain_probability: Some(probability),
                expected_rain_amount: Some(3.0),
            };
            assert_eq!(
                validate_with_model(&before, &conditions, now),
                validate_with_model(&after, &conditions, now)
            );
        }
    }

    #[test]
    fn registry_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(FsArtifactStore::new(dir.path()).unwrap());
        let registry = Arc::new(JsonFileRegistry::in_dir(dir.path()));
        let trainer = ModelTrainer::new(store, registry, fast_ml_config());

        for id in [1, 2] {
            let (readings, forecasts) = history(id, Scenario::Ideal, tomato(), 8, 9);
            trainer.train(id, &readings, &forecasts).unwrap();
        }

        let reopened = JsonFileRegistry::in_dir(dir.path());
        let all = reopened.all().unwrap();
        assert_eq!(all.keys().copied().collect::<Vec<_>>(), vec![1, 2]);
        assert_eq!(all[&1].feature_count, 14);
    }

    #[tokio::test]
    async fn status_reflects_training() {
        let h = Harness::new(Arc::new(StaticForecast::dry()));
        let data = history(3, Scenario::Ideal, tomato(), 8, 1);
        h.repo.seed(Field::new(3, "South", tomato()), data.0, data.1).unwrap();

        let before = h.prediction.status(3).unwrap();
        assert!(!before.trained);
        assert!(before.accuracy.is_none());

        let report = h.prediction.train(3).await.unwrap();
        let after = h.prediction.status(3).unwrap();
        assert!(after.trained);
        assert_eq!(after.accuracy, Some(report.accuracy));
        assert_eq!(after.sample_count, Some(32));
        assert!(after.model_size_kb.unwrap() > 0.0);
    }

    #[tokio::test]
    async fn training_unknown_field_is_not_found() {
        let h = Harness::new(Arc::new(StaticForecast::dry()));
        assert!(matches!(h.prediction.train(404).await, Err(AppError::NotFound(_))));
    }
}

// =============================================================================
// Batch training
// =============================================================================

mod batch {
    use super::*;

    #[tokio::test]
    async fn one_thin_field_does_not_abort_the_batch() {
        let h = Harness::new(Arc::new(StaticForecast::dry()));
        for id in 1..=12 {
            let (mut readings, forecasts) = history(id, Scenario::Ideal, tomato(), 8, 21);
            if id == 7 {
                readings.truncate(5);
            }
            h.repo
                .seed(Field::new(id, format!("Field {id}"), tomato()), readings, forecasts)
                .unwrap();
        }

        let report = h.prediction.train_all().await.unwrap();
        assert_eq!(report.total, 12);
        assert_eq!(report.succeeded, 11);
        assert_eq!(report.failed, 1);

        let thin = report.outcome(7).unwrap();
        assert!(!thin.is_success());
        assert_eq!(thin.error.as_ref().unwrap().code, "INSUFFICIENT_DATA");

        assert!(!h.artifacts.exists(7));
        assert!(h.artifacts.exists(6));
        assert_eq!(h.prediction.status_all().unwrap().len(), 11);
    }

    #[tokio::test]
    async fn registry_rebuild_recovers_entries() {
        let h = Harness::new(Arc::new(StaticForecast::dry()));
        let data = history(2, Scenario::Ideal, tomato(), 8, 4);
        h.repo.seed(Field::new(2, "East", tomato()), data.0, data.1).unwrap();
        h.prediction.train(2).await.unwrap();

        // Fresh registry over the same artifacts
        let fresh = Harness::new(Arc::new(StaticForecast::dry()));
        fresh.artifacts.put(&h.artifacts.get(2).unwrap().unwrap()).unwrap();
        assert!(!fresh.prediction.status(2).unwrap().trained);

        assert_eq!(fresh.prediction.rebuild_registry().unwrap(), 1);
        assert!(fresh.prediction.status(2).unwrap().trained);
    }
}
