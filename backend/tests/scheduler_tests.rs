//! Tests for the periodic rain-check and retrain jobs

mod common;

use std::sync::Arc;

use common::{history, Harness, StaticForecast};
use shared::{Field, FieldScope, IrrigationAction, PlantThresholds, Verdict};
use smart_irrigation_backend::{
    scheduler::{PeriodicJob, RainCheckJob, RetrainJob},
    services::{FieldRepository, InMemoryNotificationSink, NotificationSink},
    simulation::Scenario,
};

fn thresholds() -> PlantThresholds {
    PlantThresholds::new(25.0, 70.0, 10.0, 6)
}

fn rain_check(h: &Harness, sink: Arc<InMemoryNotificationSink>, scope: FieldScope) -> RainCheckJob {
    let repo: Arc<dyn FieldRepository> = h.repo.clone();
    let sink: Arc<dyn NotificationSink> = sink;
    RainCheckJob::new(repo, h.irrigation.clone(), sink, scope)
}

// =============================================================================
// Rain check
// =============================================================================

mod rain_check {
    use super::*;

    #[tokio::test]
    async fn distrusted_forecast_notifies_owner_with_decided_action() {
        let h = Harness::new(Arc::new(StaticForecast::dry()));
        let data = history(1, Scenario::UnreliableForecast, thresholds(), 30, 7);
        h.seed_with_latest(Field::new(1, "North", thresholds()).with_owner(10), data, 12.0, Some(80.0));
        h.prediction.train(1).await.unwrap();

        // Owned but never trained: decided on thresholds alone, nothing to report
        h.seed_with_latest(
            Field::new(2, "South", thresholds()).with_owner(10),
            (Vec::new(), Vec::new()),
            40.0,
            None,
        );
        // No owner: decided, nobody to notify
        h.seed_with_latest(Field::new(3, "Orphan", thresholds()), (Vec::new(), Vec::new()), 40.0, None);
        // No readings: the decision fails in its own slot
        h.repo.add_field(Field::new(4, "Bare", thresholds()).with_owner(10)).unwrap();

        let sink = Arc::new(InMemoryNotificationSink::new());
        let summary = rain_check(&h, sink.clone(), FieldScope::All).run_once().await.unwrap();

        assert_eq!(summary.processed, 4);
        assert_eq!(summary.succeeded, 3);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.notifications, 1);

        let sent = sink.notifications();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].user_id, 10);
        assert_eq!(sent[0].field_id, 1);
        assert_eq!(sent[0].verdict, Verdict::DistrustIrrigate);
        assert_eq!(sent[0].action, IrrigationAction::DefensiveIrrigation);
        assert!(sent[0].message.contains("Field 'North'"));
        assert!(sent[0].message.contains("DEFENSIVE_IRRIGATION up to 25.0%"));
    }

    #[tokio::test]
    async fn scope_limits_checked_fields() {
        let h = Harness::new(Arc::new(StaticForecast::dry()));
        let data = history(1, Scenario::UnreliableForecast, thresholds(), 30, 7);
        h.seed_with_latest(Field::new(1, "North", thresholds()).with_owner(10), data, 40.0, Some(80.0));
        h.prediction.train(1).await.unwrap();

        let sink = Arc::new(InMemoryNotificationSink::new());
        let summary = rain_check(&h, sink.clone(), FieldScope::Owner(99)).run_once().await.unwrap();

        assert_eq!(summary.processed, 0);
        assert!(sink.notifications().is_empty());
    }
}

// =============================================================================
// Retrain
// =============================================================================

mod retrain {
    use super::*;

    #[tokio::test]
    async fn retrain_reports_per_field_counts() {
        let h = Harness::new(Arc::new(StaticForecast::dry()));
        for id in 1..=3 {
            let (mut readings, forecasts) = history(id, Scenario::Ideal, thresholds(), 8, 5);
            if id == 3 {
                readings.truncate(10);
            }
            h.repo.seed(Field::new(id, format!("F{id}"), thresholds()), readings, forecasts).unwrap();
        }

        let job = RetrainJob::new(h.prediction.clone());
        assert_eq!(job.name(), "retrain_all");

        let summary = job.run_once().await.unwrap();
        assert_eq!(summary.processed, 3);
        assert_eq!(summary.succeeded, 2);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.notifications, 0);
    }
}
