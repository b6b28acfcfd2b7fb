//! Periodic background jobs
//!
//! Each job runs on its own interval inside a [`PeriodicTask`] whose
//! lifecycle belongs to the host process: `start` spawns it and `stop`
//! signals it and waits for the current run to finish.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use shared::FieldScope;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::error::AppResult;
use crate::services::field_data::FieldRepository;
use crate::services::irrigation::IrrigationService;
use crate::services::notification::{Notification, NotificationSink};
use crate::services::prediction::PredictionService;

/// Counters reported by one run of a job
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct JobSummary {
    pub processed: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub notifications: usize,
}

#[async_trait]
pub trait PeriodicJob: Send + Sync + 'static {
    fn name(&self) -> &'static str;

    async fn run_once(&self) -> AppResult<JobSummary>;
}

/// A job running on a fixed interval until stopped
pub struct PeriodicTask {
    name: &'static str,
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl PeriodicTask {
    /// Spawn the job; the first run happens one `every` after start
    pub fn start(job: Arc<dyn PeriodicJob>, every: Duration) -> Self {
        let name = job.name();
        let (shutdown, mut stop) = watch::channel(false);

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        match job.run_once().await {
                            Ok(summary) => tracing::info!(job = name, ?summary, "periodic job finished"),
                            Err(e) => tracing::error!(job = name, error = %e, "periodic job failed"),
                        }
                    }
                    changed = stop.changed() => {
                        if changed.is_err() || *stop.borrow() {
                            break;
                        }
                    }
                }
            }
            tracing::info!(job = name, "periodic job stopped");
        });

        tracing::info!(job = name, interval_secs = every.as_secs(), "periodic job started");
        Self { name, shutdown, handle }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }

    /// Signal the task and wait for it to exit
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.handle.await {
            tracing::error!(job = self.name, error = %e, "periodic job panicked");
        }
    }
}

/// Decides irrigation for every field in scope and notifies owners
///
/// Per-field failures stay in the decision batch; whatever notifications
/// were produced are committed once at the end.
pub struct RainCheckJob {
    repo: Arc<dyn FieldRepository>,
    irrigation: Arc<IrrigationService>,
    sink: Arc<dyn NotificationSink>,
    scope: FieldScope,
}

impl RainCheckJob {
    pub fn new(
        repo: Arc<dyn FieldRepository>,
        irrigation: Arc<IrrigationService>,
        sink: Arc<dyn NotificationSink>,
        scope: FieldScope,
    ) -> Self {
        Self {
            repo,
            irrigation,
            sink,
            scope,
        }
    }
}

#[async_trait]
impl PeriodicJob for RainCheckJob {
    fn name(&self) -> &'static str {
        "rain_check"
    }

    async fn run_once(&self) -> AppResult<JobSummary> {
        let owners: HashMap<_, _> = self
            .repo
            .list_fields(self.scope)
            .await?
            .into_iter()
            .filter_map(|f| f.owner_id.map(|owner| (f.id, (owner, f.name))))
            .collect();

        let report = self.irrigation.decide_all(self.scope).await?;

        let pending: Vec<Notification> = report
            .outcomes
            .iter()
            .filter_map(|outcome| {
                let decision = outcome.result.as_ref()?;
                let (owner, name) = owners.get(&outcome.field_id)?;
                Notification::for_decision(*owner, name, decision)
            })
            .collect();

        Ok(JobSummary {
            processed: report.total,
            succeeded: report.succeeded,
            failed: report.failed,
            notifications: self.sink.commit(pending).await?,
        })
    }
}

/// Retrains every field's model
pub struct RetrainJob {
    prediction: Arc<PredictionService>,
}

impl RetrainJob {
    pub fn new(prediction: Arc<PredictionService>) -> Self {
        Self { prediction }
    }
}

#[async_trait]
impl PeriodicJob for RetrainJob {
    fn name(&self) -> &'static str {
        "retrain_all"
    }

    async fn run_once(&self) -> AppResult<JobSummary> {
        let report = self.prediction.train_all().await?;
        Ok(JobSummary {
            processed: report.total,
            succeeded: report.succeeded,
            failed: report.failed,
            notifications: 0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counting(Arc<AtomicUsize>);

    #[async_trait]
    impl PeriodicJob for Counting {
        fn name(&self) -> &'static str {
            "counting"
        }

        async fn run_once(&self) -> AppResult<JobSummary> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(JobSummary::default())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn runs_on_interval_until_stopped() {
        let runs = Arc::new(AtomicUsize::new(0));
        let task = PeriodicTask::start(Arc::new(Counting(runs.clone())), Duration::from_secs(60));

        tokio::time::sleep(Duration::from_secs(185)).await;
        assert!(task.is_running());
        task.stop().await;

        let seen = runs.load(Ordering::SeqCst);
        assert_eq!(seen, 3);

        tokio::time::sleep(Duration::from_secs(300)).await;
        assert_eq!(runs.load(Ordering::SeqCst), seen);
    }
}
