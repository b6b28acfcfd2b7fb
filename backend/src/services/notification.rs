//! Owner notifications produced by the periodic rain check

use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shared::{FieldId, IrrigationAction, IrrigationDecision, UserId, Verdict};
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{AppError, AppResult};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Notification {
    pub id: Uuid,
    pub user_id: UserId,
    pub field_id: FieldId,
    pub verdict: Verdict,
    /// Action the decision engine took for the field
    pub action: IrrigationAction,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    pub fn new(user_id: UserId, field_id: FieldId, verdict: Verdict, action: IrrigationAction, message: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            field_id,
            verdict,
            action,
            message,
            created_at: Utc::now(),
        }
    }

    /// Notification for the owner of a decided field, if the verdict warrants one
    pub fn for_decision(user_id: UserId, field_name: &str, decision: &IrrigationDecision) -> Option<Self> {
        let verdict = decision.verdict?;
        let message = decision_message(field_name, decision)?;
        Some(Self::new(user_id, decision.field_id, verdict, decision.action, message))
    }
}

/// Owner-facing message for a decision; `None` when nothing is worth saying
pub fn decision_message(field_name: &str, decision: &IrrigationDecision) -> Option<String> {
    let advice = match decision.verdict? {
        Verdict::DistrustIrrigate => {
            "the forecast claims rain but rain forecasts have not held here. Do not skip irrigation."
        }
        Verdict::TrustWait => "rain is expected and this field's history backs the forecast. Irrigation can wait.",
        Verdict::SurpriseRainCaution => {
            "no rain is forecast, but this field's model expects some. Watch the field before irrigating heavily."
        }
        Verdict::NormalSchedule => return None,
    };

    let action = match decision.target_moisture {
        Some(target) => format!("{} up to {target:.1}%", decision.action),
        None => decision.action.to_string(),
    };
    Some(format!(
        "Field '{field_name}': {advice} Moisture {:.1}%, action {action}.",
        decision.moisture
    ))
}

/// Destination for notifications
#[async_trait]
pub trait NotificationSink: Send + Sync {
    /// Persist a batch, returning how many were stored
    async fn commit(&self, notifications: Vec<Notification>) -> AppResult<usize>;
}

/// Notifications stored in the `notifications` table
#[derive(Clone)]
pub struct PgNotificationSink {
    db: PgPool,
}

impl PgNotificationSink {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl NotificationSink for PgNotificationSink {
    async fn commit(&self, notifications: Vec<Notification>) -> AppResult<usize> {
        if notifications.is_empty() {
            return Ok(0);
        }

        let mut tx = self.db.begin().await?;
        for n in &notifications {
            sqlx::query(
                r#"
                INSERT INTO notifications (id, user_id, field_id, verdict, action, message, created_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                "#,
            )
            .bind(n.id)
            .bind(n.user_id)
            .bind(n.field_id)
            .bind(n.verdict.to_string())
            .bind(n.action.to_string())
            .bind(&n.message)
            .bind(n.created_at)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        Ok(notifications.len())
    }
}

/// Notifications collected in memory
#[derive(Debug, Default)]
pub struct InMemoryNotificationSink {
    sent: Mutex<Vec<Notification>>,
}

impl InMemoryNotificationSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notifications(&self) -> Vec<Notification> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl NotificationSink for InMemoryNotificationSink {
    async fn commit(&self, notifications: Vec<Notification>) -> AppResult<usize> {
        let count = notifications.len();
        self.sent
            .lock()
            .map_err(|_| AppError::Internal("notification sink lock poisoned".to_string()))?
            .extend(notifications);
        Ok(count)
    }
}
