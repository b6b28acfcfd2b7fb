//! Irrigation decision engine
//!
//! [`evaluate`] is the pure arbiter: moisture state first, then the rain
//! horizon, then the field model's verdict as an override. The service
//! gathers its inputs and never lets a forecast outage fail a decision.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use shared::{
    BatchReport, Field, FieldId, FieldOutcome, FieldScope, ForecastHorizon, IrrigationAction, IrrigationDecision,
    MoistureState, PlantThresholds, PumpDirective, Urgency, Verdict,
};

use crate::error::{AppError, AppResult};
use crate::external::weather::ForecastSource;
use crate::services::field_data::FieldRepository;
use crate::services::prediction::PredictionService;

/// Margin above critical a LOW field needs to wait up to 3h for rain
pub const SHORT_WAIT_BUFFER: f64 = 5.0;

/// Margin above critical a LOW field needs to take a half dose and wait up to 6h
pub const HALF_DOSE_BUFFER: f64 = 10.0;

/// Distance to critical at which a distrusted deferral becomes a minimum dose
pub const DEFENSIVE_MARGIN: f64 = 3.0;

/// Everything the arbiter looks at for one field
#[derive(Debug, Clone, Copy)]
pub struct DecisionInput<'a> {
    pub field_id: FieldId,
    pub moisture: f64,
    pub thresholds: &'a PlantThresholds,
    /// `None` when the forecast feed was unavailable
    pub horizon: Option<&'a ForecastHorizon>,
    /// `None` when the field has no usable model
    pub verdict: Option<Verdict>,
}

impl DecisionInput<'_> {
    /// Rain within `hours`, counted only if the plant may wait that long
    fn rain_within(&self, hours: u32) -> bool {
        hours <= self.thresholds.max_wait_hours && self.horizon.map_or(false, |h| h.rain_within(hours))
    }

    fn horizon_shows_rain(&self) -> bool {
        self.horizon.map_or(false, |h| h.first_rain_in_hours.is_some())
    }
}

struct Branch {
    action: IrrigationAction,
    urgency: Urgency,
    pump_directive: PumpDirective,
    target_moisture: Option<f64>,
    rationale: String,
}

impl Branch {
    fn new(
        action: IrrigationAction,
        urgency: Urgency,
        pump_directive: PumpDirective,
        target_moisture: Option<f64>,
        rationale: String,
    ) -> Self {
        Self {
            action,
            urgency,
            pump_directive,
            target_moisture,
            rationale,
        }
    }

    fn is_deferral(&self) -> bool {
        self.action == IrrigationAction::DeferForRain
    }
}

fn critical_branch(input: &DecisionInput<'_>) -> Branch {
    let t = input.thresholds;
    let m = input.moisture;

    match input.verdict {
        Some(Verdict::DistrustIrrigate) if input.horizon_shows_rain() => Branch::new(
            IrrigationAction::DefensiveIrrigation,
            Urgency::VeryHigh,
            PumpDirective::MinimumDose,
            Some(t.min_moisture),
            format!(
                "Moisture {m:.1}% is below the critical level {:.1}%. Rain is forecast but this field's \
                 model distrusts it; defensive irrigation up to {:.1}% only.",
                t.critical_moisture, t.min_moisture
            ),
        ),
        Some(Verdict::TrustWait) if input.rain_within(1) => Branch::new(
            IrrigationAction::PartialIrrigation,
            Urgency::VeryHigh,
            PumpDirective::HalfDose,
            Some(t.min_moisture),
            format!(
                "Moisture {m:.1}% is below the critical level {:.1}%. Trusted rain is due within the \
                 hour; bridging dose up to {:.1}%.",
                t.critical_moisture, t.min_moisture
            ),
        ),
        _ => {
            let mut rationale = format!(
                "Moisture {m:.1}% is below the critical level {:.1}%. Emergency irrigation up to {:.1}%.",
                t.critical_moisture, t.max_moisture
            );
            if input.horizon.is_none() {
                rationale.push_str(" Forecast data unavailable; not waiting for rain.");
            }
            Branch::new(
                IrrigationAction::EmergencyIrrigation,
                Urgency::VeryHigh,
                PumpDirective::On,
                Some(t.max_moisture),
                rationale,
            )
        }
    }
}

fn low_branch(input: &DecisionInput<'_>) -> Branch {
    let t = input.thresholds;
    let m = input.moisture;
    let c = t.critical_moisture;

    // Distrusted rain near critical: minimum dose whatever the window
    if input.verdict == Some(Verdict::DistrustIrrigate) && m - c <= DEFENSIVE_MARGIN {
        return Branch::new(
            IrrigationAction::DefensiveIrrigation,
            Urgency::High,
            PumpDirective::MinimumDose,
            Some(t.min_moisture),
            format!(
                "Moisture {m:.1}% is within {DEFENSIVE_MARGIN} points of critical ({c:.1}%). Rain is forecast \
                 but this field's model distrusts it; defensive minimum dose up to {:.1}%.",
                t.min_moisture
            ),
        );
    }

    let mut branch = if input.rain_within(1) {
        Branch::new(
            IrrigationAction::DeferForRain,
            Urgency::Low,
            PumpDirective::Off,
            None,
            format!("Moisture {m:.1}% is below the minimum {:.1}%, but rain is expected within 1 hour. Irrigation deferred.", t.min_moisture),
        )
    } else if input.rain_within(3) && m > c + SHORT_WAIT_BUFFER {
        Branch::new(
            IrrigationAction::DeferForRain,
            Urgency::Medium,
            PumpDirective::Off,
            None,
            format!(
                "Moisture {m:.1}% is below the minimum {:.1}% but more than {SHORT_WAIT_BUFFER} points above \
                 critical; rain is expected within 3 hours and the plant can wait.",
                t.min_moisture
            ),
        )
    } else if input.rain_within(6) && m > c + HALF_DOSE_BUFFER {
        let target = (m + t.max_moisture) / 2.0;
        Branch::new(
            IrrigationAction::HalfDoseIrrigation,
            Urgency::Medium,
            PumpDirective::HalfDose,
            Some(target),
            format!(
                "Moisture {m:.1}% is below the minimum {:.1}%; rain is expected within 6 hours. Half dose \
                 up to {target:.1}%, rain completes the job.",
                t.min_moisture
            ),
        )
    } else {
        let mut rationale = format!(
            "Moisture {m:.1}% is below the minimum {:.1}% and no rain is expected in time. Full irrigation \
             up to {:.1}%.",
            t.min_moisture, t.max_moisture
        );
        if input.horizon.is_none() {
            rationale.push_str(" Forecast data unavailable.");
        }
        Branch::new(
            IrrigationAction::FullIrrigation,
            Urgency::High,
            PumpDirective::On,
            Some(t.max_moisture),
            rationale,
        )
    };

    if !branch.is_deferral() {
        return branch;
    }

    match input.verdict {
        Some(Verdict::DistrustIrrigate) => {
            branch.rationale.push_str(
                " This field's model distrusts the rain forecast; irrigation starts once moisture nears critical.",
            );
            branch
        }
        Some(Verdict::TrustWait) => {
            branch
                .rationale
                .push_str(" This field's model confirms the forecast; waiting is safe.");
            branch
        }
        _ => branch,
    }
}

/// Decide the pump action for one field
pub fn evaluate(input: DecisionInput<'_>) -> IrrigationDecision {
    let t = input.thresholds;
    let m = input.moisture;
    let status = MoistureState::classify(m, t);

    let branch = match status {
        MoistureState::Critical => critical_branch(&input),
        MoistureState::Low => low_branch(&input),
        MoistureState::Excess => Branch::new(
            IrrigationAction::HaltIrrigation,
            Urgency::Medium,
            PumpDirective::Off,
            None,
            format!(
                "Moisture {m:.1}% is above the maximum {:.1}%. Irrigation halted to prevent root rot.",
                t.max_moisture
            ),
        ),
        MoistureState::Ideal => Branch::new(
            IrrigationAction::NoAction,
            Urgency::None,
            PumpDirective::Off,
            None,
            format!(
                "Moisture {m:.1}% is within the ideal band {:.1}-{:.1}%. No action needed.",
                t.min_moisture, t.max_moisture
            ),
        ),
    };

    IrrigationDecision {
        field_id: input.field_id,
        moisture: m,
        status,
        action: branch.action,
        urgency: branch.urgency,
        rationale: branch.rationale,
        pump_directive: branch.pump_directive,
        target_moisture: branch.target_moisture,
        verdict: input.verdict,
        forecast_available: input.horizon.is_some(),
    }
}

/// Gathers inputs for [`evaluate`] and runs it for one or many fields
pub struct IrrigationService {
    repo: Arc<dyn FieldRepository>,
    forecasts: Arc<dyn ForecastSource>,
    prediction: Arc<PredictionService>,
    forecast_timeout: Duration,
}

impl IrrigationService {
    pub fn new(
        repo: Arc<dyn FieldRepository>,
        forecasts: Arc<dyn ForecastSource>,
        prediction: Arc<PredictionService>,
        forecast_timeout: Duration,
    ) -> Self {
        Self {
            repo,
            forecasts,
            prediction,
            forecast_timeout,
        }
    }

    /// Near-term outlook, or `None` if the feed failed or timed out
    async fn fetch_horizon(&self, field: &Field) -> Option<ForecastHorizon> {
        let reason = match tokio::time::timeout(self.forecast_timeout, self.forecasts.hourly_outlook(field)).await {
            Ok(Ok(points)) => return Some(ForecastHorizon::from_hourly(&points, Utc::now())),
            Ok(Err(e)) => e.to_string(),
            Err(_) => format!("no answer within {:?}", self.forecast_timeout),
        };

        let err = AppError::UpstreamForecastUnavailable(reason);
        tracing::warn!(field_id = field.id, error = %err, "deciding without forecast");
        None
    }

    pub async fn decide_irrigation(&self, field_id: FieldId) -> AppResult<IrrigationDecision> {
        let field = self
            .repo
            .get_field(field_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("field {}", field_id)))?;
        self.decide_for_field(&field).await
    }

    pub async fn decide_for_field(&self, field: &Field) -> AppResult<IrrigationDecision> {
        let reading = self
            .repo
            .latest_reading(field.id)
            .await?
            .ok_or(AppError::NoSensorData(field.id))?;

        let horizon = self.fetch_horizon(field).await;

        let verdict = match self.prediction.predict_latest(field.id).await {
            Ok(validation) => Some(validation.verdict),
            Err(e) => {
                tracing::debug!(field_id = field.id, error = %e, "no verdict, using threshold policy");
                None
            }
        };

        let decision = evaluate(DecisionInput {
            field_id: field.id,
            moisture: reading.moisture,
            thresholds: &field.thresholds,
            horizon: horizon.as_ref(),
            verdict,
        });

        tracing::info!(
            field_id = field.id,
            status = %decision.status,
            pump = ?decision.pump_directive,
            verdict = ?decision.verdict,
            "irrigation decided"
        );
        Ok(decision)
    }

    /// Decide every field in scope; per-field failures land in their slot
    pub async fn decide_all(&self, scope: FieldScope) -> AppResult<BatchReport<IrrigationDecision>> {
        let fields = self.repo.list_fields(scope).await?;
        let mut outcomes = Vec::with_capacity(fields.len());

        for field in &fields {
            let outcome = match self.decide_for_field(field).await {
                Ok(decision) => FieldOutcome::success(field.id, Some(field.name.clone()), decision),
                Err(e) => {
                    tracing::warn!(field_id = field.id, error = %e, "irrigation decision failed");
                    FieldOutcome::failure(field.id, Some(field.name.clone()), e.code(), e.to_string())
                }
            };
            outcomes.push(outcome);
        }

        Ok(BatchReport::from_outcomes(outcomes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn thresholds() -> PlantThresholds {
        PlantThresholds::new(25.0, 70.0, 10.0, 6)
    }

    fn decide(moisture: f64, rain_in: Option<u32>, verdict: Option<Verdict>) -> IrrigationDecision {
        let t = thresholds();
        let horizon = ForecastHorizon::with_first_rain_in(rain_in, 80.0);
        evaluate(DecisionInput {
            field_id: 1,
            moisture,
            thresholds: &t,
            horizon: Some(&horizon),
            verdict,
        })
    }

    #[test]
    fn critical_without_verdict_is_emergency() {
        let d = decide(8.0, None, None);
        assert_eq!(d.status, MoistureState::Critical);
        assert_eq!(d.action, IrrigationAction::EmergencyIrrigation);
        assert_eq!(d.pump_directive, PumpDirective::On);
        assert_eq!(d.urgency, Urgency::VeryHigh);
        assert_eq!(d.target_moisture, Some(70.0));
    }

    #[test]
    fn critical_distrust_with_rain_targets_min() {
        let d = decide(8.0, Some(2), Some(Verdict::DistrustIrrigate));
        assert_eq!(d.pump_directive, PumpDirective::MinimumDose);
        assert_eq!(d.target_moisture, Some(25.0));
    }

    #[test]
    fn critical_trust_never_fully_defers() {
        let d = decide(8.0, Some(0), Some(Verdict::TrustWait));
        assert_eq!(d.pump_directive, PumpDirective::HalfDose);
        assert_eq!(d.target_moisture, Some(25.0));
    }

    #[test]
    fn low_rain_within_hour_defers() {
        let d = decide(20.0, Some(1), None);
        assert_eq!(d.action, IrrigationAction::DeferForRain);
        assert_eq!(d.pump_directive, PumpDirective::Off);
        assert_eq!(d.target_moisture, None);
    }

    #[test]
    fn low_three_hour_wait_needs_buffer() {
        assert_eq!(decide(16.0, Some(3), None).action, IrrigationAction::DeferForRain);
        assert_eq!(decide(15.0, Some(3), None).action, IrrigationAction::FullIrrigation);
    }

    #[test]
    fn low_six_hour_rain_half_dose() {
        let d = decide(21.0, Some(5), None);
        assert_eq!(d.pump_directive, PumpDirective::HalfDose);
        assert_eq!(d.target_moisture, Some(45.5));

        assert_eq!(decide(20.0, Some(5), None).pump_directive, PumpDirective::On);
    }

    #[test]
    fn rain_beyond_max_wait_is_ignored() {
        let t = PlantThresholds::new(25.0, 70.0, 10.0, 3);
        let horizon = ForecastHorizon::with_first_rain_in(Some(5), 80.0);
        let d = evaluate(DecisionInput {
            field_id: 1,
            moisture: 22.0,
            thresholds: &t,
            horizon: Some(&horizon),
            verdict: None,
        });
        assert_eq!(d.pump_directive, PumpDirective::On);
    }

    #[test]
    fn distrust_near_critical_converts_deferral() {
        let d = decide(12.0, Some(0), Some(Verdict::DistrustIrrigate));
        assert_eq!(d.action, IrrigationAction::DefensiveIrrigation);
        assert_eq!(d.pump_directive, PumpDirective::MinimumDose);
        assert_eq!(d.target_moisture, Some(25.0));
    }

    #[test]
    fn distrust_near_critical_ignores_rain_window() {
        for rain_in in [Some(2), Some(6), Some(12), None] {
            let d = decide(12.0, rain_in, Some(Verdict::DistrustIrrigate));
            assert_eq!(d.action, IrrigationAction::DefensiveIrrigation, "rain in {rain_in:?}");
            assert_eq!(d.pump_directive, PumpDirective::MinimumDose);
            assert_eq!(d.target_moisture, Some(25.0));
        }
    }

    #[test]
    fn distrust_near_critical_without_feed_is_defensive() {
        let t = thresholds();
        let d = evaluate(DecisionInput {
            field_id: 1,
            moisture: 12.0,
            thresholds: &t,
            horizon: None,
            verdict: Some(Verdict::DistrustIrrigate),
        });
        assert_eq!(d.pump_directive, PumpDirective::MinimumDose);
        assert_eq!(d.target_moisture, Some(25.0));
        assert!(!d.forecast_available);
    }

    #[test]
    fn distrust_far_from_critical_keeps_deferral() {
        let d = decide(20.0, Some(1), Some(Verdict::DistrustIrrigate));
        assert_eq!(d.action, IrrigationAction::DeferForRain);
    }

    #[test]
    fn trust_wait_only_adds_rationale() {
        let plain = decide(20.0, Some(1), None);
        let trusted = decide(20.0, Some(1), Some(Verdict::TrustWait));
        assert_eq!(plain.pump_directive, trusted.pump_directive);
        assert!(trusted.rationale.len() > plain.rationale.len());
    }

    #[test]
    fn excess_halts_regardless_of_forecast() {
        let d = decide(75.0, None, Some(Verdict::SurpriseRainCaution));
        assert_eq!(d.status, MoistureState::Excess);
        assert_eq!(d.pump_directive, PumpDirective::Off);
    }

    #[test]
    fn ideal_does_nothing_and_ignores_forecast() {
        let d = decide(55.0, Some(0), Some(Verdict::TrustWait));
        assert_eq!(d.status, MoistureState::Ideal);
        assert_eq!(d.pump_directive, PumpDirective::Off);
        assert!(!d.rationale.to_lowercase().contains("forecast"));
    }

    #[test]
    fn critical_without_forecast_still_irrigates() {
        let t = thresholds();
        let d = evaluate(DecisionInput {
            field_id: 1,
            moisture: 5.0,
            thresholds: &t,
            horizon: None,
            verdict: Some(Verdict::DistrustIrrigate),
        });
        assert_eq!(d.pump_directive, PumpDirective::On);
        assert!(!d.forecast_available);
    }

    fn any_verdict() -> impl Strategy<Value = Option<Verdict>> {
        prop_oneof![
            Just(None),
            Just(Some(Verdict::TrustWait)),
            Just(Some(Verdict::DistrustIrrigate)),
            Just(Some(Verdict::SurpriseRainCaution)),
            Just(Some(Verdict::NormalSchedule)),
        ]
    }

    proptest! {
        #[test]
        fn critical_always_waters(moisture in 0.0f64..10.0, rain in proptest::option::of(0u32..24), verdict in any_verdict()) {
            prop_assert!(decide(moisture, rain, verdict).pump_running());
        }

        #[test]
        fn excess_never_waters(moisture in 70.001f64..100.0, rain in proptest::option::of(0u32..24), verdict in any_verdict()) {
            prop_assert!(!decide(moisture, rain, verdict).pump_running());
        }

        #[test]
        fn targets_never_exceed_max(moisture in 0.0f64..100.0, rain in proptest::option::of(0u32..24), verdict in any_verdict()) {
            let d = decide(moisture, rain, verdict);
            if let Some(target) = d.target_moisture {
                prop_assert!(target <= 70.0);
            }
        }
    }
}
