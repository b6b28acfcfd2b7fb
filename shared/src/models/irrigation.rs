//! Irrigation decision models

use serde::{Deserialize, Serialize};

use crate::models::{PlantThresholds, Verdict};
use crate::types::FieldId;

/// Primary moisture-driven state of a field
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MoistureState {
    /// moisture < critical_moisture
    Critical,
    /// critical_moisture <= moisture < min_moisture
    Low,
    /// min_moisture <= moisture <= max_moisture
    Ideal,
    /// moisture > max_moisture
    Excess,
}

impl MoistureState {
    pub fn classify(moisture: f64, thresholds: &PlantThresholds) -> Self {
        if moisture < thresholds.critical_moisture {
            MoistureState::Critical
        } else if moisture < thresholds.min_moisture {
            MoistureState::Low
        } else if moisture > thresholds.max_moisture {
            MoistureState::Excess
        } else {
            MoistureState::Ideal
        }
    }
}

impl std::fmt::Display for MoistureState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MoistureState::Critical => write!(f, "CRITICAL"),
            MoistureState::Low => write!(f, "LOW"),
            MoistureState::Ideal => write!(f, "IDEAL"),
            MoistureState::Excess => write!(f, "EXCESS"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Urgency {
    None,
    Low,
    Medium,
    High,
    VeryHigh,
}

/// What the pump controller is told to do
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PumpDirective {
    Off,
    On,
    HalfDose,
    MinimumDose,
}

/// Human-facing action behind a decision
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IrrigationAction {
    EmergencyIrrigation,
    DefensiveIrrigation,
    PartialIrrigation,
    FullIrrigation,
    HalfDoseIrrigation,
    DeferForRain,
    HaltIrrigation,
    NoAction,
}

impl std::fmt::Display for IrrigationAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            IrrigationAction::EmergencyIrrigation => "EMERGENCY_IRRIGATION",
            IrrigationAction::DefensiveIrrigation => "DEFENSIVE_IRRIGATION",
            IrrigationAction::PartialIrrigation => "PARTIAL_IRRIGATION",
            IrrigationAction::FullIrrigation => "FULL_IRRIGATION",
            IrrigationAction::HalfDoseIrrigation => "HALF_DOSE_IRRIGATION",
            IrrigationAction::DeferForRain => "DEFER_FOR_RAIN",
            IrrigationAction::HaltIrrigation => "HALT_IRRIGATION",
            IrrigationAction::NoAction => "NO_ACTION",
        };
        f.write_str(name)
    }
}

/// Final pump decision for one field
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IrrigationDecision {
    pub field_id: FieldId,
    pub moisture: f64,
    pub status: MoistureState,
    pub action: IrrigationAction,
    pub urgency: Urgency,
    /// Audit trail explaining the branch that was taken
    pub rationale: String,
    pub pump_directive: PumpDirective,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_moisture: Option<f64>,
    /// Verdict of the field's model, when one was available
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verdict: Option<Verdict>,
    pub forecast_available: bool,
}

impl IrrigationDecision {
    pub fn pump_running(&self) -> bool {
        self.pump_directive != PumpDirective::Off
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_boundaries() {
        let t = PlantThresholds::new(25.0, 70.0, 10.0, 6);

        assert_eq!(MoistureState::classify(9.9, &t), MoistureState::Critical);
        assert_eq!(MoistureState::classify(10.0, &t), MoistureState::Low);
        assert_eq!(MoistureState::classify(24.9, &t), MoistureState::Low);
        assert_eq!(MoistureState::classify(25.0, &t), MoistureState::Ideal);
        assert_eq!(MoistureState::classify(70.0, &t), MoistureState::Ideal);
        assert_eq!(MoistureState::classify(70.1, &t), MoistureState::Excess);
    }

    #[test]
    fn urgency_is_ordered() {
        assert!(Urgency::VeryHigh > Urgency::High);
        assert!(Urgency::Low > Urgency::None);
    }
}
