//! Rain forecast validation models
//!
//! The numeric cut-offs below are behavioural contracts of the decision
//! matrix. They are deliberately constants rather than configuration.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::FieldId;

/// A forecast "says rain" when its probability is strictly above this
pub const FORECAST_RAIN_THRESHOLD: f64 = 40.0;

/// Model rain probability (%) needed to trust a rain forecast
pub const MODEL_TRUST_PROBABILITY: f64 = 60.0;

/// This-month hit rate (%) needed to trust a rain forecast
pub const MONTH_TRUST_HIT_RATE: f64 = 55.0;

/// Model rain probability (%) that flags unforecast rain
pub const SURPRISE_RAIN_PROBABILITY: f64 = 50.0;

/// Overall hit rate (%) from which a field's forecasts count as reliable
pub const RELIABILITY_THRESHOLD: f64 = 60.0;

/// Hit rate reported when there is not enough evidence to judge
pub const LOW_CONFIDENCE_HIT_RATE: f64 = 50.0;

pub fn forecast_says_rain(rain_probability: f64) -> bool {
    rain_probability > FORECAST_RAIN_THRESHOLD
}

pub fn is_reliable_rate(overall_hit_rate: f64) -> bool {
    overall_hit_rate >= RELIABILITY_THRESHOLD
}

/// How trustworthy "forecast says rain" has been for one field
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReliabilitySummary {
    /// Percentage of rain forecasts that were confirmed (1 decimal)
    pub overall_hit_rate: f64,
    /// Calendar month (1-12) to hit rate, for months with enough evidence
    pub per_month_hit_rate: BTreeMap<u32, f64>,
    /// Calendar month to the number of rain forecasts behind its rate
    pub per_month_counts: BTreeMap<u32, usize>,
    /// Readings that were matched to a forecast
    pub matched_count: usize,
    /// Matched readings whose forecast said rain
    pub rain_predicted_count: usize,
    /// Of those, readings where rain was actually observed
    pub confirmed_count: usize,
    pub is_reliable: bool,
    pub threshold: f64,
    /// Why a low-confidence default was returned, if it was
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ReliabilitySummary {
    /// The fixed default used whenever the evidence is too thin
    pub fn low_confidence(message: impl Into<String>, matched_count: usize) -> Self {
        Self {
            overall_hit_rate: LOW_CONFIDENCE_HIT_RATE,
            per_month_hit_rate: BTreeMap::new(),
            per_month_counts: BTreeMap::new(),
            matched_count,
            rain_predicted_count: 0,
            confirmed_count: 0,
            is_reliable: false,
            threshold: RELIABILITY_THRESHOLD,
            message: Some(message.into()),
        }
    }

    /// Hit rate for a calendar month, falling back to the overall rate
    pub fn hit_rate_for_month(&self, month: u32) -> f64 {
        self.per_month_hit_rate
            .get(&month)
            .copied()
            .unwrap_or(self.overall_hit_rate)
    }
}

/// Four-way outcome of validating a forecast against a field's history
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Verdict {
    /// Forecast says rain and the field's history backs it: defer irrigation
    TrustWait,
    /// Forecast says rain but the field's history does not: irrigate defensively
    DistrustIrrigate,
    /// Forecast is dry but the model expects rain
    SurpriseRainCaution,
    /// Nobody expects rain
    NormalSchedule,
}

impl Verdict {
    /// Apply the decision matrix in its fixed evaluation order
    pub fn resolve(forecast_probability: f64, model_probability: f64, month_hit_rate: f64) -> Self {
        if forecast_says_rain(forecast_probability) {
            if model_probability >= MODEL_TRUST_PROBABILITY && month_hit_rate >= MONTH_TRUST_HIT_RATE
            {
                Verdict::TrustWait
            } else {
                Verdict::DistrustIrrigate
            }
        } else if model_probability >= SURPRISE_RAIN_PROBABILITY {
            Verdict::SurpriseRainCaution
        } else {
            Verdict::NormalSchedule
        }
    }
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Verdict::TrustWait => write!(f, "TRUST_WAIT"),
            Verdict::DistrustIrrigate => write!(f, "DISTRUST_IRRIGATE"),
            Verdict::SurpriseRainCaution => write!(f, "SURPRISE_RAIN_CAUTION"),
            Verdict::NormalSchedule => write!(f, "NORMAL_SCHEDULE"),
        }
    }
}

/// Result of validating the current forecast for one field
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RainValidation {
    pub field_id: FieldId,
    /// External forecast probability (%)
    pub forecast_rain_probability: f64,
    /// Calibrated model probability (%)
    pub model_rain_probability: f64,
    /// Calendar month used for the hit-rate lookup
    pub month: u32,
    /// Hit rate for `month`, or the overall rate when the month has no entry
    pub month_hit_rate: f64,
    pub overall_hit_rate: f64,
    pub forecast_reliable: bool,
    pub verdict: Verdict,
    pub rationale: String,
    /// Held-out accuracy of the model in percent
    pub model_accuracy: f64,
    pub trained_at: DateTime<Utc>,
}
