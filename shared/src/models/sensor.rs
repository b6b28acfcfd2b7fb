//! Ground-truth sensor models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::FieldId;

/// A single reading produced by field hardware (or the simulator)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SensorReading {
    pub field_id: FieldId,
    pub timestamp: DateTime<Utc>,
    /// Soil moisture in percent (0-100)
    pub moisture: f64,
    pub temperature: f64,
    /// Whether rain was actually observed at the field
    pub rain_observed: bool,
}

impl SensorReading {
    pub fn new(
        field_id: FieldId,
        timestamp: DateTime<Utc>,
        moisture: f64,
        temperature: f64,
        rain_observed: bool,
    ) -> Self {
        Self {
            field_id,
            timestamp,
            moisture,
            temperature,
            rain_observed,
        }
    }
}

/// The latest conditions used for a single inference
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CurrentConditions {
    pub moisture: f64,
    pub temperature: f64,
    /// External forecast rain probability; the feed may be unavailable
    pub rain_probability: Option<f64>,
    pub expected_rain_amount: Option<f64>,
}

impl CurrentConditions {
    pub fn forecast_probability(&self) -> f64 {
        self.rain_probability
            .unwrap_or(crate::models::DEFAULT_RAIN_PROBABILITY)
    }

    pub fn forecast_amount(&self) -> f64 {
        self.expected_rain_amount
            .unwrap_or(crate::models::DEFAULT_RAIN_AMOUNT)
    }
}
