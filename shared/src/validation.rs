//! Validation utilities for the Smart Irrigation Platform

use crate::models::{ForecastRecord, PlantThresholds, SensorReading};

/// Validate a percentage-valued measurement (moisture, probability)
pub fn validate_percentage(value: f64) -> Result<(), &'static str> {
    if !value.is_finite() || !(0.0..=100.0).contains(&value) {
        return Err("Value must be a percentage between 0 and 100");
    }
    Ok(())
}

/// Validate soil moisture is within 0-100%
pub fn validate_moisture(moisture: f64) -> Result<(), &'static str> {
    validate_percentage(moisture).map_err(|_| "Moisture must be between 0 and 100%")
}

/// Validate forecast rain probability is within 0-100%
pub fn validate_rain_probability(probability: f64) -> Result<(), &'static str> {
    validate_percentage(probability).map_err(|_| "Rain probability must be between 0 and 100%")
}

/// Validate expected rain amount is non-negative
pub fn validate_rain_amount(amount: f64) -> Result<(), &'static str> {
    if !amount.is_finite() || amount < 0.0 {
        return Err("Expected rain amount cannot be negative");
    }
    Ok(())
}

/// Validate plant thresholds are ordered critical < min < max
pub fn validate_thresholds(thresholds: &PlantThresholds) -> Result<(), &'static str> {
    validate_moisture(thresholds.critical_moisture)?;
    validate_moisture(thresholds.min_moisture)?;
    validate_moisture(thresholds.max_moisture)?;

    if thresholds.critical_moisture >= thresholds.min_moisture {
        return Err("Critical moisture must be below minimum moisture");
    }
    if thresholds.min_moisture >= thresholds.max_moisture {
        return Err("Minimum moisture must be below maximum moisture");
    }
    Ok(())
}

/// Validate a sensor reading before it is accepted
pub fn validate_reading(reading: &SensorReading) -> Result<(), &'static str> {
    validate_moisture(reading.moisture)?;
    if !reading.temperature.is_finite() {
        return Err("Temperature must be a finite number");
    }
    Ok(())
}

/// Validate a forecast record before it is accepted
pub fn validate_forecast(forecast: &ForecastRecord) -> Result<(), &'static str> {
    validate_rain_probability(forecast.rain_probability)?;
    validate_rain_amount(forecast.expected_rain_amount)
}
