//! Reliability Estimator
//!
//! Measures how often "forecast says rain" was confirmed by observed rain at
//! one field, overall and per calendar month.

use std::collections::BTreeMap;

use chrono::Datelike;
use shared::{forecast_says_rain, is_reliable_rate, FieldId, ForecastRecord, ReliabilitySummary, SensorReading, RELIABILITY_THRESHOLD};

use super::features::{field_readings, match_nearest_forecasts};

/// Matched readings needed before any rate is reported
pub const MIN_MATCHED_READINGS: usize = 10;

/// Rain forecasts a month needs before it gets its own rate
pub const MIN_MONTH_SAMPLES: usize = 3;

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

fn hit_rate(confirmed: usize, predicted: usize) -> f64 {
    round1(confirmed as f64 / predicted as f64 * 100.0)
}

/// Estimate forecast reliability for one field
///
/// Uses the same nearest-timestamp join as the feature builder. Thin
/// evidence yields the low-confidence default instead of an error.
pub fn estimate_reliability(
    field_id: FieldId,
    readings: &[SensorReading],
    forecasts: &[ForecastRecord],
) -> ReliabilitySummary {
    let readings = field_readings(field_id, readings);
    let matches = match_nearest_forecasts(field_id, &readings, forecasts);

    let matched: Vec<(&SensorReading, &ForecastRecord)> = readings
        .iter()
        .zip(matches)
        .filter_map(|(r, f)| f.map(|f| (*r, f)))
        .collect();

    if matched.len() < MIN_MATCHED_READINGS {
        return ReliabilitySummary::low_confidence(
            format!(
                "Only {} readings matched a forecast (minimum {})",
                matched.len(),
                MIN_MATCHED_READINGS
            ),
            matched.len(),
        );
    }

    let predicted: Vec<&(&SensorReading, &ForecastRecord)> = matched
        .iter()
        .filter(|(_, f)| forecast_says_rain(f.rain_probability))
        .collect();

    if predicted.is_empty() {
        return ReliabilitySummary::low_confidence(
            "The forecast never predicted rain for this field",
            matched.len(),
        );
    }

    let confirmed = predicted.iter().filter(|(r, _)| r.rain_observed).count();
    let overall_hit_rate = hit_rate(confirmed, predicted.len());

    // month -> (rain forecasts, confirmed)
    let mut by_month: BTreeMap<u32, (usize, usize)> = BTreeMap::new();
    for (reading, _) in &predicted {
        let entry = by_month.entry(reading.timestamp.month()).or_default();
        entry.0 += 1;
        if reading.rain_observed {
            entry.1 += 1;
        }
    }

    let mut per_month_hit_rate = BTreeMap::new();
    let mut per_month_counts = BTreeMap::new();
    for (month, (count, hits)) in by_month {
        if count >= MIN_MONTH_SAMPLES {
            per_month_hit_rate.insert(month, hit_rate(hits, count));
            per_month_counts.insert(month, count);
        }
    }

    ReliabilitySummary {
        overall_hit_rate,
        per_month_hit_rate,
        per_month_counts,
        matched_count: matched.len(),
        rain_predicted_count: predicted.len(),
        confirmed_count: confirmed,
        is_reliable: is_reliable_rate(overall_hit_rate),
        threshold: RELIABILITY_THRESHOLD,
        message: None,
    }
}
