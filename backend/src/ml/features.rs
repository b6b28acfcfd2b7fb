//! Feature Builder
//!
//! Turns one field's raw sensor history and forecast history into a labeled
//! table. Each reading is joined to the temporally nearest forecast within
//! [`FORECAST_MATCH_TOLERANCE_HOURS`]; readings without a match get imputed
//! forecast values.

use std::f64::consts::PI;

use chrono::{DateTime, Datelike, Duration, Timelike, Utc};
use shared::{forecast_says_rain, FieldId, ForecastRecord, SensorReading, DEFAULT_RAIN_AMOUNT, DEFAULT_RAIN_PROBABILITY};

use crate::error::{AppError, AppResult};

/// Readings required before a field can be trained
pub const MIN_TRAINING_READINGS: usize = 20;

/// Maximum distance between a reading and the forecast it is joined to
pub const FORECAST_MATCH_TOLERANCE_HOURS: i64 = 6;

/// Prior readings considered by the rolling forecast hit rate
pub const HIT_RATE_WINDOW: usize = 10;

pub const TARGET_COLUMN: &str = "rain_observed";

/// Fixed feature schema, in column order
pub const FEATURE_COLUMNS: [&str; 14] = [
    "moisture",
    "temperature",
    "hour",
    "month",
    "day_of_year",
    "day_of_week",
    "hour_sin",
    "hour_cos",
    "month_sin",
    "month_cos",
    "rain_probability",
    "expected_rain_amount",
    "forecast_says_rain",
    "recent_forecast_hit_rate",
];

/// Calendar features derived from a timestamp
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TemporalFeatures {
    pub hour: u32,
    pub month: u32,
    pub day_of_year: u32,
    /// Monday = 0
    pub day_of_week: u32,
    pub hour_sin: f64,
    pub hour_cos: f64,
    pub month_sin: f64,
    pub month_cos: f64,
}

impl TemporalFeatures {
    pub fn from_timestamp(ts: DateTime<Utc>) -> Self {
        let hour = ts.hour();
        let month = ts.month();
        let hour_angle = 2.0 * PI * f64::from(hour) / 24.0;
        let month_angle = 2.0 * PI * f64::from(month) / 12.0;

        Self {
            hour,
            month,
            day_of_year: ts.ordinal(),
            day_of_week: ts.weekday().num_days_from_monday(),
            hour_sin: hour_angle.sin(),
            hour_cos: hour_angle.cos(),
            month_sin: month_angle.sin(),
            month_cos: month_angle.cos(),
        }
    }
}

/// One row of model input, addressable by column name
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureRow {
    pub moisture: f64,
    pub temperature: f64,
    pub temporal: TemporalFeatures,
    pub rain_probability: f64,
    pub expected_rain_amount: f64,
    pub recent_forecast_hit_rate: f64,
}

impl FeatureRow {
    pub fn forecast_says_rain(&self) -> bool {
        forecast_says_rain(self.rain_probability)
    }

    /// Value of a named column, `None` for unknown names
    pub fn value(&self, column: &str) -> Option<f64> {
        let t = &self.temporal;
        let v = match column {
            "moisture" => self.moisture,
            "temperature" => self.temperature,
            "hour" => f64::from(t.hour),
            "month" => f64::from(t.month),
            "day_of_year" => f64::from(t.day_of_year),
            "day_of_week" => f64::from(t.day_of_week),
            "hour_sin" => t.hour_sin,
            "hour_cos" => t.hour_cos,
            "month_sin" => t.month_sin,
            "month_cos" => t.month_cos,
            "rain_probability" => self.rain_probability,
            "expected_rain_amount" => self.expected_rain_amount,
            "forecast_says_rain" => {
                if self.forecast_says_rain() {
                    1.0
                } else {
                    0.0
                }
            }
            "recent_forecast_hit_rate" => self.recent_forecast_hit_rate,
            _ => return None,
        };
        Some(v)
    }

    /// Project onto a column order; unknown or non-finite values become 0
    pub fn to_vector<S: AsRef<str>>(&self, columns: &[S]) -> Vec<f64> {
        columns
            .iter()
            .map(|c| self.value(c.as_ref()).filter(|v| v.is_finite()).unwrap_or(0.0))
            .collect()
    }
}

/// Labeled training table for one field
#[derive(Debug, Clone)]
pub struct TrainingDataset {
    pub field_id: FieldId,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<f64>>,
    /// `rain_observed` per row
    pub targets: Vec<bool>,
    /// Readings that found a forecast within tolerance
    pub matched_count: usize,
}

impl TrainingDataset {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Fraction of rows where rain was observed
    pub fn rain_ratio(&self) -> f64 {
        if self.targets.is_empty() {
            return 0.0;
        }
        self.targets.iter().filter(|&&t| t).count() as f64 / self.targets.len() as f64
    }

    /// One-line description used in training reports and logs
    pub fn describe(&self) -> String {
        let says_rain_col = self
            .columns
            .iter()
            .position(|c| c == "forecast_says_rain");

        let confirmation = says_rain_col.and_then(|col| {
            let flagged: Vec<bool> = self
                .rows
                .iter()
                .zip(&self.targets)
                .filter(|(row, _)| row[col] > 0.5)
                .map(|(_, &t)| t)
                .collect();
            (!flagged.is_empty()).then(|| {
                flagged.iter().filter(|&&t| t).count() as f64 / flagged.len() as f64 * 100.0
            })
        });

        let trust = match confirmation {
            Some(pct) => format!("when the forecast said rain it actually rained {:.0}% of the time", pct),
            None => "not enough forecast/observation pairs".to_string(),
        };

        format!(
            "Field {}: {} rows, rainy: {:.1}%, {}",
            self.field_id,
            self.len(),
            self.rain_ratio() * 100.0,
            trust
        )
    }
}

/// Readings of one field in chronological order
pub(crate) fn field_readings(field_id: FieldId, readings: &[SensorReading]) -> Vec<&SensorReading> {
    let mut own: Vec<&SensorReading> = readings.iter().filter(|r| r.field_id == field_id).collect();
    own.sort_by_key(|r| r.timestamp);
    own
}

/// Nearest forecast for every reading, within the match tolerance
///
/// `readings` must already be chronological. On equal distance the earlier
/// forecast wins.
pub(crate) fn match_nearest_forecasts<'a>(
    field_id: FieldId,
    readings: &[&SensorReading],
    forecasts: &'a [ForecastRecord],
) -> Vec<Option<&'a ForecastRecord>> {
    let mut sorted: Vec<&ForecastRecord> = forecasts.iter().filter(|f| f.field_id == field_id).collect();
    sorted.sort_by_key(|f| f.forecast_timestamp);

    let tolerance = Duration::hours(FORECAST_MATCH_TOLERANCE_HOURS);

    readings
        .iter()
        .map(|reading| {
            let ts = reading.timestamp;
            let after = sorted.partition_point(|f| f.forecast_timestamp < ts);
            let before = sorted.partition_point(|f| f.forecast_timestamp <= ts);

            let backward = before.checked_sub(1).map(|i| sorted[i]);
            let forward = sorted.get(after).copied();

            let best = match (backward, forward) {
                (Some(b), Some(f)) => {
                    if ts - b.forecast_timestamp <= f.forecast_timestamp - ts {
                        Some(b)
                    } else {
                        Some(f)
                    }
                }
                (b, f) => b.or(f),
            };

            best.filter(|f| (f.forecast_timestamp - ts).abs() <= tolerance)
        })
        .collect()
}

fn median(values: &mut [f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(|a, b| a.total_cmp(b));
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        Some((values[mid - 1] + values[mid]) / 2.0)
    } else {
        Some(values[mid])
    }
}

/// Build the labeled dataset for one field
///
/// Rows from other fields are ignored. Fails with
/// [`AppError::InsufficientData`] below [`MIN_TRAINING_READINGS`] readings.
pub fn build_training_dataset(
    field_id: FieldId,
    readings: &[SensorReading],
    forecasts: &[ForecastRecord],
) -> AppResult<TrainingDataset> {
    let readings = field_readings(field_id, readings);
    if readings.len() < MIN_TRAINING_READINGS {
        return Err(AppError::InsufficientData {
            field_id,
            found: readings.len(),
            required: MIN_TRAINING_READINGS,
        });
    }

    let matches = match_nearest_forecasts(field_id, &readings, forecasts);
    let mut matched_probabilities: Vec<f64> = matches
        .iter()
        .flatten()
        .map(|f| f.rain_probability)
        .filter(|p| p.is_finite())
        .collect();
    let matched_count = matches.iter().filter(|m| m.is_some()).count();
    let imputed_probability = median(&mut matched_probabilities).unwrap_or(DEFAULT_RAIN_PROBABILITY);

    tracing::debug!(
        field_id,
        readings = readings.len(),
        matched = matched_count,
        imputed_probability,
        "joined readings to forecasts"
    );

    // Agreement between "forecast says rain" and observed rain, per reading
    let mut agreements: Vec<f64> = Vec::with_capacity(readings.len());
    let mut rows = Vec::with_capacity(readings.len());
    let mut targets = Vec::with_capacity(readings.len());
    let columns: Vec<String> = FEATURE_COLUMNS.iter().map(|c| c.to_string()).collect();

    for (reading, forecast) in readings.iter().zip(&matches) {
        let (rain_probability, expected_rain_amount) = match forecast {
            Some(f) => (f.rain_probability, f.expected_rain_amount),
            None => (imputed_probability, DEFAULT_RAIN_AMOUNT),
        };

        // Strictly prior readings only; the first row has no history
        let start = agreements.len().saturating_sub(HIT_RATE_WINDOW);
        let window = &agreements[start..];
        let recent_forecast_hit_rate = if window.is_empty() {
            f64::NAN
        } else {
            window.iter().sum::<f64>() / window.len() as f64
        };

        let row = FeatureRow {
            moisture: reading.moisture,
            temperature: reading.temperature,
            temporal: TemporalFeatures::from_timestamp(reading.timestamp),
            rain_probability,
            expected_rain_amount,
            recent_forecast_hit_rate,
        };

        let agreed = row.forecast_says_rain() == reading.rain_observed;
        agreements.push(if agreed { 1.0 } else { 0.0 });

        rows.push(row.to_vector(&columns));
        targets.push(reading.rain_observed);
    }

    Ok(TrainingDataset {
        field_id,
        columns,
        rows,
        targets,
        matched_count,
    })
}
