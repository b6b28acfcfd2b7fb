//! Synthetic field histories
//!
//! Seeded generators for sensor and forecast history under named weather
//! regimes. The same seed always produces the same history.

use chrono::{DateTime, Duration, Timelike, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use shared::{FieldId, ForecastRecord, PlantThresholds, SensorReading};

/// Hours of day at which readings are taken
const READING_HOURS: [i64; 4] = [0, 6, 12, 18];

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Scenario {
    /// Ordinary weather, then a dry spell that drives moisture below critical
    Drought,
    /// Rain is forecast often and rarely arrives
    UnreliableForecast,
    /// Rain forecasts are usually confirmed
    ReliableForecast,
    /// Moisture stays inside the ideal band
    Ideal,
    /// Frequent rain keeps the soil saturated
    Waterlogged,
}

#[derive(Debug, Clone, Default)]
pub struct SimulatedHistory {
    pub readings: Vec<SensorReading>,
    pub forecasts: Vec<ForecastRecord>,
}

impl SimulatedHistory {
    pub fn last_moisture(&self) -> Option<f64> {
        self.readings.last().map(|r| r.moisture)
    }
}

/// Parameters of one simulated history
#[derive(Debug, Clone)]
pub struct SimulationSpec {
    pub field_id: FieldId,
    pub scenario: Scenario,
    pub thresholds: PlantThresholds,
    pub days: u32,
    /// Timestamp of the final reading
    pub end: DateTime<Utc>,
    pub seed: u64,
}

struct Slot {
    rain_probability: f64,
    rain_amount: f64,
    rained: bool,
}

fn slot(rng: &mut StdRng, scenario: Scenario, dry_spell: bool) -> Slot {
    let (rain_probability, rained): (f64, bool) = match scenario {
        Scenario::Drought if dry_spell => (rng.gen_range(0.0..12.0), false),
        Scenario::Drought => (rng.gen_range(10.0..70.0), rng.gen_bool(0.15)),
        Scenario::UnreliableForecast => (rng.gen_range(50.0..85.0), rng.gen_bool(0.05)),
        Scenario::ReliableForecast => {
            if rng.gen_bool(0.45) {
                (rng.gen_range(50.0..85.0), rng.gen_bool(0.85))
            } else {
                (rng.gen_range(5.0..30.0), rng.gen_bool(0.10))
            }
        }
        Scenario::Ideal => {
            let rained = rng.gen_bool(0.2);
            let p = if rained { rng.gen_range(45.0..80.0) } else { rng.gen_range(5.0..40.0) };
            (p, rained)
        }
        Scenario::Waterlogged => (rng.gen_range(40.0..90.0), rng.gen_bool(0.4)),
    };

    let rain_amount: f64 = if forecast_wet(rain_probability) { rng.gen_range(2.0..18.0) } else { rng.gen_range(0.0..1.0) };

    Slot {
        rain_probability: (rain_probability * 10.0).round() / 10.0,
        rain_amount: (rain_amount * 10.0).round() / 10.0,
        rained,
    }
}

fn forecast_wet(probability: f64) -> bool {
    shared::forecast_says_rain(probability)
}

/// Moisture band a scenario drifts within
fn band(scenario: Scenario, t: &PlantThresholds) -> (f64, f64) {
    match scenario {
        Scenario::Drought => (t.min_moisture, t.max_moisture - 10.0),
        Scenario::UnreliableForecast | Scenario::ReliableForecast => (t.critical_moisture + 5.0, t.max_moisture),
        Scenario::Ideal => (t.min_moisture + 2.0, t.max_moisture - 2.0),
        Scenario::Waterlogged => (t.max_moisture + 2.0, 95.0),
    }
}

/// Generate one field's history
pub fn simulate(spec: &SimulationSpec) -> SimulatedHistory {
    let mut rng = StdRng::seed_from_u64(spec.seed ^ (spec.field_id as u64).rotate_left(17));
    let t = &spec.thresholds;
    let (low, high) = band(spec.scenario, t);

    let per_day = READING_HOURS.len() as i64;
    let total = i64::from(spec.days) * per_day;
    let start = spec.end - Duration::hours(6 * (total - 1).max(0));
    // Drought: the last ten days are a dry spell
    let dry_from = total - 10 * per_day;

    let mut moisture = (low + high) / 2.0;
    let mut history = SimulatedHistory::default();

    for i in 0..total {
        let ts = start + Duration::hours(6 * i);
        let dry_spell = spec.scenario == Scenario::Drought && i >= dry_from;
        let s = slot(&mut rng, spec.scenario, dry_spell);

        if dry_spell {
            // Falls to just under critical by the final reading
            let remaining = (total - i) as f64;
            let floor = t.critical_moisture - 2.0;
            moisture -= (moisture - floor) / remaining;
        } else {
            moisture += if s.rained { rng.gen_range(4.0..10.0_f64) } else { -rng.gen_range(0.5..3.0_f64) };
            moisture = moisture.clamp(low, high);
        }
        moisture = moisture.clamp(0.0, 100.0);

        // Warmest mid-afternoon
        let day_phase = (f64::from(ts.hour()) - 9.0) / 24.0 * std::f64::consts::TAU;
        let temperature = 18.0 + 8.0 * day_phase.sin() + rng.gen_range(-2.0..2.0_f64);

        history.readings.push(SensorReading::new(
            spec.field_id,
            ts,
            (moisture * 10.0).round() / 10.0,
            (temperature * 10.0).round() / 10.0,
            s.rained,
        ));

        let jitter = Duration::minutes(rng.gen_range(-15_i64..=15));
        history
            .forecasts
            .push(ForecastRecord::new(spec.field_id, ts + jitter, s.rain_probability, s.rain_amount));
    }

    history
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn spec(scenario: Scenario, seed: u64) -> SimulationSpec {
        SimulationSpec {
            field_id: 3,
            scenario,
            thresholds: PlantThresholds::default(),
            days: 30,
            end: Utc.with_ymd_and_hms(2024, 8, 31, 18, 0, 0).unwrap(),
            seed,
        }
    }

    #[test]
    fn same_seed_same_history() {
        let a = simulate(&spec(Scenario::ReliableForecast, 7));
        let b = simulate(&spec(Scenario::ReliableForecast, 7));
        assert_eq!(a.readings, b.readings);
        assert_eq!(a.forecasts, b.forecasts);
    }

    #[test]
    fn drought_ends_below_critical() {
        let h = simulate(&spec(Scenario::Drought, 1));
        assert_eq!(h.readings.len(), 120);
        assert!(h.last_moisture().unwrap() < 10.0);
        assert_eq!(h.readings.last().unwrap().timestamp, Utc.with_ymd_and_hms(2024, 8, 31, 18, 0, 0).unwrap());
    }

    #[test]
    fn waterlogged_stays_above_max() {
        let h = simulate(&spec(Scenario::Waterlogged, 2));
        assert!(h.readings.iter().all(|r| r.moisture > 70.0));
    }

    #[test]
    fn unreliable_forecast_rarely_rains() {
        let h = simulate(&spec(Scenario::UnreliableForecast, 3));
        let rainy = h.readings.iter().filter(|r| r.rain_observed).count();
        assert!(rainy < h.readings.len() / 5);
        assert!(h.forecasts.iter().all(|f| f.rain_probability >= 50.0));
    }
}
