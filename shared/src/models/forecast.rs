//! Weather forecast models

use chrono::{DateTime, Duration, DurationRound, Utc};
use serde::{Deserialize, Serialize};

use crate::models::forecast_says_rain;
use crate::types::FieldId;

/// Rain probability assumed when the forecast feed has nothing for a moment
pub const DEFAULT_RAIN_PROBABILITY: f64 = 30.0;

/// Rain amount assumed when the forecast feed has nothing for a moment
pub const DEFAULT_RAIN_AMOUNT: f64 = 0.0;

/// Precipitation (mm) at or above which an hourly slot counts as rainy
pub const RAIN_AMOUNT_THRESHOLD_MM: f64 = 0.1;

/// Slots further out than this are ignored by the horizon
pub const HORIZON_LIMIT_HOURS: i64 = 24;

/// A historical forecast as delivered by the external weather feed
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ForecastRecord {
    pub field_id: FieldId,
    pub forecast_timestamp: DateTime<Utc>,
    /// Probability of rain in percent (0-100)
    pub rain_probability: f64,
    /// Expected rain in millimetres
    pub expected_rain_amount: f64,
}

impl ForecastRecord {
    pub fn new(
        field_id: FieldId,
        forecast_timestamp: DateTime<Utc>,
        rain_probability: f64,
        expected_rain_amount: f64,
    ) -> Self {
        Self {
            field_id,
            forecast_timestamp,
            rain_probability,
            expected_rain_amount,
        }
    }
}

/// One hourly slot of an upcoming forecast
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HourlyForecastPoint {
    pub time: DateTime<Utc>,
    pub rain_probability: f64,
    pub precipitation_mm: f64,
}

impl HourlyForecastPoint {
    pub fn is_rainy(&self) -> bool {
        forecast_says_rain(self.rain_probability)
            || self.precipitation_mm >= RAIN_AMOUNT_THRESHOLD_MM
    }
}

/// Near-term rain outlook used by the irrigation engine
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ForecastHorizon {
    /// Hours until the first rainy slot (0 = current hour)
    pub first_rain_in_hours: Option<u32>,
    pub peak_probability: f64,
}

impl ForecastHorizon {
    /// An outlook built directly from the time until the first rain
    pub fn with_first_rain_in(first_rain_in_hours: Option<u32>, peak_probability: f64) -> Self {
        Self {
            first_rain_in_hours,
            peak_probability,
        }
    }

    /// Summarise hourly slots relative to `now`
    ///
    /// Slots are bucketed by whole hours from the start of the current hour;
    /// past slots and slots beyond [`HORIZON_LIMIT_HOURS`] are ignored.
    pub fn from_hourly(points: &[HourlyForecastPoint], now: DateTime<Utc>) -> Self {
        let hour_start = now.duration_trunc(Duration::hours(1)).unwrap_or(now);

        let upcoming = points.iter().filter_map(|p| {
            let ahead = (p.time - hour_start).num_hours();
            (p.time >= hour_start && ahead <= HORIZON_LIMIT_HOURS).then_some((ahead, p))
        });

        let mut first_rain: Option<u32> = None;
        let mut peak = 0.0_f64;
        for (ahead, point) in upcoming {
            peak = peak.max(point.rain_probability);
            if point.is_rainy() {
                let ahead = ahead as u32;
                first_rain = Some(first_rain.map_or(ahead, |h| h.min(ahead)));
            }
        }

        Self::with_first_rain_in(first_rain, peak)
    }

    /// Whether rain is expected within `hours`
    pub fn rain_within(&self, hours: u32) -> bool {
        self.first_rain_in_hours.map_or(false, |h| h <= hours)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;

    fn at(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, hour, minute, 0).unwrap()
    }

    fn point(hour: u32, probability: f64, mm: f64) -> HourlyForecastPoint {
        HourlyForecastPoint {
            time: at(hour, 0),
            rain_probability: probability,
            precipitation_mm: mm,
        }
    }

    #[test]
    fn rain_in_next_hour_sets_every_window() {
        let points = vec![point(10, 10.0, 0.0), point(11, 80.0, 2.0), point(12, 20.0, 0.0)];
        let horizon = ForecastHorizon::from_hourly(&points, at(10, 20));

        assert!(horizon.rain_within(1));
        assert!(horizon.rain_within(3));
        assert!(horizon.rain_within(6));
        assert_eq!(horizon.first_rain_in_hours, Some(1));
        assert_eq!(horizon.peak_probability, 80.0);
    }

    #[test]
    fn rain_five_hours_out_only_hits_six_hour_window() {
        let points = vec![point(10, 10.0, 0.0), point(15, 45.0, 0.0)];
        let horizon = ForecastHorizon::from_hourly(&points, at(10, 5));

        assert!(!horizon.rain_within(1));
        assert!(!horizon.rain_within(3));
        assert!(horizon.rain_within(6));
        assert_eq!(horizon.first_rain_in_hours, Some(5));
    }

    #[test]
    fn past_slots_are_ignored() {
        let points = vec![point(8, 90.0, 5.0), point(9, 90.0, 5.0)];
        let horizon = ForecastHorizon::from_hourly(&points, at(10, 0));

        assert_eq!(horizon, ForecastHorizon::default());
    }

    #[test]
    fn forty_percent_alone_is_not_rainy() {
        assert!(!point(10, 40.0, 0.0).is_rainy());
        assert!(point(10, 41.0, 0.0).is_rainy());
        assert!(point(10, 0.0, 0.1).is_rainy());
    }

    proptest! {
        #[test]
        fn prop_windows_follow_first_rain(first in proptest::option::of(0u32..48), window in 0u32..48) {
            let horizon = ForecastHorizon::with_first_rain_in(first, 60.0);
            prop_assert_eq!(horizon.rain_within(window), first.map_or(false, |h| h <= window));
        }

        #[test]
        fn prop_hourly_windows_match_rain_hour(rain_hour in 0u32..12, window in 0u32..12) {
            let points: Vec<_> = (0..12)
                .map(|h| if h == rain_hour { point(h, 75.0, 3.0) } else { point(h, 5.0, 0.0) })
                .collect();
            let horizon = ForecastHorizon::from_hourly(&points, at(0, 30));

            prop_assert_eq!(horizon.first_rain_in_hours, Some(rain_hour));
            prop_assert_eq!(horizon.rain_within(window), rain_hour <= window);
        }
    }
}
