//! Hourly forecast client
//!
//! Integrates with the Open-Meteo API for hourly precipitation probability
//! and amount at a field's coordinates.

use async_trait::async_trait;
use chrono::NaiveDateTime;
use reqwest::Client;
use serde::Deserialize;
use shared::{Field, GpsCoordinates, HourlyForecastPoint};

use crate::config::WeatherConfig;
use crate::error::{AppError, AppResult};

/// Source of the near-term hourly outlook for a field
#[async_trait]
pub trait ForecastSource: Send + Sync {
    async fn hourly_outlook(&self, field: &Field) -> AppResult<Vec<HourlyForecastPoint>>;
}

/// Open-Meteo API client
#[derive(Clone)]
pub struct WeatherClient {
    client: Client,
    base_url: String,
    default_location: GpsCoordinates,
}

/// Open-Meteo forecast response (hourly block only)
#[derive(Debug, Deserialize)]
struct OpenMeteoResponse {
    hourly: OpenMeteoHourly,
}

#[derive(Debug, Deserialize)]
struct OpenMeteoHourly {
    time: Vec<String>,
    #[serde(default)]
    precipitation_probability: Vec<Option<f64>>,
    #[serde(default)]
    precipitation: Vec<Option<f64>>,
}

impl WeatherClient {
    pub fn new(config: &WeatherConfig) -> Self {
        Self::with_base_url(config, config.api_endpoint.clone())
    }

    /// Create a client against a custom base URL (for testing)
    pub fn with_base_url(config: &WeatherConfig, base_url: String) -> Self {
        let client = Client::builder()
            .timeout(config.timeout())
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            client,
            base_url,
            default_location: GpsCoordinates::new(config.default_latitude, config.default_longitude),
        }
    }

    /// Fetch the next 48 hourly slots at a location
    pub async fn get_hourly_forecast(&self, location: GpsCoordinates) -> AppResult<Vec<HourlyForecastPoint>> {
        let url = format!(
            "{}/forecast?latitude={}&longitude={}&hourly=precipitation_probability,precipitation&forecast_days=2&timezone=UTC",
            self.base_url, location.latitude, location.longitude
        );

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| AppError::UpstreamForecastUnavailable(format!("request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::UpstreamForecastUnavailable(format!(
                "forecast API error: {} - {}",
                status, body
            )));
        }

        let data: OpenMeteoResponse = response
            .json()
            .await
            .map_err(|e| AppError::UpstreamForecastUnavailable(format!("failed to parse forecast response: {}", e)))?;

        convert_hourly(data.hourly)
    }
}

/// Zip the column-oriented hourly block into points
fn convert_hourly(hourly: OpenMeteoHourly) -> AppResult<Vec<HourlyForecastPoint>> {
    hourly
        .time
        .iter()
        .enumerate()
        .map(|(i, time)| {
            let time = NaiveDateTime::parse_from_str(time, "%Y-%m-%dT%H:%M")
                .map_err(|e| AppError::UpstreamForecastUnavailable(format!("bad timestamp {time:?}: {e}")))?
                .and_utc();
            Ok(HourlyForecastPoint {
                time,
                rain_probability: hourly.precipitation_probability.get(i).copied().flatten().unwrap_or(0.0),
                precipitation_mm: hourly.precipitation.get(i).copied().flatten().unwrap_or(0.0),
            })
        })
        .collect()
}

#[async_trait]
impl ForecastSource for WeatherClient {
    async fn hourly_outlook(&self, field: &Field) -> AppResult<Vec<HourlyForecastPoint>> {
        let location = field.location.unwrap_or(self.default_location);
        self.get_hourly_forecast(location).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_open_meteo_hourly_block() {
        let body = r#"{
            "latitude": 39.93,
            "longitude": 32.85,
            "hourly": {
                "time": ["2024-06-01T00:00", "2024-06-01T01:00", "2024-06-01T02:00"],
                "precipitation_probability": [10, 65, null],
                "precipitation": [0.0, 1.2, 0.0]
            }
        }"#;
        let data: OpenMeteoResponse = serde_json::from_str(body).unwrap();
        let points = convert_hourly(data.hourly).unwrap();

        assert_eq!(points.len(), 3);
        assert_eq!(points[1].rain_probability, 65.0);
        assert!(points[1].is_rainy());
        assert_eq!(points[2].rain_probability, 0.0);
        assert_eq!(points[0].time.to_rfc3339(), "2024-06-01T00:00:00+00:00");
    }

    #[test]
    fn rejects_bad_timestamps() {
        let hourly = OpenMeteoHourly {
            time: vec!["yesterday".to_string()],
            precipitation_probability: vec![],
            precipitation: vec![],
        };
        let err = convert_hourly(hourly).unwrap_err();
        assert_eq!(err.code(), "UPSTREAM_FORECAST_UNAVAILABLE");
    }
}
