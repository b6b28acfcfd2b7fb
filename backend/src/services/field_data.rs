//! Field data access
//!
//! The engine reads fields, sensor history and forecast history through
//! [`FieldRepository`]. PostgreSQL backs the server; the in-memory
//! implementation backs tests and simulations.

use std::collections::BTreeMap;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use shared::{
    validate_forecast, validate_reading, validate_thresholds, Field, FieldId, FieldScope, ForecastRecord,
    GpsCoordinates, PlantThresholds, SensorReading,
};
use sqlx::{FromRow, PgPool};

use crate::error::{AppError, AppResult};

#[async_trait]
pub trait FieldRepository: Send + Sync {
    /// Fields in scope, ordered by id
    async fn list_fields(&self, scope: FieldScope) -> AppResult<Vec<Field>>;

    async fn get_field(&self, field_id: FieldId) -> AppResult<Option<Field>>;

    /// Every reading of the field, oldest first
    async fn sensor_readings(&self, field_id: FieldId) -> AppResult<Vec<SensorReading>>;

    /// Every forecast of the field, oldest first
    async fn forecasts(&self, field_id: FieldId) -> AppResult<Vec<ForecastRecord>>;

    async fn latest_reading(&self, field_id: FieldId) -> AppResult<Option<SensorReading>>;

    /// Most recent forecast issued for a time at or before `at`
    async fn latest_forecast_before(&self, field_id: FieldId, at: DateTime<Utc>) -> AppResult<Option<ForecastRecord>>;

    async fn record_reading(&self, reading: &SensorReading) -> AppResult<()>;

    async fn record_forecast(&self, forecast: &ForecastRecord) -> AppResult<()>;
}

fn check<T>(result: Result<T, &'static str>, field: &str) -> AppResult<T> {
    result.map_err(|message| AppError::Validation {
        field: field.to_string(),
        message: message.to_string(),
    })
}

/// PostgreSQL-backed repository
#[derive(Clone)]
pub struct PgFieldRepository {
    db: PgPool,
}

#[derive(Debug, FromRow)]
struct FieldRow {
    id: i64,
    name: String,
    owner_id: Option<i64>,
    plant_name: Option<String>,
    min_moisture: Option<f64>,
    max_moisture: Option<f64>,
    critical_moisture: Option<f64>,
    max_wait_hours: Option<i32>,
    latitude: Option<f64>,
    longitude: Option<f64>,
}

/// Rows pass the same threshold validation as fields added in memory
impl TryFrom<FieldRow> for Field {
    type Error = AppError;

    fn try_from(row: FieldRow) -> AppResult<Self> {
        let defaults = PlantThresholds::default();
        let thresholds = PlantThresholds::new(
            row.min_moisture.unwrap_or(defaults.min_moisture),
            row.max_moisture.unwrap_or(defaults.max_moisture),
            row.critical_moisture.unwrap_or(defaults.critical_moisture),
            row.max_wait_hours
                .and_then(|h| u32::try_from(h).ok())
                .unwrap_or(defaults.max_wait_hours),
        );
        check(validate_thresholds(&thresholds), "thresholds")?;

        Ok(Field {
            id: row.id,
            name: row.name,
            owner_id: row.owner_id,
            plant_name: row.plant_name,
            thresholds,
            location: row.latitude.zip(row.longitude).map(|(lat, lon)| GpsCoordinates::new(lat, lon)),
        })
    }
}

#[derive(Debug, FromRow)]
struct SensorRow {
    field_id: i64,
    timestamp: DateTime<Utc>,
    moisture: f64,
    temperature: f64,
    rain_observed: bool,
}

impl From<SensorRow> for SensorReading {
    fn from(row: SensorRow) -> Self {
        SensorReading::new(row.field_id, row.timestamp, row.moisture, row.temperature, row.rain_observed)
    }
}

#[derive(Debug, FromRow)]
struct ForecastRow {
    field_id: i64,
    forecast_timestamp: DateTime<Utc>,
    rain_probability: f64,
    expected_rain_amount: f64,
}

impl From<ForecastRow> for ForecastRecord {
    fn from(row: ForecastRow) -> Self {
        ForecastRecord::new(row.field_id, row.forecast_timestamp, row.rain_probability, row.expected_rain_amount)
    }
}

const FIELD_SELECT: &str = r#"
    SELECT f.id, f.name, f.owner_id, p.name AS plant_name,
           p.min_moisture, p.max_moisture, p.critical_moisture, p.max_wait_hours,
           f.latitude, f.longitude
    FROM fields f
    LEFT JOIN plant_types p ON p.id = f.plant_type_id
"#;

impl PgFieldRepository {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl FieldRepository for PgFieldRepository {
    async fn list_fields(&self, scope: FieldScope) -> AppResult<Vec<Field>> {
        let owner = match scope {
            FieldScope::All => None,
            FieldScope::Owner(id) => Some(id),
        };

        let rows = sqlx::query_as::<_, FieldRow>(&format!(
            "{FIELD_SELECT} WHERE ($1::BIGINT IS NULL OR f.owner_id = $1) ORDER BY f.id"
        ))
        .bind(owner)
        .fetch_all(&self.db)
        .await?;

        rows.into_iter().map(Field::try_from).collect()
    }

    async fn get_field(&self, field_id: FieldId) -> AppResult<Option<Field>> {
        let row = sqlx::query_as::<_, FieldRow>(&format!("{FIELD_SELECT} WHERE f.id = $1"))
            .bind(field_id)
            .fetch_optional(&self.db)
            .await?;

        row.map(Field::try_from).transpose()
    }

    async fn sensor_readings(&self, field_id: FieldId) -> AppResult<Vec<SensorReading>> {
        let rows = sqlx::query_as::<_, SensorRow>(
            r#"
            SELECT field_id, timestamp, moisture, temperature, rain_observed
            FROM sensor_logs
            WHERE field_id = $1
            ORDER BY timestamp
            "#,
        )
        .bind(field_id)
        .fetch_all(&self.db)
        .await?;

        Ok(rows.into_iter().map(SensorReading::from).collect())
    }

    async fn forecasts(&self, field_id: FieldId) -> AppResult<Vec<ForecastRecord>> {
        let rows = sqlx::query_as::<_, ForecastRow>(
            r#"
            SELECT field_id, forecast_timestamp, rain_probability, expected_rain_amount
            FROM weather_forecasts
            WHERE field_id = $1
            ORDER BY forecast_timestamp
            "#,
        )
        .bind(field_id)
        .fetch_all(&self.db)
        .await?;

        Ok(rows.into_iter().map(ForecastRecord::from).collect())
    }

    async fn latest_reading(&self, field_id: FieldId) -> AppResult<Option<SensorReading>> {
        let row = sqlx::query_as::<_, SensorRow>(
            r#"
            SELECT field_id, timestamp, moisture, temperature, rain_observed
            FROM sensor_logs
            WHERE field_id = $1
            ORDER BY timestamp DESC
            LIMIT 1
            "#,
        )
        .bind(field_id)
        .fetch_optional(&self.db)
        .await?;

        Ok(row.map(SensorReading::from))
    }

    async fn latest_forecast_before(&self, field_id: FieldId, at: DateTime<Utc>) -> AppResult<Option<ForecastRecord>> {
        let row = sqlx::query_as::<_, ForecastRow>(
            r#"
            SELECT field_id, forecast_timestamp, rain_probability, expected_rain_amount
            FROM weather_forecasts
            WHERE field_id = $1 AND forecast_timestamp <= $2
            ORDER BY forecast_timestamp DESC
            LIMIT 1
            "#,
        )
        .bind(field_id)
        .bind(at)
        .fetch_optional(&self.db)
        .await?;

        Ok(row.map(ForecastRecord::from))
    }

    async fn record_reading(&self, reading: &SensorReading) -> AppResult<()> {
        check(validate_reading(reading), "reading")?;

        sqlx::query(
            r#"
            INSERT INTO sensor_logs (field_id, timestamp, moisture, temperature, rain_observed)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(reading.field_id)
        .bind(reading.timestamp)
        .bind(reading.moisture)
        .bind(reading.temperature)
        .bind(reading.rain_observed)
        .execute(&self.db)
        .await?;

        Ok(())
    }

    async fn record_forecast(&self, forecast: &ForecastRecord) -> AppResult<()> {
        check(validate_forecast(forecast), "forecast")?;

        sqlx::query(
            r#"
            INSERT INTO weather_forecasts (field_id, forecast_timestamp, rain_probability, expected_rain_amount)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(forecast.field_id)
        .bind(forecast.forecast_timestamp)
        .bind(forecast.rain_probability)
        .bind(forecast.expected_rain_amount)
        .execute(&self.db)
        .await?;

        Ok(())
    }
}

#[derive(Debug, Default)]
struct FieldData {
    field: Option<Field>,
    readings: Vec<SensorReading>,
    forecasts: Vec<ForecastRecord>,
}

/// Repository held entirely in memory
#[derive(Debug, Default)]
pub struct InMemoryFieldRepository {
    fields: RwLock<BTreeMap<FieldId, FieldData>>,
}

fn poisoned() -> AppError {
    AppError::Internal("field repository lock poisoned".to_string())
}

impl InMemoryFieldRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_field(&self, field: Field) -> AppResult<()> {
        check(validate_thresholds(&field.thresholds), "thresholds")?;
        let mut fields = self.fields.write().map_err(|_| poisoned())?;
        let id = field.id;
        fields.entry(id).or_default().field = Some(field);
        Ok(())
    }

    /// Register a field together with its whole history
    pub fn seed(&self, field: Field, readings: Vec<SensorReading>, forecasts: Vec<ForecastRecord>) -> AppResult<()> {
        let field_id = field.id;
        self.add_field(field)?;
        let mut fields = self.fields.write().map_err(|_| poisoned())?;
        let data = fields.entry(field_id).or_default();
        data.readings.extend(readings);
        data.readings.sort_by_key(|r| r.timestamp);
        data.forecasts.extend(forecasts);
        data.forecasts.sort_by_key(|f| f.forecast_timestamp);
        Ok(())
    }
}

#[async_trait]
impl FieldRepository for InMemoryFieldRepository {
    async fn list_fields(&self, scope: FieldScope) -> AppResult<Vec<Field>> {
        let fields = self.fields.read().map_err(|_| poisoned())?;
        Ok(fields
            .values()
            .filter_map(|d| d.field.clone())
            .filter(|f| scope.includes(f.owner_id))
            .collect())
    }

    async fn get_field(&self, field_id: FieldId) -> AppResult<Option<Field>> {
        let fields = self.fields.read().map_err(|_| poisoned())?;
        Ok(fields.get(&field_id).and_then(|d| d.field.clone()))
    }

    async fn sensor_readings(&self, field_id: FieldId) -> AppResult<Vec<SensorReading>> {
        let fields = self.fields.read().map_err(|_| poisoned())?;
        Ok(fields.get(&field_id).map(|d| d.readings.clone()).unwrap_or_default())
    }

    async fn forecasts(&self, field_id: FieldId) -> AppResult<Vec<ForecastRecord>> {
        let fields = self.fields.read().map_err(|_| poisoned())?;
        Ok(fields.get(&field_id).map(|d| d.forecasts.clone()).unwrap_or_default())
    }

    async fn latest_reading(&self, field_id: FieldId) -> AppResult<Option<SensorReading>> {
        let fields = self.fields.read().map_err(|_| poisoned())?;
        Ok(fields
            .get(&field_id)
            .and_then(|d| d.readings.iter().max_by_key(|r| r.timestamp).cloned()))
    }

    async fn latest_forecast_before(&self, field_id: FieldId, at: DateTime<Utc>) -> AppResult<Option<ForecastRecord>> {
        let fields = self.fields.read().map_err(|_| poisoned())?;
        Ok(fields.get(&field_id).and_then(|d| {
            d.forecasts
                .iter()
                .filter(|f| f.forecast_timestamp <= at)
                .max_by_key(|f| f.forecast_timestamp)
                .cloned()
        }))
    }

    async fn record_reading(&self, reading: &SensorReading) -> AppResult<()> {
        check(validate_reading(reading), "reading")?;
        let mut fields = self.fields.write().map_err(|_| poisoned())?;
        let data = fields
            .get_mut(&reading.field_id)
            .filter(|d| d.field.is_some())
            .ok_or_else(|| AppError::NotFound(format!("field {}", reading.field_id)))?;
        data.readings.push(reading.clone());
        Ok(())
    }

    async fn record_forecast(&self, forecast: &ForecastRecord) -> AppResult<()> {
        check(validate_forecast(forecast), "forecast")?;
        let mut fields = self.fields.write().map_err(|_| poisoned())?;
        let data = fields
            .get_mut(&forecast.field_id)
            .filter(|d| d.field.is_some())
            .ok_or_else(|| AppError::NotFound(format!("field {}", forecast.field_id)))?;
        data.forecasts.push(forecast.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn at(hour: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 7, 1, 0, 0, 0).unwrap() + Duration::hours(hour)
    }

    fn row(min: f64, max: f64, critical: f64) -> FieldRow {
        FieldRow {
            id: 7,
            name: "Terrace".to_string(),
            owner_id: Some(10),
            plant_name: Some("corn".to_string()),
            min_moisture: Some(min),
            max_moisture: Some(max),
            critical_moisture: Some(critical),
            max_wait_hours: Some(4),
            latitude: Some(38.4),
            longitude: None,
        }
    }

    #[test]
    fn stored_thresholds_are_validated() {
        let field = Field::try_from(row(35.0, 70.0, 15.0)).unwrap();
        assert_eq!(field.thresholds, PlantThresholds::new(35.0, 70.0, 15.0, 4));
        assert!(field.location.is_none());

        let err = Field::try_from(row(70.0, 35.0, 15.0)).unwrap_err();
        assert_eq!(err.code(), "VALIDATION_ERROR");
        let err = Field::try_from(row(35.0, 70.0, 50.0)).unwrap_err();
        assert_eq!(err.code(), "VALIDATION_ERROR");
    }

    #[test]
    fn missing_plant_type_uses_default_thresholds() {
        let mut bare = row(0.0, 0.0, 0.0);
        bare.min_moisture = None;
        bare.max_moisture = None;
        bare.critical_moisture = None;
        bare.max_wait_hours = None;

        let field = Field::try_from(bare).unwrap();
        assert_eq!(field.thresholds, PlantThresholds::default());
    }

    #[tokio::test]
    async fn scope_filters_by_owner() {
        let repo = InMemoryFieldRepository::new();
        repo.add_field(Field::new(1, "North", PlantThresholds::default()).with_owner(10)).unwrap();
        repo.add_field(Field::new(2, "South", PlantThresholds::default()).with_owner(20)).unwrap();
        repo.add_field(Field::new(3, "Orphan", PlantThresholds::default())).unwrap();

        assert_eq!(repo.list_fields(FieldScope::All).await.unwrap().len(), 3);
        let owned = repo.list_fields(FieldScope::Owner(20)).await.unwrap();
        assert_eq!(owned.len(), 1);
        assert_eq!(owned[0].id, 2);
    }

    #[tokio::test]
    async fn latest_forecast_ignores_future() {
        let repo = InMemoryFieldRepository::new();
        repo.seed(
            Field::new(1, "North", PlantThresholds::default()),
            vec![],
            vec![
                ForecastRecord::new(1, at(0), 10.0, 0.0),
                ForecastRecord::new(1, at(5), 55.0, 1.0),
                ForecastRecord::new(1, at(9), 90.0, 5.0),
            ],
        )
        .unwrap();

        let latest = repo.latest_forecast_before(1, at(6)).await.unwrap().unwrap();
        assert_eq!(latest.rain_probability, 55.0);
    }

    #[tokio::test]
    async fn rejects_out_of_range_reading() {
        let repo = InMemoryFieldRepository::new();
        repo.add_field(Field::new(1, "North", PlantThresholds::default())).unwrap();

        let err = repo
            .record_reading(&SensorReading::new(1, at(0), 140.0, 20.0, false))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn readings_for_unknown_field_are_rejected() {
        let repo = InMemoryFieldRepository::new();
        let err = repo
            .record_reading(&SensorReading::new(9, at(0), 40.0, 20.0, false))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "NOT_FOUND");
    }
}
