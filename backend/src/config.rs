//! Configuration management for the Smart Irrigation Platform
//!
//! Supports hierarchical configuration loading:
//! 1. Default values in code
//! 2. Configuration files (development.toml, production.toml)
//! 3. Environment variable overrides with IRR_ prefix

use std::path::PathBuf;
use std::time::Duration;

use config::{ConfigError, Environment, File};
use serde::Deserialize;

/// Main application configuration
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Current environment (development, production)
    pub environment: String,

    /// Server configuration
    pub server: ServerConfig,

    /// Database configuration
    pub database: DatabaseConfig,

    /// Model training and artifact storage
    pub ml: MlConfig,

    /// Hourly forecast feed
    pub weather: WeatherConfig,

    /// Periodic jobs
    pub scheduler: SchedulerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    /// Server port
    pub port: u16,

    /// Server host
    pub host: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    pub url: String,

    /// Maximum number of connections in the pool
    pub max_connections: u32,

    /// Minimum number of connections in the pool
    pub min_connections: u32,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct MlConfig {
    /// Directory holding per-field artifacts and the registry file
    pub models_dir: PathBuf,

    /// Seed for the train/test split and the bootstrap samples
    pub random_seed: u64,

    /// Trees in the ensemble
    pub n_estimators: usize,

    pub max_depth: usize,

    pub min_samples_split: usize,

    pub min_samples_leaf: usize,

    /// Share of rows held out for evaluation
    pub test_ratio: f64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct WeatherConfig {
    /// Hourly forecast API endpoint
    pub api_endpoint: String,

    /// Upper bound on a single forecast fetch
    pub timeout_secs: u64,

    /// Location used for fields without coordinates
    pub default_latitude: f64,

    pub default_longitude: f64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SchedulerConfig {
    pub enabled: bool,

    /// Interval of the forecast validation + notification job
    pub rain_check_interval_secs: u64,

    /// Interval of the retrain-all job
    pub retrain_interval_secs: u64,
}

impl Config {
    /// Load configuration from files and environment variables
    pub fn load() -> Result<Self, ConfigError> {
        let environment = std::env::var("IRR_ENVIRONMENT").unwrap_or_else(|_| "development".into());

        let config = config::Config::builder()
            // Start with default values
            .set_default("environment", environment.clone())?
            .set_default("server.port", 8000)?
            .set_default("server.host", "0.0.0.0")?
            .set_default("database.max_connections", 10)?
            .set_default("database.min_connections", 2)?
            .set_default("ml.models_dir", "ml_models")?
            .set_default("ml.random_seed", 42)?
            .set_default("ml.n_estimators", 100)?
            .set_default("ml.max_depth", 12)?
            .set_default("ml.min_samples_split", 5)?
            .set_default("ml.min_samples_leaf", 2)?
            .set_default("ml.test_ratio", 0.2)?
            .set_default("weather.api_endpoint", "https://api.open-meteo.com/v1")?
            .set_default("weather.timeout_secs", 5)?
            .set_default("weather.default_latitude", 39.93)?
            .set_default("weather.default_longitude", 32.85)?
            .set_default("scheduler.enabled", true)?
            .set_default("scheduler.rain_check_interval_secs", 3600)?
            .set_default("scheduler.retrain_interval_secs", 86400)?
            // Load environment-specific config file
            .add_source(File::with_name(&format!("config/{}", environment)).required(false))
            // Override with environment variables (IRR_ prefix)
            .add_source(
                Environment::with_prefix("IRR")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8000,
            host: "0.0.0.0".to_string(),
        }
    }
}

impl Default for MlConfig {
    fn default() -> Self {
        Self {
            models_dir: PathBuf::from("ml_models"),
            random_seed: 42,
            n_estimators: 100,
            max_depth: 12,
            min_samples_split: 5,
            min_samples_leaf: 2,
            test_ratio: 0.2,
        }
    }
}

impl WeatherConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for WeatherConfig {
    fn default() -> Self {
        Self {
            api_endpoint: "https://api.open-meteo.com/v1".to_string(),
            timeout_secs: 5,
            default_latitude: 39.93,
            default_longitude: 32.85,
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            rain_check_interval_secs: 3600,
            retrain_interval_secs: 86400,
        }
    }
}
