//! External service integrations

pub mod weather;

pub use weather::{ForecastSource, WeatherClient};
