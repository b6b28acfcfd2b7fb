//! Business logic services for the Smart Irrigation Platform

pub mod field_data;
pub mod irrigation;
pub mod notification;
pub mod prediction;

pub use field_data::{FieldRepository, InMemoryFieldRepository, PgFieldRepository};
pub use irrigation::IrrigationService;
pub use notification::{InMemoryNotificationSink, NotificationSink, PgNotificationSink};
pub use prediction::PredictionService;
