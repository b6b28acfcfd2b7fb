//! HTTP handlers

pub mod field_data;
pub mod health;
pub mod irrigation;
pub mod prediction;

pub use field_data::*;
pub use health::*;
pub use irrigation::*;
pub use prediction::*;
