//! Domain models for the Smart Irrigation Platform

mod field;
mod forecast;
mod irrigation;
mod plant;
mod prediction;
mod sensor;

pub use field::*;
pub use forecast::*;
pub use irrigation::*;
pub use plant::*;
pub use prediction::*;
pub use sensor::*;
