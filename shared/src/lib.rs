//! Shared types and models for the Smart Irrigation Platform
//!
//! This crate contains the domain types shared between the backend engine,
//! its HTTP surface, and any client that needs to read decisions.

pub mod models;
pub mod types;
pub mod validation;

pub use models::*;
pub use types::*;
pub use validation::*;
