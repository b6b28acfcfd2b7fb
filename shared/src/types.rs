//! Common types used across the platform

use serde::{Deserialize, Serialize};

/// Identifier of an independently managed field
pub type FieldId = i64;

/// Identifier of a field owner
pub type UserId = i64;

/// GPS coordinates
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct GpsCoordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl GpsCoordinates {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }
}

/// The set of fields a batch operation covers
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case", tag = "kind", content = "owner_id")]
pub enum FieldScope {
    #[default]
    All,
    Owner(UserId),
}

impl FieldScope {
    /// Whether a field with the given owner belongs to this scope
    pub fn includes(&self, owner_id: Option<UserId>) -> bool {
        match self {
            FieldScope::All => true,
            FieldScope::Owner(id) => owner_id == Some(*id),
        }
    }
}

/// Error recorded in a single slot of a batch operation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FieldFailure {
    pub code: String,
    pub message: String,
}

/// Outcome of one field inside a batch operation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldOutcome<T> {
    pub field_id: FieldId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<FieldFailure>,
}

impl<T> FieldOutcome<T> {
    pub fn success(field_id: FieldId, field_name: Option<String>, result: T) -> Self {
        Self {
            field_id,
            field_name,
            result: Some(result),
            error: None,
        }
    }

    pub fn failure(
        field_id: FieldId,
        field_name: Option<String>,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            field_id,
            field_name,
            result: None,
            error: Some(FieldFailure {
                code: code.into(),
                message: message.into(),
            }),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Aggregated result of a batch operation over many fields
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchReport<T> {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub outcomes: Vec<FieldOutcome<T>>,
}

impl<T> BatchReport<T> {
    pub fn from_outcomes(outcomes: Vec<FieldOutcome<T>>) -> Self {
        let succeeded = outcomes.iter().filter(|o| o.is_success()).count();
        Self {
            total: outcomes.len(),
            succeeded,
            failed: outcomes.len() - succeeded,
            outcomes,
        }
    }

    /// Look up the slot for one field
    pub fn outcome(&self, field_id: FieldId) -> Option<&FieldOutcome<T>> {
        self.outcomes.iter().find(|o| o.field_id == field_id)
    }
}
