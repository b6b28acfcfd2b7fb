//! Field models

use serde::{Deserialize, Serialize};

use crate::models::PlantThresholds;
use crate::types::{FieldId, GpsCoordinates, UserId};

/// An independently irrigated area with its own sensors, thresholds and model
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Field {
    pub id: FieldId,
    pub name: String,
    pub owner_id: Option<UserId>,
    pub plant_name: Option<String>,
    pub thresholds: PlantThresholds,
    pub location: Option<GpsCoordinates>,
}

impl Field {
    pub fn new(id: FieldId, name: impl Into<String>, thresholds: PlantThresholds) -> Self {
        Self {
            id,
            name: name.into(),
            owner_id: None,
            plant_name: None,
            thresholds,
            location: None,
        }
    }

    pub fn with_owner(mut self, owner_id: UserId) -> Self {
        self.owner_id = Some(owner_id);
        self
    }

    pub fn with_plant(mut self, plant_name: impl Into<String>) -> Self {
        self.plant_name = Some(plant_name.into());
        self
    }

    pub fn with_location(mut self, location: GpsCoordinates) -> Self {
        self.location = Some(location);
        self
    }
}
