//! Plant species threshold models

use serde::{Deserialize, Serialize};

/// Moisture decision boundaries for one plant species
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct PlantThresholds {
    /// Lower bound of the ideal band
    pub min_moisture: f64,
    /// Upper bound of the ideal band
    pub max_moisture: f64,
    /// Below this the plant needs emergency irrigation
    pub critical_moisture: f64,
    /// Longest the plant may wait for forecast rain
    pub max_wait_hours: u32,
}

impl PlantThresholds {
    pub const fn new(
        min_moisture: f64,
        max_moisture: f64,
        critical_moisture: f64,
        max_wait_hours: u32,
    ) -> Self {
        Self {
            min_moisture,
            max_moisture,
            critical_moisture,
            max_wait_hours,
        }
    }

    /// Thresholds of a catalog species, matched case-insensitively
    pub fn for_species(name: &str) -> Option<Self> {
        PLANT_CATALOG
            .iter()
            .find(|p| p.name.eq_ignore_ascii_case(name))
            .map(|p| p.thresholds)
    }
}

impl Default for PlantThresholds {
    fn default() -> Self {
        Self::new(30.0, 70.0, 10.0, 6)
    }
}

/// A plant species with its agronomic thresholds
#[derive(Debug, Clone, Copy, Serialize, PartialEq)]
pub struct PlantType {
    pub name: &'static str,
    pub category: PlantCategory,
    pub thresholds: PlantThresholds,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PlantCategory {
    Vegetable,
    Grain,
    Tuber,
    Fruit,
    Oilseed,
}

/// Built-in species presets
pub const PLANT_CATALOG: &[PlantType] = &[
    PlantType {
        name: "Tomato",
        category: PlantCategory::Vegetable,
        thresholds: PlantThresholds::new(30.0, 70.0, 10.0, 6),
    },
    PlantType {
        name: "Wheat",
        category: PlantCategory::Grain,
        thresholds: PlantThresholds::new(25.0, 60.0, 12.0, 12),
    },
    PlantType {
        name: "Capia Pepper",
        category: PlantCategory::Vegetable,
        thresholds: PlantThresholds::new(35.0, 70.0, 15.0, 6),
    },
    PlantType {
        name: "Potato",
        category: PlantCategory::Tuber,
        thresholds: PlantThresholds::new(35.0, 65.0, 15.0, 4),
    },
    PlantType {
        name: "Onion",
        category: PlantCategory::Vegetable,
        thresholds: PlantThresholds::new(25.0, 55.0, 12.0, 8),
    },
    PlantType {
        name: "Corn",
        category: PlantCategory::Grain,
        thresholds: PlantThresholds::new(35.0, 70.0, 15.0, 4),
    },
    PlantType {
        name: "Strawberry",
        category: PlantCategory::Fruit,
        thresholds: PlantThresholds::new(40.0, 70.0, 20.0, 3),
    },
    PlantType {
        name: "Sunflower",
        category: PlantCategory::Oilseed,
        thresholds: PlantThresholds::new(25.0, 55.0, 10.0, 10),
    },
];
