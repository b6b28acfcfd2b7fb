//! Per-field rain models
//!
//! Everything in here is synchronous and free of I/O except the artifact
//! and registry stores.

pub mod artifact;
pub mod features;
pub mod forest;
pub mod metrics;
pub mod registry;
pub mod reliability;
pub mod trainer;
pub mod validator;

pub use artifact::{ArtifactStore, FsArtifactStore, InMemoryArtifactStore, TrainedModel};
pub use features::{build_training_dataset, FeatureRow, TrainingDataset, FEATURE_COLUMNS, MIN_TRAINING_READINGS};
pub use forest::{ForestParams, RandomForest};
pub use registry::{rebuild_from_artifacts, InMemoryRegistry, JsonFileRegistry, Registry, RegistryEntry};
pub use reliability::estimate_reliability;
pub use trainer::{ModelTrainer, TrainingReport};
pub use validator::{validate_with_model, RainValidator};
