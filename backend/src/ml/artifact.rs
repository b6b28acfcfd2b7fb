//! Model artifacts and their storage
//!
//! One artifact per field, stored as JSON at `{models_dir}/field_{id}.json`.
//! Writes go to a temp file in the same directory and are renamed into
//! place, so readers never observe a partial artifact.

use std::collections::HashMap;
use std::fmt::Display;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shared::{FieldId, ReliabilitySummary};
use tempfile::NamedTempFile;

use super::features::FeatureRow;
use super::forest::RandomForest;
use crate::error::{AppError, AppResult};

/// Bumped whenever the serialized layout changes incompatibly
pub const ARTIFACT_FORMAT_VERSION: u32 = 1;

/// Everything inference needs for one field
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TrainedModel {
    pub format_version: u32,
    pub field_id: FieldId,
    pub classifier: RandomForest,
    /// Column order the classifier was trained on
    pub feature_columns: Vec<String>,
    pub reliability: ReliabilitySummary,
    /// Held-out accuracy in `[0, 1]`, rounded to 4 decimals
    pub accuracy: f64,
    /// Held-out weighted F1 in `[0, 1]`, rounded to 4 decimals
    pub f1_score: f64,
    pub sample_count: usize,
    pub rain_ratio: f64,
    pub trained_at: DateTime<Utc>,
}

impl TrainedModel {
    /// Calibrated rain probability in `[0, 1]` for one feature row
    pub fn rain_probability(&self, row: &FeatureRow) -> f64 {
        self.classifier.predict_proba(&row.to_vector(&self.feature_columns))
    }

    pub fn to_json(&self) -> AppResult<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| AppError::StorageError(format!("encode artifact: {e}")))
    }

    pub fn from_json(bytes: &[u8]) -> AppResult<Self> {
        let model: Self = serde_json::from_slice(bytes)
            .map_err(|e| AppError::StorageError(format!("decode artifact: {e}")))?;
        if model.format_version != ARTIFACT_FORMAT_VERSION {
            return Err(AppError::StorageError(format!(
                "artifact for field {} has format {} (expected {})",
                model.field_id, model.format_version, ARTIFACT_FORMAT_VERSION
            )));
        }
        Ok(model)
    }
}

/// Persistent per-field artifact storage
pub trait ArtifactStore: Send + Sync {
    fn get(&self, field_id: FieldId) -> AppResult<Option<TrainedModel>>;

    /// Replace the field's artifact atomically
    fn put(&self, model: &TrainedModel) -> AppResult<()>;

    fn exists(&self, field_id: FieldId) -> bool;

    /// Serialized size, `None` if absent
    fn size_bytes(&self, field_id: FieldId) -> AppResult<Option<u64>>;

    /// Fields that currently have an artifact, ascending
    fn field_ids(&self) -> AppResult<Vec<FieldId>>;

    /// Human-readable location, for reports
    fn location(&self, field_id: FieldId) -> String;
}

fn storage_err(context: &str, err: impl Display) -> AppError {
    AppError::StorageError(format!("{context}: {err}"))
}

/// Write `bytes` to `path` through a sibling temp file
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> AppResult<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut tmp = NamedTempFile::new_in(dir).map_err(|e| storage_err("create temp file", e))?;
    tmp.write_all(bytes).map_err(|e| storage_err("write temp file", e))?;
    tmp.as_file()
        .sync_all()
        .map_err(|e| storage_err("sync temp file", e))?;
    tmp.persist(path)
        .map_err(|e| storage_err("replace file", e.error))?;
    Ok(())
}

/// Artifacts as JSON files in a directory
#[derive(Debug, Clone)]
pub struct FsArtifactStore {
    dir: PathBuf,
}

impl FsArtifactStore {
    /// Open (and create if needed) the models directory
    pub fn new(dir: impl Into<PathBuf>) -> AppResult<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|e| storage_err("create models dir", e))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, field_id: FieldId) -> PathBuf {
        self.dir.join(format!("field_{field_id}.json"))
    }
}

fn parse_artifact_name(name: &str) -> Option<FieldId> {
    name.strip_prefix("field_")?.strip_suffix(".json")?.parse().ok()
}

impl ArtifactStore for FsArtifactStore {
    fn get(&self, field_id: FieldId) -> AppResult<Option<TrainedModel>> {
        let bytes = match std::fs::read(self.path(field_id)) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(storage_err("read artifact", e)),
        };
        TrainedModel::from_json(&bytes).map(Some)
    }

    fn put(&self, model: &TrainedModel) -> AppResult<()> {
        let bytes = model.to_json()?;
        write_atomic(&self.path(model.field_id), &bytes)?;
        tracing::debug!(field_id = model.field_id, bytes = bytes.len(), "artifact written");
        Ok(())
    }

    fn exists(&self, field_id: FieldId) -> bool {
        self.path(field_id).is_file()
    }

    fn size_bytes(&self, field_id: FieldId) -> AppResult<Option<u64>> {
        match std::fs::metadata(self.path(field_id)) {
            Ok(meta) => Ok(Some(meta.len())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(storage_err("stat artifact", e)),
        }
    }

    fn field_ids(&self) -> AppResult<Vec<FieldId>> {
        let entries = std::fs::read_dir(&self.dir).map_err(|e| storage_err("list models dir", e))?;
        let mut ids = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| storage_err("list models dir", e))?;
            if let Some(id) = entry.file_name().to_str().and_then(parse_artifact_name) {
                ids.push(id);
            }
        }
        ids.sort_unstable();
        Ok(ids)
    }

    fn location(&self, field_id: FieldId) -> String {
        self.path(field_id).display().to_string()
    }
}

/// Artifacts kept in memory as their serialized bytes
#[derive(Debug, Default)]
pub struct InMemoryArtifactStore {
    artifacts: RwLock<HashMap<FieldId, Vec<u8>>>,
}

impl InMemoryArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned() -> AppError {
    AppError::StorageError("artifact store lock poisoned".to_string())
}

impl ArtifactStore for InMemoryArtifactStore {
    fn get(&self, field_id: FieldId) -> AppResult<Option<TrainedModel>> {
        let artifacts = self.artifacts.read().map_err(|_| poisoned())?;
        artifacts
            .get(&field_id)
            .map(|bytes| TrainedModel::from_json(bytes))
            .transpose()
    }

    fn put(&self, model: &TrainedModel) -> AppResult<()> {
        let bytes = model.to_json()?;
        self.artifacts
            .write()
            .map_err(|_| poisoned())?
            .insert(model.field_id, bytes);
        Ok(())
    }

    fn exists(&self, field_id: FieldId) -> bool {
        self.artifacts
            .read()
            .map(|a| a.contains_key(&field_id))
            .unwrap_or(false)
    }

    fn size_bytes(&self, field_id: FieldId) -> AppResult<Option<u64>> {
        let artifacts = self.artifacts.read().map_err(|_| poisoned())?;
        Ok(artifacts.get(&field_id).map(|b| b.len() as u64))
    }

    fn field_ids(&self) -> AppResult<Vec<FieldId>> {
        let artifacts = self.artifacts.read().map_err(|_| poisoned())?;
        let mut ids: Vec<FieldId> = artifacts.keys().copied().collect();
        ids.sort_unstable();
        Ok(ids)
    }

    fn location(&self, field_id: FieldId) -> String {
        format!("memory://field_{field_id}")
    }
}
