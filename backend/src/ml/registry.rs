//! Model registry
//!
//! Summary metadata for every trained field, keyed by field id. The file
//! backend keeps a single `meta.json`; every update is a read-modify-write
//! under one lock, so concurrent trainings of different fields never drop
//! each other's entries.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shared::{FieldId, ReliabilitySummary};

use super::artifact::{write_atomic, ArtifactStore, TrainedModel};
use crate::error::{AppError, AppResult};

pub const REGISTRY_FILE_NAME: &str = "meta.json";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RegistryEntry {
    pub accuracy: f64,
    pub f1_score: f64,
    pub sample_count: usize,
    pub feature_count: usize,
    pub rain_ratio: f64,
    pub trained_at: DateTime<Utc>,
    pub reliability: ReliabilitySummary,
}

impl From<&TrainedModel> for RegistryEntry {
    fn from(model: &TrainedModel) -> Self {
        Self {
            accuracy: model.accuracy,
            f1_score: model.f1_score,
            sample_count: model.sample_count,
            feature_count: model.feature_columns.len(),
            rain_ratio: model.rain_ratio,
            trained_at: model.trained_at,
            reliability: model.reliability.clone(),
        }
    }
}

pub trait Registry: Send + Sync {
    fn get(&self, field_id: FieldId) -> AppResult<Option<RegistryEntry>>;

    /// Insert or replace one field's entry, leaving the others untouched
    fn upsert(&self, field_id: FieldId, entry: RegistryEntry) -> AppResult<()>;

    fn all(&self) -> AppResult<BTreeMap<FieldId, RegistryEntry>>;
}

/// Registry persisted as one JSON object
#[derive(Debug)]
pub struct JsonFileRegistry {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonFileRegistry {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    /// `meta.json` inside a models directory
    pub fn in_dir(dir: &Path) -> Self {
        Self::new(dir.join(REGISTRY_FILE_NAME))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> AppResult<BTreeMap<FieldId, RegistryEntry>> {
        let bytes = match std::fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(e) => return Err(AppError::StorageError(format!("read registry: {e}"))),
        };
        serde_json::from_slice(&bytes).map_err(|e| AppError::StorageError(format!("decode registry: {e}")))
    }

    fn guard(&self) -> AppResult<std::sync::MutexGuard<'_, ()>> {
        self.lock
            .lock()
            .map_err(|_| AppError::StorageError("registry lock poisoned".to_string()))
    }
}

impl Registry for JsonFileRegistry {
    fn get(&self, field_id: FieldId) -> AppResult<Option<RegistryEntry>> {
        let _guard = self.guard()?;
        Ok(self.load()?.remove(&field_id))
    }

    fn upsert(&self, field_id: FieldId, entry: RegistryEntry) -> AppResult<()> {
        let _guard = self.guard()?;
        let mut entries = self.load()?;
        entries.insert(field_id, entry);

        let bytes = serde_json::to_vec_pretty(&entries)
            .map_err(|e| AppError::StorageError(format!("encode registry: {e}")))?;
        if let Some(dir) = self.path.parent() {
            std::fs::create_dir_all(dir)
                .map_err(|e| AppError::StorageError(format!("create registry dir: {e}")))?;
        }
        write_atomic(&self.path, &bytes)
    }

    fn all(&self) -> AppResult<BTreeMap<FieldId, RegistryEntry>> {
        let _guard = self.guard()?;
        self.load()
    }
}

#[derive(Debug, Default)]
pub struct InMemoryRegistry {
    entries: RwLock<BTreeMap<FieldId, RegistryEntry>>,
}

impl InMemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned() -> AppError {
    AppError::StorageError("registry lock poisoned".to_string())
}

impl Registry for InMemoryRegistry {
    fn get(&self, field_id: FieldId) -> AppResult<Option<RegistryEntry>> {
        Ok(self.entries.read().map_err(|_| poisoned())?.get(&field_id).cloned())
    }

    fn upsert(&self, field_id: FieldId, entry: RegistryEntry) -> AppResult<()> {
        self.entries.write().map_err(|_| poisoned())?.insert(field_id, entry);
        Ok(())
    }

    fn all(&self) -> AppResult<BTreeMap<FieldId, RegistryEntry>> {
        Ok(self.entries.read().map_err(|_| poisoned())?.clone())
    }
}

/// Re-derive every registry entry from the artifacts on disk
///
/// Returns the number of entries written. Unreadable artifacts are skipped
/// with a warning.
pub fn rebuild_from_artifacts(store: &dyn ArtifactStore, registry: &dyn Registry) -> AppResult<usize> {
    let mut rebuilt = 0;
    for field_id in store.field_ids()? {
        match store.get(field_id) {
            Ok(Some(model)) => {
                registry.upsert(field_id, RegistryEntry::from(&model))?;
                rebuilt += 1;
            }
            Ok(None) => {}
            Err(e) => tracing::warn!(field_id, error = %e, "skipping unreadable artifact"),
        }
    }
    tracing::info!(rebuilt, "registry rebuilt from artifacts");
    Ok(rebuilt)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn entry(accuracy: f64) -> RegistryEntry {
        RegistryEntry {
            accuracy,
            f1_score: 0.5,
            sample_count: 100,
            feature_count: 14,
            rain_ratio: 0.3,
            trained_at: Utc::now(),
            reliability: ReliabilitySummary::low_confidence("test", 0),
        }
    }

    #[test]
    fn upsert_keeps_other_fields() {
        let dir = tempfile::tempdir().unwrap();
        let registry = JsonFileRegistry::in_dir(dir.path());

        registry.upsert(1, entry(0.8)).unwrap();
        registry.upsert(2, entry(0.7)).unwrap();
        registry.upsert(1, entry(0.9)).unwrap();

        let all = registry.all().unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[&1].accuracy, 0.9);
        assert_eq!(all[&2].accuracy, 0.7);
    }

    #[test]
    fn concurrent_upserts_lose_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let registry = Arc::new(JsonFileRegistry::in_dir(dir.path()));

        let handles: Vec<_> = (0..8)
            .map(|id| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || registry.upsert(id, entry(0.5)).unwrap())
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let reopened = JsonFileRegistry::in_dir(dir.path());
        assert_eq!(reopened.all().unwrap().len(), 8);
    }

    #[test]
    fn missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let registry = JsonFileRegistry::in_dir(dir.path());
        assert!(registry.all().unwrap().is_empty());
        assert!(registry.get(9).unwrap().is_none());
    }
}
