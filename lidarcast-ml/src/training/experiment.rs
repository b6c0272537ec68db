//! Training experiment tracking.

use super::metrics::TrainingMetrics;
use super::reproducibility::EnvironmentSnapshot;
use crate::error::ForecastError;
use chrono::{DateTime, Utc};
use lidarcast_core::persistence::{atomic_write_json, load_json};
use lidarcast_core::{DatasetKind, ModelKind};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Training status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrainingStatus {
    Pending,
    Running,
    Completed,
    /// Ended early by a callback.
    Stopped,
    Failed,
}

/// One training run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingExperiment {
    pub id: String,
    pub name: String,
    pub dataset: DatasetKind,
    pub model: ModelKind,
    pub processed_path: PathBuf,
    pub hyperparams: serde_json::Value,
    pub status: TrainingStatus,
    pub metrics: Option<TrainingMetrics>,
    pub checkpoint_path: Option<PathBuf>,
    pub seed: u64,
    pub environment: Option<EnvironmentSnapshot>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub notes: Option<String>,
}

impl TrainingExperiment {
    pub fn new(dataset: DatasetKind, model: ModelKind, processed_path: &Path) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: format!("{model}-{dataset}-{}", now.format("%Y%m%d-%H%M%S")),
            dataset,
            model,
            processed_path: processed_path.to_path_buf(),
            hyperparams: serde_json::Value::Object(serde_json::Map::new()),
            status: TrainingStatus::Pending,
            metrics: None,
            checkpoint_path: None,
            seed: 1,
            environment: None,
            created_at: now,
            updated_at: now,
            notes: None,
        }
    }

    pub fn set_status(&mut self, status: TrainingStatus) {
        self.status = status;
        self.updated_at = Utc::now();
    }
}

/// Registry of training experiments, persisted as JSON.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExperimentRegistry {
    pub experiments: Vec<TrainingExperiment>,
}

impl ExperimentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace by id.
    pub fn upsert(&mut self, exp: TrainingExperiment) {
        match self.find_mut(&exp.id) {
            Some(existing) => *existing = exp,
            None => self.experiments.push(exp),
        }
    }

    pub fn find(&self, id: &str) -> Option<&TrainingExperiment> {
        self.experiments.iter().find(|e| e.id == id)
    }

    pub fn find_mut(&mut self, id: &str) -> Option<&mut TrainingExperiment> {
        self.experiments.iter_mut().find(|e| e.id == id)
    }

    pub fn load(path: &Path) -> Result<Self, ForecastError> {
        Ok(load_json(path)?.unwrap_or_default())
    }

    pub fn save(&self, path: &Path) -> Result<(), ForecastError> {
        atomic_write_json(path, self)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_registry_roundtrip_and_upsert() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(".lidarcast").join("experiments.json");
        assert!(ExperimentRegistry::load(&path).unwrap().experiments.is_empty());

        let mut exp = TrainingExperiment::new(DatasetKind::Kitti, ModelKind::Model1, dir.path());
        let mut registry = ExperimentRegistry::new();
        registry.upsert(exp.clone());
        exp.set_status(TrainingStatus::Completed);
        registry.upsert(exp.clone());
        registry.save(&path).unwrap();

        let loaded = ExperimentRegistry::load(&path).unwrap();
        assert_eq!(loaded.experiments.len(), 1);
        assert_eq!(loaded.find(&exp.id).unwrap().status, TrainingStatus::Completed);
    }

    #[test]
    fn test_status_serializes_snake_case() {
        let json = serde_json::to_string(&TrainingStatus::Stopped).unwrap();
        assert_eq!(json, "\"stopped\"");
    }
}
