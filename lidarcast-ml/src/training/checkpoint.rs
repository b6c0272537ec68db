//! Model checkpoints and the per-experiment checkpoint index.
//!
//! A checkpoint file is an 8-byte magic tag followed by a bincode-encoded
//! [`CheckpointFile`]. The index (`checkpoints.json`) lives next to the
//! files of each experiment and keeps the newest `max_checkpoints` entries.

use crate::data::WindowSpec;
use crate::error::{CheckpointLoadError, ForecastError};
use crate::models::{ForecastModel, build_model};
use crate::paths::CheckpointPath;
use chrono::{DateTime, Utc};
use lidarcast_core::persistence::{atomic_write_json, atomic_write_with, load_json};
use lidarcast_core::{DatasetKind, ModelKind};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::io::Write;
use std::path::{Path, PathBuf};

pub const CHECKPOINT_MAGIC: &[u8; 8] = b"LDRCKPT\0";
pub const CHECKPOINT_VERSION: u32 = 1;
pub const CHECKPOINT_EXTENSION: &str = "ckpt";
const INDEX_FILE: &str = "checkpoints.json";

/// Serialized model state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointFile {
    pub format_version: u32,
    pub model: ModelKind,
    pub dataset: DatasetKind,
    pub n_past: usize,
    pub n_future: usize,
    pub height: usize,
    pub width: usize,
    /// Range normalisation the weights were trained with.
    pub scale: f32,
    pub weights: Array2<f32>,
    pub epoch: usize,
    pub val_loss: f64,
    pub created_at: DateTime<Utc>,
}

/// What a loaded checkpoint must agree with.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CheckpointTarget {
    pub model: ModelKind,
    pub dataset: DatasetKind,
    pub window: WindowSpec,
    pub height: usize,
    pub width: usize,
}

impl CheckpointFile {
    pub fn from_model(
        model: &dyn ForecastModel,
        dataset: DatasetKind,
        height: usize,
        width: usize,
        epoch: usize,
        val_loss: f64,
    ) -> Self {
        let window = model.window();
        Self {
            format_version: CHECKPOINT_VERSION,
            model: model.kind(),
            dataset,
            n_past: window.n_past,
            n_future: window.n_future,
            height,
            width,
            scale: model.scale(),
            weights: model.params().clone(),
            epoch,
            val_loss,
            created_at: Utc::now(),
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), ForecastError> {
        atomic_write_with(path, |writer| {
            writer.write_all(CHECKPOINT_MAGIC)?;
            bincode::serialize_into(writer, self).map_err(std::io::Error::other)
        })?;
        Ok(())
    }

    /// Decode a checkpoint file. Any failure to read or decode is
    /// `Unreadable`; compatibility is checked separately.
    pub fn load(path: &CheckpointPath) -> Result<Self, CheckpointLoadError> {
        let unreadable = |reason: String| CheckpointLoadError::Unreadable {
            path: path.path().to_path_buf(),
            reason,
        };
        let bytes = std::fs::read(path.path()).map_err(|e| unreadable(e.to_string()))?;
        let payload = bytes
            .strip_prefix(CHECKPOINT_MAGIC.as_slice())
            .ok_or_else(|| unreadable("not a lidarcast checkpoint".into()))?;
        let file: Self = bincode::deserialize(payload).map_err(|e| unreadable(e.to_string()))?;
        if file.format_version != CHECKPOINT_VERSION {
            return Err(unreadable(format!(
                "checkpoint format {} is not supported (expected {CHECKPOINT_VERSION})",
                file.format_version
            )));
        }
        Ok(file)
    }

    /// Why this checkpoint cannot serve `target`, if it cannot.
    pub fn incompatibility(&self, target: &CheckpointTarget) -> Option<String> {
        if self.model != target.model {
            return Some(format!(
                "written for {}, {} was requested",
                self.model, target.model
            ));
        }
        if self.dataset != target.dataset {
            return Some(format!(
                "trained on {} data, evaluating on {}",
                self.dataset, target.dataset
            ));
        }
        if self.n_past != target.window.n_past || self.n_future != target.window.n_future {
            return Some(format!(
                "trained with {} past / {} future steps, configured {} / {}",
                self.n_past, self.n_future, target.window.n_past, target.window.n_future
            ));
        }
        if self.height != target.height || self.width != target.width {
            return Some(format!(
                "trained on {}x{} range images, data is {}x{}",
                self.height, self.width, target.height, target.width
            ));
        }
        if !(self.scale.is_finite() && self.scale > 0.0) {
            return Some(format!("invalid range scale {}", self.scale));
        }
        None
    }

    /// Rebuild the model this checkpoint describes.
    pub fn restore(
        &self,
        path: &CheckpointPath,
        target: &CheckpointTarget,
    ) -> Result<Box<dyn ForecastModel>, CheckpointLoadError> {
        let incompatible = |reason: String| CheckpointLoadError::Incompatible {
            path: path.path().to_path_buf(),
            reason,
        };
        if let Some(reason) = self.incompatibility(target) {
            return Err(incompatible(reason));
        }
        let mut model = build_model(self.model, target.window, self.scale);
        model
            .set_params(self.weights.clone())
            .map_err(incompatible)?;
        Ok(model)
    }
}

/// Index entry of a saved checkpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointEntry {
    pub id: String,
    pub experiment_id: String,
    pub epoch: usize,
    pub val_loss: f64,
    pub path: PathBuf,
    /// SHA-256 of the file contents.
    pub hash: String,
    pub size_bytes: u64,
    pub created_at: DateTime<Utc>,
}

/// Writes checkpoints and maintains their index.
pub struct CheckpointManager {
    base_dir: PathBuf,
    max_checkpoints: usize,
}

impl CheckpointManager {
    pub fn new(base_dir: PathBuf, max_checkpoints: usize) -> Self {
        Self {
            base_dir,
            max_checkpoints: max_checkpoints.max(1),
        }
    }

    pub fn experiment_dir(&self, experiment_id: &str) -> PathBuf {
        self.base_dir.join(experiment_id)
    }

    /// List checkpoints for an experiment, oldest first.
    pub fn list(&self, experiment_id: &str) -> Result<Vec<CheckpointEntry>, ForecastError> {
        let index = self.experiment_dir(experiment_id).join(INDEX_FILE);
        Ok(load_json(&index)?.unwrap_or_default())
    }

    /// Get the best checkpoint (lowest validation loss).
    pub fn best(&self, experiment_id: &str) -> Result<Option<CheckpointEntry>, ForecastError> {
        let checkpoints = self.list(experiment_id)?;
        Ok(checkpoints.into_iter().min_by(|a, b| {
            a.val_loss
                .partial_cmp(&b.val_loss)
                .unwrap_or(std::cmp::Ordering::Equal)
        }))
    }

    /// Write `file` for `experiment_id` and record it in the index.
    ///
    /// Entries beyond `max_checkpoints` are dropped oldest first together
    /// with their files.
    pub fn save(
        &self,
        experiment_id: &str,
        file: &CheckpointFile,
    ) -> Result<CheckpointEntry, ForecastError> {
        let dir = self.experiment_dir(experiment_id);
        let path = dir.join(format!("epoch-{:04}.{CHECKPOINT_EXTENSION}", file.epoch));
        file.save(&path)?;

        let bytes = std::fs::read(&path)?;
        let entry = CheckpointEntry {
            id: uuid::Uuid::new_v4().to_string(),
            experiment_id: experiment_id.to_string(),
            epoch: file.epoch,
            val_loss: file.val_loss,
            hash: format!("{:x}", Sha256::digest(&bytes)),
            size_bytes: bytes.len() as u64,
            path,
            created_at: Utc::now(),
        };

        let mut checkpoints = self.list(experiment_id)?;
        checkpoints.retain(|c| c.path != entry.path);
        checkpoints.push(entry.clone());
        while checkpoints.len() > self.max_checkpoints {
            let evicted = checkpoints.remove(0);
            if let Err(e) = std::fs::remove_file(&evicted.path) {
                tracing::warn!(path = %evicted.path.display(), error = %e, "failed to remove old checkpoint");
            }
        }
        atomic_write_json(&dir.join(INDEX_FILE), &checkpoints)?;

        tracing::debug!(
            epoch = entry.epoch,
            path = %entry.path.display(),
            "checkpoint saved"
        );
        Ok(entry)
    }
}
