//! Configuration system for lidarcast.
//!
//! Uses `figment` for layered configuration: defaults -> user config ->
//! workspace config -> explicit file -> environment. Each dataset family
//! carries its own projection profile and sequence splits.

use crate::error::ConfigError;
use crate::selector::DatasetKind;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastConfig {
    /// Projection profile and splits for KITTI odometry.
    #[serde(default = "DatasetProfile::kitti")]
    pub kitti: DatasetProfile,
    /// Projection profile and splits for nuScenes.
    #[serde(default = "DatasetProfile::nuscenes")]
    pub nuscenes: DatasetProfile,
    /// Where nuScenes metadata and sweeps are read from.
    #[serde(default)]
    pub nuscenes_source: NuScenesSourceConfig,
    /// Forecast horizon.
    #[serde(default)]
    pub model: ModelConfig,
    /// Training loop settings.
    #[serde(default)]
    pub training: TrainingConfig,
}

impl Default for ForecastConfig {
    fn default() -> Self {
        Self {
            kitti: DatasetProfile::kitti(),
            nuscenes: DatasetProfile::nuscenes(),
            nuscenes_source: NuScenesSourceConfig::default(),
            model: ModelConfig::default(),
            training: TrainingConfig::default(),
        }
    }
}

impl ForecastConfig {
    /// Profile for the given dataset family.
    pub fn profile(&self, kind: DatasetKind) -> &DatasetProfile {
        match kind {
            DatasetKind::Kitti => &self.kitti,
            DatasetKind::Nuscenes => &self.nuscenes,
        }
    }

    /// Reject values that would make preprocessing or training meaningless.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for kind in DatasetKind::ALL {
            self.profile(kind)
                .validate()
                .map_err(|e| ConfigError::invalid(format!("[{kind}] {e}")))?;
        }
        if self.model.n_past_steps == 0 || self.model.n_future_steps == 0 {
            return Err(ConfigError::invalid(
                "model.n_past_steps and model.n_future_steps must be at least 1",
            ));
        }
        let t = &self.training;
        if t.batch_size == 0 {
            return Err(ConfigError::invalid("training.batch_size must be at least 1"));
        }
        if !(t.learning_rate.is_finite() && t.learning_rate > 0.0) {
            return Err(ConfigError::invalid(
                "training.learning_rate must be a positive number",
            ));
        }
        if t.checkpoint_every == 0 || t.max_checkpoints == 0 {
            return Err(ConfigError::invalid(
                "training.checkpoint_every and training.max_checkpoints must be at least 1",
            ));
        }
        Ok(())
    }
}

/// Range-image projection parameters and sequence splits of one dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetProfile {
    /// Rows of the range image (one per laser ring, nominally).
    pub height: usize,
    /// Columns of the range image (azimuth bins).
    pub width: usize,
    /// Upper edge of the vertical field of view, degrees.
    pub fov_up: f32,
    /// Lower edge of the vertical field of view, degrees.
    pub fov_down: f32,
    /// Points closer than this are dropped, metres.
    pub min_range: f32,
    /// Points farther than this are dropped, metres.
    pub max_range: f32,
    pub splits: SplitConfig,
}

impl DatasetProfile {
    /// HDL-64E on the KITTI odometry benchmark.
    pub fn kitti() -> Self {
        Self {
            height: 64,
            width: 2048,
            fov_up: 3.0,
            fov_down: -25.0,
            min_range: 1.0,
            max_range: 85.0,
            splits: SplitConfig {
                train: SequenceSet::List(vec![0, 1, 2, 3, 4, 5]),
                val: SequenceSet::List(vec![6, 7]),
                test: SequenceSet::List(vec![8, 9, 10]),
            },
        }
    }

    /// HDL-32E on nuScenes trainval, scenes numbered in name order.
    pub fn nuscenes() -> Self {
        Self {
            height: 32,
            width: 1024,
            fov_up: 10.0,
            fov_down: -30.0,
            min_range: 1.0,
            max_range: 70.0,
            splits: SplitConfig {
                train: SequenceSet::Range { start: 0, end: 599 },
                val: SequenceSet::Range {
                    start: 600,
                    end: 699,
                },
                test: SequenceSet::Range {
                    start: 700,
                    end: 849,
                },
            },
        }
    }

    fn validate(&self) -> Result<(), String> {
        if self.height == 0 || self.width == 0 {
            return Err("height and width must be positive".into());
        }
        if self.fov_up <= self.fov_down {
            return Err(format!(
                "fov_up ({}) must be above fov_down ({})",
                self.fov_up, self.fov_down
            ));
        }
        if !(self.min_range >= 0.0 && self.min_range < self.max_range) {
            return Err(format!(
                "min_range ({}) must be non-negative and below max_range ({})",
                self.min_range, self.max_range
            ));
        }
        for (name, set) in [
            ("train", &self.splits.train),
            ("val", &self.splits.val),
            ("test", &self.splits.test),
        ] {
            if let SequenceSet::Range { start, end } = set {
                if start > end {
                    return Err(format!("splits.{name}: start {start} is after end {end}"));
                }
            }
        }
        Ok(())
    }
}

/// Train / validation / test sequence sets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SplitConfig {
    pub train: SequenceSet,
    pub val: SequenceSet,
    pub test: SequenceSet,
}

impl SplitConfig {
    /// Every sequence referenced by any split, sorted and deduplicated.
    pub fn all_ids(&self) -> Vec<u32> {
        let mut ids: Vec<u32> = [&self.train, &self.val, &self.test]
            .into_iter()
            .flat_map(|s| s.ids())
            .collect();
        ids.sort_unstable();
        ids.dedup();
        ids
    }
}

/// A set of sequence ids, written either as a list or an inclusive range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SequenceSet {
    Range { start: u32, end: u32 },
    List(Vec<u32>),
}

impl SequenceSet {
    pub fn ids(&self) -> Vec<u32> {
        match self {
            SequenceSet::Range { start, end } => (*start..=*end).collect(),
            SequenceSet::List(ids) => ids.clone(),
        }
    }
}

/// Location of nuScenes metadata tables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NuScenesSourceConfig {
    /// Metadata directory under the dataset root (`v1.0-trainval`, `v1.0-mini`).
    #[serde(default = "default_nuscenes_version")]
    pub version: String,
    /// Also convert the intermediate 20 Hz sweeps, not only key frames.
    #[serde(default)]
    pub include_sweeps: bool,
}

impl Default for NuScenesSourceConfig {
    fn default() -> Self {
        Self {
            version: default_nuscenes_version(),
            include_sweeps: false,
        }
    }
}

fn default_nuscenes_version() -> String {
    "v1.0-trainval".to_string()
}

/// Forecast horizon.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Number of observed frames fed to the model.
    #[serde(default = "default_steps")]
    pub n_past_steps: usize,
    /// Number of frames predicted.
    #[serde(default = "default_steps")]
    pub n_future_steps: usize,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            n_past_steps: default_steps(),
            n_future_steps: default_steps(),
        }
    }
}

fn default_steps() -> usize {
    5
}

/// Training loop configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingConfig {
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_learning_rate")]
    pub learning_rate: f64,
    #[serde(default = "default_max_epochs")]
    pub max_epochs: usize,
    /// Epochs without validation improvement before stopping.
    #[serde(default = "default_patience")]
    pub early_stopping_patience: usize,
    /// Stop on NaN or exploding loss.
    #[serde(default = "default_true")]
    pub anomaly_detection: bool,
    /// Checkpoint directory; one subdirectory per experiment.
    #[serde(default = "default_checkpoint_dir")]
    pub checkpoint_dir: String,
    /// Write a checkpoint every N epochs.
    #[serde(default = "default_checkpoint_every")]
    pub checkpoint_every: usize,
    /// Checkpoint index entries kept per experiment.
    #[serde(default = "default_max_checkpoints")]
    pub max_checkpoints: usize,
    #[serde(default = "default_true")]
    pub shuffle: bool,
    #[serde(default = "default_seed")]
    pub seed: u64,
    /// Experiment registry file.
    #[serde(default = "default_experiments_file")]
    pub experiments_file: String,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            learning_rate: default_learning_rate(),
            max_epochs: default_max_epochs(),
            early_stopping_patience: default_patience(),
            anomaly_detection: true,
            checkpoint_dir: default_checkpoint_dir(),
            checkpoint_every: default_checkpoint_every(),
            max_checkpoints: default_max_checkpoints(),
            shuffle: true,
            seed: default_seed(),
            experiments_file: default_experiments_file(),
        }
    }
}

fn default_batch_size() -> usize {
    4
}

fn default_learning_rate() -> f64 {
    1e-3
}

fn default_max_epochs() -> usize {
    20
}

fn default_patience() -> usize {
    5
}

fn default_checkpoint_dir() -> String {
    ".lidarcast/checkpoints".to_string()
}

fn default_checkpoint_every() -> usize {
    1
}

fn default_max_checkpoints() -> usize {
    5
}

fn default_seed() -> u64 {
    1
}

fn default_experiments_file() -> String {
    ".lidarcast/experiments.json".to_string()
}

fn default_true() -> bool {
    true
}

/// Platform config directory (`~/.config/lidarcast` on Linux).
pub fn user_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("dev", "lidarcast", "lidarcast")
        .map(|d| d.config_dir().join("config.toml"))
}

/// Workspace-local config file.
pub fn workspace_config_path(workspace: &Path) -> PathBuf {
    workspace.join(".lidarcast").join("config.toml")
}

/// Load configuration from all sources.
///
/// Priority (highest to lowest):
/// 1. Environment variables (prefixed with `LIDARCAST_`, `__` nests)
/// 2. Explicit config file (`--config`)
/// 3. Workspace-local config (`.lidarcast/config.toml`)
/// 4. User config (`~/.config/lidarcast/config.toml`)
/// 5. Built-in defaults
pub fn load_config(
    workspace: Option<&Path>,
    explicit: Option<&Path>,
) -> Result<ForecastConfig, ConfigError> {
    let mut figment = Figment::from(Serialized::defaults(ForecastConfig::default()));

    if let Some(user_config) = user_config_path() {
        if user_config.exists() {
            figment = figment.merge(Toml::file(&user_config));
        }
    }

    if let Some(ws) = workspace {
        let ws_config = workspace_config_path(ws);
        if ws_config.exists() {
            figment = figment.merge(Toml::file(&ws_config));
        }
    }

    if let Some(path) = explicit {
        if !path.is_file() {
            return Err(ConfigError::FileNotFound {
                path: path.to_path_buf(),
            });
        }
        figment = figment.merge(Toml::file(path));
    }

    // LIDARCAST_TRAINING__MAX_EPOCHS, LIDARCAST_KITTI__WIDTH, ...
    figment = figment.merge(Env::prefixed("LIDARCAST_").split("__"));

    let config: ForecastConfig = figment.extract().map_err(Box::new)?;
    config.validate()?;
    Ok(config)
}
