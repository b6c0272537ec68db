//! nuScenes LIDAR_TOP sweeps.
//!
//! Scenes are reconstructed from the `scene`, `sample` and `sample_data`
//! metadata tables under `<root>/<version>/`. Scenes are numbered by their
//! position in name order, which keeps ids stable across runs.

use super::{PointCloud, RawSequence, ScanSource, read_packed_points};
use crate::error::{ForecastError, PathError};
use crate::paths::RawDatasetDir;
use lidarcast_core::config::NuScenesSourceConfig;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

const POINT_STRIDE: usize = 5;
const LIDAR_CHANNEL: &str = "LIDAR_TOP";

#[derive(Debug, Deserialize)]
struct SceneRecord {
    token: String,
    name: String,
}

#[derive(Debug, Deserialize)]
struct SampleRecord {
    token: String,
    scene_token: String,
}

#[derive(Debug, Deserialize)]
struct SampleDataRecord {
    sample_token: String,
    filename: String,
    timestamp: i64,
    #[serde(default)]
    is_key_frame: bool,
}

pub struct NuScenesSource {
    root: RawDatasetDir,
    options: NuScenesSourceConfig,
}

impl NuScenesSource {
    pub fn new(root: RawDatasetDir, options: NuScenesSourceConfig) -> Self {
        Self { root, options }
    }

    fn table<T: DeserializeOwned>(&self, name: &str) -> Result<Vec<T>, ForecastError> {
        let path = self
            .root
            .path()
            .join(&self.options.version)
            .join(format!("{name}.json"));
        if !path.is_file() {
            return Err(PathError::UnexpectedLayout {
                role: "dataset_path",
                path: self.root.path().to_path_buf(),
                expected: format!("metadata table {}/{name}.json", self.options.version),
            }
            .into());
        }
        let reader = BufReader::new(File::open(&path)?);
        serde_json::from_reader(reader).map_err(|e| ForecastError::scan(&path, e.to_string()))
    }
}

impl ScanSource for NuScenesSource {
    fn sequences(&self, wanted: &[u32]) -> Result<Vec<RawSequence>, ForecastError> {
        let mut scenes: Vec<SceneRecord> = self.table("scene")?;
        let samples: Vec<SampleRecord> = self.table("sample")?;
        let sample_data: Vec<SampleDataRecord> = self.table("sample_data")?;

        scenes.sort_by(|a, b| a.name.cmp(&b.name));
        let scene_ids: HashMap<&str, u32> = scenes
            .iter()
            .enumerate()
            .map(|(i, s)| (s.token.as_str(), i as u32))
            .collect();
        let sample_scene: HashMap<&str, u32> = samples
            .iter()
            .filter_map(|s| {
                scene_ids
                    .get(s.scene_token.as_str())
                    .map(|id| (s.token.as_str(), *id))
            })
            .collect();

        let mut by_scene: HashMap<u32, Vec<(i64, PathBuf)>> = HashMap::new();
        let mut missing = 0usize;
        for record in &sample_data {
            if !record.filename.contains(LIDAR_CHANNEL) {
                continue;
            }
            if !record.is_key_frame && !self.options.include_sweeps {
                continue;
            }
            let Some(scene) = sample_scene.get(record.sample_token.as_str()) else {
                continue;
            };
            if !wanted.contains(scene) {
                continue;
            }
            let path = self.root.path().join(&record.filename);
            if !path.is_file() {
                missing += 1;
                continue;
            }
            by_scene
                .entry(*scene)
                .or_default()
                .push((record.timestamp, path));
        }
        if missing > 0 {
            tracing::warn!(missing, "sample_data entries reference missing sweep files");
        }

        let mut found: Vec<RawSequence> = by_scene
            .into_iter()
            .map(|(id, mut frames)| {
                frames.sort_by_key(|(ts, _)| *ts);
                RawSequence {
                    id,
                    frames: frames.into_iter().map(|(_, p)| p).collect(),
                }
            })
            .collect();
        found.sort_by_key(|s| s.id);

        if found.is_empty() {
            return Err(PathError::UnexpectedLayout {
                role: "dataset_path",
                path: self.root.path().to_path_buf(),
                expected: format!(
                    "{LIDAR_CHANNEL} sweeps for at least one configured scene ({} scenes in metadata)",
                    scenes.len()
                ),
            }
            .into());
        }
        Ok(found)
    }

    fn read_scan(&self, path: &Path) -> Result<PointCloud, ForecastError> {
        read_packed_points(path, POINT_STRIDE)
    }
}
