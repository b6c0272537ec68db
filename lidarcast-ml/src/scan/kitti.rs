//! KITTI odometry velodyne scans.
//!
//! Layout: `<root>/sequences/<NN>/velodyne/<frame>.bin`, four `f32` per point.

use super::{PointCloud, RawSequence, ScanSource, read_packed_points};
use crate::error::{ForecastError, PathError};
use crate::paths::RawDatasetDir;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

const POINT_STRIDE: usize = 4;

pub struct KittiSource {
    root: RawDatasetDir,
}

impl KittiSource {
    pub fn new(root: RawDatasetDir) -> Self {
        Self { root }
    }

    fn velodyne_dir(&self, sequence: u32) -> PathBuf {
        self.root
            .path()
            .join("sequences")
            .join(format!("{sequence:02}"))
            .join("velodyne")
    }
}

impl ScanSource for KittiSource {
    fn sequences(&self, wanted: &[u32]) -> Result<Vec<RawSequence>, ForecastError> {
        let mut found = Vec::new();
        for &id in wanted {
            let dir = self.velodyne_dir(id);
            if !dir.is_dir() {
                tracing::debug!(sequence = id, "sequence not present, skipping");
                continue;
            }
            let frames = list_scans(&dir)?;
            if frames.is_empty() {
                tracing::warn!(sequence = id, dir = %dir.display(), "sequence has no scans");
                continue;
            }
            found.push(RawSequence { id, frames });
        }

        if found.is_empty() {
            return Err(PathError::UnexpectedLayout {
                role: "dataset_path",
                path: self.root.path().to_path_buf(),
                expected: "sequences/<NN>/velodyne/*.bin for at least one configured sequence"
                    .into(),
            }
            .into());
        }
        Ok(found)
    }

    fn read_scan(&self, path: &Path) -> Result<PointCloud, ForecastError> {
        read_packed_points(path, POINT_STRIDE)
    }
}

/// `*.bin` files directly inside `dir`, sorted by name.
fn list_scans(dir: &Path) -> Result<Vec<PathBuf>, ForecastError> {
    let mut frames = Vec::new();
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1) {
        let entry = entry.map_err(|e| ForecastError::Io(e.into()))?;
        let path = entry.path();
        if entry.file_type().is_file() && path.extension().is_some_and(|ext| ext == "bin") {
            frames.push(path.to_path_buf());
        }
    }
    frames.sort();
    Ok(frames)
}
