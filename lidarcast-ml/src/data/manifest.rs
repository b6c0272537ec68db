//! Processed dataset manifest.
//!
//! Written last by the preprocessor; its presence marks a complete output
//! directory and its contents are what training checks the selector and
//! profile against.

use crate::error::ForecastError;
use crate::paths::ProcessedDir;
use chrono::{DateTime, Utc};
use lidarcast_core::{DatasetKind, DatasetProfile};
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const MANIFEST_FILE: &str = "manifest.json";
pub const MANIFEST_VERSION: u32 = 1;

/// Channel order used by [`ChannelStats`].
pub const CHANNELS: [&str; 5] = ["range", "x", "y", "z", "intensity"];

/// One processed sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SequenceEntry {
    pub id: u32,
    /// Directory name under the processed root.
    pub dir: String,
    pub frames: usize,
}

/// Mean and standard deviation per channel over occupied pixels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelStats {
    pub mean: [f64; 5],
    pub std: [f64; 5],
    pub pixels: u64,
}

/// Streaming accumulator for [`ChannelStats`].
#[derive(Debug, Clone, Default)]
pub struct StatsAccumulator {
    sum: [f64; 5],
    sum_sq: [f64; 5],
    count: u64,
}

impl StatsAccumulator {
    /// Add one occupied pixel, channels in [`CHANNELS`] order.
    pub fn push(&mut self, values: [f32; 5]) {
        for (i, v) in values.iter().enumerate() {
            let v = f64::from(*v);
            self.sum[i] += v;
            self.sum_sq[i] += v * v;
        }
        self.count += 1;
    }

    pub fn finish(&self) -> ChannelStats {
        let mut mean = [0.0; 5];
        let mut std = [0.0; 5];
        if self.count > 0 {
            let n = self.count as f64;
            for i in 0..5 {
                mean[i] = self.sum[i] / n;
                std[i] = (self.sum_sq[i] / n - mean[i] * mean[i]).max(0.0).sqrt();
            }
        }
        ChannelStats {
            mean,
            std,
            pixels: self.count,
        }
    }
}

/// Description of a processed dataset directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessedManifest {
    pub format_version: u32,
    pub dataset: DatasetKind,
    pub height: usize,
    pub width: usize,
    pub fov_up: f32,
    pub fov_down: f32,
    pub min_range: f32,
    pub max_range: f32,
    pub sequences: Vec<SequenceEntry>,
    pub stats: ChannelStats,
    pub created_at: DateTime<Utc>,
    pub tool_version: String,
}

impl ProcessedManifest {
    pub fn new(dataset: DatasetKind, profile: &DatasetProfile) -> Self {
        Self {
            format_version: MANIFEST_VERSION,
            dataset,
            height: profile.height,
            width: profile.width,
            fov_up: profile.fov_up,
            fov_down: profile.fov_down,
            min_range: profile.min_range,
            max_range: profile.max_range,
            sequences: Vec::new(),
            stats: StatsAccumulator::default().finish(),
            created_at: Utc::now(),
            tool_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    pub fn total_frames(&self) -> usize {
        self.sequences.iter().map(|s| s.frames).sum()
    }

    pub fn sequence(&self, id: u32) -> Option<&SequenceEntry> {
        self.sequences.iter().find(|s| s.id == id)
    }

    pub fn save(&self, root: &Path) -> Result<(), ForecastError> {
        lidarcast_core::persistence::atomic_write_json(&root.join(MANIFEST_FILE), self)?;
        Ok(())
    }

    /// Load the manifest of a processed directory, reading it as data for
    /// `expected`. A missing or unparsable manifest is a layout mismatch.
    pub fn load(dir: &ProcessedDir, expected: DatasetKind) -> Result<Self, ForecastError> {
        let path = dir.path().join(MANIFEST_FILE);
        let manifest: Option<Self> = lidarcast_core::persistence::load_json(&path).map_err(|e| {
            ForecastError::mismatch(
                expected,
                dir.path(),
                format!("unreadable {MANIFEST_FILE}: {e}"),
            )
        })?;
        let manifest = manifest.ok_or_else(|| {
            ForecastError::mismatch(
                expected,
                dir.path(),
                format!("no {MANIFEST_FILE}; run `lidarcast preprocess` first"),
            )
        })?;
        if manifest.format_version != MANIFEST_VERSION {
            return Err(ForecastError::mismatch(
                expected,
                dir.path(),
                format!(
                    "manifest format {} is not supported (expected {MANIFEST_VERSION})",
                    manifest.format_version
                ),
            ));
        }
        Ok(manifest)
    }

    /// Check the manifest against the selected dataset and its profile.
    pub fn ensure_matches(
        &self,
        dir: &ProcessedDir,
        kind: DatasetKind,
        profile: &DatasetProfile,
    ) -> Result<(), ForecastError> {
        if self.dataset != kind {
            return Err(ForecastError::mismatch(
                kind,
                dir.path(),
                format!("directory holds {} data", self.dataset),
            ));
        }
        if self.height != profile.height || self.width != profile.width {
            return Err(ForecastError::mismatch(
                kind,
                dir.path(),
                format!(
                    "range images are {}x{}, configuration expects {}x{}",
                    self.height, self.width, profile.height, profile.width
                ),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use tempfile::TempDir;

    #[test]
    fn test_stats_accumulator() {
        let mut acc = StatsAccumulator::default();
        acc.push([2.0, 1.0, 0.0, 0.0, 0.0]);
        acc.push([4.0, 3.0, 0.0, 0.0, 1.0]);
        let stats = acc.finish();
        assert_eq!(stats.pixels, 2);
        assert_relative_eq!(stats.mean[0], 3.0);
        assert_relative_eq!(stats.std[0], 1.0);
        assert_relative_eq!(stats.mean[4], 0.5);
    }

    #[test]
    fn test_empty_stats_are_zero() {
        let stats = StatsAccumulator::default().finish();
        assert_eq!(stats.mean, [0.0; 5]);
        assert_eq!(stats.pixels, 0);
    }

    #[test]
    fn test_missing_manifest_is_mismatch() {
        let tmp = TempDir::new().unwrap();
        let dir = ProcessedDir::open(tmp.path()).unwrap();
        let err = ProcessedManifest::load(&dir, DatasetKind::Kitti).unwrap_err();
        assert!(matches!(err, ForecastError::DatasetMismatch { .. }));
    }

    #[test]
    fn test_corrupt_manifest_is_mismatch() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join(MANIFEST_FILE), "[]").unwrap();
        let dir = ProcessedDir::open(tmp.path()).unwrap();
        let err = ProcessedManifest::load(&dir, DatasetKind::Kitti).unwrap_err();
        assert!(err.to_string().contains("unreadable"));
    }

    #[test]
    fn test_dataset_and_shape_checks() {
        let tmp = TempDir::new().unwrap();
        let dir = ProcessedDir::open(tmp.path()).unwrap();
        let kitti = DatasetProfile::kitti();
        let manifest = ProcessedManifest::new(DatasetKind::Kitti, &kitti);
        manifest.save(tmp.path()).unwrap();

        let loaded = ProcessedManifest::load(&dir, DatasetKind::Kitti).unwrap();
        assert!(loaded.ensure_matches(&dir, DatasetKind::Kitti, &kitti).is_ok());

        let err = loaded
            .ensure_matches(&dir, DatasetKind::Nuscenes, &DatasetProfile::nuscenes())
            .unwrap_err();
        assert!(err.to_string().contains("holds kitti data"));

        let mut narrow = kitti.clone();
        narrow.width = 1024;
        let err = loaded
            .ensure_matches(&dir, DatasetKind::Kitti, &narrow)
            .unwrap_err();
        assert!(err.to_string().contains("64x2048"));
    }
}
