//! Raw LiDAR scan readers.
//!
//! Both supported datasets store each sweep as a packed little-endian `f32`
//! array; they differ in record width and in how sweeps are grouped into
//! sequences. A [`ScanSource`] hides the latter.

pub mod kitti;
pub mod nuscenes;

pub use kitti::KittiSource;
pub use nuscenes::NuScenesSource;

use crate::error::ForecastError;
use crate::paths::RawDatasetDir;
use lidarcast_core::{DatasetKind, ForecastConfig};
use std::path::{Path, PathBuf};

/// One LiDAR return.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub intensity: f32,
}

impl Point {
    pub fn range(&self) -> f32 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }
}

/// A single sweep.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PointCloud {
    pub points: Vec<Point>,
}

impl PointCloud {
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// Ordered sweeps of one driving sequence (KITTI sequence, nuScenes scene).
#[derive(Debug, Clone, PartialEq)]
pub struct RawSequence {
    pub id: u32,
    pub frames: Vec<PathBuf>,
}

/// Trait for enumerating and decoding raw scans of a dataset.
pub trait ScanSource {
    /// Sequences present on disk among `wanted`, frames in temporal order.
    fn sequences(&self, wanted: &[u32]) -> Result<Vec<RawSequence>, ForecastError>;

    /// Decode one sweep.
    fn read_scan(&self, path: &Path) -> Result<PointCloud, ForecastError>;
}

/// Build the scan source for a dataset family.
pub fn open_source(
    kind: DatasetKind,
    raw: &RawDatasetDir,
    config: &ForecastConfig,
) -> Box<dyn ScanSource> {
    match kind {
        DatasetKind::Kitti => Box::new(KittiSource::new(raw.clone())),
        DatasetKind::Nuscenes => Box::new(NuScenesSource::new(
            raw.clone(),
            config.nuscenes_source.clone(),
        )),
    }
}

/// Decode a packed `f32` point file with `stride` floats per record.
///
/// The first four floats of a record are x, y, z, intensity; any remaining
/// ones (the nuScenes ring index) are ignored.
pub fn read_packed_points(path: &Path, stride: usize) -> Result<PointCloud, ForecastError> {
    debug_assert!(stride >= 4);
    let bytes = std::fs::read(path)?;
    let record = stride * std::mem::size_of::<f32>();
    if bytes.len() % record != 0 {
        return Err(ForecastError::scan(
            path,
            format!(
                "file size {} is not a multiple of the {record}-byte point record",
                bytes.len()
            ),
        ));
    }

    let points = bytes
        .chunks_exact(record)
        .map(|rec| {
            let f = |i: usize| {
                let o = i * 4;
                f32::from_le_bytes([rec[o], rec[o + 1], rec[o + 2], rec[o + 3]])
            };
            Point {
                x: f(0),
                y: f(1),
                z: f(2),
                intensity: f(3),
            }
        })
        .collect();
    Ok(PointCloud { points })
}

/// Encode points as packed `f32` records (used to build fixtures).
#[cfg(test)]
pub(crate) fn encode_points(points: &[[f32; 4]], stride: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(points.len() * stride * 4);
    for p in points {
        for i in 0..stride {
            let v = p.get(i).copied().unwrap_or(0.0);
            out.extend_from_slice(&v.to_le_bytes());
        }
    }
    out
}
