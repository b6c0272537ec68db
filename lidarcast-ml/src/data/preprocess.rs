//! Raw scans to range-image frames.
//!
//! Output layout under the processed root:
//!
//! ```text
//! manifest.json
//! <seq>/processed/range/<frame:06>.bin      [H, W]
//! <seq>/processed/xyz/<frame:06>.bin        [3, H, W]
//! <seq>/processed/intensity/<frame:06>.bin  [H, W]
//! ```

use super::manifest::{MANIFEST_FILE, ProcessedManifest, SequenceEntry, StatsAccumulator};
use crate::error::ForecastError;
use crate::paths::{OutputDir, RawDatasetDir};
use crate::projection::{Projector, RangeImage};
use crate::scan::{self, RawSequence, ScanSource};
use crate::tensor_io::{FRAME_EXTENSION, write_tensor};
use lidarcast_core::{DatasetKind, ForecastConfig};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Instant;

/// Channel subdirectories of a processed sequence.
pub const RANGE_DIR: &str = "range";
pub const XYZ_DIR: &str = "xyz";
pub const INTENSITY_DIR: &str = "intensity";

/// Arguments of the `preprocess` entry point.
#[derive(Debug, Clone)]
pub struct PreprocessRequest {
    pub dataset: DatasetKind,
    pub dataset_path: PathBuf,
    pub processed_path: PathBuf,
}

/// What a preprocessing run produced.
#[derive(Debug, Clone, Serialize)]
pub struct PreprocessSummary {
    pub dataset: DatasetKind,
    pub output: PathBuf,
    pub sequences: usize,
    pub frames: usize,
    pub dropped_points: usize,
    pub elapsed_secs: f64,
}

/// `<root>/<seq>/processed/<channel>`.
pub fn channel_dir(root: &Path, kind: DatasetKind, sequence: u32, channel: &str) -> PathBuf {
    root.join(kind.sequence_dir(sequence))
        .join("processed")
        .join(channel)
}

fn frame_name(index: usize) -> String {
    format!("{index:06}.{FRAME_EXTENSION}")
}

/// Convert a raw dataset into range-image frames.
///
/// Paths are validated before any scan is read. If this run created
/// `processed_path` and fails part-way, the directory is removed again.
pub fn preprocess(
    request: &PreprocessRequest,
    config: &ForecastConfig,
) -> Result<PreprocessSummary, ForecastError> {
    let started = Instant::now();
    let raw = RawDatasetDir::open(&request.dataset_path)?;
    let output = OutputDir::acquire(&request.processed_path)?;
    let profile = config.profile(request.dataset);

    let source = scan::open_source(request.dataset, &raw, config);
    let wanted = profile.splits.all_ids();
    let sequences = source.sequences(&wanted)?;
    tracing::info!(
        dataset = %request.dataset,
        sequences = sequences.len(),
        height = profile.height,
        width = profile.width,
        "preprocessing raw scans"
    );

    clear_previous_output(output.path(), request.dataset, &sequences)?;

    let projector = Projector::new(profile);
    let mut manifest = ProcessedManifest::new(request.dataset, profile);
    let mut stats = StatsAccumulator::default();
    let mut dropped_points = 0;

    for sequence in &sequences {
        let mut frames = 0;
        for (index, frame) in sequence.frames.iter().enumerate() {
            dropped_points += convert_frame(
                source.as_ref(),
                &projector,
                frame,
                output.path(),
                request.dataset,
                sequence.id,
                index,
                &mut stats,
            )?;
            frames += 1;
        }
        tracing::info!(sequence = sequence.id, frames, "sequence converted");
        manifest.sequences.push(SequenceEntry {
            id: sequence.id,
            dir: request.dataset.sequence_dir(sequence.id),
            frames,
        });
    }

    manifest.stats = stats.finish();
    tracing::info!(
        mean_range = manifest.stats.mean[0],
        std_range = manifest.stats.std[0],
        "channel statistics"
    );
    manifest.save(output.path())?;

    let summary = PreprocessSummary {
        dataset: request.dataset,
        sequences: manifest.sequences.len(),
        frames: manifest.total_frames(),
        dropped_points,
        elapsed_secs: started.elapsed().as_secs_f64(),
        output: output.commit(),
    };
    tracing::info!(
        frames = summary.frames,
        dropped_points = summary.dropped_points,
        elapsed_secs = summary.elapsed_secs,
        output = %summary.output.display(),
        "preprocessing complete"
    );
    Ok(summary)
}

/// Remove what an earlier run left in `root`: the manifest first, then the
/// channel directories of every sequence it lists or this run rewrites.
///
/// Without a manifest the directory is rejected by `run`, so a rerun that
/// fails part-way never leaves old and new frames looking complete.
fn clear_previous_output(
    root: &Path,
    kind: DatasetKind,
    sequences: &[RawSequence],
) -> Result<(), ForecastError> {
    let manifest_path = root.join(MANIFEST_FILE);
    let mut stale: Vec<(DatasetKind, u32)> = sequences.iter().map(|s| (kind, s.id)).collect();
    match lidarcast_core::persistence::load_json::<ProcessedManifest>(&manifest_path) {
        Ok(Some(previous)) => {
            stale.extend(previous.sequences.iter().map(|s| (previous.dataset, s.id)));
        }
        Ok(None) => {}
        Err(e) => tracing::warn!(
            path = %manifest_path.display(),
            error = %e,
            "ignoring unreadable previous manifest"
        ),
    }
    if manifest_path.exists() {
        std::fs::remove_file(&manifest_path)?;
        tracing::info!(path = %root.display(), "replacing previous preprocessing output");
    }

    for (kind, id) in stale {
        for channel in [RANGE_DIR, XYZ_DIR, INTENSITY_DIR] {
            let dir = channel_dir(root, kind, id, channel);
            if dir.is_dir() {
                std::fs::remove_dir_all(&dir)?;
                tracing::debug!(dir = %dir.display(), "removed stale frames");
            }
        }
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn convert_frame(
    source: &dyn ScanSource,
    projector: &Projector,
    frame: &Path,
    root: &Path,
    kind: DatasetKind,
    sequence: u32,
    index: usize,
    stats: &mut StatsAccumulator,
) -> Result<usize, ForecastError> {
    let cloud = source.read_scan(frame)?;
    if cloud.is_empty() {
        tracing::warn!(frame = %frame.display(), "empty scan");
    }
    let projection = projector.project(&cloud);
    accumulate(&projection.image, stats);

    let name = frame_name(index);
    let image = &projection.image;
    let path = |channel| channel_dir(root, kind, sequence, channel).join(&name);
    write_tensor(&path(RANGE_DIR), &image.range)?;
    write_tensor(&path(XYZ_DIR), &image.xyz)?;
    write_tensor(&path(INTENSITY_DIR), &image.intensity)?;
    tracing::debug!(
        frame = %frame.display(),
        points = cloud.len(),
        occupied = image.occupied(),
        "frame projected"
    );
    Ok(projection.dropped)
}

fn accumulate(image: &RangeImage, stats: &mut StatsAccumulator) {
    for ((row, col), &r) in image.range.indexed_iter() {
        if r > 0.0 {
            stats.push([
                r,
                image.xyz[[0, row, col]],
                image.xyz[[1, row, col]],
                image.xyz[[2, row, col]],
                image.intensity[[row, col]],
            ]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PathError;
    use crate::scan::encode_points;
    use crate::tensor_io::read_tensor;
    use ndarray::{Array2, Array3};
    use tempfile::TempDir;

    fn small_config() -> ForecastConfig {
        let mut config = ForecastConfig::default();
        config.kitti.height = 4;
        config.kitti.width = 8;
        config
    }

    fn write_kitti(root: &Path, seq: &str, frames: usize) {
        let dir = root.join("sequences").join(seq).join("velodyne");
        std::fs::create_dir_all(&dir).unwrap();
        for i in 0..frames {
            let d = 10.0 + i as f32;
            let points = [[d, 0.0, 0.0, 0.2], [0.0, d, 0.0, 0.4], [0.2, 0.0, 0.0, 0.0]];
            std::fs::write(dir.join(format!("{i:06}.bin")), encode_points(&points, 4)).unwrap();
        }
    }

    #[test]
    fn test_preprocess_kitti_layout() {
        let tmp = TempDir::new().unwrap();
        let raw = tmp.path().join("raw_kitti");
        write_kitti(&raw, "00", 3);
        write_kitti(&raw, "08", 2);
        let out = tmp.path().join("out");

        let summary = preprocess(
            &PreprocessRequest {
                dataset: DatasetKind::Kitti,
                dataset_path: raw,
                processed_path: out.clone(),
            },
            &small_config(),
        )
        .unwrap();

        assert_eq!(summary.sequences, 2);
        assert_eq!(summary.frames, 5);
        assert_eq!(summary.dropped_points, 5);
        assert!(out.join(MANIFEST_FILE).is_file());

        let range_file = channel_dir(&out, DatasetKind::Kitti, 8, RANGE_DIR).join("000001.bin");
        let range: Array2<f32> = read_tensor(&range_file).unwrap();
        assert_eq!(range.shape(), &[4, 8]);
        assert_eq!(range.iter().filter(|r| **r > 0.0).count(), 2);

        let xyz_file = channel_dir(&out, DatasetKind::Kitti, 0, XYZ_DIR).join("000002.bin");
        let xyz: Array3<f32> = read_tensor(&xyz_file).unwrap();
        assert_eq!(xyz.shape(), &[3, 4, 8]);
    }

    fn count_bins(dir: &Path) -> usize {
        std::fs::read_dir(dir).unwrap().count()
    }

    #[test]
    fn test_rerun_with_fewer_frames_replaces_old_output() {
        let tmp = TempDir::new().unwrap();
        let raw = tmp.path().join("raw_kitti");
        let out = tmp.path().join("out");
        let request = PreprocessRequest {
            dataset: DatasetKind::Kitti,
            dataset_path: raw.clone(),
            processed_path: out.clone(),
        };
        write_kitti(&raw, "00", 6);
        preprocess(&request, &small_config()).unwrap();

        std::fs::remove_dir_all(&raw).unwrap();
        write_kitti(&raw, "00", 4);
        let summary = preprocess(&request, &small_config()).unwrap();

        assert_eq!(summary.frames, 4);
        for channel in [RANGE_DIR, XYZ_DIR, INTENSITY_DIR] {
            assert_eq!(count_bins(&channel_dir(&out, DatasetKind::Kitti, 0, channel)), 4);
        }
    }

    #[test]
    fn test_failed_rerun_leaves_no_manifest() {
        let tmp = TempDir::new().unwrap();
        let raw = tmp.path().join("raw_kitti");
        let out = tmp.path().join("out");
        let request = PreprocessRequest {
            dataset: DatasetKind::Kitti,
            dataset_path: raw.clone(),
            processed_path: out.clone(),
        };
        write_kitti(&raw, "00", 3);
        preprocess(&request, &small_config()).unwrap();

        std::fs::write(raw.join("sequences/00/velodyne/000002.bin"), [1u8; 7]).unwrap();
        let err = preprocess(&request, &small_config()).unwrap_err();

        assert!(matches!(err, ForecastError::Scan { .. }));
        assert!(out.is_dir());
        assert!(!out.join(MANIFEST_FILE).exists());
    }

    #[test]
    fn test_missing_raw_dir_touches_nothing() {
        let tmp = TempDir::new().unwrap();
        let out = tmp.path().join("out");
        let err = preprocess(
            &PreprocessRequest {
                dataset: DatasetKind::Kitti,
                dataset_path: tmp.path().join("raw_kitti"),
                processed_path: out.clone(),
            },
            &small_config(),
        )
        .unwrap_err();

        assert!(matches!(err, ForecastError::Path(PathError::NotFound { .. })));
        assert!(!out.exists());
    }

    #[test]
    fn test_wrong_layout_cleans_up_output() {
        let tmp = TempDir::new().unwrap();
        let raw = tmp.path().join("raw");
        std::fs::create_dir_all(&raw).unwrap();
        std::fs::write(raw.join("notes.txt"), b"hello").unwrap();
        let out = tmp.path().join("out");

        let err = preprocess(
            &PreprocessRequest {
                dataset: DatasetKind::Kitti,
                dataset_path: raw,
                processed_path: out.clone(),
            },
            &small_config(),
        )
        .unwrap_err();

        assert!(matches!(
            err,
            ForecastError::Path(PathError::UnexpectedLayout { .. })
        ));
        assert!(!out.exists());
    }

    #[test]
    fn test_corrupt_scan_aborts_and_cleans_up() {
        let tmp = TempDir::new().unwrap();
        let raw = tmp.path().join("raw");
        write_kitti(&raw, "00", 2);
        std::fs::write(raw.join("sequences/00/velodyne/000001.bin"), [1u8; 7]).unwrap();
        let out = tmp.path().join("out");

        let err = preprocess(
            &PreprocessRequest {
                dataset: DatasetKind::Kitti,
                dataset_path: raw,
                processed_path: out.clone(),
            },
            &small_config(),
        )
        .unwrap_err();

        assert!(matches!(err, ForecastError::Scan { .. }));
        assert!(!out.exists());
    }
}
