//! Sliding past/future windows over processed sequences.

use super::manifest::ProcessedManifest;
use super::preprocess::{RANGE_DIR, XYZ_DIR, channel_dir};
use crate::error::ForecastError;
use crate::paths::ProcessedDir;
use crate::tensor_io::{FRAME_EXTENSION, read_tensor};
use lidarcast_core::config::SplitConfig;
use lidarcast_core::{DatasetKind, SequenceSet};
use ndarray::{Array2, Array3, Array4, Axis, s};
use rand::Rng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Channels of a sample frame: range followed by x, y, z.
pub const SAMPLE_CHANNELS: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Split {
    Train,
    Val,
    Test,
}

impl Split {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Train => "train",
            Self::Val => "val",
            Self::Test => "test",
        }
    }

    pub fn sequences<'a>(&self, splits: &'a SplitConfig) -> &'a SequenceSet {
        match self {
            Self::Train => &splits.train,
            Self::Val => &splits.val,
            Self::Test => &splits.test,
        }
    }
}

impl fmt::Display for Split {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One training example.
#[derive(Debug, Clone)]
pub struct Sample {
    /// `[n_past, 4, H, W]`, oldest frame first.
    pub past: Array4<f32>,
    /// `[n_future, 4, H, W]`.
    pub future: Array4<f32>,
    pub sequence: u32,
    /// Scan index of the last past frame.
    pub anchor: usize,
}

/// Window counts and step sizes of a dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowSpec {
    pub n_past: usize,
    pub n_future: usize,
}

impl WindowSpec {
    /// Samples a sequence of `frames` scans yields.
    pub fn samples_in(&self, frames: usize) -> usize {
        (frames + 1).saturating_sub(self.n_past + self.n_future)
    }

    /// Scan index the `k`-th sample of a sequence is anchored at.
    pub fn anchor(&self, k: usize) -> usize {
        self.n_past + k - 1
    }
}

/// Lazily loaded samples of one split.
#[derive(Debug, Clone)]
pub struct ForecastDataset {
    root: PathBuf,
    kind: DatasetKind,
    split: Split,
    window: WindowSpec,
    height: usize,
    width: usize,
    /// `(sequence, anchor)` per global sample index.
    index: Vec<(u32, usize)>,
}

impl ForecastDataset {
    /// Index the samples of `split`.
    ///
    /// Sequences listed in the split but absent from the manifest are
    /// skipped with a warning; a split without any sample is an error.
    pub fn open(
        dir: &ProcessedDir,
        manifest: &ProcessedManifest,
        splits: &SplitConfig,
        split: Split,
        window: WindowSpec,
    ) -> Result<Self, ForecastError> {
        let kind = manifest.dataset;
        let mut index = Vec::new();
        let mut missing = Vec::new();

        for id in split.sequences(splits).ids() {
            let Some(entry) = manifest.sequence(id) else {
                missing.push(id);
                continue;
            };
            for channel in [RANGE_DIR, XYZ_DIR] {
                let found = count_frames(&channel_dir(dir.path(), kind, id, channel))?;
                if found != entry.frames {
                    return Err(ForecastError::mismatch(
                        kind,
                        dir.path(),
                        format!(
                            "sequence {} has {found} {channel} frames, manifest lists {}",
                            entry.dir, entry.frames
                        ),
                    ));
                }
            }
            let samples = window.samples_in(entry.frames);
            if samples == 0 {
                tracing::warn!(
                    sequence = id,
                    frames = entry.frames,
                    "sequence too short for one window"
                );
            }
            index.extend((0..samples).map(|k| (id, window.anchor(k))));
        }

        if !missing.is_empty() {
            tracing::warn!(
                split = %split,
                count = missing.len(),
                first = missing[0],
                "split sequences not found in processed data"
            );
        }
        if index.is_empty() {
            return Err(ForecastError::mismatch(
                kind,
                dir.path(),
                format!(
                    "{split} split has no sample of {} past and {} future frames",
                    window.n_past, window.n_future
                ),
            ));
        }
        tracing::debug!(split = %split, samples = index.len(), "dataset indexed");

        Ok(Self {
            root: dir.path().to_path_buf(),
            kind,
            split,
            window,
            height: manifest.height,
            width: manifest.width,
            index,
        })
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn split(&self) -> Split {
        self.split
    }

    pub fn dataset(&self) -> DatasetKind {
        self.kind
    }

    /// `(height, width)` of the range images.
    pub fn image_size(&self) -> (usize, usize) {
        (self.height, self.width)
    }

    pub fn window(&self) -> WindowSpec {
        self.window
    }

    /// `(sequence, anchor)` of sample `i`.
    pub fn locate(&self, i: usize) -> Option<(u32, usize)> {
        self.index.get(i).copied()
    }

    /// Load sample `i`.
    pub fn get(&self, i: usize) -> Result<Sample, ForecastError> {
        let (sequence, anchor) = self.locate(i).ok_or_else(|| {
            ForecastError::training(format!(
                "sample {i} out of range for {} split of {} samples",
                self.split,
                self.len()
            ))
        })?;
        let WindowSpec { n_past, n_future } = self.window;
        let past = self.stack(sequence, anchor + 1 - n_past..=anchor)?;
        let future = self.stack(sequence, anchor + 1..=anchor + n_future)?;
        Ok(Sample {
            past,
            future,
            sequence,
            anchor,
        })
    }

    /// Batches of sample indices; shuffled when `rng` is given.
    pub fn batches<R: Rng>(&self, batch_size: usize, rng: Option<&mut R>) -> BatchIterator<'_> {
        let mut order: Vec<usize> = (0..self.len()).collect();
        if let Some(rng) = rng {
            order.shuffle(rng);
        }
        BatchIterator::new(self, order, batch_size)
    }

    fn stack(
        &self,
        sequence: u32,
        frames: std::ops::RangeInclusive<usize>,
    ) -> Result<Array4<f32>, ForecastError> {
        let steps = frames.clone().count();
        let mut out = Array4::zeros((steps, SAMPLE_CHANNELS, self.height, self.width));
        for (t, frame) in frames.enumerate() {
            let name = format!("{frame:06}.{FRAME_EXTENSION}");
            let range_path = channel_dir(&self.root, self.kind, sequence, RANGE_DIR).join(&name);
            let xyz_path = channel_dir(&self.root, self.kind, sequence, XYZ_DIR).join(&name);
            let range: Array2<f32> = read_tensor(&range_path)?;
            let xyz: Array3<f32> = read_tensor(&xyz_path)?;
            if range.dim() != (self.height, self.width)
                || xyz.dim() != (3, self.height, self.width)
            {
                return Err(ForecastError::mismatch(
                    self.kind,
                    &self.root,
                    format!("frame {} has an unexpected shape", range_path.display()),
                ));
            }
            let mut slot = out.index_axis_mut(Axis(0), t);
            slot.index_axis_mut(Axis(0), 0).assign(&range);
            slot.slice_mut(s![1..4, .., ..]).assign(&xyz);
        }
        Ok(out)
    }
}

fn count_frames(dir: &Path) -> Result<usize, ForecastError> {
    if !dir.is_dir() {
        return Ok(0);
    }
    let mut count = 0;
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.extension().is_some_and(|e| e == FRAME_EXTENSION) {
            count += 1;
        }
    }
    Ok(count)
}

/// Iterator over batches of a [`ForecastDataset`].
pub struct BatchIterator<'a> {
    dataset: &'a ForecastDataset,
    order: Vec<usize>,
    batch_size: usize,
    current_pos: usize,
}

impl<'a> BatchIterator<'a> {
    fn new(dataset: &'a ForecastDataset, order: Vec<usize>, batch_size: usize) -> Self {
        Self {
            dataset,
            order,
            batch_size: batch_size.max(1),
            current_pos: 0,
        }
    }

    /// Number of batches this iterator yields in total.
    pub fn total(&self) -> usize {
        self.order.len().div_ceil(self.batch_size)
    }
}

impl Iterator for BatchIterator<'_> {
    type Item = Result<Vec<Sample>, ForecastError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.current_pos >= self.order.len() {
            return None;
        }
        let end = (self.current_pos + self.batch_size).min(self.order.len());
        let batch = self.order[self.current_pos..end]
            .iter()
            .map(|&i| self.dataset.get(i))
            .collect();
        self.current_pos = end;
        Some(batch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::manifest::SequenceEntry;
    use crate::tensor_io::write_tensor;
    use lidarcast_core::DatasetProfile;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use tempfile::TempDir;

    const H: usize = 2;
    const W: usize = 3;

    /// Processed KITTI tree whose frame `i` of sequence `seq` has range
    /// `seq * 100 + i` everywhere.
    fn fixture(root: &Path, sequences: &[(u32, usize)]) -> ProcessedManifest {
        let mut profile = DatasetProfile::kitti();
        profile.height = H;
        profile.width = W;
        let mut manifest = ProcessedManifest::new(DatasetKind::Kitti, &profile);
        for &(id, frames) in sequences {
            for i in 0..frames {
                let name = format!("{i:06}.bin");
                let value = (id * 100) as f32 + i as f32;
                write_tensor(
                    &channel_dir(root, DatasetKind::Kitti, id, RANGE_DIR).join(&name),
                    &Array2::<f32>::from_elem((H, W), value),
                )
                .unwrap();
                write_tensor(
                    &channel_dir(root, DatasetKind::Kitti, id, XYZ_DIR).join(&name),
                    &Array3::<f32>::from_elem((3, H, W), -value),
                )
                .unwrap();
            }
            manifest.sequences.push(SequenceEntry {
                id,
                dir: DatasetKind::Kitti.sequence_dir(id),
                frames,
            });
        }
        manifest.save(root).unwrap();
        manifest
    }

    fn splits(train: Vec<u32>) -> SplitConfig {
        SplitConfig {
            train: SequenceSet::List(train),
            val: SequenceSet::List(vec![]),
            test: SequenceSet::List(vec![]),
        }
    }

    #[test]
    fn test_window_counts() {
        let w = WindowSpec {
            n_past: 5,
            n_future: 5,
        };
        assert_eq!(w.samples_in(9), 0);
        assert_eq!(w.samples_in(10), 1);
        assert_eq!(w.samples_in(12), 3);
        assert_eq!(w.anchor(0), 4);
        assert_eq!(w.anchor(2), 6);
    }

    #[test]
    fn test_sample_frames_follow_anchor() {
        let tmp = TempDir::new().unwrap();
        let manifest = fixture(tmp.path(), &[(0, 6), (3, 4)]);
        let dir = ProcessedDir::open(tmp.path()).unwrap();
        let window = WindowSpec {
            n_past: 2,
            n_future: 2,
        };

        let ds = ForecastDataset::open(&dir, &manifest, &splits(vec![0, 3]), Split::Train, window)
            .unwrap();
        // 6 - 4 + 1 = 3 and 4 - 4 + 1 = 1
        assert_eq!(ds.len(), 4);
        assert_eq!(ds.locate(3), Some((3, 1)));

        let sample = ds.get(1).unwrap();
        assert_eq!(sample.anchor, 2);
        assert_eq!(sample.past.shape(), &[2, 4, H, W]);
        assert_eq!(sample.past[[0, 0, 0, 0]], 1.0);
        assert_eq!(sample.past[[1, 0, 1, 2]], 2.0);
        assert_eq!(sample.past[[1, 3, 0, 0]], -2.0);
        assert_eq!(sample.future[[0, 0, 0, 0]], 3.0);
        assert_eq!(sample.future[[1, 0, 0, 0]], 4.0);

        let last = ds.get(3).unwrap();
        assert_eq!(last.past[[0, 0, 0, 0]], 300.0);
        assert_eq!(last.future[[1, 0, 0, 0]], 303.0);
    }

    #[test]
    fn test_missing_sequences_are_skipped() {
        let tmp = TempDir::new().unwrap();
        let manifest = fixture(tmp.path(), &[(0, 5)]);
        let dir = ProcessedDir::open(tmp.path()).unwrap();
        let window = WindowSpec {
            n_past: 2,
            n_future: 1,
        };

        let ds =
            ForecastDataset::open(&dir, &manifest, &splits(vec![0, 1, 2]), Split::Train, window)
                .unwrap();
        assert_eq!(ds.len(), 3);
    }

    #[test]
    fn test_split_without_samples_is_mismatch() {
        let tmp = TempDir::new().unwrap();
        let manifest = fixture(tmp.path(), &[(0, 3)]);
        let dir = ProcessedDir::open(tmp.path()).unwrap();
        let window = WindowSpec {
            n_past: 2,
            n_future: 2,
        };

        let err = ForecastDataset::open(&dir, &manifest, &splits(vec![0]), Split::Train, window)
            .unwrap_err();
        assert!(matches!(err, ForecastError::DatasetMismatch { .. }));
        assert!(err.to_string().contains("train split has no sample"));
    }

    #[test]
    fn test_frame_count_disagreement_is_mismatch() {
        let tmp = TempDir::new().unwrap();
        let manifest = fixture(tmp.path(), &[(0, 4)]);
        std::fs::remove_file(
            channel_dir(tmp.path(), DatasetKind::Kitti, 0, XYZ_DIR).join("000003.bin"),
        )
        .unwrap();
        let dir = ProcessedDir::open(tmp.path()).unwrap();
        let window = WindowSpec {
            n_past: 1,
            n_future: 1,
        };

        let err = ForecastDataset::open(&dir, &manifest, &splits(vec![0]), Split::Train, window)
            .unwrap_err();
        assert!(err.to_string().contains("3 xyz frames"));
    }

    #[test]
    fn test_shuffled_batches_cover_every_sample() {
        let tmp = TempDir::new().unwrap();
        let manifest = fixture(tmp.path(), &[(0, 8)]);
        let dir = ProcessedDir::open(tmp.path()).unwrap();
        let window = WindowSpec {
            n_past: 1,
            n_future: 1,
        };
        let ds = ForecastDataset::open(&dir, &manifest, &splits(vec![0]), Split::Train, window)
            .unwrap();

        let mut rng = StdRng::seed_from_u64(7);
        let batches = ds.batches(3, Some(&mut rng));
        assert_eq!(batches.total(), 3);
        let mut anchors: Vec<usize> = batches
            .map(|b| b.unwrap())
            .flat_map(|b| b.into_iter().map(|s| s.anchor))
            .collect();
        anchors.sort_unstable();
        assert_eq!(anchors, (0..7).collect::<Vec<_>>());
    }
}
