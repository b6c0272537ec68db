//! Error types for the lidarcast-ml crate.

use lidarcast_core::{ConfigError, DatasetKind, SelectorError};
use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for preprocessing, training and evaluation.
#[derive(Debug, Error)]
pub enum ForecastError {
    /// `InvalidDataset` / `InvalidModel`.
    #[error(transparent)]
    Selector(#[from] SelectorError),

    #[error(transparent)]
    Path(#[from] PathError),

    #[error("processed data at {path} does not match dataset '{dataset}': {reason}")]
    DatasetMismatch {
        dataset: DatasetKind,
        path: PathBuf,
        reason: String,
    },

    #[error(transparent)]
    CheckpointLoad(#[from] CheckpointLoadError),

    #[error("Scan error in {path}: {message}")]
    Scan { path: PathBuf, message: String },

    #[error("Training error: {0}")]
    Training(String),

    #[error("Evaluation error: {0}")]
    Evaluation(String),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("Encoding error: {0}")]
    Encoding(#[from] bincode::Error),
}

impl ForecastError {
    pub fn mismatch(dataset: DatasetKind, path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::DatasetMismatch {
            dataset,
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn scan(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Scan {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn training(msg: impl Into<String>) -> Self {
        Self::Training(msg.into())
    }

    pub fn evaluation(msg: impl Into<String>) -> Self {
        Self::Evaluation(msg.into())
    }
}

/// A path argument that failed validation.
///
/// `NotFound` and `UnexpectedLayout` are kept apart: the first means the path
/// is wrong, the second that it points at the wrong kind of data.
#[derive(Debug, Error)]
pub enum PathError {
    #[error("{role} does not exist: {path}")]
    NotFound { role: &'static str, path: PathBuf },

    #[error("{role} is not a directory: {path}")]
    NotADirectory { role: &'static str, path: PathBuf },

    #[error("{role} is not readable: {path}: {source}")]
    NotReadable {
        role: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("{role} cannot be created or written: {path}: {source}")]
    NotWritable {
        role: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("{role} exists but is not in the expected format: {path}: {expected}")]
    UnexpectedLayout {
        role: &'static str,
        path: PathBuf,
        expected: String,
    },
}

/// Failures to obtain usable weights from a checkpoint file.
#[derive(Debug, Error)]
pub enum CheckpointLoadError {
    #[error("checkpoint does not exist: {path}")]
    Missing { path: PathBuf },

    #[error("checkpoint could not be read: {path}: {reason}")]
    Unreadable { path: PathBuf, reason: String },

    #[error("checkpoint {path} is incompatible: {reason}")]
    Incompatible { path: PathBuf, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_selector_errors_pass_through() {
        let err: ForecastError = SelectorError::InvalidDataset {
            value: "waymo".into(),
        }
        .into();
        assert_eq!(
            err.to_string(),
            "invalid dataset 'waymo': expected one of kitti, nuscenes"
        );
    }

    #[test]
    fn test_path_errors_name_the_argument() {
        let err = PathError::NotFound {
            role: "dataset_path",
            path: PathBuf::from("./raw_kitti"),
        };
        assert_eq!(err.to_string(), "dataset_path does not exist: ./raw_kitti");
    }

    #[test]
    fn test_incompatible_checkpoint_is_distinct() {
        let err: ForecastError = CheckpointLoadError::Incompatible {
            path: PathBuf::from("m.ckpt"),
            reason: "written for model1".into(),
        }
        .into();
        assert!(matches!(
            err,
            ForecastError::CheckpointLoad(CheckpointLoadError::Incompatible { .. })
        ));
    }
}
