//! # lidarcast-ml
//!
//! LiDAR range-image forecasting: raw scan readers, spherical projection,
//! preprocessing into range-image frames, windowed datasets, the two
//! forecasting models, training with checkpoints and experiment tracking,
//! and evaluation.
//!
//! The two entry points are [`preprocess`] and [`run`].

pub mod data;
pub mod error;
pub mod eval;
pub mod models;
pub mod paths;
pub mod projection;
pub mod run;
pub mod scan;
pub mod tensor_io;
pub mod training;

pub use data::{PreprocessRequest, PreprocessSummary, preprocess};
pub use error::{CheckpointLoadError, ForecastError, PathError};
pub use eval::EvaluationReport;
pub use run::{RunOutcome, RunRequest, run};
pub use training::TrainingReport;
