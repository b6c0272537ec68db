//! Training infrastructure.

pub mod callbacks;
pub mod checkpoint;
pub mod experiment;
pub mod metrics;
pub mod optimizer;
pub mod reproducibility;
pub mod runner;

pub use checkpoint::{CheckpointEntry, CheckpointFile, CheckpointManager, CheckpointTarget};
pub use experiment::{ExperimentRegistry, TrainingExperiment, TrainingStatus};
pub use metrics::TrainingMetrics;
pub use runner::{TrainingReport, TrainingRunner};
