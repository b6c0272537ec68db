//! # lidarcast-core
//!
//! Shared foundation for the lidarcast workspace: layered configuration,
//! dataset/model selectors, configuration errors and atomic persistence
//! helpers.

pub mod config;
pub mod error;
pub mod persistence;
pub mod selector;

pub use config::{DatasetProfile, ForecastConfig, ModelConfig, SequenceSet, TrainingConfig};
pub use error::{ConfigError, SelectorError};
pub use selector::{DatasetKind, ModelKind};
