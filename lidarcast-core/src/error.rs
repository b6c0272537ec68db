//! Error types for configuration and selector parsing.
//!
//! Uses `thiserror` with structured variants; the ML crate wraps these in
//! its own `ForecastError`.

use std::path::PathBuf;

/// A selector string outside its closed set of values.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SelectorError {
    #[error("invalid dataset '{value}': expected one of kitti, nuscenes")]
    InvalidDataset { value: String },

    #[error("invalid model '{value}': expected one of model1, model2")]
    InvalidModel { value: String },
}

/// Errors from the configuration system.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("Invalid configuration: {message}")]
    Invalid { message: String },

    #[error("Configuration parse error: {message}")]
    ParseError { message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ConfigError {
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid {
            message: message.into(),
        }
    }
}

impl From<Box<figment::Error>> for ConfigError {
    fn from(err: Box<figment::Error>) -> Self {
        Self::ParseError {
            message: err.to_string(),
        }
    }
}
