//! Binary tensor files.
//!
//! Processed frames are `ndarray` arrays serialized with `bincode` and
//! written atomically.

use crate::error::ForecastError;
use lidarcast_core::persistence::atomic_write_with;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// Extension of processed frame files.
pub const FRAME_EXTENSION: &str = "bin";

/// Serialize `data` to `path` with bincode.
pub fn write_tensor<T: Serialize>(path: &Path, data: &T) -> Result<(), ForecastError> {
    atomic_write_with(path, |writer| {
        bincode::serialize_into(writer, data).map_err(std::io::Error::other)
    })?;
    Ok(())
}

/// Deserialize a bincode file.
pub fn read_tensor<T: DeserializeOwned>(path: &Path) -> Result<T, ForecastError> {
    let reader = BufReader::new(File::open(path)?);
    Ok(bincode::deserialize_from(reader)?)
}
