//! Closed selectors for the dataset family and the forecasting model.

use crate::error::SelectorError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Which raw dataset family a run works on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatasetKind {
    Kitti,
    Nuscenes,
}

impl DatasetKind {
    pub const ALL: [DatasetKind; 2] = [DatasetKind::Kitti, DatasetKind::Nuscenes];

    pub fn as_str(&self) -> &'static str {
        match self {
            DatasetKind::Kitti => "kitti",
            DatasetKind::Nuscenes => "nuscenes",
        }
    }

    /// Directory name of a processed sequence.
    ///
    /// KITTI odometry sequences are two digits (`08`), nuScenes scenes are
    /// numbered with three (`042`).
    pub fn sequence_dir(&self, sequence: u32) -> String {
        match self {
            DatasetKind::Kitti => format!("{sequence:02}"),
            DatasetKind::Nuscenes => format!("{sequence:03}"),
        }
    }
}

impl fmt::Display for DatasetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DatasetKind {
    type Err = SelectorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "kitti" => Ok(DatasetKind::Kitti),
            "nuscenes" => Ok(DatasetKind::Nuscenes),
            other => Err(SelectorError::InvalidDataset {
                value: other.to_string(),
            }),
        }
    }
}

/// Which forecasting architecture to instantiate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelKind {
    Model1,
    Model2,
}

impl ModelKind {
    pub const ALL: [ModelKind; 2] = [ModelKind::Model1, ModelKind::Model2];

    pub fn as_str(&self) -> &'static str {
        match self {
            ModelKind::Model1 => "model1",
            ModelKind::Model2 => "model2",
        }
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModelKind {
    type Err = SelectorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "model1" => Ok(ModelKind::Model1),
            "model2" => Ok(ModelKind::Model2),
            other => Err(SelectorError::InvalidModel {
                value: other.to_string(),
            }),
        }
    }
}
