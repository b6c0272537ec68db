//! Spherical projection of a sweep onto a range image.

use crate::scan::PointCloud;
use lidarcast_core::DatasetProfile;
use ndarray::{Array2, Array3};
use serde::{Deserialize, Serialize};
use std::f32::consts::PI;

/// Range image of one sweep. Empty pixels hold `0.0` in every channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RangeImage {
    /// `[H, W]` distance in metres.
    pub range: Array2<f32>,
    /// `[3, H, W]` cartesian coordinates of the pixel's point.
    pub xyz: Array3<f32>,
    /// `[H, W]` return intensity.
    pub intensity: Array2<f32>,
}

impl RangeImage {
    pub fn empty(height: usize, width: usize) -> Self {
        Self {
            range: Array2::zeros((height, width)),
            xyz: Array3::zeros((3, height, width)),
            intensity: Array2::zeros((height, width)),
        }
    }

    pub fn height(&self) -> usize {
        self.range.nrows()
    }

    pub fn width(&self) -> usize {
        self.range.ncols()
    }

    pub fn occupied(&self) -> usize {
        self.range.iter().filter(|r| **r > 0.0).count()
    }
}

/// Result of projecting one sweep.
#[derive(Debug, Clone)]
pub struct Projection {
    pub image: RangeImage,
    /// Points outside `[min_range, max_range]` or non-finite.
    pub dropped: usize,
}

/// Maps points to pixels for one sensor profile.
#[derive(Debug, Clone)]
pub struct Projector {
    height: usize,
    width: usize,
    fov_up: f32,
    fov_down: f32,
    min_range: f32,
    max_range: f32,
}

impl Projector {
    pub fn new(profile: &DatasetProfile) -> Self {
        Self {
            height: profile.height,
            width: profile.width,
            fov_up: profile.fov_up.to_radians(),
            fov_down: profile.fov_down.to_radians(),
            min_range: profile.min_range,
            max_range: profile.max_range,
        }
    }

    /// Pixel `(row, col)` of a point at `range` metres.
    ///
    /// Column 0 faces backwards and the forward direction lands in the
    /// middle column; row 0 is the top of the field of view. Points above or
    /// below the field of view are clamped to the border rows.
    pub fn pixel(&self, x: f32, y: f32, z: f32, range: f32) -> (usize, usize) {
        let yaw = -y.atan2(x);
        let pitch = (z / range).clamp(-1.0, 1.0).asin();
        let fov = self.fov_up - self.fov_down;

        let u = 0.5 * (yaw / PI + 1.0) * self.width as f32;
        let v = (1.0 - (pitch - self.fov_down) / fov) * self.height as f32;

        let col = (u.floor().max(0.0) as usize).min(self.width - 1);
        let row = (v.floor().max(0.0) as usize).min(self.height - 1);
        (row, col)
    }

    /// Project a sweep. When several points share a pixel the closest wins.
    pub fn project(&self, cloud: &PointCloud) -> Projection {
        let mut image = RangeImage::empty(self.height, self.width);
        let mut dropped = 0;

        for p in &cloud.points {
            let r = p.range();
            if !r.is_finite() || r < self.min_range || r > self.max_range {
                dropped += 1;
                continue;
            }
            let (row, col) = self.pixel(p.x, p.y, p.z, r);
            let current = image.range[[row, col]];
            if current > 0.0 && current <= r {
                continue;
            }
            image.range[[row, col]] = r;
            image.xyz[[0, row, col]] = p.x;
            image.xyz[[1, row, col]] = p.y;
            image.xyz[[2, row, col]] = p.z;
            image.intensity[[row, col]] = p.intensity;
        }

        Projection { image, dropped }
    }
}
