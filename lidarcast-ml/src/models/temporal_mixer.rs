//! `model2`: each future range is a learned mix of every observed range at
//! the same pixel.

use super::ForecastModel;
use crate::data::WindowSpec;
use lidarcast_core::ModelKind;
use ndarray::Array2;

#[derive(Debug, Clone)]
pub struct TemporalMixer {
    window: WindowSpec,
    scale: f32,
    /// `[n_future, n_past + 1]`.
    weights: Array2<f32>,
}

impl TemporalMixer {
    pub fn new(window: WindowSpec, scale: f32) -> Self {
        let mut weights = Array2::zeros((window.n_future, window.n_past + 1));
        if window.n_past > 0 {
            weights.column_mut(window.n_past - 1).fill(1.0);
        }
        Self {
            window,
            scale,
            weights,
        }
    }
}

impl ForecastModel for TemporalMixer {
    fn kind(&self) -> ModelKind {
        ModelKind::Model2
    }

    fn window(&self) -> WindowSpec {
        self.window
    }

    fn scale(&self) -> f32 {
        self.scale
    }

    fn params(&self) -> &Array2<f32> {
        &self.weights
    }

    fn params_mut(&mut self) -> &mut Array2<f32> {
        &mut self.weights
    }

    fn features(&self, past: &[f32], out: &mut [f32]) {
        let n = past.len();
        out[..n].copy_from_slice(past);
        out[n] = 1.0;
    }
}
