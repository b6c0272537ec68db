//! `model1`: each future range is an affine function of the last observed
//! range at the same pixel.

use super::ForecastModel;
use crate::data::WindowSpec;
use lidarcast_core::ModelKind;
use ndarray::Array2;

#[derive(Debug, Clone)]
pub struct LastFrameRegressor {
    window: WindowSpec,
    scale: f32,
    /// `[n_future, 2]`: gain and bias per step.
    weights: Array2<f32>,
}

impl LastFrameRegressor {
    pub fn new(window: WindowSpec, scale: f32) -> Self {
        let mut weights = Array2::zeros((window.n_future, 2));
        weights.column_mut(0).fill(1.0);
        Self {
            window,
            scale,
            weights,
        }
    }
}

impl ForecastModel for LastFrameRegressor {
    fn kind(&self) -> ModelKind {
        ModelKind::Model1
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
        out[0] = past.last().copied().unwrap_or(0.0);
        out[1] = 1.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::test_support::constant_sample;
    use approx::assert_relative_eq;

    #[test]
    fn test_gain_and_bias_apply_per_step() {
        let window = WindowSpec {
            n_past: 2,
            n_future: 2,
        };
        let mut model = LastFrameRegressor::new(window, 100.0);
        model
            .set_params(ndarray::arr2(&[[1.0, 0.05], [0.5, 0.0]]))
            .unwrap();

        let sample = constant_sample(window, &[30.0, 20.0, 0.0, 0.0], 1, 1);
        let out = model.predict(sample.past.view());
        assert_relative_eq!(out[[0, 0, 0, 0]], 25.0, epsilon = 1e-4);
        assert_relative_eq!(out[[1, 0, 0, 0]], 10.0, epsilon = 1e-4);
    }

    #[test]
    fn test_negative_forecast_is_clamped() {
        let window = WindowSpec {
            n_past: 1,
            n_future: 1,
        };
        let mut model = LastFrameRegressor::new(window, 50.0);
        model.set_params(ndarray::arr2(&[[1.0, -1.0]])).unwrap();
        let sample = constant_sample(window, &[10.0, 10.0], 1, 1);
        assert_eq!(model.predict(sample.past.view())[[0, 0, 0, 0]], 0.0);
    }
}
