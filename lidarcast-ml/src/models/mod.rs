//! Range-image forecasters.
//!
//! Both variants are per-pixel linear regressors on the normalised range
//! channel. They share the prediction and loss code through
//! [`ForecastModel`] and differ only in the features they read from the
//! observed frames and in their parameter shape.

pub mod last_frame;
pub mod temporal_mixer;

pub use last_frame::LastFrameRegressor;
pub use temporal_mixer::TemporalMixer;

use crate::data::{Sample, WindowSpec};
use lidarcast_core::ModelKind;
use ndarray::{Array2, Array4, ArrayView1, ArrayView4, Axis};

/// Masked L1 totals over a set of pixels.
#[derive(Debug, Clone)]
pub struct LossTerms {
    /// Sum of absolute errors in normalised range units.
    pub abs_error: f64,
    /// Pixels valid in both the last input frame and the target.
    pub pixels: usize,
    /// Sum of subgradients, same shape as the parameters.
    pub grad: Array2<f32>,
}

impl LossTerms {
    pub fn zeros(shape: (usize, usize)) -> Self {
        Self {
            abs_error: 0.0,
            pixels: 0,
            grad: Array2::zeros(shape),
        }
    }

    pub fn merge(&mut self, other: &LossTerms) {
        self.abs_error += other.abs_error;
        self.pixels += other.pixels;
        self.grad += &other.grad;
    }

    /// Mean absolute error, or `None` when no pixel was valid.
    pub fn mean(&self) -> Option<f64> {
        (self.pixels > 0).then(|| self.abs_error / self.pixels as f64)
    }

    /// Mean subgradient.
    pub fn mean_grad(&self) -> Array2<f32> {
        if self.pixels == 0 {
            return self.grad.clone();
        }
        &self.grad / self.pixels as f32
    }
}

/// Trait for forecasting models.
pub trait ForecastModel: Send + Sync {
    fn kind(&self) -> ModelKind;

    fn window(&self) -> WindowSpec;

    /// Range normalisation constant in metres.
    fn scale(&self) -> f32;

    /// `[n_future, n_features]` weights; the last column is the bias.
    fn params(&self) -> &Array2<f32>;

    fn params_mut(&mut self) -> &mut Array2<f32>;

    /// Write the regression features of one pixel into `out` given its
    /// normalised past ranges, oldest first.
    fn features(&self, past: &[f32], out: &mut [f32]);

    /// Replace the weights, rejecting a different shape.
    fn set_params(&mut self, params: Array2<f32>) -> Result<(), String> {
        let expected = self.params().dim();
        if params.dim() != expected {
            return Err(format!(
                "{} expects {}x{} weights, found {}x{}",
                self.kind(),
                expected.0,
                expected.1,
                params.nrows(),
                params.ncols()
            ));
        }
        *self.params_mut() = params;
        Ok(())
    }

    /// Forecast `[n_future, 4, H, W]` frames from `[n_past, 4, H, W]`
    /// observations.
    ///
    /// Pixels empty in the last observed frame stay empty. The xyz channels
    /// are the last observed direction scaled to the predicted range.
    fn predict(&self, past: ArrayView4<f32>) -> Array4<f32> {
        let WindowSpec { n_past, n_future } = self.window();
        let (_, channels, height, width) = past.dim();
        let mut out = Array4::zeros((n_future, channels, height, width));
        let weights = self.params();
        let scale = self.scale();
        let mut history = vec![0.0; n_past];
        let mut feats = vec![0.0; weights.ncols()];

        for row in 0..height {
            for col in 0..width {
                let last = past[[n_past - 1, 0, row, col]];
                if last <= 0.0 {
                    continue;
                }
                for (t, h) in history.iter_mut().enumerate() {
                    *h = past[[t, 0, row, col]] / scale;
                }
                self.features(&history, &mut feats);
                for f in 0..n_future {
                    let y = dot(weights.row(f), &feats).max(0.0) * scale;
                    out[[f, 0, row, col]] = y;
                    for c in 1..channels.min(4) {
                        out[[f, c, row, col]] = past[[n_past - 1, c, row, col]] / last * y;
                    }
                }
            }
        }
        out
    }

    /// Masked L1 loss and its subgradient for one sample.
    fn loss_terms(&self, sample: &Sample) -> LossTerms {
        let WindowSpec { n_past, n_future } = self.window();
        let weights = self.params();
        let scale = self.scale();
        let mut terms = LossTerms::zeros(weights.dim());
        let past_range = sample.past.index_axis(Axis(1), 0);
        let future_range = sample.future.index_axis(Axis(1), 0);
        let (_, height, width) = past_range.dim();
        let mut history = vec![0.0; n_past];
        let mut feats = vec![0.0; weights.ncols()];

        for row in 0..height {
            for col in 0..width {
                if past_range[[n_past - 1, row, col]] <= 0.0 {
                    continue;
                }
                for (t, h) in history.iter_mut().enumerate() {
                    *h = past_range[[t, row, col]] / scale;
                }
                self.features(&history, &mut feats);
                for f in 0..n_future {
                    let target = future_range[[f, row, col]];
                    if target <= 0.0 {
                        continue;
                    }
                    let err = dot(weights.row(f), &feats) - target / scale;
                    terms.abs_error += f64::from(err.abs());
                    terms.pixels += 1;
                    let sign = if err > 0.0 {
                        1.0
                    } else if err < 0.0 {
                        -1.0
                    } else {
                        0.0
                    };
                    let mut g = terms.grad.row_mut(f);
                    for (gi, fi) in g.iter_mut().zip(&feats) {
                        *gi += sign * fi;
                    }
                }
            }
        }
        terms
    }
}

fn dot(weights: ArrayView1<f32>, feats: &[f32]) -> f32 {
    weights.iter().zip(feats).map(|(a, b)| a * b).sum()
}

/// Build an untrained model of the given kind, initialised to persistence.
pub fn build_model(kind: ModelKind, window: WindowSpec, scale: f32) -> Box<dyn ForecastModel> {
    match kind {
        ModelKind::Model1 => Box::new(LastFrameRegressor::new(window, scale)),
        ModelKind::Model2 => Box::new(TemporalMixer::new(window, scale)),
    }
}
