//! Range forecast error metrics.

use ndarray::{ArrayView2, ArrayView3, Axis};
use serde::{Deserialize, Serialize};

/// Forecast quality over a set of samples. Errors are in metres over pixels
/// valid in both the last observed frame and the target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastMetrics {
    pub mae_m: f64,
    pub rmse_m: f64,
    pub per_step_mae_m: Vec<f64>,
    /// Intersection over union of predicted and target occupied pixels.
    pub mask_iou: f64,
    pub valid_pixels: u64,
}

/// Streaming accumulator for [`ForecastMetrics`].
#[derive(Debug, Clone)]
pub struct MetricsAccumulator {
    abs_sum: f64,
    sq_sum: f64,
    valid: u64,
    step_abs: Vec<f64>,
    step_valid: Vec<u64>,
    intersection: u64,
    union: u64,
}

impl MetricsAccumulator {
    pub fn new(n_future: usize) -> Self {
        Self {
            abs_sum: 0.0,
            sq_sum: 0.0,
            valid: 0,
            step_abs: vec![0.0; n_future],
            step_valid: vec![0; n_future],
            intersection: 0,
            union: 0,
        }
    }

    /// Add one sample: `predicted` and `target` are `[n_future, H, W]`
    /// ranges, `last_input` the `[H, W]` range of the last observed frame.
    pub fn push(
        &mut self,
        predicted: ArrayView3<f32>,
        target: ArrayView3<f32>,
        last_input: ArrayView2<f32>,
    ) {
        for (step, (pred, truth)) in predicted
            .axis_iter(Axis(0))
            .zip(target.axis_iter(Axis(0)))
            .enumerate()
        {
            for ((&p, &t), &last) in pred.iter().zip(truth.iter()).zip(last_input.iter()) {
                let (p_occ, t_occ) = (p > 0.0, t > 0.0);
                if p_occ && t_occ {
                    self.intersection += 1;
                }
                if p_occ || t_occ {
                    self.union += 1;
                }
                if last > 0.0 && t_occ {
                    let err = f64::from((p - t).abs());
                    self.abs_sum += err;
                    self.sq_sum += err * err;
                    self.valid += 1;
                    if let Some(slot) = self.step_abs.get_mut(step) {
                        *slot += err;
                        self.step_valid[step] += 1;
                    }
                }
            }
        }
    }

    pub fn finish(&self) -> ForecastMetrics {
        let mean = |sum: f64, n: u64| if n == 0 { 0.0 } else { sum / n as f64 };
        ForecastMetrics {
            mae_m: mean(self.abs_sum, self.valid),
            rmse_m: mean(self.sq_sum, self.valid).sqrt(),
            per_step_mae_m: self
                .step_abs
                .iter()
                .zip(&self.step_valid)
                .map(|(s, n)| mean(*s, *n))
                .collect(),
            mask_iou: if self.union == 0 {
                1.0
            } else {
                self.intersection as f64 / self.union as f64
            },
            valid_pixels: self.valid,
        }
    }
}
