//! Adam optimiser over a single weight matrix.

use ndarray::Array2;
use serde::{Deserialize, Serialize};

/// Adam with bias-corrected moment estimates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Adam {
    learning_rate: f32,
    beta1: f32,
    beta2: f32,
    epsilon: f32,
    step: usize,
    m: Array2<f32>,
    v: Array2<f32>,
}

impl Adam {
    pub fn new(learning_rate: f32, shape: (usize, usize)) -> Self {
        Self {
            learning_rate,
            beta1: 0.9,
            beta2: 0.999,
            epsilon: 1e-8,
            step: 0,
            m: Array2::zeros(shape),
            v: Array2::zeros(shape),
        }
    }

    /// Updates applied so far.
    pub fn steps(&self) -> usize {
        self.step
    }

    /// Apply one update to `param` given its gradient.
    pub fn step(&mut self, param: &mut Array2<f32>, grad: &Array2<f32>) {
        self.step += 1;
        let t = self.step as i32;

        self.m = &self.m * self.beta1 + grad * (1.0 - self.beta1);
        self.v = &self.v * self.beta2 + grad.mapv(|g| g * g) * (1.0 - self.beta2);

        let m_hat = &self.m / (1.0 - self.beta1.powi(t));
        let v_hat = &self.v / (1.0 - self.beta2.powi(t));

        let eps = self.epsilon;
        let update = (m_hat / v_hat.mapv(|v| v.sqrt() + eps)) * self.learning_rate;
        *param -= &update;
    }
}
