//! Training callbacks: early stopping, anomaly detection, checkpointing.

use crate::training::metrics::TrainingMetrics;
use lidarcast_core::TrainingConfig;
use serde::{Deserialize, Serialize};

/// Action a callback can request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackAction {
    Continue,
    Stop,
    Checkpoint,
}

/// Trait for training callbacks.
pub trait TrainingCallback: Send + Sync {
    fn name(&self) -> &'static str;

    /// Called at the end of each epoch with epoch number and current metrics.
    fn on_epoch_end(&mut self, epoch: usize, metrics: &TrainingMetrics) -> CallbackAction;
}

/// Stops when the monitored loss has not improved for `patience` epochs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EarlyStoppingCallback {
    pub patience: usize,
    pub min_delta: f64,
    #[serde(skip)]
    counter: usize,
    #[serde(skip)]
    best_loss: Option<f64>,
}

impl EarlyStoppingCallback {
    pub fn new(patience: usize, min_delta: f64) -> Self {
        Self {
            patience,
            min_delta,
            counter: 0,
            best_loss: None,
        }
    }

    pub fn observe(&mut self, loss: f64) -> CallbackAction {
        match self.best_loss {
            None => {
                self.best_loss = Some(loss);
                CallbackAction::Continue
            }
            Some(best) if loss < best - self.min_delta => {
                self.best_loss = Some(loss);
                self.counter = 0;
                CallbackAction::Continue
            }
            Some(_) => {
                self.counter += 1;
                if self.counter >= self.patience {
                    CallbackAction::Stop
                } else {
                    CallbackAction::Continue
                }
            }
        }
    }
}

impl TrainingCallback for EarlyStoppingCallback {
    fn name(&self) -> &'static str {
        "early_stopping"
    }

    fn on_epoch_end(&mut self, _epoch: usize, metrics: &TrainingMetrics) -> CallbackAction {
        self.observe(metrics.monitored_loss().unwrap_or(f64::MAX))
    }
}

/// Stops on a non-finite loss or a spike above `threshold` times the
/// recent mean.
#[derive(Debug, Clone)]
pub struct AnomalyDetectionCallback {
    pub threshold: f64,
    window: Vec<f64>,
    window_size: usize,
}

impl AnomalyDetectionCallback {
    pub fn new(threshold: f64, window_size: usize) -> Self {
        Self {
            threshold,
            window: Vec::new(),
            window_size,
        }
    }

    pub fn observe(&mut self, loss: f64) -> CallbackAction {
        if !loss.is_finite() {
            return CallbackAction::Stop;
        }

        self.window.push(loss);
        if self.window.len() > self.window_size {
            self.window.remove(0);
        }

        if self.window.len() >= 3 {
            let mean = self.window.iter().sum::<f64>() / self.window.len() as f64;
            if loss > mean * self.threshold {
                return CallbackAction::Stop;
            }
        }

        CallbackAction::Continue
    }
}

impl TrainingCallback for AnomalyDetectionCallback {
    fn name(&self) -> &'static str {
        "anomaly_detection"
    }

    fn on_epoch_end(&mut self, _epoch: usize, metrics: &TrainingMetrics) -> CallbackAction {
        let loss = metrics.loss_history.last().copied().unwrap_or(0.0);
        self.observe(loss)
    }
}

/// Requests a checkpoint every `frequency` epochs.
#[derive(Debug, Clone)]
pub struct CheckpointCallback {
    pub frequency: usize,
    epoch_counter: usize,
}

impl CheckpointCallback {
    pub fn new(frequency: usize) -> Self {
        Self {
            frequency: frequency.max(1),
            epoch_counter: 0,
        }
    }

    pub fn tick(&mut self) -> CallbackAction {
        self.epoch_counter += 1;
        if self.epoch_counter >= self.frequency {
            self.epoch_counter = 0;
            CallbackAction::Checkpoint
        } else {
            CallbackAction::Continue
        }
    }
}

impl TrainingCallback for CheckpointCallback {
    fn name(&self) -> &'static str {
        "checkpoint"
    }

    fn on_epoch_end(&mut self, _epoch: usize, _metrics: &TrainingMetrics) -> CallbackAction {
        self.tick()
    }
}

/// The callback set a training configuration asks for.
pub fn standard_callbacks(config: &TrainingConfig) -> Vec<Box<dyn TrainingCallback>> {
    let mut callbacks: Vec<Box<dyn TrainingCallback>> = vec![
        Box::new(CheckpointCallback::new(config.checkpoint_every)),
        Box::new(EarlyStoppingCallback::new(
            config.early_stopping_patience.max(1),
            0.0,
        )),
    ];
    if config.anomaly_detection {
        callbacks.push(Box::new(AnomalyDetectionCallback::new(3.0, 5)));
    }
    callbacks
}
