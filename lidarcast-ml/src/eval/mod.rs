//! Evaluation of a trained forecaster on a held-out split.

pub mod metrics;

pub use metrics::{ForecastMetrics, MetricsAccumulator};

use crate::data::{ForecastDataset, Split};
use crate::error::ForecastError;
use crate::models::{ForecastModel, LastFrameRegressor};
use chrono::{DateTime, Utc};
use lidarcast_core::{DatasetKind, ModelKind};
use ndarray::Axis;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Result of evaluating a checkpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationReport {
    pub dataset: DatasetKind,
    pub model: ModelKind,
    pub checkpoint: PathBuf,
    pub checkpoint_epoch: usize,
    pub split: Split,
    pub samples: usize,
    pub metrics: ForecastMetrics,
    /// Repeating the last observed frame, for reference.
    pub persistence: ForecastMetrics,
    pub created_at: DateTime<Utc>,
}

impl EvaluationReport {
    /// Log the per-step table.
    pub fn log_summary(&self) {
        tracing::info!(
            model = %self.model,
            dataset = %self.dataset,
            samples = self.samples,
            mae_m = self.metrics.mae_m,
            rmse_m = self.metrics.rmse_m,
            mask_iou = self.metrics.mask_iou,
            persistence_mae_m = self.persistence.mae_m,
            "evaluation complete"
        );
        for (step, (mae, base)) in self
            .metrics
            .per_step_mae_m
            .iter()
            .zip(&self.persistence.per_step_mae_m)
            .enumerate()
        {
            tracing::info!(step = step + 1, mae_m = mae, persistence_mae_m = base, "horizon");
        }
    }
}

/// Score `model` on every sample of `data`, next to a persistence baseline.
pub fn evaluate(
    model: &dyn ForecastModel,
    data: &ForecastDataset,
    checkpoint: &Path,
    checkpoint_epoch: usize,
) -> Result<EvaluationReport, ForecastError> {
    let window = model.window();
    if data.window() != window {
        return Err(ForecastError::evaluation(format!(
            "model forecasts {} from {} frames, data windows are {} from {}",
            window.n_future,
            window.n_past,
            data.window().n_future,
            data.window().n_past
        )));
    }
    let baseline = LastFrameRegressor::new(window, model.scale());
    let mut acc = MetricsAccumulator::new(window.n_future);
    let mut base_acc = MetricsAccumulator::new(window.n_future);

    for i in 0..data.len() {
        let sample = data.get(i)?;
        let last = sample.past.index_axis(Axis(0), window.n_past - 1);
        let last_range = last.index_axis(Axis(0), 0);
        let target = sample.future.index_axis(Axis(1), 0);

        let predicted = model.predict(sample.past.view());
        acc.push(predicted.index_axis(Axis(1), 0), target, last_range);

        let persisted = baseline.predict(sample.past.view());
        base_acc.push(persisted.index_axis(Axis(1), 0), target, last_range);

        tracing::debug!(sample = i, sequence = sample.sequence, anchor = sample.anchor, "scored");
    }

    let report = EvaluationReport {
        dataset: data.dataset(),
        model: model.kind(),
        checkpoint: checkpoint.to_path_buf(),
        checkpoint_epoch,
        split: data.split(),
        samples: data.len(),
        metrics: acc.finish(),
        persistence: base_acc.finish(),
        created_at: Utc::now(),
    };
    if report.metrics.valid_pixels == 0 {
        tracing::warn!(split = %report.split, "no pixel valid in both input and target frames");
    }
    Ok(report)
}
