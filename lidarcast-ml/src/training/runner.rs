//! Epoch loop: mini-batch Adam on the train split, validation, callbacks
//! and checkpoints.

use super::callbacks::{CallbackAction, standard_callbacks};
use super::checkpoint::{CheckpointEntry, CheckpointFile, CheckpointManager};
use super::experiment::{TrainingExperiment, TrainingStatus};
use super::metrics::TrainingMetrics;
use super::optimizer::Adam;
use super::reproducibility::SeedManager;
use crate::data::ForecastDataset;
use crate::error::ForecastError;
use crate::models::{ForecastModel, LossTerms};
use lidarcast_core::TrainingConfig;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Instant;

/// Outcome of a training run.
#[derive(Debug, Clone, Serialize)]
pub struct TrainingReport {
    pub experiment_id: String,
    pub status: TrainingStatus,
    pub epochs: usize,
    pub best_epoch: Option<usize>,
    /// Lowest validation loss in normalised range units.
    pub best_val_loss: Option<f64>,
    /// `best_val_loss` in metres.
    pub best_val_mae_m: Option<f64>,
    pub final_checkpoint: PathBuf,
    pub best_checkpoint: Option<PathBuf>,
    /// Callback that ended training early.
    pub stop_reason: Option<String>,
    pub elapsed_secs: f64,
}

/// Trains a model in place.
pub struct TrainingRunner {
    config: TrainingConfig,
    checkpoints: CheckpointManager,
}

impl TrainingRunner {
    pub fn new(config: TrainingConfig, checkpoint_dir: &Path) -> Self {
        let checkpoints = CheckpointManager::new(checkpoint_dir.to_path_buf(), config.max_checkpoints);
        Self {
            config,
            checkpoints,
        }
    }

    /// Fit `model` on `train`, validating on `val` after every epoch.
    ///
    /// `experiment` is updated with status, metrics and the best checkpoint;
    /// persisting it is up to the caller.
    pub fn train(
        &self,
        model: &mut dyn ForecastModel,
        train: &ForecastDataset,
        val: &ForecastDataset,
        experiment: &mut TrainingExperiment,
    ) -> Result<TrainingReport, ForecastError> {
        if self.config.max_epochs == 0 {
            return Err(ForecastError::training("training.max_epochs is 0"));
        }
        let started = Instant::now();
        experiment.set_status(TrainingStatus::Running);

        let mut seeds = SeedManager::new(self.config.seed);
        let mut rng = seeds.rng("shuffle");
        let mut adam = Adam::new(self.config.learning_rate as f32, model.params().dim());
        let mut callbacks = standard_callbacks(&self.config);
        let mut metrics = TrainingMetrics::default();
        let mut last_saved: Option<CheckpointEntry> = None;
        let mut stop_reason: Option<&'static str> = None;

        tracing::info!(
            experiment = %experiment.id,
            model = %model.kind(),
            train_samples = train.len(),
            val_samples = val.len(),
            max_epochs = self.config.max_epochs,
            "training started"
        );

        for epoch in 1..=self.config.max_epochs {
            let mut abs_error = 0.0;
            let mut pixels = 0usize;
            let batches = train.batches(
                self.config.batch_size,
                self.config.shuffle.then_some(&mut rng),
            );
            for batch in batches {
                let batch = batch?;
                let mut terms = LossTerms::zeros(model.params().dim());
                for sample in &batch {
                    terms.merge(&model.loss_terms(sample));
                }
                if terms.pixels == 0 {
                    continue;
                }
                adam.step(model.params_mut(), &terms.mean_grad());
                abs_error += terms.abs_error;
                pixels += terms.pixels;
            }
            if pixels == 0 {
                return Err(ForecastError::training(
                    "train split has no pixel valid in both input and target frames",
                ));
            }
            let train_loss = abs_error / pixels as f64;
            let val_loss = validation_loss(model, val)?;
            metrics.record_epoch(train_loss, Some(val_loss));

            tracing::info!(
                epoch,
                train_loss,
                val_loss,
                val_mae_m = val_loss * f64::from(model.scale()),
                "epoch complete"
            );

            let mut want_checkpoint = false;
            for callback in callbacks.iter_mut() {
                match callback.on_epoch_end(epoch, &metrics) {
                    CallbackAction::Continue => {}
                    CallbackAction::Checkpoint => want_checkpoint = true,
                    CallbackAction::Stop => {
                        stop_reason.get_or_insert(callback.name());
                    }
                }
            }
            if want_checkpoint {
                last_saved = Some(self.save(model, train, &experiment.id, epoch, val_loss)?);
            }
            if let Some(reason) = stop_reason {
                tracing::warn!(epoch, reason, "training stopped early");
                break;
            }
        }

        let epochs = metrics.epochs_completed;
        let final_entry = match last_saved {
            Some(entry) if entry.epoch == epochs => entry,
            _ => {
                let val_loss = metrics.val_loss_history.last().copied().unwrap_or(f64::NAN);
                self.save(model, train, &experiment.id, epochs, val_loss)?
            }
        };
        let best = self.checkpoints.best(&experiment.id)?;
        metrics.total_training_time_secs = started.elapsed().as_secs_f64();

        let status = if stop_reason.is_some() {
            TrainingStatus::Stopped
        } else {
            TrainingStatus::Completed
        };
        experiment.metrics = Some(metrics.clone());
        experiment.checkpoint_path = Some(
            best.as_ref()
                .map_or_else(|| final_entry.path.clone(), |b| b.path.clone()),
        );
        experiment.set_status(status.clone());

        let report = TrainingReport {
            experiment_id: experiment.id.clone(),
            status,
            epochs,
            best_epoch: metrics.best_epoch,
            best_val_loss: metrics.best_loss,
            best_val_mae_m: metrics.best_loss.map(|l| l * f64::from(model.scale())),
            final_checkpoint: final_entry.path,
            best_checkpoint: best.map(|b| b.path),
            stop_reason: stop_reason.map(str::to_string),
            elapsed_secs: metrics.total_training_time_secs,
        };
        tracing::info!(
            epochs = report.epochs,
            best_epoch = ?report.best_epoch,
            optimizer_steps = adam.steps(),
            checkpoint = %report.final_checkpoint.display(),
            "training finished"
        );
        Ok(report)
    }

    fn save(
        &self,
        model: &dyn ForecastModel,
        data: &ForecastDataset,
        experiment_id: &str,
        epoch: usize,
        val_loss: f64,
    ) -> Result<CheckpointEntry, ForecastError> {
        let (height, width) = data.image_size();
        let file = CheckpointFile::from_model(model, data.dataset(), height, width, epoch, val_loss);
        self.checkpoints.save(experiment_id, &file)
    }
}

/// Mean masked L1 over a dataset, in normalised range units.
pub fn validation_loss(model: &dyn ForecastModel, data: &ForecastDataset) -> Result<f64, ForecastError> {
    let mut abs_error = 0.0;
    let mut pixels = 0usize;
    for i in 0..data.len() {
        let terms = model.loss_terms(&data.get(i)?);
        abs_error += terms.abs_error;
        pixels += terms.pixels;
    }
    if pixels == 0 {
        return Err(ForecastError::training(format!(
            "{} split has no pixel valid in both input and target frames",
            data.split()
        )));
    }
    Ok(abs_error / pixels as f64)
}
