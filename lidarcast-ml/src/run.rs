//! The `run` entry point: train a model, or evaluate a checkpoint.

use crate::data::{ForecastDataset, ProcessedManifest, Split, WindowSpec};
use crate::error::ForecastError;
use crate::eval::{EvaluationReport, evaluate};
use crate::models::build_model;
use crate::paths::{CheckpointPath, ProcessedDir};
use crate::training::reproducibility::EnvironmentSnapshot;
use crate::training::{
    CheckpointFile, CheckpointTarget, ExperimentRegistry, TrainingExperiment, TrainingReport,
    TrainingRunner, TrainingStatus,
};
use lidarcast_core::{DatasetKind, ForecastConfig, ModelKind};
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Arguments of the `run` entry point.
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub dataset: DatasetKind,
    pub processed_path: PathBuf,
    pub model: ModelKind,
    /// Evaluate this checkpoint instead of training.
    pub checkpoint: Option<PathBuf>,
    /// Where to also write the evaluation report.
    pub report_path: Option<PathBuf>,
    /// Base for relative checkpoint and experiment paths.
    pub workspace: PathBuf,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum RunOutcome {
    Trained(TrainingReport),
    Evaluated(EvaluationReport),
}

fn resolve(workspace: &Path, configured: &str) -> PathBuf {
    let path = Path::new(configured);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        workspace.join(path)
    }
}

/// Train or evaluate.
///
/// Every path and compatibility check happens before the first sample is
/// loaded: processed directory, checkpoint existence, manifest against the
/// dataset selector, then checkpoint against the model selector.
pub fn run(request: &RunRequest, config: &ForecastConfig) -> Result<RunOutcome, ForecastError> {
    let processed = ProcessedDir::open(&request.processed_path)?;
    let checkpoint = request
        .checkpoint
        .as_deref()
        .map(CheckpointPath::open)
        .transpose()?;

    let profile = config.profile(request.dataset);
    let manifest = ProcessedManifest::load(&processed, request.dataset)?;
    manifest.ensure_matches(&processed, request.dataset, profile)?;
    let window = WindowSpec {
        n_past: config.model.n_past_steps,
        n_future: config.model.n_future_steps,
    };

    match checkpoint {
        Some(path) => {
            let file = CheckpointFile::load(&path)?;
            let target = CheckpointTarget {
                model: request.model,
                dataset: request.dataset,
                window,
                height: manifest.height,
                width: manifest.width,
            };
            let model = file.restore(&path, &target)?;
            tracing::info!(
                checkpoint = %path.path().display(),
                epoch = file.epoch,
                "checkpoint loaded"
            );

            let test = ForecastDataset::open(
                &processed,
                &manifest,
                &profile.splits,
                Split::Test,
                window,
            )?;
            let report = evaluate(model.as_ref(), &test, path.path(), file.epoch)?;
            report.log_summary();
            if let Some(out) = &request.report_path {
                lidarcast_core::persistence::atomic_write_json(out, &report)?;
                tracing::info!(report = %out.display(), "report written");
            }
            Ok(RunOutcome::Evaluated(report))
        }
        None => {
            let open = |split| {
                ForecastDataset::open(&processed, &manifest, &profile.splits, split, window)
            };
            let train = open(Split::Train)?;
            let val = open(Split::Val)?;
            train_and_record(request, config, &train, &val, manifest.max_range)
        }
    }
}

fn train_and_record(
    request: &RunRequest,
    config: &ForecastConfig,
    train: &ForecastDataset,
    val: &ForecastDataset,
    scale: f32,
) -> Result<RunOutcome, ForecastError> {
    let training = &config.training;
    let registry_path = resolve(&request.workspace, &training.experiments_file);
    let mut registry = ExperimentRegistry::load(&registry_path)?;

    let mut experiment =
        TrainingExperiment::new(request.dataset, request.model, &request.processed_path);
    experiment.seed = training.seed;
    experiment.hyperparams = serde_json::json!({
        "model": config.model,
        "training": training,
    });
    experiment.environment = Some(EnvironmentSnapshot::capture(config));

    let mut model = build_model(request.model, train.window(), scale);
    let runner = TrainingRunner::new(
        training.clone(),
        &resolve(&request.workspace, &training.checkpoint_dir),
    );

    let outcome = runner.train(model.as_mut(), train, val, &mut experiment);
    if let Err(e) = &outcome {
        experiment.notes = Some(e.to_string());
        experiment.set_status(TrainingStatus::Failed);
    }
    registry.upsert(experiment);
    registry.save(&registry_path)?;

    Ok(RunOutcome::Trained(outcome?))
}
