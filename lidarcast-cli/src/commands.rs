//! CLI subcommand handlers.

use crate::{Commands, ConfigAction};
use anyhow::Context;
use lidarcast_core::ForecastConfig;
use lidarcast_ml::{PreprocessRequest, RunOutcome, RunRequest};
use std::path::Path;

/// Handle a CLI subcommand.
pub fn handle_command(
    command: Commands,
    workspace: &Path,
    config_path: Option<&Path>,
) -> anyhow::Result<()> {
    match command {
        Commands::Preprocess {
            dataset,
            dataset_path,
            processed_path,
        } => {
            let config = load(workspace, config_path)?;
            let request = PreprocessRequest {
                dataset,
                dataset_path,
                processed_path,
            };
            let summary = lidarcast_ml::preprocess(&request, &config)
                .with_context(|| format!("preprocessing {dataset} failed"))?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
            Ok(())
        }
        Commands::Run {
            dataset,
            processed_path,
            model,
            test,
            report,
        } => {
            let config = load(workspace, config_path)?;
            let mode = if test.is_some() { "evaluation" } else { "training" };
            let request = RunRequest {
                dataset,
                processed_path,
                model,
                checkpoint: test,
                report_path: report,
                workspace: workspace.to_path_buf(),
            };
            let outcome = lidarcast_ml::run(&request, &config)
                .with_context(|| format!("{model} {mode} on {dataset} failed"))?;
            if let RunOutcome::Trained(report) = &outcome {
                tracing::info!(
                    experiment = %report.experiment_id,
                    checkpoint = %report.final_checkpoint.display(),
                    "training finished; evaluate with --test"
                );
            }
            println!("{}", serde_json::to_string_pretty(&outcome)?);
            Ok(())
        }
        Commands::Config { action } => handle_config(action, workspace, config_path),
    }
}

fn load(workspace: &Path, config_path: Option<&Path>) -> anyhow::Result<ForecastConfig> {
    lidarcast_core::config::load_config(Some(workspace), config_path)
        .map_err(|e| anyhow::anyhow!("Configuration error: {}", e))
}

fn handle_config(
    action: ConfigAction,
    workspace: &Path,
    config_path: Option<&Path>,
) -> anyhow::Result<()> {
    match action {
        ConfigAction::Init => {
            let config_path = lidarcast_core::config::workspace_config_path(workspace);
            if config_path.exists() {
                println!(
                    "Configuration file already exists at: {}",
                    config_path.display()
                );
                return Ok(());
            }
            if let Some(dir) = config_path.parent() {
                std::fs::create_dir_all(dir)?;
            }

            let toml_str = toml::to_string_pretty(&ForecastConfig::default())?;
            std::fs::write(&config_path, &toml_str)?;
            println!(
                "Created default configuration at: {}",
                config_path.display()
            );
            Ok(())
        }
        ConfigAction::Show => {
            let config = load(workspace, config_path)?;
            let toml_str = toml::to_string_pretty(&config)?;
            println!("{}", toml_str);
            Ok(())
        }
    }
}
