//! lidarcast CLI: preprocess raw LiDAR scans into range images, then train or
//! evaluate a forecaster on them.

mod commands;

use anyhow::Context;
use clap::Parser;
use lidarcast_core::{DatasetKind, ModelKind};
use std::path::PathBuf;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// LiDAR point cloud forecasting on range images
#[derive(Parser, Debug)]
#[command(name = "lidarcast", version, about, long_about = None)]
struct Cli {
    /// Workspace directory (holds `.lidarcast/`)
    #[arg(short, long, global = true, default_value = ".")]
    workspace: PathBuf,

    /// Configuration file path
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Increase verbosity (-v, -vv)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Only report errors
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Convert raw point clouds to range images
    Preprocess {
        /// Dataset family: kitti, nuscenes
        #[arg(long, default_value = "kitti")]
        dataset: DatasetKind,

        /// Root of the raw dataset
        #[arg(long = "dataset_path")]
        dataset_path: PathBuf,

        /// Output directory for the processed range images
        #[arg(long = "processed_path")]
        processed_path: PathBuf,
    },
    /// Train a model, or evaluate a checkpoint with --test
    Run {
        /// Dataset family: kitti, nuscenes
        #[arg(long, default_value = "kitti")]
        dataset: DatasetKind,

        /// Directory written by `preprocess`
        #[arg(long = "processeddatapath")]
        processed_path: PathBuf,

        /// Model: model1, model2
        #[arg(long)]
        model: ModelKind,

        /// Checkpoint to evaluate on the test split
        #[arg(long)]
        test: Option<PathBuf>,

        /// Also write the evaluation report to this file
        #[arg(long, requires = "test")]
        report: Option<PathBuf>,
    },
    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(clap::Subcommand, Debug)]
enum ConfigAction {
    /// Print the effective configuration
    Show,
    /// Write the default configuration to .lidarcast/config.toml
    Init,
}

fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 if cli.quiet => "error",
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::new(filter));

    // JSON file log; skipped when the data dir is not writable
    let log_dir = directories::ProjectDirs::from("dev", "lidarcast", "lidarcast")
        .map(|d| d.data_dir().join("logs"))
        .unwrap_or_else(|| PathBuf::from("."));
    let file_appender = tracing_appender::rolling::RollingFileAppender::builder()
        .rotation(tracing_appender::rolling::Rotation::DAILY)
        .filename_prefix("lidarcast")
        .filename_suffix("log")
        .build(&log_dir)
        .ok();
    let (json_layer, _guard) = match file_appender {
        Some(appender) => {
            let (non_blocking, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .json()
                .with_writer(non_blocking)
                .with_filter(EnvFilter::new("debug"));
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let workspace = cli.workspace.canonicalize().with_context(|| {
        format!(
            "workspace {} does not exist or is not accessible",
            cli.workspace.display()
        )
    })?;
    if !workspace.is_dir() {
        anyhow::bail!("workspace {} is not a directory", workspace.display());
    }

    commands::handle_command(cli.command, &workspace, cli.config.as_deref())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::error::ErrorKind;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_preprocess_flags() {
        let cli = Cli::try_parse_from([
            "lidarcast",
            "preprocess",
            "--dataset",
            "nuscenes",
            "--dataset_path",
            "./raw",
            "--processed_path",
            "./out",
        ])
        .unwrap();
        match cli.command {
            Commands::Preprocess {
                dataset,
                dataset_path,
                processed_path,
            } => {
                assert_eq!(dataset, DatasetKind::Nuscenes);
                assert_eq!(dataset_path, PathBuf::from("./raw"));
                assert_eq!(processed_path, PathBuf::from("./out"));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_dataset_defaults_to_kitti() {
        let cli = Cli::try_parse_from([
            "lidarcast",
            "preprocess",
            "--dataset_path",
            "r",
            "--processed_path",
            "o",
        ])
        .unwrap();
        assert!(matches!(
            cli.command,
            Commands::Preprocess {
                dataset: DatasetKind::Kitti,
                ..
            }
        ));
    }

    #[test]
    fn test_run_train_and_test_modes() {
        let cli = Cli::try_parse_from([
            "lidarcast",
            "run",
            "--dataset",
            "kitti",
            "--processeddatapath",
            "./out",
            "--model",
            "model2",
        ])
        .unwrap();
        let Commands::Run { model, test, .. } = cli.command else {
            panic!("expected run");
        };
        assert_eq!(model, ModelKind::Model2);
        assert_eq!(test, None);

        let cli = Cli::try_parse_from([
            "lidarcast",
            "-v",
            "run",
            "--processeddatapath",
            "./out",
            "--model",
            "model1",
            "--test",
            "ckpt/epoch-0003.ckpt",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 1);
        let Commands::Run { test, .. } = cli.command else {
            panic!("expected run");
        };
        assert_eq!(test, Some(PathBuf::from("ckpt/epoch-0003.ckpt")));
    }

    #[test]
    fn test_invalid_model_is_usage_error() {
        let err = Cli::try_parse_from([
            "lidarcast",
            "run",
            "--dataset",
            "nuscenes",
            "--processeddatapath",
            "./out",
            "--model",
            "model3",
        ])
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ValueValidation);
        assert!(err.to_string().contains("model3"));
    }

    #[test]
    fn test_invalid_dataset_is_usage_error() {
        let err = Cli::try_parse_from([
            "lidarcast",
            "preprocess",
            "--dataset",
            "waymo",
            "--dataset_path",
            "r",
            "--processed_path",
            "o",
        ])
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ValueValidation);
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn test_model_is_required() {
        let err = Cli::try_parse_from(["lidarcast", "run", "--processeddatapath", "./out"])
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MissingRequiredArgument);
    }

    #[test]
    fn test_report_requires_test() {
        let err = Cli::try_parse_from([
            "lidarcast",
            "run",
            "--processeddatapath",
            "./out",
            "--model",
            "model1",
            "--report",
            "r.json",
        ])
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MissingRequiredArgument);
    }

    #[test]
    fn test_config_subcommands() {
        let cli = Cli::try_parse_from(["lidarcast", "config", "show"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Config {
                action: ConfigAction::Show
            }
        ));
    }
}
