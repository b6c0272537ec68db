//! Exit codes and output of the `lidarcast` binary.

use std::path::Path;
use std::process::{Command, Output};
use tempfile::TempDir;

fn lidarcast(dir: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_lidarcast"))
        .args(args)
        .current_dir(dir)
        .env("HOME", dir)
        .env("XDG_CONFIG_HOME", dir.join("xdg-config"))
        .env("XDG_DATA_HOME", dir.join("xdg-data"))
        .output()
        .unwrap()
}

fn small_kitti_workspace(dir: &Path) {
    let velodyne = dir.join("raw_kitti/sequences/00/velodyne");
    std::fs::create_dir_all(&velodyne).unwrap();
    for frame in 0..3 {
        let mut bytes = Vec::new();
        for (x, y, z) in [(10.0f32, 0.0f32, -1.0f32), (0.0, 12.0, -1.0), (-8.0, -8.0, 0.5)] {
            for v in [x + frame as f32, y, z, 0.3] {
                bytes.extend_from_slice(&v.to_le_bytes());
            }
        }
        std::fs::write(velodyne.join(format!("{frame:06}.bin")), bytes).unwrap();
    }
    std::fs::create_dir_all(dir.join(".lidarcast")).unwrap();
    std::fs::write(
        dir.join(".lidarcast/config.toml"),
        "[kitti]\nheight = 8\nwidth = 32\n",
    )
    .unwrap();
}

#[test]
fn invalid_model_exits_with_usage_error() {
    let tmp = TempDir::new().unwrap();
    let out = lidarcast(
        tmp.path(),
        &[
            "run",
            "--dataset",
            "nuscenes",
            "--processeddatapath",
            "./out",
            "--model",
            "model3",
        ],
    );
    assert_eq!(out.status.code(), Some(2));
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("invalid model 'model3'"), "{stderr}");
}

#[test]
fn invalid_dataset_touches_nothing() {
    let tmp = TempDir::new().unwrap();
    std::fs::create_dir_all(tmp.path().join("raw")).unwrap();
    let out = lidarcast(
        tmp.path(),
        &[
            "preprocess",
            "--dataset",
            "waymo",
            "--dataset_path",
            "./raw",
            "--processed_path",
            "./out",
        ],
    );
    assert_eq!(out.status.code(), Some(2));
    assert!(!tmp.path().join("out").exists());
}

#[test]
fn preprocess_then_missing_checkpoint() {
    let tmp = TempDir::new().unwrap();
    small_kitti_workspace(tmp.path());

    let out = lidarcast(
        tmp.path(),
        &[
            "preprocess",
            "--dataset",
            "kitti",
            "--dataset_path",
            "./raw_kitti",
            "--processed_path",
            "./out",
        ],
    );
    assert_eq!(
        out.status.code(),
        Some(0),
        "{}",
        String::from_utf8_lossy(&out.stderr)
    );
    let summary: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(summary["frames"], 3);
    assert!(tmp.path().join("out/manifest.json").is_file());

    let out = lidarcast(
        tmp.path(),
        &[
            "run",
            "--processeddatapath",
            "./out",
            "--model",
            "model1",
            "--test",
            "./missing.ckpt",
        ],
    );
    assert_eq!(out.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("missing.ckpt"), "{stderr}");
}

#[test]
fn preprocess_missing_raw_dir_fails() {
    let tmp = TempDir::new().unwrap();
    let out = lidarcast(
        tmp.path(),
        &[
            "preprocess",
            "--dataset_path",
            "./raw_kitti",
            "--processed_path",
            "./out",
        ],
    );
    assert_eq!(out.status.code(), Some(1));
    assert!(!tmp.path().join("out").exists());
}

#[test]
fn config_init_then_show() {
    let tmp = TempDir::new().unwrap();
    let out = lidarcast(tmp.path(), &["config", "init"]);
    assert_eq!(out.status.code(), Some(0));
    assert!(tmp.path().join(".lidarcast/config.toml").is_file());

    let out = lidarcast(tmp.path(), &["config", "show"]);
    assert_eq!(out.status.code(), Some(0));
    let shown = String::from_utf8_lossy(&out.stdout);
    assert!(shown.contains("[kitti]"), "{shown}");
    assert!(shown.contains("n_past_steps = 5"), "{shown}");
}

#[test]
fn missing_workspace_is_an_error() {
    let tmp = TempDir::new().unwrap();
    small_kitti_workspace(tmp.path());
    let out = lidarcast(
        tmp.path(),
        &[
            "-w",
            "./no_such_workspace",
            "preprocess",
            "--dataset_path",
            "./raw_kitti",
            "--processed_path",
            "./out",
        ],
    );
    assert_eq!(out.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("no_such_workspace"), "{stderr}");
    assert!(!tmp.path().join("out").exists());
}
