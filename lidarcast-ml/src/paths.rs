//! Validated path handles.
//!
//! Path arguments are checked once, up front, and then carried as typed
//! handles so later stages never re-validate raw strings.

use crate::error::{CheckpointLoadError, PathError};
use std::path::{Path, PathBuf};

/// An existing, readable directory of raw scans.
#[derive(Debug, Clone)]
pub struct RawDatasetDir {
    path: PathBuf,
}

impl RawDatasetDir {
    pub fn open(path: &Path) -> Result<Self, PathError> {
        let path = existing_dir("dataset_path", path)?;
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// An existing directory produced by the preprocessor.
#[derive(Debug, Clone)]
pub struct ProcessedDir {
    path: PathBuf,
}

impl ProcessedDir {
    pub fn open(path: &Path) -> Result<Self, PathError> {
        let path = existing_dir("processeddatapath", path)?;
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// A checkpoint file that exists on disk. Its contents are not inspected yet.
#[derive(Debug, Clone)]
pub struct CheckpointPath {
    path: PathBuf,
}

impl CheckpointPath {
    pub fn open(path: &Path) -> Result<Self, CheckpointLoadError> {
        if !path.exists() {
            return Err(CheckpointLoadError::Missing {
                path: path.to_path_buf(),
            });
        }
        if !path.is_file() {
            return Err(CheckpointLoadError::Unreadable {
                path: path.to_path_buf(),
                reason: "not a regular file".into(),
            });
        }
        Ok(Self {
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Output directory held for the duration of a preprocessing run.
///
/// If this run created the directory and the handle is dropped without
/// [`OutputDir::commit`], every directory the run created on the way
/// (including missing parents) is removed again. Directories that existed
/// beforehand are never deleted.
#[derive(Debug)]
pub struct OutputDir {
    path: PathBuf,
    /// Topmost directory created by `acquire`.
    created_root: Option<PathBuf>,
    committed: bool,
}

impl OutputDir {
    pub fn acquire(path: &Path) -> Result<Self, PathError> {
        let role = "processed_path";
        let created_root = if path.exists() {
            if !path.is_dir() {
                return Err(PathError::NotADirectory {
                    role,
                    path: path.to_path_buf(),
                });
            }
            None
        } else {
            let root = path
                .ancestors()
                .take_while(|a| !a.as_os_str().is_empty() && !a.exists())
                .last()
                .map(Path::to_path_buf);
            if let Err(source) = std::fs::create_dir_all(path) {
                if let Some(root) = &root {
                    let _ = std::fs::remove_dir_all(root);
                }
                return Err(PathError::NotWritable {
                    role,
                    path: path.to_path_buf(),
                    source,
                });
            }
            root
        };

        let handle = Self {
            path: path.to_path_buf(),
            created_root,
            committed: false,
        };
        lidarcast_core::persistence::check_writable(path).map_err(|source| {
            PathError::NotWritable {
                role,
                path: path.to_path_buf(),
                source,
            }
        })?;
        Ok(handle)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Keep the directory and release the handle.
    pub fn commit(mut self) -> PathBuf {
        self.committed = true;
        std::mem::take(&mut self.path)
    }
}

impl Drop for OutputDir {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        let Some(root) = self.created_root.take() else {
            return;
        };
        match std::fs::remove_dir_all(&root) {
            Ok(()) => tracing::debug!(path = %root.display(), "removed partial output"),
            Err(e) => tracing::warn!(
                path = %root.display(),
                error = %e,
                "failed to remove partial output"
            ),
        }
    }
}

fn existing_dir(role: &'static str, path: &Path) -> Result<PathBuf, PathError> {
    if !path.exists() {
        return Err(PathError::NotFound {
            role,
            path: path.to_path_buf(),
        });
    }
    if !path.is_dir() {
        return Err(PathError::NotADirectory {
            role,
            path: path.to_path_buf(),
        });
    }
    std::fs::read_dir(path).map_err(|source| PathError::NotReadable {
        role,
        path: path.to_path_buf(),
        source,
    })?;
    Ok(path.to_path_buf())
}
