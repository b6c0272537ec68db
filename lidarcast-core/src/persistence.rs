//! Shared persistence helpers: atomic file writes, JSON load and save.
//!
//! Every artefact lidarcast produces (range-image frames, manifests,
//! checkpoints, experiment records) goes through the write-to-temp then
//! rename pattern implemented here, so an interrupted run never leaves a
//! half-written file under its final name.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

/// Sibling temp path used while a file is being written.
///
/// The full file name is kept (`frame.bin` -> `.frame.bin.tmp`) so that two
/// files differing only in extension never share a temp file.
fn temp_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "lidarcast".to_string());
    path.with_file_name(format!(".{name}.tmp"))
}

/// Atomically write JSON data to a file.
///
/// Serializes `data` to pretty-printed JSON, writes to a temp sibling file,
/// then renames to the target path. Creates parent directories if needed.
pub fn atomic_write_json<T: serde::Serialize>(path: &Path, data: &T) -> io::Result<()> {
    let json = serde_json::to_string_pretty(data).map_err(io::Error::other)?;
    atomic_write(path, json.as_bytes())
}

/// Atomically write raw bytes to a file.
pub fn atomic_write(path: &Path, data: &[u8]) -> io::Result<()> {
    atomic_write_with(path, |w| w.write_all(data))
}

/// Atomically write a file by streaming into a buffered writer.
///
/// The closure receives a writer on the temp file; the rename only happens
/// if the closure and the final flush both succeed. On failure the temp file
/// is removed.
pub fn atomic_write_with<F>(path: &Path, write: F) -> io::Result<()>
where
    F: FnOnce(&mut BufWriter<File>) -> io::Result<()>,
{
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let tmp = temp_path(path);
    let result = (|| {
        let mut writer = BufWriter::new(File::create(&tmp)?);
        write(&mut writer)?;
        writer.flush()?;
        Ok(())
    })();
    if let Err(e) = result {
        let _ = std::fs::remove_file(&tmp);
        return Err(e);
    }
    std::fs::rename(&tmp, path)
}

/// Load and deserialize JSON from a file.
///
/// Returns `Ok(None)` if the file doesn't exist.
/// Returns `Err` on I/O errors or deserialization failures.
pub fn load_json<T: serde::de::DeserializeOwned>(path: &Path) -> io::Result<Option<T>> {
    if !path.exists() {
        return Ok(None);
    }
    let data = std::fs::read_to_string(path)?;
    let value =
        serde_json::from_str(&data).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    Ok(Some(value))
}

/// Check that `dir` accepts new files by creating and removing a scratch file.
pub fn check_writable(dir: &Path) -> io::Result<()> {
    let scratch = dir.join(".lidarcast-write-check");
    std::fs::write(&scratch, b"")?;
    std::fs::remove_file(&scratch)
}
