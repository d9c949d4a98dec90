//! Locked, atomic JSON persistence shared by config and history.
//!
//! Both files are read-modify-written as a whole, so writers take an
//! exclusive lock on a sidecar `<file>.lock` for the full cycle. The lock is
//! released when the returned guard is dropped.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use fs2::FileExt;
use serde::Serialize;
use tempfile::NamedTempFile;

/// Held exclusive lock on a persisted file
pub struct FileLock {
    _file: File,
    path: PathBuf,
}

impl FileLock {
    /// Path of the lock file
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Acquire an exclusive lock guarding `target`, blocking until available
pub fn lock_exclusive(target: &Path) -> Result<FileLock> {
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }

    let lock_path = lock_path_for(target);
    let file = OpenOptions::new()
        .create(true)
        .read(true)
        .write(true)
        .open(&lock_path)
        .with_context(|| format!("Failed to open lock file: {}", lock_path.display()))?;

    file.lock_exclusive()
        .with_context(|| format!("Failed to acquire file lock on {}", target.display()))?;

    Ok(FileLock {
        _file: file,
        path: lock_path,
    })
}

/// Write `value` as pretty JSON, replacing `path` atomically
pub fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create directory: {}", dir.display()))?;

    let mut tmp = NamedTempFile::new_in(dir)
        .with_context(|| format!("Failed to create temp file in {}", dir.display()))?;
    serde_json::to_writer_pretty(&mut tmp, value).context("Failed to serialize JSON")?;
    tmp.write_all(b"\n")?;
    tmp.flush()?;

    tmp.persist(path)
        .with_context(|| format!("Failed to write {}", path.display()))?;

    Ok(())
}

fn lock_path_for(target: &Path) -> PathBuf {
    let mut name = target
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".lock");
    target.with_file_name(name)
}
