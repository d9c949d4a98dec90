//! Conversion history.
//!
//! A JSON array at `<home>/history.json`, newest entry first, capped at
//! [`MAX_HISTORY_ENTRIES`]. Writers hold an exclusive file lock across the
//! read-modify-write cycle so concurrent runs never lose entries.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Local;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::config::paths;
use crate::domain::{BundleKind, RunReport};
use crate::persist::{lock_exclusive, write_json_atomic};

/// Maximum number of retained entries
pub const MAX_HISTORY_ENTRIES: usize = 50;

/// Display format of entry timestamps
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// One completed conversion
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// Source file name without extension
    pub file_name: String,

    /// Local completion time
    pub timestamp: String,

    /// Delivered bundle
    pub output_path: PathBuf,

    /// Bundle kind
    pub output_type: BundleKind,
}

impl HistoryEntry {
    /// Entry for a completed run, stamped with the current local time
    pub fn from_report(report: &RunReport) -> Self {
        Self {
            file_name: report.file_name.clone(),
            timestamp: report
                .completed_at
                .with_timezone(&Local)
                .format(TIMESTAMP_FORMAT)
                .to_string(),
            output_path: report.package.output_path.clone(),
            output_type: report.package.kind,
        }
    }
}

/// Bounded, file-backed history list
#[derive(Debug, Clone)]
pub struct HistoryStore {
    path: PathBuf,
    capacity: usize,
}

impl HistoryStore {
    /// Store backed by `path` with the default capacity
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            capacity: MAX_HISTORY_ENTRIES,
        }
    }

    /// Store at the canonical history file
    pub fn open_default() -> Result<Self> {
        Ok(Self::new(paths::history_file()?))
    }

    /// Override the retention cap
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// All entries, newest first. A missing or unreadable file is empty.
    pub fn load(&self) -> Result<Vec<HistoryEntry>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let content = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read history: {}", self.path.display()))?;

        match serde_json::from_str(&content) {
            Ok(entries) => Ok(entries),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "History file is corrupt, ignoring");
                Ok(Vec::new())
            }
        }
    }

    /// Entry at `index` (0 = newest)
    pub fn get(&self, index: usize) -> Result<Option<HistoryEntry>> {
        Ok(self.load()?.into_iter().nth(index))
    }

    /// Prepend `entry`, dropping the oldest beyond capacity
    pub fn add(&self, entry: HistoryEntry) -> Result<()> {
        let _lock = lock_exclusive(&self.path)?;

        let mut entries = self.load()?;
        entries.insert(0, entry);
        entries.truncate(self.capacity);

        write_json_atomic(&self.path, &entries)
    }

    /// Remove all entries
    pub fn clear(&self) -> Result<()> {
        let _lock = lock_exclusive(&self.path)?;
        write_json_atomic(&self.path, &Vec::<HistoryEntry>::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn entry(name: &str) -> HistoryEntry {
        HistoryEntry {
            file_name: name.to_string(),
            timestamp: "2024-01-01 12:00:00".to_string(),
            output_path: PathBuf::from(format!("/out/{name}.zip")),
            output_type: BundleKind::Archive,
        }
    }

    #[test]
    fn test_missing_file_is_empty() {
        let temp = TempDir::new().unwrap();
        let store = HistoryStore::new(temp.path().join("history.json"));
        assert!(store.load().unwrap().is_empty());
        assert_eq!(store.get(0).unwrap(), None);
    }

    #[test]
    fn test_add_is_newest_first() {
        let temp = TempDir::new().unwrap();
        let store = HistoryStore::new(temp.path().join("history.json"));

        store.add(entry("first")).unwrap();
        store.add(entry("second")).unwrap();

        let entries = store.load().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].file_name, "second");
        assert_eq!(store.get(1).unwrap().unwrap().file_name, "first");
    }

    #[test]
    fn test_capacity_drops_oldest() {
        let temp = TempDir::new().unwrap();
        let store = HistoryStore::new(temp.path().join("history.json"));

        for i in 0..(MAX_HISTORY_ENTRIES + 5) {
            store.add(entry(&format!("doc{i}"))).unwrap();
        }

        let entries = store.load().unwrap();
        assert_eq!(entries.len(), MAX_HISTORY_ENTRIES);
        assert_eq!(
            entries[0].file_name,
            format!("doc{}", MAX_HISTORY_ENTRIES + 4)
        );
        assert_eq!(entries.last().unwrap().file_name, "doc5");
    }

    #[test]
    fn test_clear() {
        let temp = TempDir::new().unwrap();
        let store = HistoryStore::new(temp.path().join("history.json")).with_capacity(3);

        store.add(entry("a")).unwrap();
        store.clear().unwrap();
        assert!(store.load().unwrap().is_empty());
    }

    #[test]
    fn test_corrupt_file_reads_as_empty() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("history.json");
        fs::write(&path, "not json").unwrap();

        let store = HistoryStore::new(&path);
        assert!(store.load().unwrap().is_empty());

        // And is repaired by the next write
        store.add(entry("a")).unwrap();
        assert_eq!(store.load().unwrap().len(), 1);
    }

    #[test]
    fn test_reads_legacy_zip_output_type() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("history.json");
        fs::write(
            &path,
            r#"[{"file_name":"paper","timestamp":"2024-01-01 12:00:00","output_path":"/o/paper.zip","output_type":"zip"}]"#,
        )
        .unwrap();

        let entries = HistoryStore::new(&path).load().unwrap();
        assert_eq!(entries[0].output_type, BundleKind::Archive);
    }
}
