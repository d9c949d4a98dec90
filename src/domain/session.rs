//! A single conversion run and the workspace it exclusively owns.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Subdirectory holding the extractor's output tree
pub const MARKDOWN_DIR: &str = "markdown";

/// Subdirectory holding the translated artifact
pub const TRANSLATED_DIR: &str = "translated";

/// One conversion run.
///
/// The workspace at `root` belongs to this session alone; no other session
/// reads or writes inside it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Unique identifier, also the workspace directory name
    pub id: Uuid,

    /// `<temp_root>/<id>`
    pub root: PathBuf,

    /// When the session was created
    pub created_at: DateTime<Utc>,
}

impl Session {
    /// Describe a session rooted under `temp_root`. Does not touch the disk.
    pub fn new(id: Uuid, temp_root: &Path) -> Self {
        Self {
            id,
            root: temp_root.join(id.to_string()),
            created_at: Utc::now(),
        }
    }

    /// Workspace root
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Where the extractor writes (may not exist yet)
    pub fn markdown_dir(&self) -> PathBuf {
        self.root.join(MARKDOWN_DIR)
    }

    /// Where the translated artifact lands (may not exist yet)
    pub fn translated_dir(&self) -> PathBuf {
        self.root.join(TRANSLATED_DIR)
    }
}
