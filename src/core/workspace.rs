//! Per-run isolated workspaces.
//!
//! Every session gets its own directory `<temp_root>/<session_id>`. Stages
//! create subdirectories lazily through [`WorkspaceManager::resolve_subpath`].
//! Destruction is recursive and irreversible; the packaging stage is the only
//! caller that destroys a session, after it has copied everything it needs.

use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use anyhow::Result;
use tokio::fs;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::domain::Session;
use crate::error::ResourceError;

/// Default age after which `sweep_stale` removes leftover workspaces
pub const DEFAULT_STALE_AGE: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Creates and destroys session workspaces under a shared temp root
#[derive(Debug, Clone)]
pub struct WorkspaceManager {
    temp_root: PathBuf,
}

impl WorkspaceManager {
    /// Manage workspaces under `temp_root`
    pub fn new(temp_root: impl Into<PathBuf>) -> Self {
        Self {
            temp_root: temp_root.into(),
        }
    }

    /// Manage workspaces under the application temp root (<home>/temp)
    pub fn from_default_root() -> Result<Self> {
        Ok(Self::new(crate::config::paths::temp_root()?))
    }

    /// The process-wide temp root
    pub fn temp_root(&self) -> &Path {
        &self.temp_root
    }

    /// Create a fresh, empty session workspace
    pub async fn create_session(&self) -> Result<Session, ResourceError> {
        fs::create_dir_all(&self.temp_root)
            .await
            .map_err(|source| ResourceError::CreateWorkspace {
                path: self.temp_root.clone(),
                source,
            })?;

        let session = Session::new(Uuid::new_v4(), &self.temp_root);

        // create_dir (not create_dir_all) so an existing directory is never reused
        fs::create_dir(&session.root)
            .await
            .map_err(|source| ResourceError::CreateWorkspace {
                path: session.root.clone(),
                source,
            })?;

        debug!(session_id = %session.id, root = %session.root.display(), "Created session workspace");
        Ok(session)
    }

    /// Recursively remove a session workspace. Removing an absent one is a no-op.
    pub async fn destroy_session(&self, session: &Session) -> Result<(), ResourceError> {
        match fs::remove_dir_all(&session.root).await {
            Ok(()) => {
                debug!(session_id = %session.id, "Destroyed session workspace");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(ResourceError::DestroyWorkspace {
                path: session.root.clone(),
                source,
            }),
        }
    }

    /// Return `<session>/<name>`, creating it if needed
    pub async fn resolve_subpath(
        &self,
        session: &Session,
        name: &str,
    ) -> Result<PathBuf, ResourceError> {
        let path = session.root.join(name);
        fs::create_dir_all(&path)
            .await
            .map_err(|source| ResourceError::CreateSubdir {
                path: path.clone(),
                source,
            })?;
        Ok(path)
    }

    /// Remove temp-root entries last modified more than `max_age` ago.
    ///
    /// Returns how many entries were removed. Entries that cannot be
    /// inspected or removed are logged and skipped.
    pub async fn sweep_stale(&self, max_age: Duration) -> usize {
        let mut entries = match fs::read_dir(&self.temp_root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return 0,
            Err(e) => {
                warn!(root = %self.temp_root.display(), error = %e, "Failed to read temp root");
                return 0;
            }
        };

        let cutoff = SystemTime::now()
            .checked_sub(max_age)
            .unwrap_or(SystemTime::UNIX_EPOCH);
        let mut removed = 0;

        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(e) => {
                    warn!(error = %e, "Failed to read temp root entry");
                    break;
                }
            };

            let path = entry.path();
            let metadata = match entry.metadata().await {
                Ok(m) => m,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Failed to stat temp entry");
                    continue;
                }
            };

            let modified = metadata.modified().unwrap_or_else(|_| SystemTime::now());
            if modified >= cutoff {
                continue;
            }

            let result = if metadata.is_dir() {
                fs::remove_dir_all(&path).await
            } else {
                fs::remove_file(&path).await
            };

            match result {
                Ok(()) => removed += 1,
                Err(e) => warn!(path = %path.display(), error = %e, "Failed to remove stale temp entry"),
            }
        }

        if removed > 0 {
            info!(removed, root = %self.temp_root.display(), "Swept stale workspaces");
        }
        removed
    }
}
