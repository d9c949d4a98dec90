//! PDF → Markdown stage.
//!
//! Invokes the extractor into `<session>/markdown`, then locates the single
//! authoritative Markdown file in whatever layout the extractor chose.
//!
//! Discovery rules, applied per directory in name order:
//! 1. a `.md` file directly inside the directory wins;
//! 2. otherwise, for each subdirectory `d`, `d/d.md` wins;
//! 3. otherwise, recurse into `d` before moving to the next subdirectory.

use std::collections::HashSet;
use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, instrument, warn};

use super::workspace::WorkspaceManager;
use crate::adapters::Extractor;
use crate::config::ExtractorOptions;
use crate::domain::session::MARKDOWN_DIR;
use crate::domain::{ExtractionResult, Session};
use crate::error::ExtractionError;

/// Recursion bound for artifact discovery
pub const MAX_DISCOVERY_DEPTH: usize = 32;

/// Name of the assets directory produced next to the Markdown
pub const ASSETS_DIR_NAME: &str = "images";

/// Magic bytes every PDF starts with
const PDF_MAGIC: &[u8] = b"%PDF-";

/// Whether `path` has a `.pdf` extension and starts with the PDF header
pub fn is_valid_pdf(path: &Path) -> bool {
    let has_extension = path
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("pdf"))
        .unwrap_or(false);
    if !has_extension {
        return false;
    }

    let mut header = [0u8; 5];
    File::open(path)
        .and_then(|mut f| f.read_exact(&mut header))
        .map(|()| header == PDF_MAGIC)
        .unwrap_or(false)
}

/// Runs an [`Extractor`] inside a session workspace
pub struct ExtractionStage {
    extractor: Arc<dyn Extractor>,
    workspace: WorkspaceManager,
}

impl ExtractionStage {
    pub fn new(extractor: Arc<dyn Extractor>, workspace: WorkspaceManager) -> Self {
        Self {
            extractor,
            workspace,
        }
    }

    /// Convert `source` and locate the resulting Markdown
    #[instrument(skip(self, session, options), fields(session_id = %session.id, extractor = self.extractor.name()))]
    pub async fn extract(
        &self,
        source: &Path,
        session: &Session,
        options: &ExtractorOptions,
    ) -> Result<ExtractionResult, ExtractionError> {
        // The probe only informs; a failed probe does not block the attempt
        if let Err(e) = self.extractor.health_check().await {
            warn!(error = %e, "Extractor availability check failed, attempting anyway");
        }

        let output_dir = self.workspace.resolve_subpath(session, MARKDOWN_DIR).await?;

        let output = self
            .extractor
            .convert(source, &output_dir, options)
            .await?;
        debug!(stdout_bytes = output.stdout.len(), "Extractor finished");

        let scan_root = output_dir.clone();
        let (markdown_path, assets_dir) = tokio::task::spawn_blocking(move || {
            let markdown = discover_markdown(&scan_root)?
                .ok_or(ExtractionError::ArtifactNotFound { dir: scan_root.clone() })?;
            let assets = find_assets_dir(&markdown, &scan_root);
            Ok::<_, ExtractionError>((markdown, assets))
        })
        .await
        .map_err(|e| ExtractionError::Worker(e.to_string()))??;

        info!(
            markdown = %markdown_path.display(),
            has_assets = assets_dir.is_some(),
            "Markdown extracted"
        );

        Ok(ExtractionResult {
            markdown_path,
            assets_dir,
            base_dir: output_dir,
        })
    }
}

/// Locate the Markdown artifact under `dir`.
///
/// Deterministic for a given tree. Symlink cycles are cut by tracking
/// visited canonical paths and depth is capped at [`MAX_DISCOVERY_DEPTH`].
pub fn discover_markdown(dir: &Path) -> Result<Option<PathBuf>, ExtractionError> {
    let mut visited = HashSet::new();
    search(dir, 0, &mut visited)
}

fn search(
    dir: &Path,
    depth: usize,
    visited: &mut HashSet<PathBuf>,
) -> Result<Option<PathBuf>, ExtractionError> {
    if depth > MAX_DISCOVERY_DEPTH {
        return Ok(None);
    }

    let canonical = dir.canonicalize().unwrap_or_else(|_| dir.to_path_buf());
    if !visited.insert(canonical) {
        return Ok(None);
    }

    let entries = sorted_entries(dir)?;

    if let Some(markdown) = entries.iter().find(|p| is_markdown(p) && p.is_file()) {
        return Ok(Some(markdown.clone()));
    }

    for subdir in entries.iter().filter(|p| p.is_dir()) {
        if let Some(name) = subdir.file_name() {
            let mut conventional = name.to_os_string();
            conventional.push(".md");
            let conventional = subdir.join(conventional);
            if conventional.is_file() {
                return Ok(Some(conventional));
            }
        }

        if let Some(found) = search(subdir, depth + 1, visited)? {
            return Ok(Some(found));
        }
    }

    Ok(None)
}

fn sorted_entries(dir: &Path) -> Result<Vec<PathBuf>, ExtractionError> {
    let read = fs::read_dir(dir).map_err(|source| ExtractionError::Scan {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut entries = Vec::new();
    for entry in read {
        let entry = entry.map_err(|source| ExtractionError::Scan {
            path: dir.to_path_buf(),
            source,
        })?;
        entries.push(entry.path());
    }
    entries.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(entries)
}

fn is_markdown(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.eq_ignore_ascii_case("md"))
        .unwrap_or(false)
}

/// `images/` beside the Markdown, else at the extraction root
pub fn find_assets_dir(markdown_path: &Path, base_dir: &Path) -> Option<PathBuf> {
    let beside = markdown_path
        .parent()
        .map(|parent| parent.join(ASSETS_DIR_NAME));

    beside
        .into_iter()
        .chain(std::iter::once(base_dir.join(ASSETS_DIR_NAME)))
        .find(|candidate| candidate.is_dir())
}
