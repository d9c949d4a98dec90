//! Output bundle assembly.
//!
//! Layout of a bundle named `<base>_<timestamp>`:
//!
//! ```text
//! <base>_translated.md   translated Markdown
//! <base>.md              original Markdown (when still present)
//! <source>.pdf           source document (when still present)
//! *.png, *.jpeg, ...     extractor assets, flattened
//! ```
//!
//! In archive mode the directory is zipped with every entry under a single
//! top-level `<base>/` folder.

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use chrono::Local;
use glob::{MatchOptions, Pattern};
use tracing::{debug, info, instrument, warn};
use walkdir::WalkDir;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

use super::translate::TRANSLATED_PREFIX;
use super::workspace::WorkspaceManager;
use crate::config::RunOptions;
use crate::domain::artifact::file_stem;
use crate::domain::{BundleKind, ExtractionResult, PackageResult, Session, TranslationResult};
use crate::error::PackagingError;

/// Suffix of the translated Markdown inside a bundle
pub const TRANSLATED_SUFFIX: &str = "_translated";

/// Timestamp appended to bundle names
pub const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Extractor outputs never copied into a bundle, matched ignoring case
pub const EXCLUDED_PATTERNS: &[&str] = &["*.md", "*_meta.json"];

const EXCLUDE_MATCH: MatchOptions = MatchOptions {
    case_sensitive: false,
    require_literal_separator: false,
    require_literal_leading_dot: false,
};

/// Everything the blocking assembly needs, owned so it can cross threads
#[derive(Debug, Clone)]
pub struct BundlePlan {
    pub output_root: PathBuf,
    pub base_name: String,
    pub timestamp: String,
    pub translated_path: PathBuf,
    pub original_markdown: PathBuf,
    pub source: Option<PathBuf>,
    pub extraction_root: PathBuf,
    pub kind: BundleKind,
    pub keep_temp_files: bool,
}

impl BundlePlan {
    /// Build a plan from stage results, stamped with the current local time
    pub fn new(
        output_root: PathBuf,
        extraction: &ExtractionResult,
        translation: &TranslationResult,
        source: Option<&Path>,
        options: &RunOptions,
    ) -> Self {
        Self {
            output_root,
            base_name: base_name_for(&translation.translated_path, extraction),
            timestamp: Local::now().format(TIMESTAMP_FORMAT).to_string(),
            translated_path: translation.translated_path.clone(),
            original_markdown: extraction.markdown_path.clone(),
            source: source.map(Path::to_path_buf),
            extraction_root: extraction.base_dir.clone(),
            kind: options.output_format,
            keep_temp_files: options.keep_temp_files,
        }
    }
}

/// Bundle base name: translated stem minus the `zh_` prefix
pub fn base_name_for(translated_path: &Path, extraction: &ExtractionResult) -> String {
    let stem = file_stem(translated_path);
    let base = stem.strip_prefix(TRANSLATED_PREFIX).unwrap_or(&stem);
    if base.is_empty() {
        extraction.document_stem()
    } else {
        base.to_string()
    }
}

/// Assembles bundles and releases the session afterwards
pub struct PackagingStage {
    workspace: WorkspaceManager,
    default_output_root: PathBuf,
}

impl PackagingStage {
    pub fn new(workspace: WorkspaceManager, default_output_root: impl Into<PathBuf>) -> Self {
        Self {
            workspace,
            default_output_root: default_output_root.into(),
        }
    }

    /// Assemble the bundle, then destroy the session unless temp files are kept
    #[instrument(skip_all, fields(session_id = %session.id, kind = %options.output_format))]
    pub async fn package(
        &self,
        session: &Session,
        extraction: &ExtractionResult,
        translation: &TranslationResult,
        source: Option<&Path>,
        options: &RunOptions,
        destination_override: Option<&Path>,
    ) -> Result<PackageResult, PackagingError> {
        let output_root = destination_override
            .map(Path::to_path_buf)
            .or_else(|| options.output_dir.clone())
            .unwrap_or_else(|| self.default_output_root.clone());

        let plan = BundlePlan::new(output_root, extraction, translation, source, options);

        let result = tokio::task::spawn_blocking(move || build_bundle(&plan))
            .await
            .map_err(|e| PackagingError::Worker(e.to_string()))??;

        if options.keep_temp_files {
            info!(root = %session.root.display(), "Keeping session workspace");
        } else if let Err(e) = self.workspace.destroy_session(session).await {
            warn!(error = %e, "Failed to clean up session workspace");
        }

        Ok(result)
    }
}

/// Assemble a bundle on the current thread
pub fn build_bundle(plan: &BundlePlan) -> Result<PackageResult, PackagingError> {
    fs::create_dir_all(&plan.output_root).map_err(|source| PackagingError::CreateDir {
        path: plan.output_root.clone(),
        source,
    })?;

    let bundle_dir = create_unique_bundle_dir(plan)?;
    debug!(bundle = %bundle_dir.display(), "Created bundle directory");

    copy_file(
        &plan.translated_path,
        &bundle_dir.join(format!("{}{}.md", plan.base_name, TRANSLATED_SUFFIX)),
    )?;

    if plan.original_markdown.is_file() {
        copy_file(
            &plan.original_markdown,
            &bundle_dir.join(format!("{}.md", plan.base_name)),
        )?;
    }

    if let Some(source) = plan.source.as_deref().filter(|s| s.is_file()) {
        if let Some(name) = source.file_name() {
            copy_file(source, &bundle_dir.join(name))?;
        }
    }

    let assets = copy_assets(plan, &bundle_dir)?;
    debug!(assets, "Copied extractor assets");

    match plan.kind {
        BundleKind::Directory => {
            info!(output = %bundle_dir.display(), "Bundle ready");
            Ok(PackageResult {
                output_path: bundle_dir,
                kind: BundleKind::Directory,
            })
        }
        BundleKind::Archive => {
            let zip_path = archive_path_for(&bundle_dir);
            write_archive(&bundle_dir, &zip_path, &plan.base_name)?;

            if !plan.keep_temp_files {
                fs::remove_dir_all(&bundle_dir).map_err(|source| PackagingError::RemoveBundle {
                    path: bundle_dir.clone(),
                    source,
                })?;
            }

            info!(output = %zip_path.display(), "Archive ready");
            Ok(PackageResult {
                output_path: zip_path,
                kind: BundleKind::Archive,
            })
        }
    }
}

fn archive_path_for(bundle_dir: &Path) -> PathBuf {
    let mut name = bundle_dir.as_os_str().to_os_string();
    name.push(".zip");
    PathBuf::from(name)
}

/// `<root>/<base>_<ts>`, or `<root>/<base>_<ts>-N` when taken
fn create_unique_bundle_dir(plan: &BundlePlan) -> Result<PathBuf, PackagingError> {
    let stem = format!("{}_{}", plan.base_name, plan.timestamp);
    let mut suffix = 1u32;

    loop {
        let name = if suffix == 1 {
            stem.clone()
        } else {
            format!("{}-{}", stem, suffix)
        };
        let candidate = plan.output_root.join(name);

        let archive_taken =
            plan.kind == BundleKind::Archive && archive_path_for(&candidate).exists();
        if !archive_taken {
            match fs::create_dir(&candidate) {
                Ok(()) => return Ok(candidate),
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {}
                Err(source) => {
                    return Err(PackagingError::CreateDir {
                        path: candidate,
                        source,
                    })
                }
            }
        }

        suffix += 1;
    }
}

/// Copy non-excluded files under the extraction root into the bundle root
fn copy_assets(plan: &BundlePlan, bundle_dir: &Path) -> Result<usize, PackagingError> {
    if !plan.extraction_root.is_dir() {
        return Ok(0);
    }

    let excluded = exclusion_patterns();
    let translated_name = plan.translated_path.file_name();
    let mut copied = 0;

    for entry in WalkDir::new(&plan.extraction_root).sort_by_file_name() {
        let entry = entry.map_err(|source| PackagingError::Walk {
            path: plan.extraction_root.clone(),
            source,
        })?;
        if !entry.file_type().is_file() {
            continue;
        }

        let name = entry.file_name();
        let name_str = name.to_string_lossy();
        let excluded_name = excluded
            .iter()
            .any(|p| p.matches_with(&name_str, EXCLUDE_MATCH));
        if Some(name) == translated_name || excluded_name {
            continue;
        }

        copy_file(entry.path(), &bundle_dir.join(name))?;
        copied += 1;
    }

    Ok(copied)
}

fn exclusion_patterns() -> Vec<Pattern> {
    EXCLUDED_PATTERNS
        .iter()
        .filter_map(|p| Pattern::new(p).ok())
        .collect()
}

fn copy_file(from: &Path, to: &Path) -> Result<(), PackagingError> {
    fs::copy(from, to).map_err(|source| PackagingError::Copy {
        from: from.to_path_buf(),
        to: to.to_path_buf(),
        source,
    })?;
    Ok(())
}

/// Zip `bundle_dir` into `zip_path`, nesting every entry under `prefix/`
fn write_archive(bundle_dir: &Path, zip_path: &Path, prefix: &str) -> Result<(), PackagingError> {
    let archive_err = |message: String| PackagingError::Archive {
        path: zip_path.to_path_buf(),
        message,
    };

    let file = File::create(zip_path).map_err(|e| archive_err(e.to_string()))?;
    let mut zip = ZipWriter::new(file);
    let options = FileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .unix_permissions(0o644);
    let dir_options = FileOptions::default().unix_permissions(0o755);

    zip.add_directory(format!("{}/", prefix), dir_options)
        .map_err(|e| archive_err(e.to_string()))?;

    for entry in WalkDir::new(bundle_dir).min_depth(1).sort_by_file_name() {
        let entry = entry.map_err(|source| PackagingError::Walk {
            path: bundle_dir.to_path_buf(),
            source,
        })?;

        let relative = entry
            .path()
            .strip_prefix(bundle_dir)
            .map_err(|e| archive_err(e.to_string()))?;
        let entry_name = archive_entry_name(prefix, relative);

        if entry.file_type().is_dir() {
            zip.add_directory(format!("{}/", entry_name), dir_options)
                .map_err(|e| archive_err(e.to_string()))?;
            continue;
        }

        zip.start_file(entry_name, options)
            .map_err(|e| archive_err(e.to_string()))?;
        let mut input = File::open(entry.path()).map_err(|e| archive_err(e.to_string()))?;
        io::copy(&mut input, &mut zip).map_err(|e| archive_err(e.to_string()))?;
    }

    zip.finish().map_err(|e| archive_err(e.to_string()))?;
    Ok(())
}

/// Forward-slash entry name regardless of platform separator
fn archive_entry_name(prefix: &str, relative: &Path) -> String {
    let mut name = prefix.to_string();
    for component in relative.components() {
        name.push('/');
        name.push_str(&component.as_os_str().to_string_lossy());
    }
    name
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use tempfile::TempDir;

    struct Fixture {
        _temp: TempDir,
        plan: BundlePlan,
    }

    /// Session-like tree: markdown/paper/{paper.md, paper_meta.json, images/fig1.png}
    fn fixture(kind: BundleKind, keep_temp_files: bool) -> Fixture {
        let temp = TempDir::new().unwrap();
        let root = temp.path();

        let md_root = root.join("session").join("markdown");
        let doc = md_root.join("paper");
        fs::create_dir_all(doc.join("images")).unwrap();
        fs::write(doc.join("paper.md"), "# Paper").unwrap();
        fs::write(doc.join("paper_meta.json"), "{}").unwrap();
        fs::write(doc.join("images").join("fig1.png"), b"png").unwrap();
        fs::write(doc.join("table.jpeg"), b"jpeg").unwrap();

        let translated = root.join("session").join("translated").join("zh_paper.md");
        fs::create_dir_all(translated.parent().unwrap()).unwrap();
        fs::write(&translated, "# 论文").unwrap();

        let source = root.join("paper.pdf");
        fs::write(&source, b"%PDF-1.4").unwrap();

        let plan = BundlePlan {
            output_root: root.join("out"),
            base_name: "paper".to_string(),
            timestamp: "20240101_120000".to_string(),
            translated_path: translated,
            original_markdown: doc.join("paper.md"),
            source: Some(source),
            extraction_root: md_root,
            kind,
            keep_temp_files,
        };

        Fixture { _temp: temp, plan }
    }

    fn names_in(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn test_base_name_strips_prefix() {
        let extraction = ExtractionResult {
            markdown_path: PathBuf::from("/s/markdown/paper/paper.md"),
            assets_dir: None,
            base_dir: PathBuf::from("/s/markdown"),
        };
        assert_eq!(
            base_name_for(Path::new("/s/translated/zh_paper.md"), &extraction),
            "paper"
        );
        assert_eq!(
            base_name_for(Path::new("/s/translated/notes.md"), &extraction),
            "notes"
        );
        assert_eq!(
            base_name_for(Path::new("/s/translated/zh_.md"), &extraction),
            "paper"
        );
    }

    #[test]
    fn test_directory_bundle_contents() {
        let fx = fixture(BundleKind::Directory, false);
        let result = build_bundle(&fx.plan).unwrap();

        assert_eq!(result.kind, BundleKind::Directory);
        assert_eq!(
            result.output_path,
            fx.plan.output_root.join("paper_20240101_120000")
        );
        assert_eq!(
            names_in(&result.output_path),
            vec![
                "fig1.png",
                "paper.md",
                "paper.pdf",
                "paper_translated.md",
                "table.jpeg"
            ]
        );
        assert_eq!(
            fs::read_to_string(result.output_path.join("paper_translated.md")).unwrap(),
            "# 论文"
        );
    }

    #[test]
    fn test_bundle_name_collision_gets_suffix() {
        let fx = fixture(BundleKind::Directory, false);
        let first = build_bundle(&fx.plan).unwrap();
        let second = build_bundle(&fx.plan).unwrap();

        assert_ne!(first.output_path, second.output_path);
        assert!(second
            .output_path
            .to_string_lossy()
            .ends_with("paper_20240101_120000-2"));
    }

    #[test]
    fn test_missing_original_and_source_are_skipped() {
        let mut fx = fixture(BundleKind::Directory, false);
        fs::remove_file(&fx.plan.original_markdown).unwrap();
        fx.plan.source = None;

        let result = build_bundle(&fx.plan).unwrap();
        let names = names_in(&result.output_path);
        assert!(!names.contains(&"paper.md".to_string()));
        assert!(!names.contains(&"paper.pdf".to_string()));
        assert!(names.contains(&"paper_translated.md".to_string()));
    }

    #[test]
    fn test_archive_nests_entries_and_removes_dir() {
        let fx = fixture(BundleKind::Archive, false);
        let result = build_bundle(&fx.plan).unwrap();

        assert_eq!(result.kind, BundleKind::Archive);
        assert_eq!(
            result.output_path,
            fx.plan.output_root.join("paper_20240101_120000.zip")
        );
        assert!(!fx.plan.output_root.join("paper_20240101_120000").exists());

        let mut archive = zip::ZipArchive::new(File::open(&result.output_path).unwrap()).unwrap();
        for i in 0..archive.len() {
            let name = archive.by_index(i).unwrap().name().to_string();
            assert!(name.starts_with("paper/"), "entry outside prefix: {name}");
        }

        let mut translated = String::new();
        archive
            .by_name("paper/paper_translated.md")
            .unwrap()
            .read_to_string(&mut translated)
            .unwrap();
        assert_eq!(translated, "# 论文");
        assert!(archive.by_name("paper/fig1.png").is_ok());
        assert!(archive.by_name("paper/paper_meta.json").is_err());
    }

    #[test]
    fn test_archive_directories_are_traversable() {
        let fx = fixture(BundleKind::Archive, false);
        let result = build_bundle(&fx.plan).unwrap();

        let mut archive = zip::ZipArchive::new(File::open(&result.output_path).unwrap()).unwrap();
        let dir = archive.by_name("paper/").unwrap();
        assert!(dir.is_dir());
        let mode = dir.unix_mode().unwrap();
        assert_eq!(mode & 0o777, 0o755);
        drop(dir);

        let file = archive.by_name("paper/paper_translated.md").unwrap();
        assert_eq!(file.unix_mode().unwrap() & 0o777, 0o644);
    }

    #[test]
    fn test_uppercase_markdown_extension_is_not_duplicated() {
        let mut fx = fixture(BundleKind::Directory, false);
        let doc = fx.plan.extraction_root.join("paper");
        let upper = doc.join("paper.MD");
        fs::rename(doc.join("paper.md"), &upper).unwrap();
        fs::write(doc.join("paper_META.json"), "{}").unwrap();
        fx.plan.original_markdown = upper;

        let result = build_bundle(&fx.plan).unwrap();
        assert_eq!(
            names_in(&result.output_path),
            vec![
                "fig1.png",
                "paper.md",
                "paper.pdf",
                "paper_translated.md",
                "table.jpeg"
            ]
        );
    }

    #[test]
    fn test_archive_keeps_dir_when_requested() {
        let fx = fixture(BundleKind::Archive, true);
        let result = build_bundle(&fx.plan).unwrap();

        assert!(result.output_path.is_file());
        assert!(fx.plan.output_root.join("paper_20240101_120000").is_dir());
    }

    #[test]
    fn test_unwritable_root_is_create_dir_error() {
        let mut fx = fixture(BundleKind::Directory, false);
        let blocker = fx.plan.output_root.with_file_name("blocker");
        fs::write(&blocker, "x").unwrap();
        fx.plan.output_root = blocker.join("out");

        let err = build_bundle(&fx.plan).unwrap_err();
        assert!(matches!(err, PackagingError::CreateDir { .. }));
    }

    #[test]
    fn test_archive_entry_name_uses_forward_slashes() {
        let rel = Path::new("images").join("fig.png");
        assert_eq!(archive_entry_name("paper", &rel), "paper/images/fig.png");
    }
}
