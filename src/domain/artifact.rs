//! Artifacts handed from one pipeline stage to the next.
//!
//! Each stage produces exactly one of these results; later stages consume
//! them by path and never reach back into an earlier stage's internals.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Output of the extraction stage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionResult {
    /// The single authoritative Markdown file
    pub markdown_path: PathBuf,

    /// `images/` directory, if the extractor produced one
    pub assets_dir: Option<PathBuf>,

    /// Root of the extractor output tree (`<session>/markdown`)
    pub base_dir: PathBuf,
}

impl ExtractionResult {
    /// Stem of the discovered Markdown file (e.g. `paper` for `paper.md`)
    pub fn document_stem(&self) -> String {
        file_stem(&self.markdown_path)
    }
}

/// Output of the translation stage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranslationResult {
    /// Translated Markdown, `<session>/translated/zh_<name>`
    pub translated_path: PathBuf,

    /// Length of the translated text in characters
    pub char_count: usize,
}

/// Kind of bundle delivered to the user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BundleKind {
    /// Single zip file
    #[serde(alias = "zip")]
    Archive,

    /// Plain directory
    Directory,
}

impl fmt::Display for BundleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Archive => f.write_str("archive"),
            Self::Directory => f.write_str("directory"),
        }
    }
}

/// Output of the packaging stage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageResult {
    /// Final bundle location (zip file or directory)
    pub output_path: PathBuf,

    /// Which of the two bundle kinds was produced
    pub kind: BundleKind,
}

/// File stem as an owned string, empty when the path has none
pub(crate) fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_stem() {
        let result = ExtractionResult {
            markdown_path: PathBuf::from("/tmp/s/markdown/paper/paper.md"),
            assets_dir: None,
            base_dir: PathBuf::from("/tmp/s/markdown"),
        };
        assert_eq!(result.document_stem(), "paper");
    }

    #[test]
    fn test_bundle_kind_serialization() {
        assert_eq!(serde_json::to_string(&BundleKind::Archive).unwrap(), "\"archive\"");
        let parsed: BundleKind = serde_json::from_str("\"directory\"").unwrap();
        assert_eq!(parsed, BundleKind::Directory);
        let legacy: BundleKind = serde_json::from_str("\"zip\"").unwrap();
        assert_eq!(legacy, BundleKind::Archive);
        assert_eq!(BundleKind::Archive.to_string(), "archive");
    }
}
