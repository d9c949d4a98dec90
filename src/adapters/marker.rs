//! marker-pdf adapter.
//!
//! Runs the `marker_single` CLI as a subprocess:
//! `marker_single <pdf> --output_dir <dir> [--force_ocr] [--disable_image_extraction]`.
//! The CLI picks its own layout under the output directory, usually
//! `<dir>/<stem>/<stem>.md` plus an `images/` folder.

use std::ffi::OsString;
use std::path::Path;
use std::process::Stdio;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use super::{Extractor, ExtractorOutput};
use crate::config::{ExtractorOptions, DEFAULT_EXTRACTOR_COMMAND};
use crate::error::ExtractionError;

/// Extractor backed by the marker-pdf CLI
pub struct MarkerExtractor {
    /// Path to the marker binary (default: "marker_single")
    binary_path: String,
}

impl Default for MarkerExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl MarkerExtractor {
    /// Create an extractor using `marker_single` from PATH
    pub fn new() -> Self {
        Self::with_binary_path(DEFAULT_EXTRACTOR_COMMAND)
    }

    /// Create an extractor with a custom binary path
    pub fn with_binary_path(binary_path: impl Into<String>) -> Self {
        Self {
            binary_path: binary_path.into(),
        }
    }

    /// The binary this extractor invokes
    pub fn binary_path(&self) -> &str {
        &self.binary_path
    }

    /// Command-line arguments for one conversion
    pub fn build_args(
        source: &Path,
        output_dir: &Path,
        options: &ExtractorOptions,
    ) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![
            source.as_os_str().to_owned(),
            "--output_dir".into(),
            output_dir.as_os_str().to_owned(),
        ];

        if options.force_ocr {
            args.push("--force_ocr".into());
        }
        if !options.extract_images {
            args.push("--disable_image_extraction".into());
        }

        args
    }
}

#[async_trait]
impl Extractor for MarkerExtractor {
    fn name(&self) -> &str {
        "marker"
    }

    async fn convert(
        &self,
        source: &Path,
        output_dir: &Path,
        options: &ExtractorOptions,
    ) -> Result<ExtractorOutput, ExtractionError> {
        let args = Self::build_args(source, output_dir, options);
        debug!(binary = %self.binary_path, ?args, "Running extractor");

        let output = Command::new(&self.binary_path)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|source| ExtractionError::Spawn {
                command: self.binary_path.clone(),
                source,
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

        if !output.status.success() {
            // Prefer stderr; some marker versions report failures on stdout only
            let diagnostic = if stderr.trim().is_empty() {
                stdout.trim()
            } else {
                stderr.trim()
            };
            return Err(ExtractionError::Failed {
                status: output.status.code(),
                output: diagnostic.to_string(),
            });
        }

        Ok(ExtractorOutput { stdout, stderr })
    }

    async fn health_check(&self) -> Result<()> {
        let output = Command::new(&self.binary_path)
            .arg("--help")
            .stdin(Stdio::null())
            .output()
            .await
            .with_context(|| format!("Failed to run {} --help", self.binary_path))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("{} health check failed: {}", self.binary_path, stderr.trim());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args_as_strings(args: Vec<OsString>) -> Vec<String> {
        args.into_iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn test_default_binary() {
        let extractor = MarkerExtractor::new();
        assert_eq!(extractor.binary_path(), "marker_single");
        assert_eq!(extractor.name(), "marker");
    }

    #[test]
    fn test_build_args_defaults() {
        let args = MarkerExtractor::build_args(
            Path::new("/docs/paper.pdf"),
            Path::new("/tmp/s/markdown"),
            &ExtractorOptions::default(),
        );
        assert_eq!(
            args_as_strings(args),
            vec!["/docs/paper.pdf", "--output_dir", "/tmp/s/markdown"]
        );
    }

    #[test]
    fn test_build_args_with_flags() {
        let options = ExtractorOptions {
            force_ocr: true,
            extract_images: false,
            ..ExtractorOptions::default()
        };
        let args = args_as_strings(MarkerExtractor::build_args(
            Path::new("a.pdf"),
            Path::new("out"),
            &options,
        ));
        assert!(args.contains(&"--force_ocr".to_string()));
        assert!(args.contains(&"--disable_image_extraction".to_string()));
    }

    #[tokio::test]
    async fn test_missing_binary_is_spawn_error() {
        let extractor = MarkerExtractor::with_binary_path("/nonexistent/marker_single_xyz");
        let err = extractor
            .convert(
                Path::new("a.pdf"),
                Path::new("out"),
                &ExtractorOptions::default(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ExtractionError::Spawn { .. }));

        assert!(extractor.health_check().await.is_err());
    }
}
