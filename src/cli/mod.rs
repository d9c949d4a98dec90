//! Command-line interface for enpdf2zhmd.
//!
//! Provides commands for converting PDFs, browsing and opening conversion
//! history, managing settings, and housekeeping.

use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};

use crate::adapters::{Extractor, MarkerExtractor};
use crate::config::{paths, Config};
use crate::core::{is_valid_pdf, Orchestrator, WorkspaceManager};
use crate::domain::BundleKind;
use crate::library::HistoryStore;

pub mod config;

/// enpdf2zhmd - Convert English PDFs into Chinese Markdown bundles
#[derive(Parser, Debug)]
#[command(name = "enpdf2zhmd")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Convert a PDF into a translated Markdown bundle
    Convert {
        /// PDF file to convert
        pdf: PathBuf,

        /// Directory receiving the bundle (default: ~/Documents/enPDF2zhMD_Output)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Bundle format (default: from config)
        #[arg(short, long, value_enum)]
        format: Option<FormatArg>,

        /// Keep the session workspace and unzipped bundle directory
        #[arg(long)]
        keep_temp: bool,

        /// Force OCR on every page
        #[arg(long)]
        force_ocr: bool,

        /// Skip image extraction
        #[arg(long)]
        no_images: bool,
    },

    /// List recent conversions
    History {
        /// Maximum number of entries to show
        #[arg(short, long, default_value = "10")]
        limit: usize,

        /// Remove all entries
        #[arg(long)]
        clear: bool,
    },

    /// Open the output of a history entry in the file browser
    Open {
        /// Entry index as shown by `history` (0 = newest)
        index: usize,
    },

    /// Show or change settings
    Config {
        #[command(subcommand)]
        command: config::ConfigCommands,
    },

    /// Remove stale session workspaces
    Clean {
        /// Remove workspaces older than this many days
        #[arg(long, default_value = "7")]
        max_age_days: u64,
    },

    /// Check the extractor and configuration
    Doctor,
}

/// Bundle format for CLI filtering
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum FormatArg {
    /// Single zip file
    #[value(alias = "zip")]
    Archive,

    /// Plain directory
    Directory,
}

impl From<FormatArg> for BundleKind {
    fn from(f: FormatArg) -> Self {
        match f {
            FormatArg::Archive => BundleKind::Archive,
            FormatArg::Directory => BundleKind::Directory,
        }
    }
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(self) -> Result<()> {
        match self.command {
            Commands::Convert {
                pdf,
                output,
                format,
                keep_temp,
                force_ocr,
                no_images,
            } => {
                let overrides = ConvertOverrides {
                    output,
                    format: format.map(BundleKind::from),
                    keep_temp,
                    force_ocr,
                    no_images,
                };
                convert(&pdf, overrides).await
            }
            Commands::History { limit, clear } => {
                if clear {
                    clear_history()
                } else {
                    list_history(limit)
                }
            }
            Commands::Open { index } => open_output(index),
            Commands::Config { command } => config::execute(command),
            Commands::Clean { max_age_days } => clean(max_age_days).await,
            Commands::Doctor => doctor().await,
        }
    }
}

/// Per-invocation overrides of the configured run options
#[derive(Debug, Default)]
struct ConvertOverrides {
    output: Option<PathBuf>,
    format: Option<BundleKind>,
    keep_temp: bool,
    force_ocr: bool,
    no_images: bool,
}

/// Convert a single PDF
async fn convert(pdf: &Path, overrides: ConvertOverrides) -> Result<()> {
    if !pdf.exists() {
        anyhow::bail!("File not found: {}", pdf.display());
    }
    if !is_valid_pdf(pdf) {
        anyhow::bail!("Not a valid PDF file: {}", pdf.display());
    }

    let config = Config::load_default()?;
    let mut options = config.run_options();

    if options.backend.api_key.trim().is_empty() {
        eprintln!("API key is not set.");
        eprintln!("  Run: enpdf2zhmd config set api.key <KEY>");
        eprintln!("  Or set {}", crate::config::API_KEY_ENV);
        std::process::exit(1);
    }

    if let Some(format) = overrides.format {
        options.output_format = format;
    }
    options.keep_temp_files |= overrides.keep_temp;
    options.extractor.force_ocr |= overrides.force_ocr;
    if overrides.no_images {
        options.extractor.extract_images = false;
    }

    let source = pdf
        .canonicalize()
        .with_context(|| format!("Failed to resolve path: {}", pdf.display()))?;

    eprintln!("Converting: {}", source.display());

    let orchestrator = Arc::new(Orchestrator::from_options(options)?);
    let result = orchestrator
        .spawn_to(source, overrides.output)
        .wait_with(|progress| eprintln!("[{:>3}%] {}", progress.percent, progress.message))
        .await;

    match result {
        Ok(report) => {
            println!("{}", report.package.output_path.display());
            eprintln!(
                "\n[Conversion of '{}' completed: {}]",
                report.file_name, report.package.kind
            );
            Ok(())
        }
        Err(e) => {
            eprintln!("\n[Conversion failed at {} stage]", e.stage());
            eprintln!("  Hint:  {}", e.hint());
            eprintln!("  Error: {}", e);
            std::process::exit(1);
        }
    }
}

/// List recent history entries
fn list_history(limit: usize) -> Result<()> {
    let store = HistoryStore::open_default()?;
    let entries = store.load()?;

    if entries.is_empty() {
        eprintln!("No conversions yet.");
        return Ok(());
    }

    println!(
        "{:<5} {:<20} {:<10} {:<30} OUTPUT",
        "#", "TIMESTAMP", "TYPE", "FILE"
    );
    println!("{}", "-".repeat(90));

    for (index, entry) in entries.iter().take(limit).enumerate() {
        let missing = if entry.output_path.exists() {
            ""
        } else {
            " (missing)"
        };
        println!(
            "{:<5} {:<20} {:<10} {:<30} {}{}",
            index,
            entry.timestamp,
            entry.output_type.to_string(),
            truncate(&entry.file_name, 28),
            entry.output_path.display(),
            missing
        );
    }

    if entries.len() > limit {
        eprintln!("\n({} more, use --limit to show)", entries.len() - limit);
    }

    Ok(())
}

fn clear_history() -> Result<()> {
    HistoryStore::open_default()?.clear()?;
    eprintln!("History cleared.");
    Ok(())
}

/// Open a history entry's output in the platform file browser
fn open_output(index: usize) -> Result<()> {
    let store = HistoryStore::open_default()?;
    let entry = store
        .get(index)?
        .with_context(|| format!("No history entry at index {}", index))?;

    if !entry.output_path.exists() {
        anyhow::bail!(
            "Output no longer exists: {}\nIt may have been moved or deleted.",
            entry.output_path.display()
        );
    }

    // Archives open their containing folder
    let target = if entry.output_path.is_file() {
        entry
            .output_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| entry.output_path.clone())
    } else {
        entry.output_path.clone()
    };

    let opener = file_browser_command();
    println!("Opening: {}", target.display());

    match Command::new(opener).arg(&target).status() {
        Ok(status) if status.success() => Ok(()),
        Ok(_) => {
            println!();
            println!("'{}' failed. You can manually open:", opener);
            println!("  {}", target.display());
            Ok(())
        }
        Err(_) => {
            println!();
            println!("'{}' not found in PATH.", opener);
            println!("To open manually:");
            println!("  {}", target.display());
            Ok(())
        }
    }
}

fn file_browser_command() -> &'static str {
    if cfg!(target_os = "windows") {
        "explorer"
    } else if cfg!(target_os = "macos") {
        "open"
    } else {
        "xdg-open"
    }
}

/// Sweep stale session workspaces
async fn clean(max_age_days: u64) -> Result<()> {
    let workspace = WorkspaceManager::from_default_root()?;
    let max_age = Duration::from_secs(max_age_days.saturating_mul(24 * 60 * 60));

    let removed = workspace.sweep_stale(max_age).await;
    eprintln!(
        "Removed {} stale workspace(s) from {}",
        removed,
        workspace.temp_root().display()
    );
    Ok(())
}

/// Report extractor availability and configuration sanity
async fn doctor() -> Result<()> {
    let config = Config::load_default()?;
    let options = config.run_options();
    let mut problems = 0;

    println!("Paths:");
    println!("  Home:        {}", paths::app_home()?.display());
    println!(
        "  Config:      {}",
        config
            .path()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(in memory)".to_string())
    );
    println!("  Temp root:   {}", paths::temp_root()?.display());
    println!(
        "  Output root: {}",
        options
            .output_dir
            .clone()
            .unwrap_or_else(paths::default_output_root)
            .display()
    );
    println!();

    let extractor = MarkerExtractor::with_binary_path(options.extractor.command.clone());
    println!("Extractor:");
    match extractor.health_check().await {
        Ok(()) => println!("  {}: ok", extractor.binary_path()),
        Err(e) => {
            problems += 1;
            println!("  {}: unavailable ({})", extractor.binary_path(), e);
            println!("  Install marker-pdf: pip install marker-pdf");
        }
    }
    println!();

    println!("Translation backend:");
    println!("  URL:     {}", options.backend.url);
    println!("  Model:   {}", options.backend.model);
    println!("  Timeout: {}s", options.backend.timeout.as_secs());
    if options.backend.api_key.trim().is_empty() {
        problems += 1;
        println!("  API key: not set");
    } else {
        println!("  API key: set");
    }
    println!();

    println!("Output format: {}", options.output_format);

    if problems > 0 {
        eprintln!("\n[{} problem(s) found]", problems);
        std::process::exit(1);
    }

    eprintln!("\n[All checks passed]");
    Ok(())
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", cut)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_convert_flags() {
        let cli = Cli::try_parse_from([
            "enpdf2zhmd",
            "convert",
            "paper.pdf",
            "-o",
            "/tmp/out",
            "--format",
            "zip",
            "--keep-temp",
            "--no-images",
        ])
        .unwrap();

        match cli.command {
            Commands::Convert {
                pdf,
                output,
                format,
                keep_temp,
                force_ocr,
                no_images,
            } => {
                assert_eq!(pdf, PathBuf::from("paper.pdf"));
                assert_eq!(output, Some(PathBuf::from("/tmp/out")));
                assert_eq!(format.map(BundleKind::from), Some(BundleKind::Archive));
                assert!(keep_temp);
                assert!(!force_ocr);
                assert!(no_images);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_truncate_counts_chars() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("一二三四五六七八", 6), "一二三...");
    }
}
