//! enpdf2zhmd - English PDF to Chinese Markdown converter
//!
//! Turns a PDF into a self-contained bundle holding the translated Markdown,
//! the original Markdown, the source PDF and the extracted images.
//!
//! # Architecture
//!
//! A run is a strictly sequential pipeline over an isolated workspace:
//! - Extraction: `marker_single` converts the PDF into Markdown + images
//! - Translation: one chat completion call translates the Markdown
//! - Packaging: results are bundled into a directory or zip archive
//!
//! Progress and the terminal result travel over a typed event channel.
//!
//! # Modules
//!
//! - `adapters`: External system integrations (marker, OpenAI-compatible API)
//! - `core`: Stages, workspaces and the orchestrator
//! - `domain`: Data structures (Session, artifacts, events, run state)
//! - `library`: Conversion history
//! - `cli`: Command-line interface
//!
//! # Usage
//!
//! ```bash
//! # Convert a PDF
//! enpdf2zhmd convert paper.pdf
//!
//! # List and open previous conversions
//! enpdf2zhmd history
//! enpdf2zhmd open 0
//! ```

pub mod adapters;
pub mod cli;
pub mod config;
pub mod core;
pub mod domain;
pub mod error;
pub mod library;
pub mod persist;

// Re-export main types at crate root for convenience
pub use crate::config::{Config, RunOptions};
pub use crate::core::{Orchestrator, RunHandle, WorkspaceManager};
pub use domain::{BundleKind, PipelineEvent, Progress, RunReport, RunState, Session};
pub use error::{PipelineError, Stage};
pub use library::{HistoryEntry, HistoryStore};
