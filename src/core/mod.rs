//! Core orchestration logic.
//!
//! This module contains:
//! - Workspace: Per-run isolated directories
//! - Extract: PDF → Markdown stage and artifact discovery
//! - Translate: Markdown → Chinese Markdown stage
//! - Package: Bundle assembly and archiving
//! - Orchestrator: Main execution engine

pub mod extract;
pub mod orchestrator;
pub mod package;
pub mod translate;
pub mod workspace;

// Re-export commonly used types
pub use extract::{discover_markdown, is_valid_pdf, ExtractionStage};
pub use orchestrator::{Orchestrator, RunHandle};
pub use package::PackagingStage;
pub use translate::TranslationStage;
pub use workspace::WorkspaceManager;
