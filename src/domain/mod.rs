//! Domain types for the conversion pipeline.
//!
//! This module contains the core data structures:
//! - Session: A run's identity and workspace layout
//! - Artifact: Stage results handed forward through the pipeline
//! - Events: Progress and terminal notifications
//! - Run: The run state machine and completion report

pub mod artifact;
pub mod events;
pub mod run;
pub mod session;

// Re-export commonly used types
pub use artifact::{BundleKind, ExtractionResult, PackageResult, TranslationResult};
pub use events::{PipelineEvent, Progress};
pub use run::{RunReport, RunState};
pub use session::Session;
