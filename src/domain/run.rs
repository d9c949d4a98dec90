//! Run state machine and the report of a completed run.
//!
//! A run moves strictly forward:
//! `Idle → Extracting → Translating → Packaging → {Completed | Failed}`.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::artifact::PackageResult;
use crate::error::Stage;

/// State of a pipeline run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum RunState {
    /// Not started yet
    Idle,

    /// Running the external extractor
    Extracting,

    /// Waiting on the translation backend
    Translating,

    /// Assembling the output bundle
    Packaging,

    /// Finished successfully
    Completed,

    /// Stopped by a stage failure
    Failed { stage: Stage },
}

impl Default for RunState {
    fn default() -> Self {
        Self::Idle
    }
}

impl RunState {
    /// Completion percentage reported on entering this state
    pub fn percent(&self) -> u8 {
        match self {
            Self::Idle => 0,
            Self::Extracting => 10,
            Self::Translating => 40,
            Self::Packaging => 80,
            Self::Completed => 100,
            Self::Failed { .. } => 100,
        }
    }

    /// Human-readable phase description
    pub fn description(&self) -> &'static str {
        match self {
            Self::Idle => "Ready",
            Self::Extracting => "Converting PDF to Markdown...",
            Self::Translating => "Translating Markdown content...",
            Self::Packaging => "Packaging results...",
            Self::Completed => "Conversion complete",
            Self::Failed { .. } => "Conversion failed",
        }
    }

    /// Whether the run has reached a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed { .. })
    }

    /// Whether `next` is a legal successor of this state
    pub fn can_advance_to(&self, next: RunState) -> bool {
        match (self, next) {
            (Self::Idle, Self::Extracting) => true,
            (Self::Extracting, Self::Translating) => true,
            (Self::Translating, Self::Packaging) => true,
            (Self::Packaging, Self::Completed) => true,
            (current, Self::Failed { .. }) => !current.is_terminal(),
            _ => false,
        }
    }
}

/// Metadata of a successfully completed run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReport {
    /// Session that produced the bundle
    pub session_id: Uuid,

    /// Source document the run started from
    pub source: PathBuf,

    /// Source file name without extension
    pub file_name: String,

    /// The delivered bundle
    pub package: PackageResult,

    /// When the run completed
    pub completed_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_linear_transitions() {
        assert!(RunState::Idle.can_advance_to(RunState::Extracting));
        assert!(RunState::Extracting.can_advance_to(RunState::Translating));
        assert!(RunState::Translating.can_advance_to(RunState::Packaging));
        assert!(RunState::Packaging.can_advance_to(RunState::Completed));

        // No skipping, no going back
        assert!(!RunState::Idle.can_advance_to(RunState::Translating));
        assert!(!RunState::Packaging.can_advance_to(RunState::Extracting));
        assert!(!RunState::Completed.can_advance_to(RunState::Failed {
            stage: Stage::Packaging
        }));
        assert!(RunState::Translating.can_advance_to(RunState::Failed {
            stage: Stage::Translation
        }));
    }

    #[test]
    fn test_percentages_increase_along_the_happy_path() {
        let path = [
            RunState::Extracting,
            RunState::Translating,
            RunState::Packaging,
            RunState::Completed,
        ];
        for pair in path.windows(2) {
            assert!(pair[0].percent() < pair[1].percent());
        }
    }
}
