//! Events emitted by a running pipeline.
//!
//! A run emits zero or more [`PipelineEvent::Progress`] events with strictly
//! increasing percentages, followed by exactly one terminal event.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::run::{RunReport, RunState};
use crate::error::PipelineError;

/// Progress checkpoint, emitted on entering a state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progress {
    /// State being entered
    pub state: RunState,

    /// Completion percentage (0-100)
    pub percent: u8,

    /// Human-readable phase description
    pub message: String,

    /// When the checkpoint was reached
    pub timestamp: DateTime<Utc>,
}

impl Progress {
    /// Checkpoint for entering `state`
    pub fn entering(state: RunState) -> Self {
        Self {
            state,
            percent: state.percent(),
            message: state.description().to_string(),
            timestamp: Utc::now(),
        }
    }
}

/// Event delivered to the caller of a pipeline run
#[derive(Debug)]
pub enum PipelineEvent {
    /// The run entered a new state
    Progress(Progress),

    /// Terminal: the run completed
    Completed(RunReport),

    /// Terminal: a stage failed; carries that stage's error untouched
    Failed(PipelineError),
}

impl PipelineEvent {
    /// Whether this is one of the two terminal events
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Progress(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_entering() {
        let p = Progress::entering(RunState::Translating);
        assert_eq!(p.percent, 40);
        assert_eq!(p.state, RunState::Translating);
        assert!(!p.message.is_empty());
    }

    #[test]
    fn test_progress_serialization() {
        let p = Progress::entering(RunState::Packaging);
        let json = serde_json::to_string(&p).unwrap();
        let parsed: Progress = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.state, RunState::Packaging);
        assert_eq!(parsed.percent, 80);
    }

    #[test]
    fn test_terminal_events() {
        assert!(!PipelineEvent::Progress(Progress::entering(RunState::Extracting)).is_terminal());
        let failed = PipelineEvent::Failed(PipelineError::from(
            crate::error::TranslationError::EmptyResponse,
        ));
        assert!(failed.is_terminal());
    }
}
