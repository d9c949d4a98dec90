//! Error taxonomy for the conversion pipeline.
//!
//! Every stage owns detection and classification of its own failures and
//! returns one of the tagged enums below. The orchestrator wraps the first
//! failure in a [`PipelineError`] and forwards it untouched.

use std::fmt;
use std::io;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failures creating or destroying session workspaces
#[derive(Debug, Error)]
pub enum ResourceError {
    #[error("Failed to create session workspace {}: {source}", .path.display())]
    CreateWorkspace {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to create workspace directory {}: {source}", .path.display())]
    CreateSubdir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to remove session workspace {}: {source}", .path.display())]
    DestroyWorkspace {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Failures of the PDF → Markdown stage
#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("Failed to start extractor '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },

    #[error("Extractor exited with status {}: {output}", describe_status(.status))]
    Failed { status: Option<i32>, output: String },

    #[error("Failed to scan extractor output {}: {source}", .path.display())]
    Scan {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Markdown artifact not found under {}", .dir.display())]
    ArtifactNotFound { dir: PathBuf },

    #[error("Artifact discovery stopped unexpectedly: {0}")]
    Worker(String),

    #[error(transparent)]
    Resource(#[from] ResourceError),
}

fn describe_status(status: &Option<i32>) -> String {
    match status {
        Some(code) => code.to_string(),
        None => "signal".to_string(),
    }
}

/// Diagnostic class of a backend failure.
///
/// Used only to pick a friendlier hint; never changes control flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendErrorKind {
    /// Quota exhausted or insufficient balance
    Quota,

    /// Missing or rejected credentials
    Auth,

    /// Request exceeded the call timeout
    Timeout,

    /// Anything else
    Other,
}

impl BackendErrorKind {
    /// Classify a raw diagnostic by well-known substrings
    pub fn classify(message: &str) -> Self {
        let lower = message.to_lowercase();

        if lower.contains("quota") || lower.contains("insufficient") {
            Self::Quota
        } else if lower.contains("authentication")
            || lower.contains("api key")
            || lower.contains("unauthorized")
            || lower.contains("401")
        {
            Self::Auth
        } else if lower.contains("timeout") || lower.contains("timed out") {
            Self::Timeout
        } else {
            Self::Other
        }
    }
}

impl fmt::Display for BackendErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Quota => "quota",
            Self::Auth => "auth",
            Self::Timeout => "timeout",
            Self::Other => "other",
        };
        f.write_str(s)
    }
}

/// Error returned by a completion backend
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct BackendError {
    pub kind: BackendErrorKind,
    pub message: String,
}

impl BackendError {
    /// Build an error, classifying it from its message
    pub fn new(message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            kind: BackendErrorKind::classify(&message),
            message,
        }
    }

    /// Build an error with an explicit class
    pub fn with_kind(kind: BackendErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// Failures of the Markdown translation stage
#[derive(Debug, Error)]
pub enum TranslationError {
    #[error("Failed to read source markdown {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Translation backend failed ({kind}): {message}")]
    Backend {
        kind: BackendErrorKind,
        message: String,
    },

    #[error("Translation backend returned an empty or malformed response")]
    EmptyResponse,

    #[error("Failed to write translated markdown {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Resource(#[from] ResourceError),
}

impl From<BackendError> for TranslationError {
    fn from(e: BackendError) -> Self {
        Self::Backend {
            kind: e.kind,
            message: e.message,
        }
    }
}

/// Failures assembling the output bundle
#[derive(Debug, Error)]
pub enum PackagingError {
    #[error("Failed to create bundle directory {}: {source}", .path.display())]
    CreateDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to copy {} -> {}: {source}", .from.display(), .to.display())]
    Copy {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to walk extraction output {}: {source}", .path.display())]
    Walk {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },

    #[error("Failed to write archive {}: {message}", .path.display())]
    Archive { path: PathBuf, message: String },

    #[error("Failed to remove bundle directory {}: {source}", .path.display())]
    RemoveBundle {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Packaging worker stopped unexpectedly: {0}")]
    Worker(String),
}

/// Pipeline stage a failure originated from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Workspace,
    Extraction,
    Translation,
    Packaging,

    /// The run's worker task itself
    Orchestrator,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Workspace => "workspace",
            Self::Extraction => "extraction",
            Self::Translation => "translation",
            Self::Packaging => "packaging",
            Self::Orchestrator => "orchestrator",
        };
        f.write_str(s)
    }
}

/// Terminal error of a pipeline run, tagged by originating stage
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Workspace error: {0}")]
    Resource(#[from] ResourceError),

    #[error("PDF extraction failed: {0}")]
    Extraction(#[from] ExtractionError),

    #[error("Translation failed: {0}")]
    Translation(#[from] TranslationError),

    #[error("Packaging failed: {0}")]
    Packaging(#[from] PackagingError),

    #[error("Pipeline worker stopped before reporting a result: {0}")]
    Interrupted(String),
}

impl PipelineError {
    /// Stage that produced this error
    pub fn stage(&self) -> Stage {
        match self {
            Self::Resource(_) => Stage::Workspace,
            Self::Extraction(_) => Stage::Extraction,
            Self::Translation(_) => Stage::Translation,
            Self::Packaging(_) => Stage::Packaging,
            Self::Interrupted(_) => Stage::Orchestrator,
        }
    }

    /// One-line actionable hint shown next to the raw diagnostic
    pub fn hint(&self) -> &'static str {
        match self {
            Self::Resource(_) => "Check that the temp directory is writable and the disk is not full.",
            Self::Extraction(ExtractionError::Spawn { .. }) => {
                "Install marker-pdf and make sure `marker_single` is on PATH."
            }
            Self::Extraction(_) => "Make sure the PDF is valid and not password-protected.",
            Self::Translation(TranslationError::Backend { kind, .. }) => match kind {
                BackendErrorKind::Quota => "API quota exhausted: top up the account or switch API key.",
                BackendErrorKind::Auth => "Check the API key and account quota in settings.",
                BackendErrorKind::Timeout => "The request timed out: check the network and retry later.",
                BackendErrorKind::Other => "Check the API URL and model name, then retry.",
            },
            Self::Translation(TranslationError::EmptyResponse) => {
                "The backend returned nothing: check the API key, quota and model, then retry."
            }
            Self::Translation(_) => "Translation hit a file error: check the workspace and retry.",
            Self::Packaging(_) => "Check that the output directory exists and is writable.",
            Self::Interrupted(_) => "The conversion worker stopped unexpectedly; rerun the conversion.",
        }
    }
}
