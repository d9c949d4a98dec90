//! Adapter interfaces for external systems.
//!
//! Adapters provide a unified interface for the two external capabilities
//! the pipeline depends on: a PDF → Markdown extractor process and a chat
//! completion service. Stages only see the traits, so tests substitute
//! in-process fakes.

pub mod marker;
pub mod openai;

use std::path::Path;

use anyhow::Result;
use async_trait::async_trait;

use crate::config::ExtractorOptions;
use crate::error::{BackendError, ExtractionError};

// Re-export the concrete adapters
pub use marker::MarkerExtractor;
pub use openai::OpenAiBackend;

/// Captured output of an extractor invocation
#[derive(Debug, Clone, Default)]
pub struct ExtractorOutput {
    /// Standard output, lossily decoded
    pub stdout: String,

    /// Standard error, lossily decoded
    pub stderr: String,
}

/// Trait for PDF → Markdown extractors
#[async_trait]
pub trait Extractor: Send + Sync {
    /// Human-readable extractor name
    fn name(&self) -> &str;

    /// Convert `source` into Markdown (plus assets) under `output_dir`.
    ///
    /// Only the process outcome is reported here; locating the Markdown
    /// artifact is the extraction stage's job.
    async fn convert(
        &self,
        source: &Path,
        output_dir: &Path,
        options: &ExtractorOptions,
    ) -> Result<ExtractorOutput, ExtractionError>;

    /// Advisory availability check
    async fn health_check(&self) -> Result<()>;
}

/// A single system + user prompt exchange
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    /// Fixed instruction establishing the assistant's role
    pub system: String,

    /// Prompt carrying the document content
    pub user: String,

    /// Sampling temperature
    pub temperature: f32,
}

/// Trait for chat completion services
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    /// Human-readable backend name
    fn name(&self) -> &str;

    /// Send one request and return the first choice's text.
    ///
    /// `Ok(None)` means the service answered but the answer carried no
    /// usable content (no choices, null message).
    async fn complete(&self, request: &CompletionRequest) -> Result<Option<String>, BackendError>;
}
