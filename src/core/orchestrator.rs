//! Main orchestrator for pipeline execution.
//!
//! Sequences extraction, translation and packaging for one source document,
//! reporting progress over a typed event channel. The first stage failure
//! ends the run and is forwarded untouched; later stages never start.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

use super::extract::ExtractionStage;
use super::package::PackagingStage;
use super::translate::TranslationStage;
use super::workspace::WorkspaceManager;
use crate::adapters::{CompletionBackend, Extractor, MarkerExtractor, OpenAiBackend};
use crate::config::{paths, Config, RunOptions};
use crate::domain::artifact::file_stem;
use crate::domain::{PipelineEvent, Progress, RunReport, RunState};
use crate::error::PipelineError;
use crate::library::{HistoryEntry, HistoryStore};

/// Sending half of a run's event stream
pub type EventSender = mpsc::UnboundedSender<PipelineEvent>;

/// Main pipeline orchestrator
pub struct Orchestrator {
    options: RunOptions,
    workspace: WorkspaceManager,
    extraction: ExtractionStage,
    translation: TranslationStage,
    packaging: PackagingStage,
    history: Option<HistoryStore>,
}

impl Orchestrator {
    /// Create an orchestrator over explicit collaborators.
    ///
    /// Bundles go to the default output root unless `options.output_dir`
    /// overrides it; no history is recorded until [`with_history`] is used.
    ///
    /// [`with_history`]: Orchestrator::with_history
    pub fn new(
        options: RunOptions,
        workspace: WorkspaceManager,
        extractor: Arc<dyn Extractor>,
        backend: Arc<dyn CompletionBackend>,
    ) -> Self {
        Self {
            extraction: ExtractionStage::new(extractor, workspace.clone()),
            translation: TranslationStage::new(backend, workspace.clone()),
            packaging: PackagingStage::new(workspace.clone(), paths::default_output_root()),
            workspace,
            options,
            history: None,
        }
    }

    /// Build the production orchestrator from loaded configuration
    pub fn from_config(config: &Config) -> Result<Self> {
        Self::from_options(config.run_options())
    }

    /// Build the production orchestrator from an options snapshot
    pub fn from_options(options: RunOptions) -> Result<Self> {
        let extractor = Arc::new(MarkerExtractor::with_binary_path(
            options.extractor.command.clone(),
        ));
        let backend = Arc::new(OpenAiBackend::new(options.backend.clone()));

        Ok(Self::new(
            options,
            WorkspaceManager::from_default_root()?,
            extractor,
            backend,
        )
        .with_history(HistoryStore::open_default()?))
    }

    /// Record completed runs in `history`
    pub fn with_history(mut self, history: HistoryStore) -> Self {
        self.history = Some(history);
        self
    }

    /// Deliver bundles under `root` when no output directory is configured
    pub fn with_default_output_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.packaging = PackagingStage::new(self.workspace.clone(), root);
        self
    }

    /// Run the pipeline for `source` on the current task.
    ///
    /// Bundles land under `destination` when given, else under
    /// `options.output_dir`, else under the default output root.
    /// Emits a progress event on entering every state, `Completed` included.
    /// Terminal events are left to the caller; see [`Orchestrator::spawn`].
    #[instrument(skip(self, source, destination, events), fields(source = %source.display()))]
    pub async fn run(
        &self,
        source: &Path,
        destination: Option<&Path>,
        events: &EventSender,
    ) -> Result<RunReport, PipelineError> {
        let mut state = RunState::Idle;

        let session = self.workspace.create_session().await?;
        info!(session_id = %session.id, "Starting conversion");

        advance(&mut state, RunState::Extracting, events);
        let extraction = self
            .extraction
            .extract(source, &session, &self.options.extractor)
            .await?;

        advance(&mut state, RunState::Translating, events);
        let translation = self
            .translation
            .translate(&extraction.markdown_path, &session)
            .await?;

        advance(&mut state, RunState::Packaging, events);
        let package = self
            .packaging
            .package(
                &session,
                &extraction,
                &translation,
                Some(source),
                &self.options,
                destination,
            )
            .await?;

        let report = RunReport {
            session_id: session.id,
            source: source.to_path_buf(),
            file_name: file_stem(source),
            package,
            completed_at: Utc::now(),
        };

        self.record_history(&report).await;

        advance(&mut state, RunState::Completed, events);
        info!(
            output = %report.package.output_path.display(),
            elapsed_ms = (report.completed_at - session.created_at).num_milliseconds(),
            "Conversion complete"
        );

        Ok(report)
    }

    /// Run the pipeline on a dedicated task.
    ///
    /// The returned handle yields progress events followed by exactly one
    /// terminal event.
    pub fn spawn(self: &Arc<Self>, source: impl Into<PathBuf>) -> RunHandle {
        self.spawn_to(source, None)
    }

    /// Like [`Orchestrator::spawn`], delivering the bundle under `destination`
    pub fn spawn_to(
        self: &Arc<Self>,
        source: impl Into<PathBuf>,
        destination: Option<PathBuf>,
    ) -> RunHandle {
        let source = source.into();
        let (tx, rx) = mpsc::unbounded_channel();
        let this = Arc::clone(self);

        let task = tokio::spawn(async move {
            let terminal = match this.run(&source, destination.as_deref(), &tx).await {
                Ok(report) => PipelineEvent::Completed(report),
                Err(e) => {
                    error!(stage = %e.stage(), error = %e, "Conversion failed");
                    PipelineEvent::Failed(e)
                }
            };
            // Receiver may be gone; the run still finished
            let _ = tx.send(terminal);
        });

        RunHandle { events: rx, task }
    }

    async fn record_history(&self, report: &RunReport) {
        let Some(store) = self.history.clone() else {
            return;
        };

        let entry = HistoryEntry::from_report(report);
        match tokio::task::spawn_blocking(move || store.add(entry)).await {
            Ok(Ok(())) => debug!("Recorded history entry"),
            Ok(Err(e)) => warn!(error = %e, "Failed to record history"),
            Err(e) => warn!(error = %e, "History worker failed"),
        }
    }
}

fn advance(state: &mut RunState, next: RunState, events: &EventSender) {
    debug_assert!(state.can_advance_to(next), "illegal transition {state:?} -> {next:?}");
    *state = next;

    let progress = Progress::entering(next);
    info!(percent = progress.percent, "{}", progress.message);
    let _ = events.send(PipelineEvent::Progress(progress));
}

/// Receiving end of a spawned run
pub struct RunHandle {
    events: mpsc::UnboundedReceiver<PipelineEvent>,
    task: JoinHandle<()>,
}

impl RunHandle {
    /// Next event, or `None` once the run has finished and all events were read
    pub async fn next_event(&mut self) -> Option<PipelineEvent> {
        self.events.recv().await
    }

    /// Wait for the terminal event, passing each progress event to `on_progress`
    pub async fn wait_with<F>(mut self, mut on_progress: F) -> Result<RunReport, PipelineError>
    where
        F: FnMut(&Progress),
    {
        while let Some(event) = self.events.recv().await {
            match event {
                PipelineEvent::Progress(progress) => on_progress(&progress),
                PipelineEvent::Completed(report) => return Ok(report),
                PipelineEvent::Failed(e) => return Err(e),
            }
        }

        // Channel closed without a terminal event: the worker died
        let reason = match self.task.await {
            Err(e) if e.is_panic() => "worker panicked".to_string(),
            Err(e) => e.to_string(),
            Ok(()) => "worker exited without a result".to_string(),
        };
        Err(PipelineError::Interrupted(reason))
    }

    /// Wait for the terminal event, discarding progress
    pub async fn wait(self) -> Result<RunReport, PipelineError> {
        self.wait_with(|_| {}).await
    }
}
