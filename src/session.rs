//! The session: one tool page's worth of intake, batch, job and results.
//!
//! A [`Session`] is what a front end talks to. It owns a
//! [`BatchRegistry`] and an [`Orchestrator`], applies the active
//! [`ToolPreset`], and reports outcomes through the configured
//! [`Notifier`](crate::notify::Notifier) instead of returning UI text.
//!
//! ## Intents
//!
//! | Intent | Effect | Notices |
//! |--------|--------|---------|
//! | [`add_dropped`](Session::add_dropped) / [`add_picked`](Session::add_picked) | filter, then append | `NoValidFiles`, `FilesSkipped` |
//! | [`remove_file`](Session::remove_file) | drop one entry | |
//! | [`start_conversion`](Session::start_conversion) | start a job on a snapshot | `NoFilesSelected`, `UnsupportedTarget`, `ConversionComplete` |
//! | [`download_one`](Session::download_one) / [`download_at`](Session::download_at) | write one artifact | `DownloadStarted` |
//! | [`download_all`](Session::download_all) | write a ZIP of all artifacts | `ArchiveDownloadStarted` |
//! | [`reset`](Session::reset) | clear files and results | |
//! | [`switch_preset`](Session::switch_preset) | change tool, then reset | |
//!
//! Sessions share nothing with each other.

use crate::backend::{ConversionBackend, SimulatedBackend};
use crate::config::{BatchConfig, ToolPreset};
use crate::error::{BatchError, FileError};
use crate::job::{ConversionJob, JobStatus, ResultArtifact};
use crate::notify::{Notice, SharedNotifier, TracingNotifier};
use crate::orchestrator::{JobHandle, Orchestrator};
use crate::pipeline::intake::{self, FileEntry, FileInfo, IntakeReport, RejectedFile};
use crate::pipeline::registry::BatchRegistry;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info};
use uuid::Uuid;

/// What happened to one addition of files.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AddOutcome {
    /// Entries appended to the batch.
    pub added: usize,
    /// Entries the intake filter turned away.
    pub rejected: Vec<RejectedFile>,
    /// Accepted entries dropped because the batch limit was reached.
    pub over_limit: Vec<String>,
}

impl AddOutcome {
    pub fn skipped(&self) -> usize {
        self.rejected.len() + self.over_limit.len()
    }
}

/// Snapshot of everything a front end renders.
#[derive(Debug, Clone, Serialize)]
pub struct SessionView {
    pub preset: ToolPreset,
    pub target_formats: Vec<&'static str>,
    pub files: Vec<FileInfo>,
    pub status: JobStatus,
    pub job_id: Option<Uuid>,
    pub outputs: Vec<ResultArtifact>,
    /// Name each output is delivered under, parallel to `outputs`.
    pub download_names: Vec<String>,
    pub failures: Vec<FileError>,
    pub can_download_all: bool,
}

/// Intake, batch, job and results for one tool.
pub struct Session {
    config: BatchConfig,
    registry: BatchRegistry,
    orchestrator: Orchestrator,
    notifier: SharedNotifier,
}

impl Session {
    /// Create a session over `backend`. Without a configured notifier,
    /// notices go to the `tracing` log.
    pub fn new(backend: Arc<dyn ConversionBackend>, mut config: BatchConfig) -> Self {
        let notifier = config
            .notifier
            .clone()
            .unwrap_or_else(|| Arc::new(TracingNotifier) as SharedNotifier);
        config.notifier = Some(Arc::clone(&notifier));
        Self {
            orchestrator: Orchestrator::new(backend, config.clone()),
            registry: BatchRegistry::new(),
            config,
            notifier,
        }
    }

    /// A session over the [`SimulatedBackend`] with its default delay.
    pub fn simulated(config: BatchConfig) -> Self {
        Self::new(Arc::new(SimulatedBackend::default()), config)
    }

    pub fn config(&self) -> &BatchConfig {
        &self.config
    }

    pub fn preset(&self) -> ToolPreset {
        self.config.preset
    }

    pub fn registry(&self) -> &BatchRegistry {
        &self.registry
    }

    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    // ── Intake ───────────────────────────────────────────────────────────

    /// Files dropped onto the intake surface.
    pub fn add_dropped(&mut self, dropped: Vec<FileEntry>) -> AddOutcome {
        let report = intake::from_drop(dropped, &self.config.filter);
        self.admit(report)
    }

    /// Files chosen through the picker.
    pub fn add_picked(&mut self, picked: Vec<FileEntry>) -> AddOutcome {
        let report = intake::from_picker(picked, &self.config.filter);
        self.admit(report)
    }

    /// Files from any other source, e.g. resolved CLI inputs.
    pub fn add_files(&mut self, candidates: Vec<FileEntry>) -> AddOutcome {
        let report = intake::evaluate_batch(candidates, &self.config.filter);
        self.admit(report)
    }

    fn admit(&mut self, report: IntakeReport) -> AddOutcome {
        let offered = report.offered_count();
        let IntakeReport {
            mut accepted,
            rejected,
        } = report;

        let mut over_limit = Vec::new();
        if let Some(limit) = self.config.max_batch_files {
            let room = limit.saturating_sub(self.registry.len());
            if accepted.len() > room {
                over_limit = accepted
                    .split_off(room)
                    .into_iter()
                    .map(|f| f.name().to_string())
                    .collect();
                debug!("Batch limit {} reached: {} files not added", limit, over_limit.len());
            }
        }

        let outcome = AddOutcome {
            added: accepted.len(),
            rejected,
            over_limit,
        };
        self.registry.add(accepted);

        if offered > 0 && outcome.added == 0 {
            self.notifier.notify(&Notice::NoValidFiles {
                rejected: outcome.skipped(),
            });
        } else if outcome.skipped() > 0 {
            self.notifier.notify(&Notice::FilesSkipped {
                skipped: outcome.skipped(),
                added: outcome.added,
            });
        }
        outcome
    }

    /// Remove the file at `index` from the batch.
    pub fn remove_file(&mut self, index: usize) -> Result<FileInfo, BatchError> {
        self.registry.remove(index).map(|f| f.info())
    }

    // ── Conversion ───────────────────────────────────────────────────────

    /// Start converting the current batch to `target_format`.
    ///
    /// The job works on a snapshot: later edits to the batch do not affect
    /// it. A `ConversionComplete` notice is sent when it finishes.
    pub fn start_conversion(&self, target_format: &str) -> Result<JobHandle, BatchError> {
        match self.orchestrator.start(self.registry.snapshot(), target_format) {
            Ok(handle) => Ok(handle),
            Err(e) => {
                match &e {
                    BatchError::EmptyBatch => self.notifier.notify(&Notice::NoFilesSelected),
                    BatchError::UnsupportedTarget { target, .. } => {
                        self.notifier.notify(&Notice::UnsupportedTarget {
                            target: target.clone(),
                        })
                    }
                    _ => {}
                }
                Err(e)
            }
        }
    }

    /// Start a job and wait for it to finish.
    pub async fn convert_and_wait(&self, target_format: &str) -> Result<ConversionJob, BatchError> {
        self.start_conversion(target_format)?.wait().await
    }

    /// Convert to the configured target, or the preset's default.
    pub async fn convert_default(&self) -> Result<ConversionJob, BatchError> {
        let target = self
            .config
            .effective_target()
            .ok_or_else(|| BatchError::InvalidConfig("No target format selected".into()))?
            .to_string();
        self.convert_and_wait(&target).await
    }

    pub fn status(&self) -> JobStatus {
        self.orchestrator.status()
    }

    pub fn subscribe(&self) -> watch::Receiver<JobStatus> {
        self.orchestrator.subscribe()
    }

    // ── Results ──────────────────────────────────────────────────────────

    /// Write the artifact delivered as `download_name` into `dest_dir`.
    ///
    /// The download name is the output name, suffixed ` (n)` when an
    /// earlier artifact of the same job already uses it.
    pub async fn download_one(&self, download_name: &str, dest_dir: &Path) -> Result<PathBuf, BatchError> {
        let path = self.orchestrator.ledger().await.download_one(download_name, dest_dir).await?;
        self.notifier.notify(&Notice::DownloadStarted {
            name: download_name.to_string(),
        });
        Ok(path)
    }

    /// Write the artifact at position `index` of the latest job's outputs.
    pub async fn download_at(&self, index: usize, dest_dir: &Path) -> Result<PathBuf, BatchError> {
        let path = self.orchestrator.ledger().await.download_at(index, dest_dir).await?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.notifier.notify(&Notice::DownloadStarted { name });
        Ok(path)
    }

    /// Write every artifact into one ZIP archive at `dest`.
    pub async fn download_all(&self, dest: &Path) -> Result<PathBuf, BatchError> {
        let ledger = self.orchestrator.ledger().await;
        let path = ledger.download_all(dest).await?;
        self.notifier.notify(&Notice::ArchiveDownloadStarted { count: ledger.len() });
        Ok(path)
    }

    pub async fn can_download_all(&self) -> bool {
        self.orchestrator.ledger().await.can_download_all()
    }

    // ── Lifecycle ────────────────────────────────────────────────────────

    /// Clear the batch and the results. Refused while a job is running.
    pub async fn reset(&mut self) -> Result<(), BatchError> {
        self.orchestrator.reset().await?;
        self.registry.clear();
        info!("Session reset");
        Ok(())
    }

    /// Switch to another tool. Files and results are cleared; a target
    /// format the new tool does not offer is dropped.
    pub async fn switch_preset(&mut self, preset: ToolPreset) -> Result<(), BatchError> {
        let mut config = self.config.clone();
        config.filter = preset.filter(config.filter.max_size_bytes);
        config.preset = preset;
        if let Some(ref target) = config.target_format {
            if preset.check_target(target).is_err() {
                config.target_format = None;
            }
        }

        self.orchestrator.reconfigure(config.clone())?;
        self.reset().await?;
        self.config = config;
        info!("Switched to the {}", preset);
        Ok(())
    }

    /// Everything a front end needs to render the page.
    pub async fn view(&self) -> SessionView {
        let ledger = self.orchestrator.ledger().await;
        let job = self.orchestrator.latest_job();
        SessionView {
            preset: self.config.preset,
            target_formats: self.config.preset.target_formats().to_vec(),
            files: self.registry.infos(),
            status: self.orchestrator.status(),
            job_id: job.as_ref().map(|j| j.id),
            outputs: ledger.artifacts().to_vec(),
            download_names: ledger.download_names(),
            failures: job.map(|j| j.failures).unwrap_or_default(),
            can_download_all: ledger.can_download_all(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::RecordingNotifier;

    fn session(config: crate::config::BatchConfigBuilder) -> (Session, Arc<RecordingNotifier>) {
        let rec = RecordingNotifier::new();
        let config = config.notifier(rec.clone()).build().unwrap();
        (Session::new(Arc::new(SimulatedBackend::instant()), config), rec)
    }

    fn file(name: &str, mime: &str) -> FileEntry {
        FileEntry::from_bytes(name, mime, name.as_bytes().to_vec())
    }

    #[test]
    fn all_rejected_adds_nothing() {
        let (mut s, rec) = session(BatchConfig::builder().preset(ToolPreset::ImageConverter));
        let out = s.add_dropped(vec![file("a.txt", "text/plain")]);
        assert_eq!(out.added, 0);
        assert!(s.registry().is_empty());
        assert_eq!(rec.notices(), vec![Notice::NoValidFiles { rejected: 1 }]);
    }

    #[test]
    fn partial_acceptance_reports_skipped() {
        let (mut s, rec) = session(BatchConfig::builder().preset(ToolPreset::ImageConverter));
        let out = s.add_picked(vec![file("a.png", "image/png"), file("b.txt", "text/plain")]);
        assert_eq!(out.added, 1);
        assert_eq!(s.registry().names(), vec!["a.png"]);
        assert_eq!(rec.notices(), vec![Notice::FilesSkipped { skipped: 1, added: 1 }]);
    }

    #[test]
    fn empty_addition_is_silent() {
        let (mut s, rec) = session(BatchConfig::builder());
        s.add_dropped(Vec::new());
        assert!(rec.notices().is_empty());
    }

    #[test]
    fn batch_limit_truncates() {
        let (mut s, rec) = session(BatchConfig::builder().max_batch_files(2));
        let out = s.add_files(vec![
            file("a.txt", "text/plain"),
            file("b.txt", "text/plain"),
            file("c.txt", "text/plain"),
        ]);
        assert_eq!(out.added, 2);
        assert_eq!(out.over_limit, vec!["c.txt"]);
        assert_eq!(rec.notices(), vec![Notice::FilesSkipped { skipped: 1, added: 2 }]);
    }

    #[tokio::test]
    async fn converting_an_empty_batch_notifies() {
        let (s, rec) = session(BatchConfig::builder());
        let err = s.start_conversion("pdf").err().unwrap();
        assert!(matches!(err, BatchError::EmptyBatch));
        assert_eq!(s.status(), JobStatus::Idle);
        assert_eq!(rec.notices(), vec![Notice::NoFilesSelected]);
    }

    #[tokio::test]
    async fn unsupported_target_notifies() {
        let (mut s, rec) = session(BatchConfig::builder().preset(ToolPreset::ToPdf));
        s.add_files(vec![file("a.docx", "application/msword")]);
        let err = s.start_conversion("png").err().unwrap();
        assert!(matches!(err, BatchError::UnsupportedTarget { .. }));
        assert_eq!(
            rec.notices(),
            vec![Notice::UnsupportedTarget { target: "png".into() }]
        );
    }

    #[tokio::test]
    async fn conversion_completes_and_view_reflects_it() {
        let (mut s, rec) = session(BatchConfig::builder());
        s.add_files(vec![file("a.txt", "text/plain"), file("b.txt", "text/plain")]);
        let job = s.convert_and_wait("pdf").await.unwrap();
        assert_eq!(job.status, JobStatus::Succeeded);
        assert_eq!(
            rec.notices(),
            vec![Notice::ConversionComplete { converted: 2, failed: 0 }]
        );

        let view = s.view().await;
        assert_eq!(view.status, JobStatus::Succeeded);
        assert_eq!(view.files.len(), 2);
        assert_eq!(view.outputs.len(), 2);
        assert!(view.can_download_all);
        assert_eq!(view.job_id, Some(job.id));
    }

    #[tokio::test]
    async fn downloads_notify() {
        let dir = tempfile::tempdir().unwrap();
        let (mut s, rec) = session(BatchConfig::builder());
        s.add_files(vec![file("a.txt", "text/plain"), file("b.txt", "text/plain")]);
        s.convert_and_wait("pdf").await.unwrap();

        s.download_one("a.pdf", dir.path()).await.unwrap();
        s.download_all(&dir.path().join("all.zip")).await.unwrap();
        let notices = rec.notices();
        assert_eq!(
            &notices[1..],
            &[
                Notice::DownloadStarted { name: "a.pdf".into() },
                Notice::ArchiveDownloadStarted { count: 2 },
            ]
        );
    }

    #[tokio::test]
    async fn sources_with_the_same_stem_are_all_delivered() {
        let dir = tempfile::tempdir().unwrap();
        let (mut s, rec) = session(BatchConfig::builder());
        s.add_files(vec![
            FileEntry::from_bytes("a.jpg", "image/jpeg", b"FIRST".to_vec()),
            FileEntry::from_bytes("a.png", "image/png", b"SECOND".to_vec()),
        ]);
        let job = s.convert_and_wait("pdf").await.unwrap();
        assert_eq!(job.outputs[0].output_name, "a.pdf");
        assert_eq!(job.outputs[1].output_name, "a.pdf");
        assert_eq!(s.view().await.download_names, vec!["a.pdf", "a (1).pdf"]);

        let mut delivered = Vec::new();
        for index in 0..job.outputs.len() {
            let path = s.download_at(index, dir.path()).await.unwrap();
            delivered.push(std::fs::read_to_string(path).unwrap());
        }
        assert_eq!(delivered, vec!["FIRST", "SECOND"]);
        assert_eq!(
            &rec.notices()[1..],
            &[
                Notice::DownloadStarted { name: "a.pdf".into() },
                Notice::DownloadStarted { name: "a (1).pdf".into() },
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn new_job_hides_previous_results() {
        let rec = RecordingNotifier::new();
        let config = BatchConfig::builder().notifier(rec).build().unwrap();
        let backend = Arc::new(SimulatedBackend::new(std::time::Duration::from_secs(5)));
        let mut s = Session::new(backend, config);
        s.add_files(vec![file("a.txt", "text/plain"), file("b.txt", "text/plain")]);
        s.convert_and_wait("pdf").await.unwrap();
        assert_eq!(s.view().await.outputs.len(), 2);

        s.remove_file(1).unwrap();
        let handle = s.start_conversion("pdf").unwrap();
        let view = s.view().await;
        assert_eq!(view.status, JobStatus::Running);
        assert_eq!(view.job_id, Some(handle.id()));
        assert!(view.outputs.is_empty());
        assert!(!view.can_download_all);
        let dir = tempfile::tempdir().unwrap();
        assert!(s.download_one("a.pdf", dir.path()).await.is_err());

        handle.wait().await.unwrap();
        assert_eq!(s.view().await.outputs.len(), 1);
    }

    #[tokio::test]
    async fn reset_clears_files_and_results() {
        let (mut s, _rec) = session(BatchConfig::builder());
        s.add_files(vec![file("a.txt", "text/plain")]);
        s.convert_and_wait("pdf").await.unwrap();
        s.reset().await.unwrap();

        let view = s.view().await;
        assert!(view.files.is_empty());
        assert!(view.outputs.is_empty());
        assert_eq!(view.status, JobStatus::Idle);
    }

    #[tokio::test]
    async fn switch_preset_clears_and_refilters() {
        let (mut s, _rec) = session(BatchConfig::builder().target_format("docx"));
        s.add_files(vec![file("a.txt", "text/plain")]);
        s.switch_preset(ToolPreset::ImageConverter).await.unwrap();

        assert!(s.registry().is_empty());
        assert_eq!(s.preset(), ToolPreset::ImageConverter);
        assert_eq!(s.config().effective_target(), Some("jpg"));
        assert_eq!(s.add_files(vec![file("b.txt", "text/plain")]).added, 0);
        assert_eq!(s.add_files(vec![file("c.gif", "image/gif")]).added, 1);
    }

    #[test]
    fn remove_file_returns_info() {
        let (mut s, _rec) = session(BatchConfig::builder());
        s.add_files(vec![file("a.txt", "text/plain"), file("b.txt", "text/plain")]);
        assert_eq!(s.remove_file(0).unwrap().name, "a.txt");
        assert!(matches!(
            s.remove_file(5),
            Err(BatchError::IndexOutOfRange { index: 5, len: 1 })
        ));
    }
}
