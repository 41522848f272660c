//! The conversion orchestrator: a single-flight job state machine.
//!
//! ## Lifecycle
//!
//! ```text
//! start(snapshot, fmt)
//!   │  empty snapshot ─────────────▶ Err(EmptyBatch)        (no transition)
//!   │  job already running ────────▶ Err(JobAlreadyRunning) (no transition)
//!   ▼
//! Running ── backend × N (bounded concurrency, any completion order)
//!   │        re-sort by snapshot index
//!   ├─ 0 failures ────▶ Succeeded
//!   └─ ≥1 failure ────▶ Failed   (successful artifacts are kept)
//! ```
//!
//! The in-flight slot is claimed synchronously inside [`Orchestrator::start`],
//! before the job task is spawned, so two back-to-back `start` calls can
//! never both win. The slot is released by a guard owned by the task. If
//! the task dies, the guard publishes `Failed` on its way out.
//!
//! A panicking backend call only fails its own file.
//!
//! The orchestrator never touches the batch registry. It owns the result
//! ledger, empties it when a job starts and fills it when the job finishes.

use crate::backend::{ConversionBackend, ConversionRequest};
use crate::config::{normalise_format, validate_format, BatchConfig};
use crate::error::{BatchError, ConversionError, FileError};
use crate::job::{ConversionJob, JobStatus, ResultArtifact};
use crate::notify::Notice;
use crate::pipeline::intake::FileEntry;
use crate::pipeline::ledger::ResultLedger;
use chrono::Utc;
use futures::stream::{self, StreamExt};
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;
use tokio::sync::{watch, RwLock, RwLockReadGuard};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout, Duration};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Derive the output file name: everything before the FIRST dot of
/// `source_name` (the whole name when there is none), then `.` and the
/// target format.
///
/// `"report.docx.bak"` + `"png"` → `"report.png"`.
pub fn output_name_for(source_name: &str, target_format: &str) -> String {
    let stem = source_name
        .split_once('.')
        .map_or(source_name, |(stem, _)| stem);
    format!("{stem}.{target_format}")
}

/// Drives conversion jobs over batch snapshots.
///
/// Wrap it in an `Arc` to share it between tasks.
pub struct Orchestrator {
    backend: Arc<dyn ConversionBackend>,
    config: BatchConfig,
    in_flight: Arc<Mutex<Option<Uuid>>>,
    status: watch::Sender<JobStatus>,
    latest: Arc<Mutex<Option<ConversionJob>>>,
    ledger: Arc<RwLock<ResultLedger>>,
}

impl Orchestrator {
    pub fn new(backend: Arc<dyn ConversionBackend>, config: BatchConfig) -> Self {
        let (status, _) = watch::channel(JobStatus::Idle);
        Self {
            backend,
            config,
            in_flight: Arc::new(Mutex::new(None)),
            status,
            latest: Arc::new(Mutex::new(None)),
            ledger: Arc::new(RwLock::new(ResultLedger::new())),
        }
    }

    pub fn config(&self) -> &BatchConfig {
        &self.config
    }

    /// Replace the configuration used by future jobs.
    ///
    /// Refused while a job is running.
    pub fn reconfigure(&mut self, config: BatchConfig) -> Result<(), BatchError> {
        let running = *lock(&self.in_flight);
        if let Some(job_id) = running {
            return Err(BatchError::JobAlreadyRunning {
                job_id: job_id.to_string(),
            });
        }
        self.config = config;
        Ok(())
    }

    /// Status of the latest job (`Idle` before the first one).
    pub fn status(&self) -> JobStatus {
        *self.status.borrow()
    }

    /// Receive every status transition.
    pub fn subscribe(&self) -> watch::Receiver<JobStatus> {
        self.status.subscribe()
    }

    /// The latest job, running or terminal.
    pub fn latest_job(&self) -> Option<ConversionJob> {
        lock(&self.latest).clone()
    }

    pub fn is_running(&self) -> bool {
        lock(&self.in_flight).is_some()
    }

    /// Read access to the artifacts of the latest finished job. Empty while
    /// a job runs.
    pub async fn ledger(&self) -> RwLockReadGuard<'_, ResultLedger> {
        self.ledger.read().await
    }

    /// Start converting `snapshot` to `target_format`.
    ///
    /// Must be called from within a Tokio runtime; the job runs on a spawned
    /// task and the returned [`JobHandle`] resolves to its terminal state.
    ///
    /// # Errors
    /// - [`BatchError::EmptyBatch`]: `snapshot` is empty
    /// - [`BatchError::InvalidConfig`] / [`BatchError::UnsupportedTarget`]:
    ///   the format is malformed or not offered by the preset
    /// - [`BatchError::JobAlreadyRunning`]: another job has not finished
    ///
    /// None of these change any state.
    pub fn start(
        &self,
        snapshot: Vec<Arc<FileEntry>>,
        target_format: &str,
    ) -> Result<JobHandle, BatchError> {
        if snapshot.is_empty() {
            return Err(BatchError::EmptyBatch);
        }
        let target = normalise_format(target_format);
        validate_format(&target)?;
        self.config.preset.check_target(&target)?;

        let mut job = ConversionJob::new(&target, snapshot.len());
        let guard = FlightGuard::claim(&self.in_flight, job.id, &self.status, &self.latest)?;

        // Results of the previous job are gone once a new one runs. A reader
        // holding the ledger defers the clear to the job task.
        let ledger_cleared = match self.ledger.try_write() {
            Ok(mut ledger) => {
                ledger.reset();
                true
            }
            Err(_) => false,
        };

        job.status = JobStatus::Running;
        job.started_at = Some(Utc::now());
        *lock(&self.latest) = Some(job.clone());
        self.status.send_replace(JobStatus::Running);
        info!(
            "Job {}: converting {} files to {}",
            job.id,
            snapshot.len(),
            target
        );
        if let Some(ref cb) = self.config.progress_callback {
            cb.on_job_start(snapshot.len());
        }

        let id = job.id;
        let started_at = job.started_at;
        let run = JobRun {
            backend: Arc::clone(&self.backend),
            config: self.config.clone(),
            status: self.status.clone(),
            latest: Arc::clone(&self.latest),
            ledger: Arc::clone(&self.ledger),
        };
        let task = tokio::spawn(run.execute(job, snapshot, guard, ledger_cleared));

        Ok(JobHandle {
            id,
            started_at,
            task,
        })
    }

    /// Clear the ledger and return to `Idle`.
    ///
    /// Refused while a job is running so a finishing job cannot repopulate
    /// a ledger the user just cleared.
    pub async fn reset(&self) -> Result<(), BatchError> {
        let mut ledger = self.ledger.write().await;
        let slot = lock(&self.in_flight);
        if let Some(job_id) = *slot {
            return Err(BatchError::JobAlreadyRunning {
                job_id: job_id.to_string(),
            });
        }
        ledger.reset();
        *lock(&self.latest) = None;
        self.status.send_replace(JobStatus::Idle);
        drop(slot);
        debug!("Orchestrator reset");
        Ok(())
    }
}

/// Handle to a running job.
#[derive(Debug)]
pub struct JobHandle {
    id: Uuid,
    started_at: Option<chrono::DateTime<Utc>>,
    task: JoinHandle<ConversionJob>,
}

impl JobHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn started_at(&self) -> Option<chrono::DateTime<Utc>> {
        self.started_at
    }

    /// `true` once the job task has returned.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the job to reach `Succeeded` or `Failed`.
    pub async fn wait(self) -> Result<ConversionJob, BatchError> {
        let id = self.id;
        self.task
            .await
            .map_err(|e| BatchError::Internal(format!("Job {id} task failed: {e}")))
    }
}

/// Owns the in-flight slot for one job.
///
/// Dropped without [`release_with`](FlightGuard::release_with), as when the
/// job task panics, it frees the slot and marks the job `Failed`.
struct FlightGuard {
    slot: Option<Arc<Mutex<Option<Uuid>>>>,
    status: watch::Sender<JobStatus>,
    latest: Arc<Mutex<Option<ConversionJob>>>,
}

impl FlightGuard {
    fn claim(
        slot: &Arc<Mutex<Option<Uuid>>>,
        id: Uuid,
        status: &watch::Sender<JobStatus>,
        latest: &Arc<Mutex<Option<ConversionJob>>>,
    ) -> Result<Self, BatchError> {
        let mut current = lock(slot);
        if let Some(running) = *current {
            return Err(BatchError::JobAlreadyRunning {
                job_id: running.to_string(),
            });
        }
        *current = Some(id);
        Ok(Self {
            slot: Some(Arc::clone(slot)),
            status: status.clone(),
            latest: Arc::clone(latest),
        })
    }

    /// Free the slot and run `publish` before anyone else can observe it free.
    fn release_with(mut self, publish: impl FnOnce()) {
        if let Some(slot) = self.slot.take() {
            let mut current = lock(&slot);
            *current = None;
            publish();
        }
    }
}

impl Drop for FlightGuard {
    fn drop(&mut self) {
        let Some(slot) = self.slot.take() else {
            return;
        };
        let mut current = lock(&slot);
        let id = current.take();
        {
            let mut latest = lock(&self.latest);
            if let Some(job) = latest.as_mut().filter(|j| Some(j.id) == id) {
                job.status = JobStatus::Failed;
                job.finished_at = Some(Utc::now());
            }
        }
        self.status.send_replace(JobStatus::Failed);
        drop(current);
        warn!("Job {} aborted", id.map(|i| i.to_string()).unwrap_or_default());
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Everything a spawned job needs, detached from the orchestrator borrow.
struct JobRun {
    backend: Arc<dyn ConversionBackend>,
    config: BatchConfig,
    status: watch::Sender<JobStatus>,
    latest: Arc<Mutex<Option<ConversionJob>>>,
    ledger: Arc<RwLock<ResultLedger>>,
}

impl JobRun {
    async fn execute(
        self,
        mut job: ConversionJob,
        snapshot: Vec<Arc<FileEntry>>,
        guard: FlightGuard,
        ledger_cleared: bool,
    ) -> ConversionJob {
        if !ledger_cleared {
            self.ledger.write().await.reset();
        }
        let start = Instant::now();
        let total = snapshot.len();
        let mut request = ConversionRequest::new(&job.target_format);
        request.quality = self.config.effective_quality();

        let mut outcomes = convert_files(&self.backend, snapshot, &request, &self.config).await;
        // Completion order is arbitrary; results are exposed in batch order.
        outcomes.sort_by_key(|o| o.index);

        for outcome in outcomes {
            job.stats.retries += outcome.retries;
            match outcome.result {
                Ok(artifact) => job.outputs.push(artifact),
                Err(e) => job.failures.push(e),
            }
        }

        job.stats.converted_files = job.outputs.len();
        job.stats.failed_files = job.failures.len();
        job.stats.total_duration_ms = start.elapsed().as_millis() as u64;
        job.status = if job.failures.is_empty() {
            JobStatus::Succeeded
        } else {
            JobStatus::Failed
        };
        job.finished_at = Some(Utc::now());

        {
            let mut ledger = self.ledger.write().await;
            ledger.reset();
            for artifact in &job.outputs {
                ledger.record_success(artifact.clone());
            }
        }

        info!(
            "Job {} {}: {}/{} files converted in {}ms",
            job.id, job.status, job.stats.converted_files, total, job.stats.total_duration_ms
        );
        if let Some(ref cb) = self.config.progress_callback {
            cb.on_job_complete(total, job.stats.converted_files);
        }
        if let Some(ref notifier) = self.config.notifier {
            notifier.notify(&Notice::ConversionComplete {
                converted: job.stats.converted_files,
                failed: job.stats.failed_files,
            });
        }

        *lock(&self.latest) = Some(job.clone());
        // A subscriber seeing the terminal status must be able to start again,
        // and a reset must not slip in between.
        let status = job.status;
        guard.release_with(|| {
            self.status.send_replace(status);
        });
        job
    }
}

/// Delay before retry `attempt` (1-based): `base * 2^(attempt-1)`, saturating.
fn backoff_ms(base: u64, attempt: u32) -> u64 {
    base.saturating_mul(2u64.saturating_pow(attempt.saturating_sub(1)))
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    let detail = panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown cause".to_string());
    format!("Backend panicked: {detail}")
}

/// Result of converting one file, tagged with its snapshot position.
pub(crate) struct FileOutcome {
    pub index: usize,
    pub retries: u32,
    pub result: Result<ResultArtifact, FileError>,
}

/// Run the backend over every file with bounded concurrency.
///
/// Outcomes arrive in completion order.
pub(crate) async fn convert_files(
    backend: &Arc<dyn ConversionBackend>,
    snapshot: Vec<Arc<FileEntry>>,
    request: &ConversionRequest,
    config: &BatchConfig,
) -> Vec<FileOutcome> {
    let total = snapshot.len();
    stream::iter(snapshot.into_iter().enumerate().map(|(index, file)| {
        let backend = Arc::clone(backend);
        let request = request.clone();
        let config = config.clone();
        async move { convert_one(&backend, index, total, &file, &request, &config).await }
    }))
    .buffer_unordered(config.concurrency)
    .collect()
    .await
}

/// Convert a single file with retry, back-off and optional timeout.
///
/// Never returns an error upward: a failure becomes a [`FileError`] inside
/// the outcome so one bad file does not abort the batch.
pub(crate) async fn convert_one(
    backend: &Arc<dyn ConversionBackend>,
    index: usize,
    total: usize,
    file: &FileEntry,
    request: &ConversionRequest,
    config: &BatchConfig,
) -> FileOutcome {
    let start = Instant::now();
    let output_name = output_name_for(file.name(), &request.target_format);
    if let Some(ref cb) = config.progress_callback {
        cb.on_file_start(index, total, file.name());
    }

    let mut last_err: Option<FileError> = None;

    for attempt in 0..=config.max_retries {
        if attempt > 0 {
            let backoff = backoff_ms(config.retry_backoff_ms, attempt);
            warn!(
                "File {} ('{}'): retry {}/{} after {}ms",
                index,
                file.name(),
                attempt,
                config.max_retries,
                backoff
            );
            sleep(Duration::from_millis(backoff)).await;
        }

        let call = async {
            AssertUnwindSafe(backend.convert(file, request))
                .catch_unwind()
                .await
                .unwrap_or_else(|panic| Err(ConversionError::new(panic_message(&*panic))))
        };
        let result = match config.file_timeout_secs {
            Some(secs) => match timeout(Duration::from_secs(secs), call).await {
                Ok(r) => r,
                Err(_) => {
                    warn!("File {} ('{}'): timed out after {}s", index, file.name(), secs);
                    last_err = Some(FileError::Timeout {
                        index,
                        name: file.name().to_string(),
                        secs,
                    });
                    continue;
                }
            },
            None => call.await,
        };

        match result {
            Ok(handle) => {
                let duration_ms = start.elapsed().as_millis() as u64;
                debug!(
                    "File {} ('{}') → '{}' via {} in {}ms",
                    index,
                    file.name(),
                    output_name,
                    backend.name(),
                    duration_ms
                );
                if let Some(ref cb) = config.progress_callback {
                    cb.on_file_complete(index, total, &output_name);
                }
                return FileOutcome {
                    index,
                    retries: attempt,
                    result: Ok(ResultArtifact {
                        source_index: index,
                        source_name: file.name().to_string(),
                        output_name,
                        size_bytes: handle.size_hint(),
                        handle,
                        duration_ms,
                    }),
                };
            }
            Err(e) => {
                warn!("File {} ('{}'): attempt {} failed: {}", index, file.name(), attempt + 1, e);
                last_err = Some(FileError::ConversionFailed {
                    index,
                    name: file.name().to_string(),
                    retries: attempt,
                    detail: e.detail,
                });
            }
        }
    }

    // All attempts exhausted
    let err = last_err.unwrap_or_else(|| FileError::ConversionFailed {
        index,
        name: file.name().to_string(),
        retries: config.max_retries,
        detail: "Unknown error".to_string(),
    });
    if let Some(ref cb) = config.progress_callback {
        cb.on_file_error(index, total, &err.to_string());
    }
    FileOutcome {
        index,
        retries: config.max_retries,
        result: Err(err),
    }
}
