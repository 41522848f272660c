//! # filebatch
//!
//! Batch file intake and conversion-job orchestration.
//!
//! Users drop or pick files; each candidate is checked against a size and
//! type filter; accepted files join an ordered batch; a single-flight job
//! hands every file to a pluggable [`ConversionBackend`] with bounded
//! concurrency; the produced artifacts can be downloaded one by one or
//! bundled into a ZIP archive.
//!
//! ## Pipeline Overview
//!
//! ```text
//! drop / picker / path / URL
//!  │
//!  ├─ 1. Intake     size + type filter (pure)          → IntakeReport
//!  ├─ 2. Registry   ordered batch, shared snapshots    → Vec<Arc<FileEntry>>
//!  ├─ 3. Job        single-flight, bounded concurrency → ConversionJob
//!  │                backend × N, re-sorted by index
//!  └─ 4. Ledger     artifacts of the latest job        → files / ZIP
//! ```
//!
//! [`Session`] wires the four stages together for one tool and reports
//! outcomes as [`Notice`]s.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use filebatch::{BatchConfig, FileEntry, Session, ToolPreset};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = BatchConfig::builder()
//!         .preset(ToolPreset::ImageConverter)
//!         .build()?;
//!     let mut session = Session::simulated(config);
//!
//!     session.add_dropped(vec![
//!         FileEntry::from_bytes("vacation.jpg", "image/jpeg", std::fs::read("vacation.jpg")?),
//!         FileEntry::from_bytes("notes.txt", "text/plain", b"skipped".to_vec()),
//!     ]);
//!
//!     let job = session.convert_and_wait("png").await?;
//!     for index in 0..job.outputs.len() {
//!         session.download_at(index, std::path::Path::new("out")).await?;
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `filebatch` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! filebatch = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod backend;
pub mod config;
pub mod error;
pub mod job;
pub mod notify;
pub mod orchestrator;
pub mod pipeline;
pub mod progress;
pub mod session;
pub mod stream;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use backend::{ArtifactHandle, ConversionBackend, ConversionRequest, SimulatedBackend};
pub use config::{BatchConfig, BatchConfigBuilder, ToolPreset};
pub use error::{BatchError, ConversionError, FileError, Rejection};
pub use job::{ConversionJob, JobStats, JobStatus, ResultArtifact};
pub use notify::{Notice, Notifier, NoopNotifier, RecordingNotifier, SharedNotifier, TracingNotifier};
pub use orchestrator::{output_name_for, JobHandle, Orchestrator};
pub use pipeline::intake::{
    evaluate, evaluate_batch, from_drop, from_picker, AcceptSpecifier, FileEntry, FileInfo,
    FileSource, IntakeFilter, IntakeReport, RejectedFile, Verdict, DEFAULT_MAX_SIZE_BYTES,
};
pub use pipeline::ledger::ResultLedger;
pub use pipeline::registry::BatchRegistry;
pub use progress::{BatchProgressCallback, NoopProgressCallback, ProgressCallback};
pub use session::{AddOutcome, Session, SessionView};
pub use stream::{convert_stream, FileStream};
