//! Error types for the filebatch library.
//!
//! Four types reflect four distinct failure modes:
//!
//! * [`BatchError`]: **Refused operation**: a precondition did not hold
//!   (empty batch, a job already running, a bad index) or an I/O step around
//!   the batch failed. Returned as `Err(BatchError)`; the call has no side
//!   effects on registry, job or ledger state.
//!
//! * [`Rejection`]: **Intake classification**: a single candidate file was
//!   turned away by the [`crate::pipeline::intake::IntakeFilter`]. Rejections
//!   are counted and reported, never raised; the rest of the drop continues.
//!
//! * [`FileError`]: **Non-fatal**: one file of a running job failed. Stored
//!   in [`crate::job::ConversionJob::failures`] next to the artifacts of the
//!   files that did convert, so callers keep partial results.
//!
//! * [`ConversionError`]: the detail string a
//!   [`crate::backend::ConversionBackend`] reports for one file. The
//!   orchestrator wraps it into a [`FileError`].

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// All refused operations and fatal I/O errors returned by the library.
///
/// Per-file failures use [`FileError`] and intake rejections use
/// [`Rejection`]; neither is propagated here.
#[derive(Debug, Error)]
pub enum BatchError {
    // ── Orchestration preconditions ───────────────────────────────────────
    /// `start` was called with zero files in the batch.
    #[error("No files selected: add at least one file before converting")]
    EmptyBatch,

    /// Another job on the same batch has not finished yet.
    #[error("A conversion job is already running ({job_id})")]
    JobAlreadyRunning { job_id: String },

    /// The selected tool preset does not offer this output format.
    #[error("Target format '{target}' is not offered by the {preset} tool (choose one of: {offered})")]
    UnsupportedTarget {
        target: String,
        preset: String,
        offered: String,
    },

    // ── Registry / ledger misuse ──────────────────────────────────────────
    /// A registry position outside `0..len` was addressed.
    #[error("Index {index} is out of range (batch holds {len} files)")]
    IndexOutOfRange { index: usize, len: usize },

    /// No artifact with this download name exists in the ledger.
    #[error("No converted file named '{name}'")]
    ArtifactNotFound { name: String },

    /// A ledger position outside `0..len` was addressed.
    #[error("No converted file at position {index} (ledger holds {len})")]
    ArtifactIndexOutOfRange { index: usize, len: usize },

    /// Bulk download is only offered when more than one artifact exists.
    #[error("Download-all needs at least 2 converted files, ledger holds {count}")]
    BundleUnavailable { count: usize },

    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("File not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The input string is neither a file path nor an HTTP/HTTPS URL.
    #[error("Invalid input '{input}': not a file path or a valid HTTP/HTTPS URL")]
    InvalidInput { input: String },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}\nCheck your internet connection.")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'\nIncrease --download-timeout.")]
    DownloadTimeout { url: String, secs: u64 },

    /// Reading the bytes behind a file entry failed.
    #[error("Failed to read '{name}': {source}")]
    ReadFailed {
        name: String,
        #[source]
        source: std::io::Error,
    },

    // ── Output errors ─────────────────────────────────────────────────────
    /// Could not create or write a downloaded file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Building the ZIP bundle failed.
    #[error("Failed to build archive '{path}': {detail}")]
    ArchiveFailed { path: PathBuf, detail: String },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Why the intake filter turned a candidate away.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum Rejection {
    /// `size_bytes` exceeds the filter's maximum.
    #[error("file exceeds the maximum size limit")]
    TooLarge,

    /// Neither extension nor MIME type matched an accepted specifier,
    /// or the file matched an excluded one.
    #[error("file is not an accepted file type")]
    UnsupportedType,
}

/// A non-fatal error for a single file of a job.
///
/// Stored in [`crate::job::ConversionJob::failures`]. The job keeps going
/// for the remaining files and ends `Failed` with partial results.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum FileError {
    /// The backend reported a failure after all retries.
    #[error("File {index} ('{name}'): conversion failed after {retries} retries: {detail}")]
    ConversionFailed {
        index: usize,
        name: String,
        retries: u32,
        detail: String,
    },

    /// A single backend call exceeded `file_timeout_secs`.
    #[error("File {index} ('{name}'): conversion timed out after {secs}s")]
    Timeout {
        index: usize,
        name: String,
        secs: u64,
    },
}

impl FileError {
    /// Position of the failed file in the job's snapshot.
    pub fn index(&self) -> usize {
        match self {
            FileError::ConversionFailed { index, .. } | FileError::Timeout { index, .. } => *index,
        }
    }

    /// Name of the failed source file.
    pub fn name(&self) -> &str {
        match self {
            FileError::ConversionFailed { name, .. } | FileError::Timeout { name, .. } => name,
        }
    }
}

/// Failure detail reported by a conversion backend for one file.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{detail}")]
pub struct ConversionError {
    pub detail: String,
}

impl ConversionError {
    pub fn new(detail: impl Into<String>) -> Self {
        Self {
            detail: detail.into(),
        }
    }
}
