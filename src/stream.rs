//! Streaming conversion API: emit artifacts as files complete.
//!
//! [`convert_stream`] runs the same per-file work as a job started through
//! [`crate::orchestrator::Orchestrator::start`], but hands each result to the
//! caller as soon as the backend finishes it instead of waiting for the
//! whole batch. Items arrive in completion order; sort by
//! `source_index` (or [`FileError::index`]) if order matters.
//!
//! A stream is detached from any orchestrator: it does not take the
//! single-flight slot and does not touch a result ledger.

use crate::backend::{ConversionBackend, ConversionRequest};
use crate::config::{normalise_format, validate_format, BatchConfig};
use crate::error::{BatchError, FileError};
use crate::job::ResultArtifact;
use crate::orchestrator::convert_one;
use crate::pipeline::intake::FileEntry;
use futures::stream::{self, StreamExt};
use std::pin::Pin;
use std::sync::Arc;
use tokio_stream::Stream;
use tracing::info;

/// A boxed stream of per-file results.
pub type FileStream = Pin<Box<dyn Stream<Item = Result<ResultArtifact, FileError>> + Send>>;

/// Convert `snapshot` to `target_format`, streaming results as they finish.
///
/// # Errors
/// The same preconditions as a job: [`BatchError::EmptyBatch`] for an empty
/// snapshot, [`BatchError::InvalidConfig`] or
/// [`BatchError::UnsupportedTarget`] for a bad format. Per-file failures
/// are stream items, not errors.
///
/// # Example
/// ```rust,no_run
/// use filebatch::{convert_stream, BatchConfig, FileEntry, SimulatedBackend};
/// use futures::StreamExt;
/// use std::sync::Arc;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let files = vec![Arc::new(FileEntry::from_bytes("a.txt", "text/plain", b"hi".to_vec()))];
/// let backend = Arc::new(SimulatedBackend::default());
/// let mut stream = convert_stream(files, "pdf", backend, &BatchConfig::default())?;
/// while let Some(item) = stream.next().await {
///     match item {
///         Ok(a) => println!("{} ready", a.output_name),
///         Err(e) => eprintln!("{e}"),
///     }
/// }
/// # Ok(())
/// # }
/// ```
pub fn convert_stream(
    snapshot: Vec<Arc<FileEntry>>,
    target_format: &str,
    backend: Arc<dyn ConversionBackend>,
    config: &BatchConfig,
) -> Result<FileStream, BatchError> {
    if snapshot.is_empty() {
        return Err(BatchError::EmptyBatch);
    }
    let target = normalise_format(target_format);
    validate_format(&target)?;
    config.preset.check_target(&target)?;

    info!("Streaming {} files to {}", snapshot.len(), target);

    let mut request = ConversionRequest::new(target);
    request.quality = config.effective_quality();
    let total = snapshot.len();
    let concurrency = config.concurrency;
    let config = config.clone();

    let s = stream::iter(snapshot.into_iter().enumerate().map(move |(index, file)| {
        let backend = Arc::clone(&backend);
        let request = request.clone();
        let config = config.clone();
        async move {
            convert_one(&backend, index, total, &file, &request, &config)
                .await
                .result
        }
    }))
    .buffer_unordered(concurrency);

    Ok(Box::pin(s))
}
