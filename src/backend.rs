//! The conversion backend boundary.
//!
//! The orchestrator does not know how a file becomes an artifact. It hands
//! each [`FileEntry`] (read-only) and a [`ConversionRequest`] to an injected
//! [`ConversionBackend`] and gets back an opaque [`ArtifactHandle`] or a
//! [`ConversionError`]. Real codecs, renderers or remote services plug in
//! here; tests plug in scripted fakes.

use crate::error::{BatchError, ConversionError};
use crate::pipeline::intake::FileEntry;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// What the caller asked the backend to produce.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionRequest {
    /// Output format without the dot, e.g. `"png"`.
    pub target_format: String,
    /// Lossy-encoder quality (1–100) when the tool offers one.
    pub quality: Option<u8>,
}

impl ConversionRequest {
    pub fn new(target_format: impl Into<String>) -> Self {
        Self {
            target_format: target_format.into(),
            quality: None,
        }
    }

    pub fn with_quality(mut self, quality: u8) -> Self {
        self.quality = Some(quality);
        self
    }
}

/// Opaque handle to the bytes of a produced artifact.
///
/// Cloning is cheap: memory buffers are shared, files are referenced by path.
#[derive(Debug, Clone)]
pub enum ArtifactHandle {
    Memory(Arc<[u8]>),
    File(PathBuf),
}

impl ArtifactHandle {
    pub fn from_bytes(bytes: impl Into<Arc<[u8]>>) -> Self {
        ArtifactHandle::Memory(bytes.into())
    }

    /// Size when known without touching the file system.
    pub fn size_hint(&self) -> Option<u64> {
        match self {
            ArtifactHandle::Memory(b) => Some(b.len() as u64),
            ArtifactHandle::File(_) => None,
        }
    }

    /// Load the artifact contents.
    pub async fn read(&self) -> Result<Vec<u8>, BatchError> {
        match self {
            ArtifactHandle::Memory(b) => Ok(b.to_vec()),
            ArtifactHandle::File(path) => tokio::fs::read(path).await.map_err(|e| BatchError::ReadFailed {
                name: path.display().to_string(),
                source: e,
            }),
        }
    }
}

/// Converts one file into one artifact.
///
/// Implementations must be `Send + Sync`: the orchestrator calls `convert`
/// for several files concurrently from a spawned task.
#[async_trait]
pub trait ConversionBackend: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str {
        "backend"
    }

    async fn convert(
        &self,
        file: &FileEntry,
        request: &ConversionRequest,
    ) -> Result<ArtifactHandle, ConversionError>;
}

/// Stand-in backend: waits a fixed delay, then passes the input through.
///
/// The produced artifact carries the original bytes under the new name.
/// Useful for wiring up a front end before a real converter exists.
#[derive(Debug, Clone)]
pub struct SimulatedBackend {
    delay: Duration,
}

impl SimulatedBackend {
    /// Default simulated processing time per file.
    pub const DEFAULT_DELAY: Duration = Duration::from_millis(2000);

    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }

    pub fn instant() -> Self {
        Self::new(Duration::ZERO)
    }
}

impl Default for SimulatedBackend {
    fn default() -> Self {
        Self::new(Self::DEFAULT_DELAY)
    }
}

#[async_trait]
impl ConversionBackend for SimulatedBackend {
    fn name(&self) -> &str {
        "simulated"
    }

    async fn convert(
        &self,
        file: &FileEntry,
        request: &ConversionRequest,
    ) -> Result<ArtifactHandle, ConversionError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let bytes = file
            .read_bytes()
            .await
            .map_err(|e| ConversionError::new(e.to_string()))?;
        debug!(
            "simulated: '{}' → {} ({} bytes)",
            file.name(),
            request.target_format,
            bytes.len()
        );
        Ok(ArtifactHandle::from_bytes(bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn simulated_backend_passes_bytes_through() {
        let backend = SimulatedBackend::instant();
        let file = FileEntry::from_bytes("a.txt", "text/plain", b"abc".to_vec());
        let handle = backend
            .convert(&file, &ConversionRequest::new("pdf"))
            .await
            .unwrap();
        assert_eq!(handle.size_hint(), Some(3));
        assert_eq!(handle.read().await.unwrap(), b"abc");
    }

    #[tokio::test]
    async fn simulated_backend_reports_unreadable_input() {
        let backend = SimulatedBackend::instant();
        let file = FileEntry::from_path("gone.txt", 1, "text/plain", "/definitely/not/here.txt");
        let err = backend
            .convert(&file, &ConversionRequest::new("pdf"))
            .await
            .unwrap_err();
        assert!(err.detail.contains("gone.txt"), "got: {err}");
    }

    #[tokio::test(start_paused = true)]
    async fn simulated_backend_waits_its_delay() {
        let backend = SimulatedBackend::default();
        let file = FileEntry::from_bytes("a.txt", "text/plain", vec![1]);
        let start = tokio::time::Instant::now();
        backend
            .convert(&file, &ConversionRequest::new("pdf"))
            .await
            .unwrap();
        assert!(start.elapsed() >= SimulatedBackend::DEFAULT_DELAY);
    }

    #[test]
    fn request_quality_is_optional() {
        let r = ConversionRequest::new("jpg");
        assert_eq!(r.quality, None);
        assert_eq!(r.with_quality(80).quality, Some(80));
    }

    #[test]
    fn backend_is_object_safe() {
        let b: Arc<dyn ConversionBackend> = Arc::new(SimulatedBackend::instant());
        assert_eq!(b.name(), "simulated");
    }
}
