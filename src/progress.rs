//! Progress-callback trait for per-file conversion events.
//!
//! Inject an [`Arc<dyn BatchProgressCallback>`] via
//! [`crate::config::BatchConfigBuilder::progress_callback`] to receive events
//! as the orchestrator works through a batch.
//!
//! Callers can forward events to a channel, a WebSocket or a terminal
//! progress bar without the library knowing how the host application
//! renders them. The trait is `Send + Sync` because files are converted
//! concurrently inside a spawned task.
//!
//! # Example
//!
//! ```rust
//! use filebatch::{BatchConfig, BatchProgressCallback};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     completed: AtomicUsize,
//! }
//!
//! impl BatchProgressCallback for CountingCallback {
//!     fn on_file_complete(&self, index: usize, total: usize, output_name: &str) {
//!         self.completed.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("{}/{} → {}", index + 1, total, output_name);
//!     }
//! }
//!
//! let counter = Arc::new(CountingCallback { completed: AtomicUsize::new(0) });
//!
//! let config = BatchConfig::builder()
//!     .progress_callback(counter as Arc<dyn BatchProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Called by the orchestrator as it processes each file.
///
/// All methods have default no-op implementations so callers only override
/// what they care about.
///
/// # Thread safety
///
/// With `concurrency > 1`, `on_file_start`, `on_file_complete` and
/// `on_file_error` may be called concurrently and in completion order.
/// `index` is always the file's position in the job snapshot (0-based).
pub trait BatchProgressCallback: Send + Sync {
    /// Called once when the job enters `Running`.
    fn on_job_start(&self, total_files: usize) {
        let _ = total_files;
    }

    /// Called just before the backend is invoked for a file.
    fn on_file_start(&self, index: usize, total_files: usize, name: &str) {
        let _ = (index, total_files, name);
    }

    /// Called when a file converted successfully.
    fn on_file_complete(&self, index: usize, total_files: usize, output_name: &str) {
        let _ = (index, total_files, output_name);
    }

    /// Called when a file failed after all retries.
    fn on_file_error(&self, index: usize, total_files: usize, error: &str) {
        let _ = (index, total_files, error);
    }

    /// Called once after every file has been attempted.
    fn on_job_complete(&self, total_files: usize, success_count: usize) {
        let _ = (total_files, success_count);
    }
}

/// A no-op implementation; the default when no callback is configured.
pub struct NoopProgressCallback;

impl BatchProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::BatchConfig`].
pub type ProgressCallback = Arc<dyn BatchProgressCallback>;
