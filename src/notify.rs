//! User-facing notices (the "toasts" of a front end).
//!
//! The session reports outcomes through a narrow [`Notifier`] sink instead of
//! calling any UI directly. A desktop shell can turn notices into toasts, a
//! CLI can print them, and tests can record them.

use serde::Serialize;
use std::sync::{Arc, Mutex};
use tracing::{info, warn};

/// Something the user should be told about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Notice {
    /// Files were offered but none passed intake; nothing was added.
    NoValidFiles { rejected: usize },
    /// Some files were skipped; the rest were added.
    FilesSkipped { skipped: usize, added: usize },
    /// Conversion was requested on an empty batch.
    NoFilesSelected,
    /// The active tool does not offer the requested output format.
    UnsupportedTarget { target: String },
    /// A job reached a terminal state.
    ConversionComplete { converted: usize, failed: usize },
    /// A single artifact was delivered.
    DownloadStarted { name: String },
    /// All artifacts were bundled into one archive.
    ArchiveDownloadStarted { count: usize },
}

impl Notice {
    /// Short title, as a toast would show it.
    pub fn title(&self) -> &'static str {
        match self {
            Notice::NoValidFiles { .. } => "Invalid Files",
            Notice::FilesSkipped { .. } => "Some files were skipped",
            Notice::NoFilesSelected => "No Files Selected",
            Notice::UnsupportedTarget { .. } => "Unsupported Format",
            Notice::ConversionComplete { failed: 0, .. } => "Conversion Complete",
            Notice::ConversionComplete { .. } => "Conversion Finished With Errors",
            Notice::DownloadStarted { .. } | Notice::ArchiveDownloadStarted { .. } => "Download Started",
        }
    }

    /// One-line description.
    pub fn description(&self) -> String {
        match self {
            Notice::NoValidFiles { rejected } => {
                format!("None of the {rejected} offered {} can be used here", plural(*rejected))
            }
            Notice::FilesSkipped { skipped, added } => {
                format!("{skipped} {} skipped, {added} added", plural(*skipped))
            }
            Notice::NoFilesSelected => "Please upload at least one file to convert".to_string(),
            Notice::UnsupportedTarget { target } => {
                format!("'{target}' is not an output format of this tool")
            }
            Notice::ConversionComplete { converted, failed: 0 } => {
                format!("{converted} {} converted successfully", plural(*converted))
            }
            Notice::ConversionComplete { converted, failed } => {
                format!("{converted} converted, {failed} failed")
            }
            Notice::DownloadStarted { name } => format!("Downloading {name}"),
            Notice::ArchiveDownloadStarted { count } => {
                format!("Downloading all {count} converted files as ZIP")
            }
        }
    }

    /// Whether a front end should style this as an error.
    pub fn is_destructive(&self) -> bool {
        matches!(
            self,
            Notice::NoValidFiles { .. } | Notice::NoFilesSelected | Notice::UnsupportedTarget { .. }
        )
    }
}

fn plural(n: usize) -> &'static str {
    if n == 1 {
        "file"
    } else {
        "files"
    }
}

/// Reporting sink for [`Notice`]s.
pub trait Notifier: Send + Sync {
    fn notify(&self, notice: &Notice);
}

/// Writes notices to the `tracing` log. The default sink.
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, notice: &Notice) {
        if notice.is_destructive() {
            warn!("{}: {}", notice.title(), notice.description());
        } else {
            info!("{}: {}", notice.title(), notice.description());
        }
    }
}

/// Discards every notice.
pub struct NoopNotifier;

impl Notifier for NoopNotifier {
    fn notify(&self, _notice: &Notice) {}
}

/// Keeps every notice in memory, in order.
#[derive(Default)]
pub struct RecordingNotifier {
    notices: Mutex<Vec<Notice>>,
}

impl RecordingNotifier {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Notices received so far.
    pub fn notices(&self) -> Vec<Notice> {
        self.notices
            .lock()
            .map(|n| n.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, notice: &Notice) {
        match self.notices.lock() {
            Ok(mut n) => n.push(notice.clone()),
            Err(poisoned) => poisoned.into_inner().push(notice.clone()),
        }
    }
}

/// Convenience alias matching the type stored in [`crate::config::BatchConfig`].
pub type SharedNotifier = Arc<dyn Notifier>;
