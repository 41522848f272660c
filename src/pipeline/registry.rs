//! The batch registry: the ordered working set of accepted files.
//!
//! Insertion order is meaningful: it is the order in which the orchestrator
//! converts files and in which artifacts appear in the ledger. Entries are
//! shared behind `Arc` so a [`snapshot`](BatchRegistry::snapshot) handed to a
//! running job stays valid while the user keeps editing the registry.

use crate::error::BatchError;
use crate::pipeline::intake::{FileEntry, FileInfo};
use std::sync::Arc;
use tracing::debug;

/// Ordered set of files awaiting conversion.
#[derive(Debug, Default)]
pub struct BatchRegistry {
    files: Vec<Arc<FileEntry>>,
}

impl BatchRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append entries in the given order. No capacity cap is enforced here.
    pub fn add(&mut self, entries: impl IntoIterator<Item = FileEntry>) {
        let before = self.files.len();
        self.files.extend(entries.into_iter().map(Arc::new));
        debug!("Registry: added {} files ({} total)", self.files.len() - before, self.files.len());
    }

    /// Remove the entry at `index`, shifting later entries down by one.
    pub fn remove(&mut self, index: usize) -> Result<Arc<FileEntry>, BatchError> {
        if index >= self.files.len() {
            return Err(BatchError::IndexOutOfRange {
                index,
                len: self.files.len(),
            });
        }
        Ok(self.files.remove(index))
    }

    pub fn clear(&mut self) {
        self.files.clear();
    }

    /// Read-only ordered view of the current entries.
    pub fn snapshot(&self) -> Vec<Arc<FileEntry>> {
        self.files.clone()
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&FileEntry> {
        self.files.get(index).map(Arc::as_ref)
    }

    /// File names in batch order.
    pub fn names(&self) -> Vec<&str> {
        self.files.iter().map(|f| f.name()).collect()
    }

    pub fn infos(&self) -> Vec<FileInfo> {
        self.files.iter().map(|f| f.info()).collect()
    }
}
