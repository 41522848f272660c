//! The result ledger: artifacts of the latest job and their delivery.
//!
//! Only the orchestrator records artifacts, and it clears them when a reset
//! or a new job begins. Downloads read the ledger and never change it, so
//! delivering the same artifact twice is harmless.
//!
//! Two sources can map to the same output name (`a.jpg` and `a.png` both
//! become `a.pdf`). Every artifact is therefore delivered under its
//! download name: the output name, suffixed ` (n)` when an earlier artifact
//! already uses it. The ZIP bundle uses the same names.

use crate::error::BatchError;
use crate::job::ResultArtifact;
use std::collections::HashSet;
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Ordered artifacts of the most recent job.
#[derive(Debug, Default)]
pub struct ResultLedger {
    artifacts: Vec<ResultArtifact>,
}

impl ResultLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an artifact. Callers record in snapshot order.
    pub fn record_success(&mut self, artifact: ResultArtifact) -> &ResultArtifact {
        self.artifacts.push(artifact);
        &self.artifacts[self.artifacts.len() - 1]
    }

    pub fn artifacts(&self) -> &[ResultArtifact] {
        &self.artifacts
    }

    pub fn len(&self) -> usize {
        self.artifacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.artifacts.is_empty()
    }

    /// Download names in ledger order, unique within the ledger.
    pub fn download_names(&self) -> Vec<String> {
        unique_entry_names(self.artifacts.iter().map(|a| a.output_name.as_str()))
    }

    /// Position of the artifact delivered as `download_name`.
    pub fn position_of(&self, download_name: &str) -> Option<usize> {
        self.download_names().iter().position(|n| n == download_name)
    }

    /// Bulk download is offered only for more than one artifact.
    pub fn can_download_all(&self) -> bool {
        self.artifacts.len() > 1
    }

    /// Write the artifact delivered as `download_name` into `dest_dir`.
    pub async fn download_one(&self, download_name: &str, dest_dir: &Path) -> Result<PathBuf, BatchError> {
        let index = self.position_of(download_name).ok_or_else(|| BatchError::ArtifactNotFound {
            name: download_name.to_string(),
        })?;
        self.download_at(index, dest_dir).await
    }

    /// Write the artifact at ledger position `index` into `dest_dir`.
    pub async fn download_at(&self, index: usize, dest_dir: &Path) -> Result<PathBuf, BatchError> {
        let artifact = self.artifacts.get(index).ok_or(BatchError::ArtifactIndexOutOfRange {
            index,
            len: self.artifacts.len(),
        })?;
        let mut names = self.download_names();
        let name = names.swap_remove(index);
        deliver(artifact, &name, dest_dir).await
    }

    /// Bundle every artifact into one ZIP archive written to `dest`.
    pub async fn download_all(&self, dest: &Path) -> Result<PathBuf, BatchError> {
        if !self.can_download_all() {
            return Err(BatchError::BundleUnavailable {
                count: self.artifacts.len(),
            });
        }
        let bytes = self.archive_bytes(dest).await?;
        write_atomic(dest, &bytes).await?;
        info!("Bundled {} files into {}", self.artifacts.len(), dest.display());
        Ok(dest.to_path_buf())
    }

    /// Build the ZIP archive in memory. `label` only names errors.
    pub async fn archive_bytes(&self, label: &Path) -> Result<Vec<u8>, BatchError> {
        let names = self.download_names();
        let mut entries = Vec::with_capacity(self.artifacts.len());
        for (artifact, name) in self.artifacts.iter().zip(names) {
            entries.push((name, artifact.handle.read().await?));
        }

        let label = label.to_path_buf();
        tokio::task::spawn_blocking(move || build_zip(&entries).map_err(|detail| BatchError::ArchiveFailed {
            path: label,
            detail,
        }))
        .await
        .map_err(|e| BatchError::Internal(format!("Archive task panicked: {e}")))?
    }

    pub fn reset(&mut self) {
        self.artifacts.clear();
    }
}

/// Write one artifact into `dest_dir` as `name`.
pub async fn deliver(artifact: &ResultArtifact, name: &str, dest_dir: &Path) -> Result<PathBuf, BatchError> {
    let bytes = artifact.handle.read().await?;
    let path = dest_dir.join(name);
    write_atomic(&path, &bytes).await?;
    debug!("Delivered {} ({} bytes)", path.display(), bytes.len());
    Ok(path)
}

/// Atomic write: temp file next to the target, then rename.
async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), BatchError> {
    let write_err = |e: std::io::Error| BatchError::OutputWriteFailed {
        path: path.to_path_buf(),
        source: e,
    };

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
        }
    }

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp_path = path.with_file_name(format!(".{file_name}.tmp"));
    tokio::fs::write(&tmp_path, bytes).await.map_err(write_err)?;
    tokio::fs::rename(&tmp_path, path).await.map_err(write_err)?;
    Ok(())
}

fn build_zip(entries: &[(String, Vec<u8>)]) -> Result<Vec<u8>, String> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    for (name, bytes) in entries {
        zip.start_file(name.clone(), options).map_err(|e| e.to_string())?;
        zip.write_all(bytes).map_err(|e| e.to_string())?;
    }
    let cursor = zip.finish().map_err(|e| e.to_string())?;
    Ok(cursor.into_inner())
}

/// Disambiguate repeated names: `a.png`, `a (1).png`, `a (2).png`.
///
/// The first occurrence of a name keeps it. A generated suffix skips every
/// name already in the list, so the result never repeats.
pub fn unique_entry_names<'a>(names: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    let names: Vec<&str> = names.into_iter().collect();
    let mut taken: HashSet<String> = names.iter().map(|n| n.to_string()).collect();
    let mut emitted: HashSet<&str> = HashSet::new();
    let mut out = Vec::with_capacity(names.len());
    for name in names {
        if emitted.insert(name) {
            out.push(name.to_string());
            continue;
        }
        let mut n = 1;
        let unique = loop {
            let candidate = match name.rsplit_once('.') {
                Some((stem, ext)) => format!("{stem} ({n}).{ext}"),
                None => format!("{name} ({n})"),
            };
            if taken.insert(candidate.clone()) {
                break candidate;
            }
            n += 1;
        };
        out.push(unique);
    }
    out
}
