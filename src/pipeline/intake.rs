//! File intake: classify candidate files against an [`IntakeFilter`].
//!
//! Both user entry points (dropping files onto the surface and picking them
//! through a file dialog) funnel into [`evaluate_batch`]. There is exactly
//! one validation path, so identical inputs always produce identical reports
//! regardless of how they arrived.
//!
//! Intake never mutates anything. Inserting the accepted entries into a
//! [`crate::pipeline::registry::BatchRegistry`] is the caller's job.

use crate::error::{BatchError, Rejection};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, warn};

/// Default size cap: 10 MiB.
pub const DEFAULT_MAX_SIZE_BYTES: u64 = 10 * 1024 * 1024;

// ── FileEntry ────────────────────────────────────────────────────────────

/// Where the bytes of a [`FileEntry`] live.
#[derive(Debug)]
pub enum FileSource {
    /// Bytes already in memory (dropped files, downloaded URLs).
    Memory(Vec<u8>),
    /// A file on the local file system, read lazily by the backend.
    Path(PathBuf),
}

/// One user-supplied input file.
///
/// The entry exclusively owns its byte source. Registries share entries
/// behind `Arc` so a running job can read them without copying.
#[derive(Debug)]
pub struct FileEntry {
    name: String,
    size_bytes: u64,
    mime_type: String,
    source: FileSource,
}

impl FileEntry {
    pub fn new(
        name: impl Into<String>,
        size_bytes: u64,
        mime_type: impl Into<String>,
        source: FileSource,
    ) -> Self {
        Self {
            name: name.into(),
            size_bytes,
            mime_type: mime_type.into(),
            source,
        }
    }

    /// An in-memory entry; `size_bytes` is taken from the buffer.
    pub fn from_bytes(name: impl Into<String>, mime_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        let size_bytes = bytes.len() as u64;
        Self::new(name, size_bytes, mime_type, FileSource::Memory(bytes))
    }

    /// An entry backed by a local file whose size is already known.
    pub fn from_path(
        name: impl Into<String>,
        size_bytes: u64,
        mime_type: impl Into<String>,
        path: impl Into<PathBuf>,
    ) -> Self {
        Self::new(name, size_bytes, mime_type, FileSource::Path(path.into()))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn size_bytes(&self) -> u64 {
        self.size_bytes
    }

    /// MIME type as reported by the source; may be empty.
    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn source(&self) -> &FileSource {
        &self.source
    }

    /// Lower-cased extension including the dot (`".jpg"`), taken after the
    /// last dot of the name. A name without a dot is its own extension, so
    /// `README` yields `".readme"`.
    pub fn extension(&self) -> String {
        let ext = self.name.rsplit_once('.').map_or(self.name.as_str(), |(_, ext)| ext);
        format!(".{}", ext.to_lowercase())
    }

    /// Read the full contents behind this entry.
    pub async fn read_bytes(&self) -> Result<Vec<u8>, BatchError> {
        match &self.source {
            FileSource::Memory(bytes) => Ok(bytes.clone()),
            FileSource::Path(path) => tokio::fs::read(path).await.map_err(|e| BatchError::ReadFailed {
                name: self.name.clone(),
                source: e,
            }),
        }
    }

    /// Local path behind this entry, if any.
    pub fn path(&self) -> Option<&Path> {
        match &self.source {
            FileSource::Path(p) => Some(p),
            FileSource::Memory(_) => None,
        }
    }

    /// Serialisable summary for presentation layers.
    pub fn info(&self) -> FileInfo {
        FileInfo {
            name: self.name.clone(),
            size_bytes: self.size_bytes,
            mime_type: self.mime_type.clone(),
        }
    }
}

/// Name, size and type of a [`FileEntry`], without its bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileInfo {
    pub name: String,
    pub size_bytes: u64,
    pub mime_type: String,
}

// ── Specifiers ───────────────────────────────────────────────────────────

/// One entry of an HTML-style `accept` list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AcceptSpecifier {
    /// `.ext`: compared case-insensitively with the file's extension.
    /// Stored lower-cased, dot included.
    Extension(String),
    /// `category/*`: the MIME type must start with `category/`.
    /// Stored as the bare category.
    Category(String),
    /// Exact MIME string, compared verbatim.
    Exact(String),
}

impl AcceptSpecifier {
    /// Whether `entry` satisfies this specifier.
    pub fn matches(&self, entry: &FileEntry) -> bool {
        match self {
            AcceptSpecifier::Extension(ext) => entry.extension() == *ext,
            AcceptSpecifier::Category(category) => entry
                .mime_type()
                .strip_prefix(category.as_str())
                .is_some_and(|rest| rest.starts_with('/')),
            AcceptSpecifier::Exact(mime) => entry.mime_type() == mime,
        }
    }
}

impl FromStr for AcceptSpecifier {
    type Err = BatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(BatchError::InvalidConfig("empty accept specifier".into()));
        }
        if s.starts_with('.') {
            if s.len() == 1 {
                return Err(BatchError::InvalidConfig("accept specifier '.' has no extension".into()));
            }
            return Ok(AcceptSpecifier::Extension(s.to_lowercase()));
        }
        if s.contains('*') {
            let category = s.split('/').next().unwrap_or_default();
            if category.is_empty() || category == "*" {
                return Err(BatchError::InvalidConfig(format!(
                    "wildcard specifier '{s}' needs a category, e.g. image/*"
                )));
            }
            return Ok(AcceptSpecifier::Category(category.to_string()));
        }
        Ok(AcceptSpecifier::Exact(s.to_string()))
    }
}

impl fmt::Display for AcceptSpecifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AcceptSpecifier::Extension(ext) => f.write_str(ext),
            AcceptSpecifier::Category(category) => write!(f, "{category}/*"),
            AcceptSpecifier::Exact(mime) => f.write_str(mime),
        }
    }
}

// ── Filter ───────────────────────────────────────────────────────────────

/// Size and type constraints applied to every candidate.
///
/// An empty `accepted` list admits any type. `excluded` is checked after
/// `accepted`; a match there rejects the file even if it was accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntakeFilter {
    pub accepted: Vec<AcceptSpecifier>,
    pub excluded: Vec<AcceptSpecifier>,
    pub max_size_bytes: u64,
}

impl Default for IntakeFilter {
    fn default() -> Self {
        Self {
            accepted: Vec::new(),
            excluded: Vec::new(),
            max_size_bytes: DEFAULT_MAX_SIZE_BYTES,
        }
    }
}

impl IntakeFilter {
    /// Accept any type up to `max_size_bytes`.
    pub fn any(max_size_bytes: u64) -> Self {
        Self {
            max_size_bytes,
            ..Self::default()
        }
    }

    /// Parse an `accept` attribute such as `"image/*, .pdf"`.
    /// `"*"` or an empty string means any type.
    pub fn from_accept(accept: &str, max_size_bytes: u64) -> Result<Self, BatchError> {
        let accept = accept.trim();
        let accepted = if accept.is_empty() || accept == "*" {
            Vec::new()
        } else {
            parse_specifiers(accept)?
        };
        Ok(Self {
            accepted,
            excluded: Vec::new(),
            max_size_bytes,
        })
    }

    pub fn accept(mut self, spec: AcceptSpecifier) -> Self {
        self.accepted.push(spec);
        self
    }

    pub fn exclude(mut self, spec: AcceptSpecifier) -> Self {
        self.excluded.push(spec);
        self
    }

    /// Classify one candidate. Size is checked before type.
    pub fn evaluate(&self, candidate: &FileEntry) -> Verdict {
        if candidate.size_bytes() > self.max_size_bytes {
            return Verdict::Rejected(Rejection::TooLarge);
        }
        if !self.accepted.is_empty() && !self.accepted.iter().any(|s| s.matches(candidate)) {
            return Verdict::Rejected(Rejection::UnsupportedType);
        }
        if self.excluded.iter().any(|s| s.matches(candidate)) {
            return Verdict::Rejected(Rejection::UnsupportedType);
        }
        Verdict::Accepted
    }
}

/// Split a comma-separated specifier list.
pub fn parse_specifiers(list: &str) -> Result<Vec<AcceptSpecifier>, BatchError> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(AcceptSpecifier::from_str)
        .collect()
}

/// Outcome of [`evaluate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Accepted,
    Rejected(Rejection),
}

impl Verdict {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Verdict::Accepted)
    }
}

/// A file turned away at intake.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectedFile {
    pub name: String,
    pub size_bytes: u64,
    pub reason: Rejection,
}

/// Result of classifying a set of candidates.
#[derive(Debug, Default)]
pub struct IntakeReport {
    /// Accepted entries, in the order they were offered.
    pub accepted: Vec<FileEntry>,
    /// Everything that was turned away, in the order it was offered.
    pub rejected: Vec<RejectedFile>,
}

impl IntakeReport {
    pub fn rejected_count(&self) -> usize {
        self.rejected.len()
    }

    pub fn offered_count(&self) -> usize {
        self.accepted.len() + self.rejected.len()
    }

    pub fn is_partial(&self) -> bool {
        !self.accepted.is_empty() && !self.rejected.is_empty()
    }
}

/// Classify a single candidate.
pub fn evaluate(candidate: &FileEntry, filter: &IntakeFilter) -> Verdict {
    filter.evaluate(candidate)
}

/// Classify every candidate, keeping accepted entries in offered order.
pub fn evaluate_batch(
    candidates: impl IntoIterator<Item = FileEntry>,
    filter: &IntakeFilter,
) -> IntakeReport {
    let mut report = IntakeReport::default();
    for candidate in candidates {
        match filter.evaluate(&candidate) {
            Verdict::Accepted => {
                debug!("Accepted '{}' ({} bytes)", candidate.name(), candidate.size_bytes());
                report.accepted.push(candidate);
            }
            Verdict::Rejected(reason) => {
                warn!("Skipping '{}': {}", candidate.name(), reason);
                report.rejected.push(RejectedFile {
                    name: candidate.name().to_string(),
                    size_bytes: candidate.size_bytes(),
                    reason,
                });
            }
        }
    }
    report
}

/// Files dropped onto the intake surface.
pub fn from_drop(dropped: Vec<FileEntry>, filter: &IntakeFilter) -> IntakeReport {
    evaluate_batch(dropped, filter)
}

/// Files chosen through the picker dialog.
pub fn from_picker(picked: Vec<FileEntry>, filter: &IntakeFilter) -> IntakeReport {
    evaluate_batch(picked, filter)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(name: &str, size: u64, mime: &str) -> FileEntry {
        FileEntry::from_path(name, size, mime, format!("/tmp/{name}"))
    }

    fn images_and_pdf() -> IntakeFilter {
        IntakeFilter::from_accept("image/*, .pdf", 1_000).unwrap()
    }

    #[test]
    fn too_large_wins_over_type() {
        let f = images_and_pdf();
        assert_eq!(
            f.evaluate(&file("huge.png", 1_001, "image/png")),
            Verdict::Rejected(Rejection::TooLarge)
        );
        assert_eq!(
            f.evaluate(&file("huge.exe", 5_000, "application/x-msdownload")),
            Verdict::Rejected(Rejection::TooLarge)
        );
    }

    #[test]
    fn size_equal_to_limit_is_accepted() {
        let f = IntakeFilter::any(100);
        assert!(f.evaluate(&file("a.bin", 100, "")).is_accepted());
    }

    #[test]
    fn extension_match_is_case_insensitive() {
        let f = images_and_pdf();
        assert!(f.evaluate(&file("SCAN.PDF", 10, "")).is_accepted());
        assert!(f.evaluate(&file("scan.Pdf", 10, "application/octet-stream")).is_accepted());
    }

    #[test]
    fn extension_uses_last_dot() {
        let f = IntakeFilter::from_accept(".gz", 1_000).unwrap();
        assert!(f.evaluate(&file("archive.tar.gz", 10, "")).is_accepted());
        let f = IntakeFilter::from_accept(".tar", 1_000).unwrap();
        assert!(!f.evaluate(&file("archive.tar.gz", 10, "")).is_accepted());
    }

    #[test]
    fn name_without_dot_is_its_own_extension() {
        assert_eq!(file("README", 1, "").extension(), ".readme");
        let f = IntakeFilter::from_accept(".readme", 1_000).unwrap();
        assert!(f.evaluate(&file("README", 1, "")).is_accepted());
        let f = IntakeFilter::from_accept(".txt", 1_000).unwrap();
        assert_eq!(
            f.evaluate(&file("README", 1, "")),
            Verdict::Rejected(Rejection::UnsupportedType)
        );
    }

    #[test]
    fn wildcard_requires_category_slash() {
        let f = IntakeFilter::from_accept("image/*", 1_000).unwrap();
        assert!(f.evaluate(&file("a.webp", 1, "image/webp")).is_accepted());
        assert!(!f.evaluate(&file("a.x", 1, "imagery/x")).is_accepted());
        assert!(!f.evaluate(&file("a.x", 1, "")).is_accepted());
    }

    #[test]
    fn exact_mime_must_match_verbatim() {
        let f = IntakeFilter::from_accept("application/pdf", 1_000).unwrap();
        assert!(f.evaluate(&file("x", 1, "application/pdf")).is_accepted());
        assert!(!f.evaluate(&file("x", 1, "application/pdf; charset=binary")).is_accepted());
    }

    #[test]
    fn empty_or_star_accepts_any_type() {
        for accept in ["", "*", "  *  "] {
            let f = IntakeFilter::from_accept(accept, 1_000).unwrap();
            assert!(f.accepted.is_empty());
            assert!(f.evaluate(&file("a.weird", 1, "x/y")).is_accepted());
        }
    }

    #[test]
    fn excluded_specifier_rejects() {
        let f = IntakeFilter::any(1_000)
            .exclude(AcceptSpecifier::Exact("application/pdf".into()))
            .exclude(AcceptSpecifier::Extension(".pdf".into()));
        assert!(f.evaluate(&file("notes.docx", 1, "application/msword")).is_accepted());
        assert_eq!(
            f.evaluate(&file("paper.pdf", 1, "")),
            Verdict::Rejected(Rejection::UnsupportedType)
        );
    }

    #[test]
    fn parse_specifier_kinds() {
        assert_eq!(
            ".PNG".parse::<AcceptSpecifier>().unwrap(),
            AcceptSpecifier::Extension(".png".into())
        );
        assert_eq!(
            "audio/*".parse::<AcceptSpecifier>().unwrap(),
            AcceptSpecifier::Category("audio".into())
        );
        assert_eq!(
            "text/plain".parse::<AcceptSpecifier>().unwrap(),
            AcceptSpecifier::Exact("text/plain".into())
        );
        assert!(".".parse::<AcceptSpecifier>().is_err());
        assert!("*/*".parse::<AcceptSpecifier>().is_err());
    }

    #[test]
    fn specifier_display_round_trips_the_accept_syntax() {
        let specs = parse_specifiers("image/*,.pdf,text/plain").unwrap();
        let rendered: Vec<String> = specs.iter().map(ToString::to_string).collect();
        assert_eq!(rendered, vec!["image/*", ".pdf", "text/plain"]);
    }

    #[test]
    fn batch_keeps_relative_order_and_counts_rejections() {
        let f = images_and_pdf();
        let report = evaluate_batch(
            vec![
                file("a.png", 10, "image/png"),
                file("b.exe", 10, "application/octet-stream"),
                file("c.pdf", 10, "application/pdf"),
                file("d.jpg", 5_000, "image/jpeg"),
                file("e.gif", 10, "image/gif"),
            ],
            &f,
        );
        let names: Vec<&str> = report.accepted.iter().map(|e| e.name()).collect();
        assert_eq!(names, vec!["a.png", "c.pdf", "e.gif"]);
        assert_eq!(report.rejected_count(), 2);
        assert_eq!(report.rejected[0].reason, Rejection::UnsupportedType);
        assert_eq!(report.rejected[1].reason, Rejection::TooLarge);
        assert!(report.is_partial());
        assert_eq!(report.offered_count(), 5);
    }

    #[test]
    fn drop_and_picker_agree() {
        let f = images_and_pdf();
        let make = || {
            vec![
                file("a.png", 10, "image/png"),
                file("b.txt", 10, "text/plain"),
                file("c.pdf", 2_000, "application/pdf"),
            ]
        };
        let dropped = from_drop(make(), &f);
        let picked = from_picker(make(), &f);
        let names = |r: &IntakeReport| r.accepted.iter().map(|e| e.name().to_string()).collect::<Vec<_>>();
        assert_eq!(names(&dropped), names(&picked));
        assert_eq!(dropped.rejected, picked.rejected);
    }

    #[test]
    fn duplicate_names_are_kept() {
        let report = evaluate_batch(
            vec![file("same.png", 1, "image/png"), file("same.png", 2, "image/png")],
            &IntakeFilter::default(),
        );
        assert_eq!(report.accepted.len(), 2);
    }

    #[tokio::test]
    async fn memory_entries_read_back_their_bytes() {
        let entry = FileEntry::from_bytes("hello.txt", "text/plain", b"hello".to_vec());
        assert_eq!(entry.size_bytes(), 5);
        assert_eq!(entry.read_bytes().await.unwrap(), b"hello");
        assert!(entry.path().is_none());
    }

    #[tokio::test]
    async fn missing_path_reports_read_failure() {
        let entry = FileEntry::from_path("gone.txt", 3, "text/plain", "/definitely/not/here.txt");
        let err = entry.read_bytes().await.unwrap_err();
        assert!(matches!(err, BatchError::ReadFailed { .. }), "got: {err:?}");
    }
}
