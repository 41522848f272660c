//! Configuration types for batch intake and conversion.
//!
//! All behaviour is controlled through [`BatchConfig`], built via its
//! [`BatchConfigBuilder`]. One struct holds every knob so a config can be
//! shared across tasks and logged as a whole.

use crate::error::BatchError;
use crate::notify::SharedNotifier;
use crate::pipeline::intake::{AcceptSpecifier, IntakeFilter, DEFAULT_MAX_SIZE_BYTES};
use crate::progress::ProgressCallback;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Configuration for an intake + conversion session.
///
/// # Example
/// ```rust
/// use filebatch::{BatchConfig, ToolPreset};
///
/// let config = BatchConfig::builder()
///     .preset(ToolPreset::ImageConverter)
///     .target_format("webp")
///     .quality(70)
///     .concurrency(2)
///     .build()
///     .unwrap();
/// assert_eq!(config.effective_target(), Some("webp"));
/// ```
#[derive(Clone)]
pub struct BatchConfig {
    /// Size and type constraints for intake. Default: any type up to 10 MiB.
    ///
    /// Setting a [`ToolPreset`] replaces the type constraints with the
    /// preset's and keeps the size cap.
    pub filter: IntakeFilter,

    /// Tool whose accepted inputs and output formats apply. Default: [`ToolPreset::Generic`].
    pub preset: ToolPreset,

    /// Output format without a dot. `None` falls back to the preset default.
    pub target_format: Option<String>,

    /// Encoder quality forwarded to the backend when the preset offers it. Default: 80.
    pub quality: u8,

    /// Number of backend calls in flight at once. Default: 4.
    ///
    /// Artifacts are always exposed in batch order regardless of this value;
    /// `1` makes the backend see files strictly one after another.
    pub concurrency: usize,

    /// Retry attempts for a failed backend call. Default: 0.
    pub max_retries: u32,

    /// Initial retry delay in milliseconds, doubled per attempt. Default: 500.
    pub retry_backoff_ms: u64,

    /// Per-file backend timeout in seconds. Default: none.
    pub file_timeout_secs: Option<u64>,

    /// Caller policy capping the number of files in the batch. Default: none.
    ///
    /// The registry itself never enforces a cap; the session truncates
    /// additions beyond this limit and reports them as skipped.
    pub max_batch_files: Option<usize>,

    /// Download timeout for URL inputs in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// Per-file progress events.
    pub progress_callback: Option<ProgressCallback>,

    /// Sink for user-facing notices. `None` logs them through `tracing`.
    pub notifier: Option<SharedNotifier>,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            filter: IntakeFilter::default(),
            preset: ToolPreset::default(),
            target_format: None,
            quality: 80,
            concurrency: 4,
            max_retries: 0,
            retry_backoff_ms: 500,
            file_timeout_secs: None,
            max_batch_files: None,
            download_timeout_secs: 120,
            progress_callback: None,
            notifier: None,
        }
    }
}

impl fmt::Debug for BatchConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchConfig")
            .field("filter", &self.filter)
            .field("preset", &self.preset)
            .field("target_format", &self.target_format)
            .field("quality", &self.quality)
            .field("concurrency", &self.concurrency)
            .field("max_retries", &self.max_retries)
            .field("retry_backoff_ms", &self.retry_backoff_ms)
            .field("file_timeout_secs", &self.file_timeout_secs)
            .field("max_batch_files", &self.max_batch_files)
            .field("download_timeout_secs", &self.download_timeout_secs)
            .field("progress_callback", &self.progress_callback.as_ref().map(|_| "<dyn BatchProgressCallback>"))
            .field("notifier", &self.notifier.as_ref().map(|_| "<dyn Notifier>"))
            .finish()
    }
}

impl BatchConfig {
    /// Create a new builder for `BatchConfig`.
    pub fn builder() -> BatchConfigBuilder {
        BatchConfigBuilder {
            config: Self::default(),
        }
    }

    /// The explicit target format, else the preset default.
    pub fn effective_target(&self) -> Option<&str> {
        self.target_format.as_deref().or(self.preset.default_target())
    }

    /// Quality to forward to the backend, if the preset uses one.
    pub fn effective_quality(&self) -> Option<u8> {
        self.preset.supports_quality().then_some(self.quality)
    }
}

/// Builder for [`BatchConfig`].
#[derive(Debug)]
pub struct BatchConfigBuilder {
    config: BatchConfig,
}

impl BatchConfigBuilder {
    pub fn filter(mut self, filter: IntakeFilter) -> Self {
        self.config.filter = filter;
        self
    }

    pub fn max_size_bytes(mut self, n: u64) -> Self {
        self.config.filter.max_size_bytes = n;
        self
    }

    /// Switch tool. Replaces the filter's type rules with the preset's.
    pub fn preset(mut self, preset: ToolPreset) -> Self {
        self.config.filter = preset.filter(self.config.filter.max_size_bytes);
        self.config.preset = preset;
        self
    }

    pub fn target_format(mut self, format: impl Into<String>) -> Self {
        self.config.target_format = Some(normalise_format(&format.into()));
        self
    }

    pub fn quality(mut self, q: u8) -> Self {
        self.config.quality = q.clamp(1, 100);
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn file_timeout_secs(mut self, secs: u64) -> Self {
        self.config.file_timeout_secs = Some(secs);
        self
    }

    pub fn max_batch_files(mut self, n: usize) -> Self {
        self.config.max_batch_files = Some(n);
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    pub fn notifier(mut self, notifier: SharedNotifier) -> Self {
        self.config.notifier = Some(notifier);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<BatchConfig, BatchError> {
        let c = &self.config;
        if c.concurrency == 0 {
            return Err(BatchError::InvalidConfig("Concurrency must be ≥ 1".into()));
        }
        if c.filter.max_size_bytes == 0 {
            return Err(BatchError::InvalidConfig("Maximum file size must be > 0".into()));
        }
        if c.file_timeout_secs == Some(0) {
            return Err(BatchError::InvalidConfig("File timeout must be ≥ 1s".into()));
        }
        if c.max_batch_files == Some(0) {
            return Err(BatchError::InvalidConfig("Batch limit must be ≥ 1".into()));
        }
        if let Some(ref target) = c.target_format {
            validate_format(target)?;
            c.preset.check_target(target)?;
        }
        Ok(self.config)
    }
}

/// Lower-case and strip a leading dot: `".PNG"` → `"png"`.
pub fn normalise_format(format: &str) -> String {
    format.trim().trim_start_matches('.').to_lowercase()
}

/// A target format must be a non-empty token without separators.
pub fn validate_format(format: &str) -> Result<(), BatchError> {
    if format.is_empty() {
        return Err(BatchError::InvalidConfig("Target format must not be empty".into()));
    }
    if format.contains(['.', '/', '\\']) || format.chars().any(char::is_whitespace) {
        return Err(BatchError::InvalidConfig(format!(
            "Target format '{format}' must be a bare extension such as 'png'"
        )));
    }
    Ok(())
}

// ── Presets ──────────────────────────────────────────────────────────────

/// Tool pages of the catalog, each with its own inputs and outputs.
///
/// | Preset | Accepts | Offers |
/// |--------|---------|--------|
/// | `Generic` | per filter | any format |
/// | `ImageConverter` | `image/*` | jpg, png, webp, gif |
/// | `ToPdf` | anything but PDF | pdf |
/// | `FromPdf` | PDF only | docx, txt, html, jpg |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ToolPreset {
    #[default]
    Generic,
    ImageConverter,
    ToPdf,
    FromPdf,
}

impl ToolPreset {
    /// Output formats offered, default first. Empty means unrestricted.
    pub fn target_formats(&self) -> &'static [&'static str] {
        match self {
            ToolPreset::Generic => &[],
            ToolPreset::ImageConverter => &["jpg", "png", "webp", "gif"],
            ToolPreset::ToPdf => &["pdf"],
            ToolPreset::FromPdf => &["docx", "txt", "html", "jpg"],
        }
    }

    pub fn default_target(&self) -> Option<&'static str> {
        self.target_formats().first().copied()
    }

    /// Only the image tool exposes a quality slider.
    pub fn supports_quality(&self) -> bool {
        matches!(self, ToolPreset::ImageConverter)
    }

    /// Intake filter for this tool with the given size cap.
    pub fn filter(&self, max_size_bytes: u64) -> IntakeFilter {
        let pdf = || {
            [
                AcceptSpecifier::Exact("application/pdf".into()),
                AcceptSpecifier::Extension(".pdf".into()),
            ]
        };
        let base = IntakeFilter::any(max_size_bytes);
        match self {
            ToolPreset::Generic => base,
            ToolPreset::ImageConverter => base.accept(AcceptSpecifier::Category("image".into())),
            ToolPreset::ToPdf => pdf().into_iter().fold(base, IntakeFilter::exclude),
            ToolPreset::FromPdf => pdf().into_iter().fold(base, IntakeFilter::accept),
        }
    }

    /// Refuse formats the tool does not offer.
    pub fn check_target(&self, target: &str) -> Result<(), BatchError> {
        let offered = self.target_formats();
        if offered.is_empty() || offered.contains(&target) {
            return Ok(());
        }
        Err(BatchError::UnsupportedTarget {
            target: target.to_string(),
            preset: self.to_string(),
            offered: offered.join(", "),
        })
    }
}

impl fmt::Display for ToolPreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ToolPreset::Generic => "generic converter",
            ToolPreset::ImageConverter => "image converter",
            ToolPreset::ToPdf => "to-PDF converter",
            ToolPreset::FromPdf => "from-PDF converter",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::intake::FileEntry;

    #[test]
    fn defaults() {
        let c = BatchConfig::default();
        assert_eq!(c.filter.max_size_bytes, DEFAULT_MAX_SIZE_BYTES);
        assert_eq!(c.concurrency, 4);
        assert_eq!(c.quality, 80);
        assert_eq!(c.effective_target(), None);
        assert_eq!(c.effective_quality(), None);
    }

    #[test]
    fn builder_clamps() {
        let c = BatchConfig::builder().concurrency(0).quality(0).build().unwrap();
        assert_eq!(c.concurrency, 1);
        assert_eq!(c.quality, 1);
        let c = BatchConfig::builder().quality(250).build().unwrap();
        assert_eq!(c.quality, 100);
    }

    #[test]
    fn target_format_is_normalised() {
        let c = BatchConfig::builder().target_format(".PNG").build().unwrap();
        assert_eq!(c.effective_target(), Some("png"));
    }

    #[test]
    fn bad_target_formats_are_rejected() {
        for bad in ["", "tar.gz", "a/b", "p n g"] {
            let err = BatchConfig::builder().target_format(bad).build().unwrap_err();
            assert!(matches!(err, BatchError::InvalidConfig(_)), "{bad:?} → {err:?}");
        }
    }

    #[test]
    fn preset_limits_targets() {
        let err = BatchConfig::builder()
            .preset(ToolPreset::ImageConverter)
            .target_format("docx")
            .build()
            .unwrap_err();
        assert!(matches!(err, BatchError::UnsupportedTarget { .. }));

        let c = BatchConfig::builder()
            .preset(ToolPreset::FromPdf)
            .build()
            .unwrap();
        assert_eq!(c.effective_target(), Some("docx"));
    }

    #[test]
    fn preset_keeps_size_cap() {
        let c = BatchConfig::builder()
            .max_size_bytes(512)
            .preset(ToolPreset::ImageConverter)
            .build()
            .unwrap();
        assert_eq!(c.filter.max_size_bytes, 512);
        assert_eq!(c.effective_quality(), Some(80));
    }

    #[test]
    fn preset_filters_follow_the_tools() {
        let png = FileEntry::from_bytes("a.png", "image/png", vec![0]);
        let pdf = FileEntry::from_bytes("a.pdf", "application/pdf", vec![0]);
        let doc = FileEntry::from_bytes("a.docx", "application/msword", vec![0]);

        let image = ToolPreset::ImageConverter.filter(10);
        assert!(image.evaluate(&png).is_accepted());
        assert!(!image.evaluate(&pdf).is_accepted());

        let to_pdf = ToolPreset::ToPdf.filter(10);
        assert!(to_pdf.evaluate(&doc).is_accepted());
        assert!(to_pdf.evaluate(&png).is_accepted());
        assert!(!to_pdf.evaluate(&pdf).is_accepted());

        let from_pdf = ToolPreset::FromPdf.filter(10);
        assert!(from_pdf.evaluate(&pdf).is_accepted());
        assert!(!from_pdf.evaluate(&doc).is_accepted());
    }

    #[test]
    fn zero_limits_are_invalid() {
        assert!(BatchConfig::builder().max_size_bytes(0).build().is_err());
        assert!(BatchConfig::builder().max_batch_files(0).build().is_err());
        assert!(BatchConfig::builder().file_timeout_secs(0).build().is_err());
    }

    #[test]
    fn debug_hides_callbacks() {
        let c = BatchConfig::builder()
            .notifier(std::sync::Arc::new(crate::notify::NoopNotifier))
            .build()
            .unwrap();
        let dbg = format!("{c:?}");
        assert!(dbg.contains("<dyn Notifier>"));
    }
}
