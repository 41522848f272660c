//! CLI binary for filebatch.
//!
//! A thin shim over the library crate: resolves paths and URLs into
//! candidate files, runs them through a [`Session`], and writes the
//! converted files to a directory (plus an optional ZIP bundle).

use anyhow::{Context, Result};
use clap::Parser;
use filebatch::pipeline::input::resolve_inputs;
use filebatch::{
    BatchConfig, BatchProgressCallback, IntakeFilter, JobStatus, Notice, Notifier,
    ProgressCallback, Session, SimulatedBackend, ToolPreset,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn yellow(s: &str) -> String {
    format!("\x1b[33m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback. Files may complete out of order, so start
/// times are kept per snapshot index.
struct CliProgressCallback {
    bar: ProgressBar,
    start_times: Mutex<HashMap<usize, Instant>>,
    errors: AtomicUsize,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} files  \
             ⏱ {elapsed_precise}  ETA {eta_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);
        bar.set_style(style);
        bar.set_prefix("Converting");

        Arc::new(Self {
            bar,
            start_times: Mutex::new(HashMap::new()),
            errors: AtomicUsize::new(0),
        })
    }

    fn elapsed_secs(&self, index: usize) -> f64 {
        self.start_times
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&index)
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }
}

impl BatchProgressCallback for CliProgressCallback {
    fn on_job_start(&self, total_files: usize) {
        self.bar.set_length(total_files as u64);
        self.bar.enable_steady_tick(Duration::from_millis(80));
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Converting {total_files} files…"))
        ));
    }

    fn on_file_start(&self, index: usize, _total: usize, name: &str) {
        self.start_times
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(index, Instant::now());
        self.bar.set_message(name.to_string());
    }

    fn on_file_complete(&self, index: usize, total: usize, output_name: &str) {
        let secs = self.elapsed_secs(index);
        self.bar.println(format!(
            "  {} File {:>3}/{:<3}  {}  {}",
            green("✓"),
            index + 1,
            total,
            output_name,
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_file_error(&self, index: usize, total: usize, error: &str) {
        let secs = self.elapsed_secs(index);
        self.errors.fetch_add(1, Ordering::SeqCst);

        let msg: String = if error.chars().count() > 80 {
            error.chars().take(79).chain(['…']).collect()
        } else {
            error.to_string()
        };
        self.bar.println(format!(
            "  {} File {:>3}/{:<3}  {}  {}",
            red("✗"),
            index + 1,
            total,
            red(&msg),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_job_complete(&self, _total: usize, _success_count: usize) {
        self.bar.finish_and_clear();
    }
}

// ── CLI notifier ─────────────────────────────────────────────────────────────

/// Prints notices to stderr the way a toast would show them.
struct CliNotifier {
    quiet: bool,
}

impl Notifier for CliNotifier {
    fn notify(&self, notice: &Notice) {
        if self.quiet {
            return;
        }
        let mark = match notice {
            Notice::ConversionComplete { failed: 0, .. } => green("✔"),
            Notice::ConversionComplete { .. } | Notice::FilesSkipped { .. } => yellow("⚠"),
            n if n.is_destructive() => red("✘"),
            _ => cyan("↓"),
        };
        eprintln!("{} {}  {}", mark, bold(notice.title()), dim(&notice.description()));
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Convert every image in a folder to WebP
  filebatch --preset image-converter --to webp photos/*.jpg -o out/

  # Documents to PDF, bundled into one archive
  filebatch --preset to-pdf --to pdf report.docx notes.txt --zip out/converted.zip

  # Only accept PNG and PDF files, up to 2 MiB each
  filebatch --accept ".png, application/pdf" --max-size 2097152 --to txt inputs/*

  # Fetch from a URL
  filebatch --to png https://example.com/picture.jpg

  # JSON summary for scripting
  filebatch --json --to pdf a.txt b.txt > summary.json

TOOL PRESETS:
  Preset           Accepts                  Output formats (default first)
  ───────────────  ───────────────────────  ──────────────────────────────
  generic          --accept list            any
  image-converter  image/*                  jpg, png, webp, gif
  to-pdf           anything except PDF      pdf
  from-pdf         PDF only                 docx, txt, html, jpg

ENVIRONMENT VARIABLES:
  Every flag can also be set as FILEBATCH_<FLAG>, e.g. FILEBATCH_CONCURRENCY=8.
  RUST_LOG overrides the log filter.

NOTE:
  Conversion uses the built-in simulated backend: each file waits
  --delay-ms and is written out unchanged under its new name.
"#;

/// Validate a batch of files and convert them with bounded concurrency.
#[derive(Parser, Debug)]
#[command(
    name = "filebatch",
    version,
    about = "Validate a batch of files and convert them with bounded concurrency",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Local file paths or HTTP/HTTPS URLs.
    #[arg(required = true)]
    inputs: Vec<String>,

    /// Tool preset deciding accepted inputs and output formats.
    #[arg(long, env = "FILEBATCH_PRESET", value_enum, default_value = "generic")]
    preset: PresetArg,

    /// Accepted types, HTML `accept` syntax (".pdf, image/*"). Overrides the preset's.
    #[arg(long, env = "FILEBATCH_ACCEPT")]
    accept: Option<String>,

    /// Maximum size of one file in bytes.
    #[arg(long, env = "FILEBATCH_MAX_SIZE", default_value_t = filebatch::DEFAULT_MAX_SIZE_BYTES)]
    max_size: u64,

    /// Maximum number of files in the batch.
    #[arg(long, env = "FILEBATCH_MAX_FILES")]
    max_files: Option<usize>,

    /// Output format (e.g. png, pdf). Defaults to the preset's first format.
    #[arg(short = 't', long = "to", env = "FILEBATCH_TO")]
    to: Option<String>,

    /// Encoder quality for the image converter (1–100).
    #[arg(long, env = "FILEBATCH_QUALITY", default_value_t = 80,
          value_parser = clap::value_parser!(u8).range(1..=100))]
    quality: u8,

    /// Number of files converted at once.
    #[arg(short, long, env = "FILEBATCH_CONCURRENCY", default_value_t = 4)]
    concurrency: usize,

    /// Retries per file on backend failure.
    #[arg(long, env = "FILEBATCH_MAX_RETRIES", default_value_t = 0)]
    max_retries: u32,

    /// Per-file conversion timeout in seconds.
    #[arg(long, env = "FILEBATCH_FILE_TIMEOUT")]
    file_timeout: Option<u64>,

    /// Simulated processing time per file in milliseconds.
    #[arg(long, env = "FILEBATCH_DELAY_MS", default_value_t = 2000)]
    delay_ms: u64,

    /// Directory the converted files are written to.
    #[arg(short, long, env = "FILEBATCH_OUTPUT_DIR", default_value = ".")]
    output_dir: PathBuf,

    /// Also bundle all converted files into this ZIP archive (needs ≥ 2 files).
    #[arg(long, env = "FILEBATCH_ZIP")]
    zip: Option<PathBuf>,

    /// Print a JSON summary of the session on stdout.
    #[arg(long, env = "FILEBATCH_JSON")]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "FILEBATCH_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "FILEBATCH_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "FILEBATCH_QUIET")]
    quiet: bool,

    /// HTTP download timeout in seconds.
    #[arg(long, env = "FILEBATCH_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum PresetArg {
    Generic,
    ImageConverter,
    ToPdf,
    FromPdf,
}

impl From<PresetArg> for ToolPreset {
    fn from(v: PresetArg) -> Self {
        match v {
            PresetArg::Generic => ToolPreset::Generic,
            PresetArg::ImageConverter => ToolPreset::ImageConverter,
            PresetArg::ToPdf => ToolPreset::ToPdf,
            PresetArg::FromPdf => ToolPreset::FromPdf,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar and notices carry the user-facing feedback; library
    // INFO logs would only interleave with them.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // ── Build session ────────────────────────────────────────────────────
    let progress_cb: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn BatchProgressCallback>)
    } else {
        None
    };
    let config = build_config(&cli, progress_cb)?;
    let target = config
        .effective_target()
        .map(str::to_string)
        .context("No output format: pass --to or choose a preset")?;

    let backend = Arc::new(SimulatedBackend::new(Duration::from_millis(cli.delay_ms)));
    let mut session = Session::new(backend, config);

    // ── Intake ───────────────────────────────────────────────────────────
    let candidates = resolve_inputs(&cli.inputs, cli.download_timeout)
        .await
        .context("Failed to resolve inputs")?;
    let outcome = session.add_files(candidates);
    if !cli.quiet {
        for r in &outcome.rejected {
            eprintln!("  {} {}  {}", red("✗"), r.name, dim(&r.reason.to_string()));
        }
        for name in &outcome.over_limit {
            eprintln!("  {} {}  {}", red("✗"), name, dim("batch limit reached"));
        }
    }
    if session.registry().is_empty() {
        anyhow::bail!("No files left to convert after intake");
    }

    // ── Convert ──────────────────────────────────────────────────────────
    let job = session
        .convert_and_wait(&target)
        .await
        .context("Conversion failed")?;

    // ── Deliver ──────────────────────────────────────────────────────────
    let mut written = Vec::with_capacity(job.outputs.len());
    for (index, artifact) in job.outputs.iter().enumerate() {
        let path = session
            .download_at(index, &cli.output_dir)
            .await
            .with_context(|| format!("Failed to write {}", artifact.output_name))?;
        written.push(path);
    }

    if let Some(ref zip_path) = cli.zip {
        if session.can_download_all().await {
            let path = session
                .download_all(zip_path)
                .await
                .context("Failed to build ZIP archive")?;
            written.push(path);
        } else if !cli.quiet {
            eprintln!(
                "{} {}",
                yellow("⚠"),
                dim("ZIP bundle skipped: fewer than 2 files converted")
            );
        }
    }

    // ── Summary ──────────────────────────────────────────────────────────
    if cli.json {
        let view = session.view().await;
        let summary = serde_json::json!({
            "job": job,
            "session": view,
            "written": written,
            "rejected": outcome.rejected,
        });
        println!(
            "{}",
            serde_json::to_string_pretty(&summary).context("Failed to serialise summary")?
        );
    } else if !cli.quiet {
        eprintln!(
            "   {} files  →  {}  {}",
            job.stats.converted_files,
            bold(&cli.output_dir.display().to_string()),
            dim(&format!("{}ms total", job.stats.total_duration_ms)),
        );
    }

    if job.status == JobStatus::Failed {
        anyhow::bail!(
            "{} of {} files failed to convert",
            job.stats.failed_files,
            job.stats.total_files
        );
    }
    Ok(())
}

/// Map CLI args to `BatchConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<BatchConfig> {
    let mut builder = BatchConfig::builder()
        .max_size_bytes(cli.max_size)
        .preset(cli.preset.into())
        .quality(cli.quality)
        .concurrency(cli.concurrency)
        .max_retries(cli.max_retries)
        .download_timeout_secs(cli.download_timeout)
        .notifier(Arc::new(CliNotifier { quiet: cli.quiet }));

    if let Some(ref accept) = cli.accept {
        let filter = IntakeFilter::from_accept(accept, cli.max_size)
            .with_context(|| format!("Invalid --accept list '{accept}'"))?;
        builder = builder.filter(filter);
    }
    if let Some(ref to) = cli.to {
        builder = builder.target_format(to.as_str());
    }
    if let Some(n) = cli.max_files {
        builder = builder.max_batch_files(n);
    }
    if let Some(secs) = cli.file_timeout {
        builder = builder.file_timeout_secs(secs);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("filebatch").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn defaults_map_onto_config() {
        let cli = parse(&["a.txt", "--to", "pdf"]);
        let config = build_config(&cli, None).unwrap();
        assert_eq!(config.concurrency, 4);
        assert_eq!(config.effective_target(), Some("pdf"));
        assert_eq!(config.filter.max_size_bytes, filebatch::DEFAULT_MAX_SIZE_BYTES);
    }

    #[test]
    fn preset_supplies_default_target() {
        let cli = parse(&["a.png", "--preset", "image-converter"]);
        let config = build_config(&cli, None).unwrap();
        assert_eq!(config.effective_target(), Some("jpg"));
        assert_eq!(config.effective_quality(), Some(80));
    }

    #[test]
    fn preset_refuses_foreign_target() {
        let cli = parse(&["a.pdf", "--preset", "from-pdf", "--to", "png"]);
        assert!(build_config(&cli, None).is_err());
    }

    #[test]
    fn accept_overrides_preset_filter() {
        let cli = parse(&["a.md", "--accept", ".md", "--max-size", "10"]);
        let config = build_config(&cli, None).unwrap();
        let md = filebatch::FileEntry::from_bytes("a.md", "", vec![0]);
        assert!(config.filter.evaluate(&md).is_accepted());
        assert_eq!(config.filter.max_size_bytes, 10);
    }

    #[test]
    fn quality_is_range_checked() {
        let args = ["filebatch", "a.png", "--quality", "0"];
        assert!(Cli::try_parse_from(args).is_err());
    }
}
