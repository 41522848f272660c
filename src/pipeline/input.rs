//! Input resolution: turn a user-supplied path or URL into a candidate
//! [`FileEntry`] for intake.
//!
//! Local files are referenced by path and read lazily by the backend, so
//! resolving a large file costs one `metadata` call. URLs are downloaded
//! into memory; the server's `Content-Type` wins over the extension table
//! when it names a type.
//!
//! Resolution does not validate size or type. That is the intake filter's
//! job, which keeps the picker, drop and CLI paths identical.

use crate::error::BatchError;
use crate::pipeline::intake::FileEntry;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Resolve the input string to a candidate entry.
pub async fn resolve_input(input: &str, timeout_secs: u64) -> Result<FileEntry, BatchError> {
    if input.trim().is_empty() {
        return Err(BatchError::InvalidInput {
            input: input.to_string(),
        });
    }
    if is_url(input) {
        download_url(input, timeout_secs).await
    } else {
        resolve_local(Path::new(input)).await
    }
}

/// Resolve every input in order, stopping at the first failure.
pub async fn resolve_inputs(
    inputs: &[String],
    timeout_secs: u64,
) -> Result<Vec<FileEntry>, BatchError> {
    let mut entries = Vec::with_capacity(inputs.len());
    for input in inputs {
        entries.push(resolve_input(input, timeout_secs).await?);
    }
    Ok(entries)
}

/// Resolve a local file path, validating existence and read permission.
async fn resolve_local(path: &Path) -> Result<FileEntry, BatchError> {
    let path: PathBuf = path.to_path_buf();

    let metadata = match tokio::fs::metadata(&path).await {
        Ok(m) => m,
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return Err(BatchError::PermissionDenied { path });
        }
        Err(_) => return Err(BatchError::FileNotFound { path }),
    };
    if !metadata.is_file() {
        return Err(BatchError::InvalidInput {
            input: path.display().to_string(),
        });
    }

    // Check read permission by attempting to open
    if let Err(e) = tokio::fs::File::open(&path).await {
        return Err(if e.kind() == std::io::ErrorKind::PermissionDenied {
            BatchError::PermissionDenied { path }
        } else {
            BatchError::FileNotFound { path }
        });
    }

    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    let mime = mime_for_name(&name);
    debug!("Resolved local file: {} ({} bytes, '{}')", path.display(), metadata.len(), mime);
    Ok(FileEntry::from_path(name, metadata.len(), mime, path))
}

/// Download a URL into memory.
async fn download_url(url: &str, timeout_secs: u64) -> Result<FileEntry, BatchError> {
    info!("Downloading from: {}", url);

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| BatchError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    let to_error = |e: reqwest::Error| {
        if e.is_timeout() {
            BatchError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            BatchError::DownloadFailed {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    };

    let response = client.get(url).send().await.map_err(to_error)?;

    if !response.status().is_success() {
        return Err(BatchError::DownloadFailed {
            url: url.to_string(),
            reason: format!("HTTP {}", response.status()),
        });
    }

    let name = filename_from_url(url);
    let mime = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(content_type_essence)
        .unwrap_or_else(|| mime_for_name(&name).to_string());

    let bytes = response.bytes().await.map_err(to_error)?;

    info!("Downloaded '{}' ({} bytes, '{}')", name, bytes.len(), mime);
    Ok(FileEntry::from_bytes(name, mime, bytes.to_vec()))
}

/// `"text/html; charset=utf-8"` → `"text/html"`. Generic binary types are
/// dropped so the extension table can do better.
fn content_type_essence(header: &str) -> Option<String> {
    let essence = header.split(';').next()?.trim().to_lowercase();
    if essence.is_empty() || essence == "application/octet-stream" {
        None
    } else {
        Some(essence)
    }
}

/// Last non-empty path segment of the URL, or `"download"`.
fn filename_from_url(url: &str) -> String {
    if let Ok(parsed) = reqwest::Url::parse(url) {
        if let Some(segments) = parsed.path_segments() {
            if let Some(last) = segments.filter(|s| !s.is_empty()).next_back() {
                return last.to_string();
            }
        }
    }
    "download".to_string()
}

/// Best-effort MIME type from the file extension. Unknown → empty string,
/// the same as a browser reports for an unrecognised file.
pub fn mime_for_name(name: &str) -> &'static str {
    let ext = match name.rsplit_once('.') {
        Some((_, ext)) => ext.to_lowercase(),
        None => return "",
    };
    match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "bmp" => "image/bmp",
        "svg" => "image/svg+xml",
        "tif" | "tiff" => "image/tiff",
        "pdf" => "application/pdf",
        "doc" => "application/msword",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "xls" => "application/vnd.ms-excel",
        "xlsx" => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        "ppt" => "application/vnd.ms-powerpoint",
        "pptx" => "application/vnd.openxmlformats-officedocument.presentationml.presentation",
        "txt" => "text/plain",
        "md" => "text/markdown",
        "csv" => "text/csv",
        "html" | "htm" => "text/html",
        "json" => "application/json",
        "zip" => "application/zip",
        "mp3" => "audio/mpeg",
        "wav" => "audio/wav",
        "mp4" => "video/mp4",
        _ => "",
    }
}
