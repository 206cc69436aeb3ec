//! Input resolution: turn a user-supplied path or URL into a [`RawDocument`].
//!
//! Everything downstream works on bytes in memory, so URLs are downloaded
//! straight into a buffer. The `%PDF` magic is checked before returning so
//! callers get a meaningful error instead of three failed extraction
//! attempts on an HTML error page.

use crate::error::PipelineError;
use crate::model::RawDocument;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

const PDF_MAGIC: &[u8; 4] = b"%PDF";

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Reads a local file or downloads a URL.
pub async fn resolve_input(input: &str, timeout_secs: u64) -> Result<RawDocument, PipelineError> {
    let input = input.trim();
    if input.is_empty() {
        return Err(PipelineError::InvalidInput {
            input: input.to_string(),
        });
    }
    if is_url(input) {
        download_url(input, timeout_secs).await
    } else if input.contains("://") {
        Err(PipelineError::InvalidInput {
            input: input.to_string(),
        })
    } else {
        read_local(Path::new(input)).await
    }
}

async fn read_local(path: &Path) -> Result<RawDocument, PipelineError> {
    let bytes = tokio::fs::read(path).await.map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => PipelineError::FileNotFound {
            path: path.to_path_buf(),
        },
        _ => PipelineError::InvalidInput {
            input: format!("{} ({e})", path.display()),
        },
    })?;

    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "document.pdf".to_string());
    check_magic(&filename, &bytes)?;

    debug!("Read local PDF: {} ({} bytes)", path.display(), bytes.len());
    Ok(RawDocument::new(filename, bytes))
}

async fn download_url(url: &str, timeout_secs: u64) -> Result<RawDocument, PipelineError> {
    info!("Downloading PDF from: {}", url);
    let failed = |reason: String| PipelineError::DownloadFailed {
        url: url.to_string(),
        reason,
    };

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| failed(e.to_string()))?;

    let response = client.get(url).send().await.map_err(|e| {
        if e.is_timeout() {
            failed(format!("timed out after {timeout_secs}s"))
        } else {
            failed(e.to_string())
        }
    })?;

    if !response.status().is_success() {
        return Err(failed(format!("HTTP {}", response.status())));
    }

    let bytes = response.bytes().await.map_err(|e| failed(e.to_string()))?;
    let filename = filename_from_url(url);
    check_magic(&filename, &bytes)?;

    info!("Downloaded {} ({} bytes)", filename, bytes.len());
    Ok(RawDocument::new(filename, bytes.to_vec()))
}

fn check_magic(filename: &str, bytes: &[u8]) -> Result<(), PipelineError> {
    if bytes.starts_with(PDF_MAGIC) {
        return Ok(());
    }
    let mut magic = [0u8; 4];
    let n = bytes.len().min(4);
    magic[..n].copy_from_slice(&bytes[..n]);
    Err(PipelineError::NotAPdf {
        filename: filename.to_string(),
        magic,
    })
}

/// Last path segment of the URL when it looks like a file name.
fn filename_from_url(url: &str) -> String {
    if let Ok(parsed) = reqwest::Url::parse(url) {
        if let Some(mut segments) = parsed.path_segments() {
            if let Some(last) = segments.next_back() {
                if !last.is_empty() && last.contains('.') {
                    return last.to_string();
                }
            }
        }
    }
    "downloaded.pdf".to_string()
}

/// `report.pdf` → `report_translated.pdf`, in the same directory.
pub fn translated_path(input: &Path) -> PathBuf {
    let name = input
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    input.with_file_name(crate::pipeline::translated_filename(&name))
}
