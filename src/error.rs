//! Error types for the pdf-translate library.
//!
//! Two distinct error types reflect two distinct failure scopes:
//!
//! * [`PipelineError`]: **Fatal** for the document: no extractor succeeded,
//!   the document is over the configured limits, a translation call failed,
//!   or the renderer raised. Every variant reports the [`Stage`] it came
//!   from so a caller can build a user-facing message and retry the whole
//!   document.
//!
//! * [`ExtractError`]: **Non-fatal**: one strategy attempt, one image or one
//!   table failed. The strategy chain logs it and moves on; per-image
//!   failures just leave that image out of the page.

use std::path::PathBuf;
use thiserror::Error;

/// Pipeline stage a [`PipelineError`] originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Input,
    Config,
    Extraction,
    Validation,
    Storage,
    Translation,
    Rendering,
    Internal,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Stage::Input => "input",
            Stage::Config => "config",
            Stage::Extraction => "extraction",
            Stage::Validation => "validation",
            Stage::Storage => "storage",
            Stage::Translation => "translation",
            Stage::Rendering => "rendering",
            Stage::Internal => "internal",
        };
        f.write_str(s)
    }
}

/// Which configured limit an oversized document broke.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SizeLimit {
    Pages { actual: usize, max: usize },
    FileSize { actual_bytes: u64, max_bytes: u64 },
}

impl std::fmt::Display for SizeLimit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SizeLimit::Pages { actual, max } => {
                write!(f, "{actual} pages (maximum {max})")
            }
            SizeLimit::FileSize {
                actual_bytes,
                max_bytes,
            } => write!(
                f,
                "{:.1} MB (maximum {:.1} MB)",
                *actual_bytes as f64 / (1024.0 * 1024.0),
                *max_bytes as f64 / (1024.0 * 1024.0)
            ),
        }
    }
}

/// All document-level errors returned by the pdf-translate library.
#[derive(Debug, Error)]
pub enum PipelineError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("PDF file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// The input string is not a valid file path or URL.
    #[error("Invalid input '{input}': not a file path or a valid HTTP/HTTPS URL")]
    InvalidInput { input: String },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}\nCheck your internet connection.")]
    DownloadFailed { url: String, reason: String },

    /// The bytes were read, but they are not a PDF.
    #[error("'{filename}' is not a valid PDF\nFirst bytes: {magic:?}")]
    NotAPdf { filename: String, magic: [u8; 4] },

    // ── Extraction errors ─────────────────────────────────────────────────
    /// Every registered extraction strategy failed on this document.
    #[error("All {attempted} extraction strategies failed for '{filename}'\nLast error: {last_error}")]
    ExtractionExhausted {
        filename: String,
        attempted: usize,
        last_error: String,
    },

    /// The document is larger than the configured limits.
    #[error("'{filename}' is too large: {limit}")]
    OversizedDocument { filename: String, limit: SizeLimit },

    // ── Storage errors ────────────────────────────────────────────────────
    /// The binary store could not serve or accept an object.
    #[error("Storage failure for '{locator}': {detail}")]
    StorageFailure { locator: String, detail: String },

    // ── Translation errors ────────────────────────────────────────────────
    /// The configured provider could not be constructed.
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// One chunk's backend call failed; the whole translation is abandoned.
    #[error("Translation failed on chunk {chunk}/{total}: {detail}")]
    TranslationBackendFailure {
        chunk: usize,
        total: usize,
        detail: String,
    },

    // ── Rendering errors ──────────────────────────────────────────────────
    /// The external HTML→PDF renderer raised.
    #[error("Rendering failed: {detail}")]
    RenderingFailure { detail: String },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write an output file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl PipelineError {
    /// The stage this error belongs to.
    pub fn stage(&self) -> Stage {
        match self {
            PipelineError::FileNotFound { .. }
            | PipelineError::InvalidInput { .. }
            | PipelineError::DownloadFailed { .. }
            | PipelineError::NotAPdf { .. } => Stage::Input,
            PipelineError::ExtractionExhausted { .. } => Stage::Extraction,
            PipelineError::OversizedDocument { .. } => Stage::Validation,
            PipelineError::StorageFailure { .. } => Stage::Storage,
            PipelineError::ProviderNotConfigured { .. }
            | PipelineError::TranslationBackendFailure { .. } => Stage::Translation,
            PipelineError::RenderingFailure { .. } => Stage::Rendering,
            PipelineError::OutputWriteFailed { .. } => Stage::Storage,
            PipelineError::Internal(_) => Stage::Internal,
            PipelineError::InvalidConfig(_) => Stage::Config,
        }
    }

    /// Validation failures are cheap to detect and should not be retried.
    pub fn is_validation(&self) -> bool {
        self.stage() == Stage::Validation
    }
}

/// A non-fatal error from one extraction attempt or one extracted item.
#[derive(Debug, Error)]
pub enum ExtractError {
    /// pdfium could not be bound or failed on the document.
    #[error("pdfium: {0}")]
    Pdfium(String),

    /// lopdf failed to parse or walk the object graph.
    #[error("lopdf: {0}")]
    Lopdf(#[from] lopdf::Error),

    /// pdf-extract failed to produce text.
    #[error("pdf-extract: {0}")]
    PdfExtract(String),

    /// A strategy panicked inside a parsing library.
    #[error("strategy '{strategy}' panicked: {message}")]
    Panicked { strategy: String, message: String },

    /// The image uses a colour space or filter we cannot re-encode.
    #[error("unsupported image on page {page}: {detail}")]
    UnsupportedImage { page: usize, detail: String },

    /// The `image` crate failed to encode decoded pixels.
    #[error("image encoding failed: {0}")]
    ImageEncode(#[from] image::ImageError),

    /// The strategy ran but produced nothing usable.
    #[error("strategy produced an empty document")]
    Empty,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extraction_exhausted_names_file_and_count() {
        let e = PipelineError::ExtractionExhausted {
            filename: "report.pdf".into(),
            attempted: 3,
            last_error: "pdf-extract: bad xref".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("report.pdf"), "got: {msg}");
        assert!(msg.contains("All 3"), "got: {msg}");
        assert_eq!(e.stage(), Stage::Extraction);
    }

    #[test]
    fn oversized_is_validation() {
        let e = PipelineError::OversizedDocument {
            filename: "big.pdf".into(),
            limit: SizeLimit::Pages {
                actual: 250,
                max: 200,
            },
        };
        assert!(e.is_validation());
        assert!(e.to_string().contains("250 pages (maximum 200)"));
    }

    #[test]
    fn file_size_limit_display() {
        let limit = SizeLimit::FileSize {
            actual_bytes: 60 * 1024 * 1024,
            max_bytes: 50 * 1024 * 1024,
        };
        assert_eq!(limit.to_string(), "60.0 MB (maximum 50.0 MB)");
    }

    #[test]
    fn backend_failure_display() {
        let e = PipelineError::TranslationBackendFailure {
            chunk: 2,
            total: 5,
            detail: "quota exceeded".into(),
        };
        assert!(e.to_string().contains("chunk 2/5"));
        assert_eq!(e.stage(), Stage::Translation);
    }

    #[test]
    fn stage_display_is_lowercase() {
        assert_eq!(Stage::Rendering.to_string(), "rendering");
        assert_eq!(
            PipelineError::RenderingFailure {
                detail: "x".into()
            }
            .stage(),
            Stage::Rendering
        );
    }
}
