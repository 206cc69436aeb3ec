//! # pdf-translate
//!
//! Extract a PDF into Markdown, translate it chunk by chunk with an LLM, and
//! render the translation back into a PDF that keeps the source's images at
//! their original size.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF bytes
//!  │
//!  ├─ 1. Input      local file or URL, %PDF magic checked
//!  ├─ 2. Extract    layout → table → minimal strategy chain (spawn_blocking)
//!  ├─ 3. Serialize  "# Page N" blocks, IMAGE_PLACEHOLDER refs, pipe tables
//!  ├─ 4. Store      images → BinaryStore, placeholders → locators
//!  ├─ 5. Translate  header/paragraph chunks, sequential, rolling context
//!  └─ 6. Render     page containers + inline images → HTML → external renderer
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pdf_translate::{input, FsStore, Pipeline, PipelineConfig, TranslationRequest};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Credential read from OPENAI_API_KEY / ANTHROPIC_API_KEY; offline without one.
//!     let config = PipelineConfig::from_env()?;
//!     let pipeline = Pipeline::new(config);
//!     let store = FsStore::new("out");
//!
//!     let raw = input::resolve_input("report.pdf", 120).await?;
//!     let request = TranslationRequest::new("ko", "en");
//!     let output = pipeline.run(raw, &request, &store).await?;
//!     std::fs::write(&output.filename, &output.pdf)?;
//!     Ok(())
//! }
//! ```
//!
//! Without a credential the translator runs offline: every chunk comes back
//! unchanged behind a `[ko→en]` marker, which keeps the whole pipeline
//! exercisable without network access.
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `pdf-translate` binary (clap + anyhow + indicatif + tracing-subscriber) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! pdf-translate = { version = "0.3", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod chunk;
pub mod config;
pub mod error;
pub mod extract;
pub mod input;
pub mod markdown;
pub mod model;
pub mod pipeline;
pub mod progress;
pub mod render;
pub mod store;
pub mod translate;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use chunk::MarkdownUnit;
pub use config::{ExtractorKind, PipelineConfig, PipelineConfigBuilder, ProviderKind};
pub use error::{ExtractError, PipelineError, SizeLimit, Stage};
pub use extract::{ExtractionChain, Extractor};
pub use model::{
    BBox, ExtractedDocument, ExtractedImage, ExtractedPage, ImageFormat, ImageRecord,
    PageMetadata, RawDocument, Table,
};
pub use pipeline::{ExtractOutput, Pipeline, PipelineStats, TranslationOutput, TranslationRequest};
pub use progress::{NoopProgressCallback, ProgressCallback, TranslationProgressCallback};
pub use render::{CommandRenderer, HtmlRenderer};
pub use store::{BinaryStore, FsStore, ImageResolver, MemoryStore};
pub use translate::backend::{BackendError, CompletionBackend, TranslationBackend};
pub use translate::{Glossary, Translator};
