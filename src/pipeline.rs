//! End-to-end entry points: extract → persist images → translate → render.
//!
//! [`Pipeline`] owns the pieces that are fixed for a process (config,
//! extraction chain, renderer) and is shared by reference across documents.
//! Nothing is persisted here: each stage returns its result and the caller
//! decides what to keep, so a failed document can simply be run again.

use crate::config::PipelineConfig;
use crate::error::{PipelineError, SizeLimit};
use crate::extract::ExtractionChain;
use crate::markdown;
use crate::model::{ExtractedDocument, ImageRecord, RawDocument};
use crate::render::{self, CommandRenderer, HtmlRenderer};
use crate::store::{BinaryStore, ImageResolver};
use crate::translate::{Glossary, Translator};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

pub use crate::markdown::persist_images;

/// What one translation run should produce.
#[derive(Debug, Clone)]
pub struct TranslationRequest {
    pub source_lang: String,
    pub target_lang: String,
    pub glossary: Option<Glossary>,
    /// Store folder the extracted images are written to.
    pub folder: String,
    /// Title for the rendered PDF. Defaults to the input's file stem.
    pub title: Option<String>,
}

impl TranslationRequest {
    pub fn new(source_lang: impl Into<String>, target_lang: impl Into<String>) -> Self {
        Self {
            source_lang: source_lang.into(),
            target_lang: target_lang.into(),
            glossary: None,
            folder: "images".to_string(),
            title: None,
        }
    }

    pub fn with_glossary(mut self, glossary: Glossary) -> Self {
        self.glossary = Some(glossary);
        self
    }

    pub fn with_folder(mut self, folder: impl Into<String>) -> Self {
        self.folder = folder.into();
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }
}

/// Result of the extraction stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractOutput {
    pub filename: String,
    /// Markdown with every stored image's placeholder replaced by its locator.
    pub markdown: String,
    pub images: Vec<ImageRecord>,
    pub total_pages: usize,
    /// Name of the strategy that produced the document.
    pub extractor: String,
    pub metadata: BTreeMap<String, String>,
}

/// Timing and counts for one full run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineStats {
    pub total_pages: usize,
    pub image_count: usize,
    pub extract_duration_ms: u64,
    pub translate_duration_ms: u64,
    pub render_duration_ms: u64,
    pub total_duration_ms: u64,
}

/// Result of a full run.
#[derive(Debug, Clone)]
pub struct TranslationOutput {
    /// `<stem>_translated.pdf`.
    pub filename: String,
    pub source_markdown: String,
    pub translated_markdown: String,
    pub images: Vec<ImageRecord>,
    pub pdf: Vec<u8>,
    pub stats: PipelineStats,
}

pub struct Pipeline {
    config: PipelineConfig,
    chain: ExtractionChain,
    renderer: Arc<dyn HtmlRenderer>,
}

impl Pipeline {
    /// Built-in strategies and the configured renderer command.
    pub fn new(config: PipelineConfig) -> Self {
        let chain = ExtractionChain::from_config(&config);
        let renderer = Arc::new(CommandRenderer::from_config(&config));
        Self {
            config,
            chain,
            renderer,
        }
    }

    pub fn with_chain(mut self, chain: ExtractionChain) -> Self {
        self.chain = chain;
        self
    }

    pub fn with_renderer(mut self, renderer: Arc<dyn HtmlRenderer>) -> Self {
        self.renderer = renderer;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Validates, extracts, serializes, and stores the images.
    pub async fn extract<S: BinaryStore>(
        &self,
        raw: RawDocument,
        store: &S,
        folder: &str,
    ) -> Result<ExtractOutput, PipelineError> {
        check_file_size(&raw, &self.config)?;
        let filename = raw.filename.clone();

        let doc = self.chain.run(raw).await?;
        check_page_count(&doc, &filename, &self.config)?;

        let (markdown, images) =
            markdown::serialize_with_store(&doc, self.config.include_metadata, store, folder);
        let missing = markdown::unresolved_placeholders(&markdown);
        if !missing.is_empty() {
            warn!("{} image(s) of '{}' were not stored", missing.len(), filename);
        }

        Ok(ExtractOutput {
            filename,
            markdown,
            images,
            total_pages: doc.total_pages(),
            extractor: doc.extractor.clone(),
            metadata: doc.metadata,
        })
    }

    /// Translates a Markdown document chunk by chunk.
    pub async fn translate(
        &self,
        markdown: &str,
        request: &TranslationRequest,
    ) -> Result<String, PipelineError> {
        let translator = Translator::from_config(&self.config)?;
        translator
            .translate_document(
                markdown,
                &request.source_lang,
                &request.target_lang,
                request.glossary.as_ref(),
                self.config.chunk_size,
            )
            .await
    }

    /// Renders translated Markdown to PDF bytes.
    pub async fn render(
        &self,
        markdown: &str,
        title: Option<&str>,
        lang: &str,
        images: &[ImageRecord],
        resolver: &dyn ImageResolver,
    ) -> Result<Vec<u8>, PipelineError> {
        render::render_document(markdown, title, lang, images, resolver, Arc::clone(&self.renderer))
            .await
    }

    /// All stages for one document.
    ///
    /// The translator is built first so a misconfigured provider fails
    /// before any extraction work is done.
    pub async fn run<S: BinaryStore>(
        &self,
        raw: RawDocument,
        request: &TranslationRequest,
        store: &S,
    ) -> Result<TranslationOutput, PipelineError> {
        let total_start = Instant::now();
        let translator = Translator::from_config(&self.config)?;
        let title = request
            .title
            .clone()
            .unwrap_or_else(|| file_stem(&raw.filename));
        let output_name = translated_filename(&raw.filename);

        let extract_start = Instant::now();
        let extracted = self.extract(raw, store, &request.folder).await?;
        let extract_duration_ms = extract_start.elapsed().as_millis() as u64;

        let translate_start = Instant::now();
        let translated = translator
            .translate_document(
                &extracted.markdown,
                &request.source_lang,
                &request.target_lang,
                request.glossary.as_ref(),
                self.config.chunk_size,
            )
            .await?;
        let translate_duration_ms = translate_start.elapsed().as_millis() as u64;

        let render_start = Instant::now();
        let pdf = self
            .render(
                &translated,
                Some(&title),
                &request.target_lang,
                &extracted.images,
                store,
            )
            .await?;
        let render_duration_ms = render_start.elapsed().as_millis() as u64;

        let stats = PipelineStats {
            total_pages: extracted.total_pages,
            image_count: extracted.images.len(),
            extract_duration_ms,
            translate_duration_ms,
            render_duration_ms,
            total_duration_ms: total_start.elapsed().as_millis() as u64,
        };
        info!(
            "'{}' done: {} pages, {} images, {}ms total",
            extracted.filename, stats.total_pages, stats.image_count, stats.total_duration_ms
        );

        Ok(TranslationOutput {
            filename: output_name,
            source_markdown: extracted.markdown,
            translated_markdown: translated,
            images: extracted.images,
            pdf,
            stats,
        })
    }
}

/// Rejects inputs above `max_file_size_mb` before any parsing.
pub fn check_file_size(raw: &RawDocument, config: &PipelineConfig) -> Result<(), PipelineError> {
    let max_bytes = config.max_file_size_bytes();
    let actual_bytes = raw.len() as u64;
    if actual_bytes > max_bytes {
        return Err(PipelineError::OversizedDocument {
            filename: raw.filename.clone(),
            limit: SizeLimit::FileSize {
                actual_bytes,
                max_bytes,
            },
        });
    }
    Ok(())
}

/// Rejects documents with more than `max_pages` pages.
pub fn check_page_count(
    doc: &ExtractedDocument,
    filename: &str,
    config: &PipelineConfig,
) -> Result<(), PipelineError> {
    let actual = doc.total_pages();
    if actual > config.max_pages {
        return Err(PipelineError::OversizedDocument {
            filename: filename.to_string(),
            limit: SizeLimit::Pages {
                actual,
                max: config.max_pages,
            },
        });
    }
    Ok(())
}

/// `report.pdf` → `report_translated.pdf`.
pub fn translated_filename(filename: &str) -> String {
    format!("{}_translated.pdf", file_stem(filename))
}

/// Writes `bytes` to `path` through a `.tmp` sibling and a rename, creating
/// parent directories. A failed write leaves no file at `path`.
pub async fn write_output(path: &Path, bytes: &[u8]) -> Result<(), PipelineError> {
    let failed = |source: std::io::Error| PipelineError::OutputWriteFailed {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(failed)?;
    }

    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    tokio::fs::write(&tmp, bytes).await.map_err(failed)?;
    if let Err(e) = tokio::fs::rename(&tmp, path).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(failed(e));
    }
    Ok(())
}

fn file_stem(filename: &str) -> String {
    Path::new(filename)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "document".to_string())
}
