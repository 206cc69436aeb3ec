//! Configuration types for the extraction → translation → rendering pipeline.
//!
//! All pipeline behaviour is controlled through [`PipelineConfig`], built via
//! its [`PipelineConfigBuilder`] or loaded with [`PipelineConfig::from_env`].
//! The config is read-only once built and is `Clone + Send + Sync`, so one
//! instance can be shared by any number of concurrent document runs.

use crate::error::PipelineError;
use crate::progress::ProgressCallback;
use crate::translate::backend::CompletionBackend;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

/// Configuration for a pipeline run.
///
/// # Example
/// ```rust
/// use pdf_translate::{ExtractorKind, PipelineConfig};
///
/// let config = PipelineConfig::builder()
///     .extractors(vec![ExtractorKind::TableSpecialist, ExtractorKind::MinimalFallback])
///     .chunk_size(1500)
///     .max_pages(50)
///     .build()
///     .unwrap();
/// assert_eq!(config.chunk_size, 1500);
/// ```
#[derive(Clone)]
pub struct PipelineConfig {
    /// Extraction strategies, tried in this order. Default: layout, table, minimal.
    pub extractors: Vec<ExtractorKind>,

    /// Explicit path to a pdfium shared library (`PDFIUM_LIB_PATH`).
    ///
    /// When unset the layout strategy looks next to the executable, then
    /// falls back to the system library search path.
    pub pdfium_library_path: Option<PathBuf>,

    /// Emit a metadata header before the first page. Default: false.
    ///
    /// Off by default because title/author/producer lines end up in the
    /// translation input and get translated along with the body.
    pub include_metadata: bool,

    /// Maximum number of pages accepted after extraction. Default: 200.
    pub max_pages: usize,

    /// Maximum input size in megabytes, checked before extraction. Default: 50.
    pub max_file_size_mb: u64,

    /// Translation provider. Default: OpenAI.
    pub provider: ProviderKind,

    /// Model identifier. If None, uses the provider default.
    pub model: Option<String>,

    /// Provider credential. When None the translator runs offline.
    pub api_key: Option<String>,

    /// Pre-constructed completion backend. Takes precedence over `provider`.
    pub backend: Option<Arc<dyn CompletionBackend>>,

    /// Sampling temperature for translation calls. Default: 0.3.
    pub temperature: f32,

    /// Maximum tokens the backend may generate per chunk. Default: 4000.
    pub max_tokens: usize,

    /// Soft maximum chunk size in characters. Default: 2000.
    pub chunk_size: usize,

    /// Trailing characters of the previous translated chunk passed as context. Default: 200.
    pub context_chars: usize,

    /// Per-chunk backend timeout in seconds. Default: 120.
    pub api_timeout_secs: u64,

    /// Download timeout for URL inputs in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// External HTML→PDF command. `{input}` and `{output}` are substituted
    /// with the HTML and PDF paths. Default: `weasyprint {input} {output}`.
    pub renderer_command: String,

    /// Optional per-chunk progress events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            extractors: ExtractorKind::default_order(),
            pdfium_library_path: None,
            include_metadata: false,
            max_pages: 200,
            max_file_size_mb: 50,
            provider: ProviderKind::default(),
            model: None,
            api_key: None,
            backend: None,
            temperature: 0.3,
            max_tokens: 4000,
            chunk_size: 2000,
            context_chars: 200,
            api_timeout_secs: 120,
            download_timeout_secs: 120,
            renderer_command: "weasyprint {input} {output}".to_string(),
            progress_callback: None,
        }
    }
}

impl fmt::Debug for PipelineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineConfig")
            .field("extractors", &self.extractors)
            .field("pdfium_library_path", &self.pdfium_library_path)
            .field("include_metadata", &self.include_metadata)
            .field("max_pages", &self.max_pages)
            .field("max_file_size_mb", &self.max_file_size_mb)
            .field("provider", &self.provider)
            .field("model", &self.model)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("backend", &self.backend.as_ref().map(|_| "<dyn CompletionBackend>"))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("chunk_size", &self.chunk_size)
            .field("context_chars", &self.context_chars)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field("renderer_command", &self.renderer_command)
            .finish()
    }
}

impl PipelineConfig {
    /// Create a new builder for `PipelineConfig`.
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder {
            config: Self::default(),
        }
    }

    /// Load a configuration from `PDF_TRANSLATE_*` variables and the
    /// provider's API key variable. Unset variables keep their defaults.
    pub fn from_env() -> Result<Self, PipelineError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an injectable lookup, so
    /// tests do not have to mutate the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, PipelineError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let mut builder = Self::builder();

        if let Some(list) = get("PDF_TRANSLATE_EXTRACTORS") {
            let kinds = list
                .split(',')
                .map(|s| s.trim().parse::<ExtractorKind>())
                .collect::<Result<Vec<_>, _>>()?;
            builder = builder.extractors(kinds);
        }
        if let Some(path) = get("PDFIUM_LIB_PATH") {
            builder = builder.pdfium_library_path(path);
        }
        if let Some(v) = get("PDF_TRANSLATE_METADATA") {
            builder = builder.include_metadata(parse_bool(&v));
        }
        if let Some(v) = get("PDF_TRANSLATE_MAX_PAGES") {
            builder = builder.max_pages(parse_number("PDF_TRANSLATE_MAX_PAGES", &v)?);
        }
        if let Some(v) = get("PDF_TRANSLATE_MAX_FILE_SIZE_MB") {
            builder = builder.max_file_size_mb(parse_number("PDF_TRANSLATE_MAX_FILE_SIZE_MB", &v)?);
        }
        if let Some(v) = get("PDF_TRANSLATE_CHUNK_SIZE") {
            builder = builder.chunk_size(parse_number("PDF_TRANSLATE_CHUNK_SIZE", &v)?);
        }
        if let Some(v) = get("PDF_TRANSLATE_CONTEXT_CHARS") {
            builder = builder.context_chars(parse_number("PDF_TRANSLATE_CONTEXT_CHARS", &v)?);
        }
        if let Some(v) = get("PDF_TRANSLATE_RENDERER") {
            builder = builder.renderer_command(v);
        }

        let provider = match get("PDF_TRANSLATE_PROVIDER") {
            Some(name) => name.parse::<ProviderKind>()?,
            None => ProviderKind::default(),
        };
        builder = builder.provider(provider);
        if let Some(model) = get("PDF_TRANSLATE_MODEL") {
            builder = builder.model(model);
        }
        if let Some(key) = get(provider.api_key_var()) {
            builder = builder.api_key(key);
        }

        builder.build()
    }

    /// Model to use: the configured one, or the provider default.
    pub fn effective_model(&self) -> &str {
        self.model
            .as_deref()
            .unwrap_or_else(|| self.provider.default_model())
    }

    /// `max_file_size_mb` in bytes.
    pub fn max_file_size_bytes(&self) -> u64 {
        self.max_file_size_mb.saturating_mul(1024 * 1024)
    }
}

fn parse_bool(v: &str) -> bool {
    matches!(
        v.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

fn parse_number<T: FromStr>(key: &str, v: &str) -> Result<T, PipelineError> {
    v.trim()
        .parse::<T>()
        .map_err(|_| PipelineError::InvalidConfig(format!("{key} must be a number, got '{v}'")))
}

/// Builder for [`PipelineConfig`].
#[derive(Debug)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    pub fn extractors(mut self, kinds: Vec<ExtractorKind>) -> Self {
        self.config.extractors = kinds;
        self
    }

    pub fn pdfium_library_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.pdfium_library_path = Some(path.into());
        self
    }

    pub fn include_metadata(mut self, v: bool) -> Self {
        self.config.include_metadata = v;
        self
    }

    pub fn max_pages(mut self, n: usize) -> Self {
        self.config.max_pages = n;
        self
    }

    pub fn max_file_size_mb(mut self, mb: u64) -> Self {
        self.config.max_file_size_mb = mb;
        self
    }

    pub fn provider(mut self, provider: ProviderKind) -> Self {
        self.config.provider = provider;
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.config.api_key = Some(key.into());
        self
    }

    pub fn backend(mut self, backend: Arc<dyn CompletionBackend>) -> Self {
        self.config.backend = Some(backend);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn chunk_size(mut self, n: usize) -> Self {
        self.config.chunk_size = n;
        self
    }

    pub fn context_chars(mut self, n: usize) -> Self {
        self.config.context_chars = n;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn renderer_command(mut self, cmd: impl Into<String>) -> Self {
        self.config.renderer_command = cmd.into();
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<PipelineConfig, PipelineError> {
        let c = &self.config;
        if c.extractors.is_empty() {
            return Err(PipelineError::InvalidConfig(
                "At least one extractor must be configured".into(),
            ));
        }
        if c.chunk_size == 0 {
            return Err(PipelineError::InvalidConfig("Chunk size must be ≥ 1".into()));
        }
        if c.max_pages == 0 {
            return Err(PipelineError::InvalidConfig("Max pages must be ≥ 1".into()));
        }
        if !c.renderer_command.contains("{input}") || !c.renderer_command.contains("{output}") {
            return Err(PipelineError::InvalidConfig(format!(
                "Renderer command must contain {{input}} and {{output}}, got '{}'",
                c.renderer_command
            )));
        }
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// One extraction strategy in the fallback chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractorKind {
    /// pdfium text and page geometry plus positioned images.
    Layout,
    /// lopdf object model with span-based table detection. No images.
    TableSpecialist,
    /// Plain text only.
    MinimalFallback,
}

impl ExtractorKind {
    /// Layout first, tables second, plain text last.
    pub fn default_order() -> Vec<ExtractorKind> {
        vec![
            ExtractorKind::Layout,
            ExtractorKind::TableSpecialist,
            ExtractorKind::MinimalFallback,
        ]
    }
}

impl FromStr for ExtractorKind {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "layout" | "pdfium" => Ok(ExtractorKind::Layout),
            "table" | "tables" | "table_specialist" => Ok(ExtractorKind::TableSpecialist),
            "minimal" | "text" | "minimal_fallback" => Ok(ExtractorKind::MinimalFallback),
            other => Err(PipelineError::InvalidConfig(format!(
                "Unknown extractor '{other}' (expected layout, table or minimal)"
            ))),
        }
    }
}

/// Translation provider, selected once at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    #[default]
    OpenAi,
    Anthropic,
}

impl ProviderKind {
    /// Lower-case identifier, as accepted by `FromStr`.
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "openai",
            ProviderKind::Anthropic => "anthropic",
        }
    }

    /// Environment variable holding this provider's credential.
    pub fn api_key_var(&self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "OPENAI_API_KEY",
            ProviderKind::Anthropic => "ANTHROPIC_API_KEY",
        }
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "gpt-4.1-mini",
            ProviderKind::Anthropic => "claude-sonnet-4-20250514",
        }
    }
}

impl FromStr for ProviderKind {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(ProviderKind::OpenAi),
            "anthropic" | "claude" => Ok(ProviderKind::Anthropic),
            other => Err(PipelineError::InvalidConfig(format!(
                "Unknown provider '{other}' (expected openai or anthropic)"
            ))),
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
