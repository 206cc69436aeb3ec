//! Translation orchestrator: chunk, translate in order, reassemble.
//!
//! Chunks are translated one after another, never concurrently: each call
//! receives the tail of the previous chunk's translation as context. Any
//! backend failure abandons the whole document. Nothing is partially
//! committed, and retrying is the caller's decision.

pub mod backend;
pub mod cleanup;
pub mod prompt;

use crate::chunk::{self, MarkdownUnit};
use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::progress::ProgressCallback;
use backend::{offline_translation, BackendError, CompletionBackend, TranslationBackend};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

/// Source term → required target term. Ordered so prompts are reproducible.
pub type Glossary = BTreeMap<String, String>;

pub struct Translator {
    backend: Option<Arc<dyn CompletionBackend>>,
    context_chars: usize,
    timeout: Duration,
    progress: Option<ProgressCallback>,
}

impl Translator {
    /// `None` runs offline. Context and timeout take the config defaults.
    pub fn new(backend: Option<Arc<dyn CompletionBackend>>) -> Self {
        let defaults = PipelineConfig::default();
        Self {
            backend,
            context_chars: defaults.context_chars,
            timeout: Duration::from_secs(defaults.api_timeout_secs),
            progress: None,
        }
    }

    pub fn offline() -> Self {
        Self::new(None)
    }

    /// Uses `config.backend` when set, otherwise builds the configured
    /// provider (or goes offline when there is no credential).
    pub fn from_config(config: &PipelineConfig) -> Result<Self, PipelineError> {
        let backend = match &config.backend {
            Some(backend) => Some(Arc::clone(backend)),
            None => TranslationBackend::from_config(config)?.map(|b| {
                debug!("Using the {} backend", b.kind());
                Arc::new(b) as Arc<dyn CompletionBackend>
            }),
        };
        Ok(Self {
            backend,
            context_chars: config.context_chars,
            timeout: Duration::from_secs(config.api_timeout_secs),
            progress: config.progress_callback.clone(),
        })
    }

    pub fn with_context_chars(mut self, n: usize) -> Self {
        self.context_chars = n;
        self
    }

    pub fn is_offline(&self) -> bool {
        self.backend.is_none()
    }

    /// Translates one piece of text.
    ///
    /// Whitespace-only input gives `""` without a backend call. Offline, the
    /// text comes back unchanged behind a `[src→tgt]` marker.
    pub async fn translate_unit(
        &self,
        text: &str,
        source_lang: &str,
        target_lang: &str,
        context: Option<&str>,
        glossary: Option<&Glossary>,
    ) -> Result<String, BackendError> {
        if text.trim().is_empty() {
            return Ok(String::new());
        }
        let Some(backend) = &self.backend else {
            return Ok(offline_translation(text, source_lang, target_lang));
        };

        let user = prompt::build_user_prompt(text, source_lang, target_lang, context, glossary);
        let raw = tokio::time::timeout(self.timeout, backend.complete(prompt::SYSTEM_PROMPT, &user))
            .await
            .map_err(|_| BackendError(format!("timed out after {}s", self.timeout.as_secs())))??;
        Ok(cleanup::clean_translation(&raw))
    }

    /// Translates pre-split units, one output segment per unit, in order.
    pub async fn translate_units(
        &self,
        units: &[MarkdownUnit],
        source_lang: &str,
        target_lang: &str,
        glossary: Option<&Glossary>,
    ) -> Result<Vec<String>, PipelineError> {
        let total = units.len();
        if let Some(cb) = &self.progress {
            cb.on_translation_start(total);
        }

        let mut outputs: Vec<String> = Vec::with_capacity(total);
        for unit in units {
            let chunk = unit.index + 1;
            info!("Translating chunk {}/{}", chunk, total);
            if let Some(cb) = &self.progress {
                cb.on_chunk_start(chunk, total);
            }

            let context = outputs
                .last()
                .map(|prev| tail_chars(prev, self.context_chars))
                .filter(|c| !c.is_empty());

            let translated = self
                .translate_unit(&unit.text, source_lang, target_lang, context, glossary)
                .await
                .map_err(|e| {
                    error!("Chunk {}/{} failed: {}", chunk, total, e);
                    PipelineError::TranslationBackendFailure {
                        chunk,
                        total,
                        detail: e.to_string(),
                    }
                })?;

            let output_chars = translated.chars().count();
            debug!("Chunk {}: {} → {} chars", chunk, unit.len(), output_chars);
            if let Some(cb) = &self.progress {
                cb.on_chunk_complete(chunk, total, output_chars);
            }
            outputs.push(translated);
        }

        if let Some(cb) = &self.progress {
            cb.on_translation_complete(total);
        }
        Ok(outputs)
    }

    /// Chunks `markdown`, translates every chunk, and joins the results
    /// with [`chunk::JOINER`].
    pub async fn translate_document(
        &self,
        markdown: &str,
        source_lang: &str,
        target_lang: &str,
        glossary: Option<&Glossary>,
        chunk_size: usize,
    ) -> Result<String, PipelineError> {
        let units = chunk::split(markdown, chunk_size);
        info!(
            "Translating {} chunks {}→{}{}",
            units.len(),
            source_lang,
            target_lang,
            if self.is_offline() { " (offline)" } else { "" }
        );
        let outputs = self
            .translate_units(&units, source_lang, target_lang, glossary)
            .await?;
        Ok(chunk::join(&outputs))
    }
}

/// The last `n` characters of `s` (all of `s` when shorter).
fn tail_chars(s: &str, n: usize) -> &str {
    if n == 0 {
        return "";
    }
    let count = s.chars().count();
    if count <= n {
        return s;
    }
    match s.char_indices().nth(count - n) {
        Some((idx, _)) => &s[idx..],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Echoes the text between the `---` fences, upper-cased, and records prompts.
    #[derive(Default)]
    struct Recording {
        prompts: Mutex<Vec<String>>,
        fail_on: Option<usize>,
    }

    #[async_trait]
    impl CompletionBackend for Recording {
        async fn complete(&self, system: &str, user: &str) -> Result<String, BackendError> {
            assert_eq!(system, prompt::SYSTEM_PROMPT);
            let mut prompts = self.prompts.lock().unwrap();
            prompts.push(user.to_string());
            if self.fail_on == Some(prompts.len()) {
                return Err(BackendError("quota exceeded".into()));
            }
            let body = user.split("\n---\n").nth(1).unwrap_or_default();
            Ok(format!("Translation: {}", body.to_uppercase()))
        }
    }

    #[tokio::test]
    async fn offline_unit_keeps_text_and_marks_languages() {
        let out = Translator::offline()
            .translate_unit("안녕", "ko", "en", None, None)
            .await
            .unwrap();
        assert!(out.contains("ko"));
        assert!(out.contains("en"));
        assert!(out.contains("안녕"));
    }

    #[tokio::test]
    async fn blank_unit_skips_backend() {
        let backend = Arc::new(Recording::default());
        let t = Translator::new(Some(backend.clone()));
        assert_eq!(t.translate_unit("  \n", "ko", "en", None, None).await.unwrap(), "");
        assert!(backend.prompts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn units_are_translated_in_order_with_context() {
        let backend = Arc::new(Recording::default());
        let t = Translator::new(Some(backend.clone())).with_context_chars(5);
        let units = chunk::split("# A\nalpha\n# B\nbeta\n", 8);
        assert_eq!(units.len(), 2);

        let outputs = t.translate_units(&units, "en", "ko", None).await.unwrap();
        assert_eq!(outputs, vec!["# A\nALPHA", "# B\nBETA"]);

        let prompts = backend.prompts.lock().unwrap();
        assert!(!prompts[0].contains("Previous context"));
        assert!(prompts[1].contains("Previous context: ALPHA"));
    }

    #[tokio::test]
    async fn failure_aborts_with_chunk_position() {
        let backend = Arc::new(Recording {
            fail_on: Some(2),
            ..Default::default()
        });
        let err = Translator::new(Some(backend))
            .translate_document("# A\nx\n# B\ny\n# C\nz\n", "ko", "en", None, 3)
            .await
            .unwrap_err();
        match err {
            PipelineError::TranslationBackendFailure { chunk, total, detail } => {
                assert_eq!((chunk, total), (2, 3));
                assert!(detail.contains("quota"));
            }
            other => panic!("unexpected: {other}"),
        }
    }

    #[tokio::test]
    async fn document_output_has_one_segment_per_chunk() {
        let md = "# Page 1\n\nOne\n\n---\n\n# Page 2\n\nTwo\n\n---\n";
        let units = chunk::split(md, 10);
        let out = Translator::offline()
            .translate_document(md, "ko", "en", None, 10)
            .await
            .unwrap();
        assert_eq!(out.matches("[ko→en]").count(), units.len());
    }

    #[derive(Default)]
    struct Lengths(Mutex<Vec<usize>>);

    impl crate::progress::TranslationProgressCallback for Lengths {
        fn on_chunk_complete(&self, _chunk: usize, _total: usize, output_len: usize) {
            self.0.lock().unwrap().push(output_len);
        }
    }

    #[tokio::test]
    async fn progress_reports_output_length_in_chars() {
        let lengths = Arc::new(Lengths::default());
        let config = PipelineConfig::builder()
            .progress_callback(lengths.clone())
            .build()
            .unwrap();
        let t = Translator::from_config(&config).unwrap();
        assert!(t.is_offline());

        let units = chunk::split("안녕", 100);
        let outputs = t.translate_units(&units, "ko", "en", None).await.unwrap();
        // "[ko→en]\n안녕" is 10 characters but 16 bytes.
        assert_eq!(outputs[0].len(), 16);
        assert_eq!(*lengths.0.lock().unwrap(), vec![10]);
    }

    #[test]
    fn builder_key_gives_an_online_translator() {
        let config = PipelineConfig::builder().api_key("sk-test-builder").build().unwrap();
        assert!(!Translator::from_config(&config).unwrap().is_offline());
    }

    #[test]
    fn tail_is_char_based() {
        assert_eq!(tail_chars("안녕하세요", 2), "세요");
        assert_eq!(tail_chars("abc", 10), "abc");
        assert_eq!(tail_chars("abc", 0), "");
    }
}
