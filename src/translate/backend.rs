//! Completion backends.
//!
//! The orchestrator only needs one capability, [`CompletionBackend::complete`].
//! [`TranslationBackend`] is the provider-tagged implementation built from
//! the config; tests and embedders can plug in any other implementation via
//! [`crate::config::PipelineConfigBuilder::backend`].

use crate::config::{PipelineConfig, ProviderKind};
use crate::error::PipelineError;
use async_trait::async_trait;
use edgequake_llm::{AnthropicProvider, ChatMessage, CompletionOptions, LLMProvider, OpenAIProvider};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

/// A failed backend call: network, quota, or malformed response.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct BackendError(pub String);

/// `complete(system, user) -> text`. Failures are returned, never retried here.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    async fn complete(&self, system: &str, user: &str) -> Result<String, BackendError>;
}

/// Chat call through an `edgequake_llm` provider.
pub struct LlmBackend {
    provider: Arc<dyn LLMProvider>,
    options: CompletionOptions,
}

impl LlmBackend {
    pub fn new(provider: Arc<dyn LLMProvider>, temperature: f32, max_tokens: usize) -> Self {
        Self {
            provider,
            options: CompletionOptions {
                temperature: Some(temperature),
                max_tokens: Some(max_tokens),
                ..Default::default()
            },
        }
    }
}

#[async_trait]
impl CompletionBackend for LlmBackend {
    async fn complete(&self, system: &str, user: &str) -> Result<String, BackendError> {
        let messages = vec![ChatMessage::system(system), ChatMessage::user(user)];
        let response = self
            .provider
            .chat(&messages, Some(&self.options))
            .await
            .map_err(|e| BackendError(e.to_string()))?;
        debug!(
            "Backend call: {} input tokens, {} output tokens",
            response.prompt_tokens, response.completion_tokens
        );
        Ok(response.content)
    }
}

/// The provider, chosen once when the backend is built.
pub enum TranslationBackend {
    OpenAi(LlmBackend),
    Anthropic(LlmBackend),
}

impl TranslationBackend {
    /// `Ok(None)` when no credential is configured: the caller runs offline.
    ///
    /// The provider is built with `config.api_key` itself, so a key set only
    /// through the builder is the one used for every call.
    pub fn from_config(config: &PipelineConfig) -> Result<Option<Self>, PipelineError> {
        let Some(api_key) = config.api_key.as_deref() else {
            info!("No {} credential configured, translating offline", config.provider);
            return Ok(None);
        };
        if api_key.trim().is_empty() {
            return Err(PipelineError::ProviderNotConfigured {
                provider: config.provider.to_string(),
                hint: format!(
                    "The configured API key is blank. Set {} or pass --api-key.",
                    config.provider.api_key_var()
                ),
            });
        }

        let model = config.effective_model();
        let provider: Arc<dyn LLMProvider> = match config.provider {
            ProviderKind::OpenAi => Arc::new(OpenAIProvider::new(api_key).with_model(model)),
            ProviderKind::Anthropic => Arc::new(AnthropicProvider::new(api_key).with_model(model)),
        };
        let backend = LlmBackend::new(provider, config.temperature, config.max_tokens);

        info!("Translating with {} ({})", config.provider, model);
        Ok(Some(match config.provider {
            ProviderKind::OpenAi => TranslationBackend::OpenAi(backend),
            ProviderKind::Anthropic => TranslationBackend::Anthropic(backend),
        }))
    }

    pub fn kind(&self) -> ProviderKind {
        match self {
            TranslationBackend::OpenAi(_) => ProviderKind::OpenAi,
            TranslationBackend::Anthropic(_) => ProviderKind::Anthropic,
        }
    }
}

#[async_trait]
impl CompletionBackend for TranslationBackend {
    async fn complete(&self, system: &str, user: &str) -> Result<String, BackendError> {
        match self {
            TranslationBackend::OpenAi(b) | TranslationBackend::Anthropic(b) => {
                b.complete(system, user).await
            }
        }
    }
}

/// Deterministic stand-in used when no credential is configured:
/// `[ko→en]` on its own line, then the text unchanged.
pub fn offline_translation(text: &str, source_lang: &str, target_lang: &str) -> String {
    format!("[{source_lang}→{target_lang}]\n{text}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_key_means_offline() {
        let config = PipelineConfig::default();
        assert!(TranslationBackend::from_config(&config).unwrap().is_none());
    }

    #[test]
    fn builder_key_selects_the_configured_provider() {
        let config = PipelineConfig::builder().api_key("sk-test-builder").build().unwrap();
        let backend = TranslationBackend::from_config(&config).unwrap().unwrap();
        assert_eq!(backend.kind(), ProviderKind::OpenAi);

        let config = PipelineConfig::builder()
            .provider(ProviderKind::Anthropic)
            .api_key("sk-ant-test")
            .build()
            .unwrap();
        let backend = TranslationBackend::from_config(&config).unwrap().unwrap();
        assert_eq!(backend.kind(), ProviderKind::Anthropic);
    }

    #[test]
    fn blank_key_is_not_configured() {
        let mut config = PipelineConfig::default();
        config.api_key = Some("   ".into());
        match TranslationBackend::from_config(&config) {
            Err(PipelineError::ProviderNotConfigured { provider, .. }) => assert_eq!(provider, "openai"),
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("blank key accepted"),
        }
    }

    #[test]
    fn offline_marks_language_pair_and_keeps_text() {
        let out = offline_translation("안녕", "ko", "en");
        assert!(out.contains("ko→en"));
        assert!(out.contains("안녕"));
    }
}
