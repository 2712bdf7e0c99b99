//! Embedding provider trait and factory.

use crate::embeddings::config::EmbeddingConfig;
use crate::embeddings::providers::{GeminiProvider, MockProvider, OllamaProvider};
use std::sync::Arc;
use wayfarer_core::{AppError, AppResult};

/// Trait for embedding providers.
///
/// Implementations make one attempt per call and classify failures as
/// transient or permanent; retries and timeouts are applied by the caller.
#[async_trait::async_trait]
pub trait EmbeddingProvider: Send + Sync + std::fmt::Debug {
    /// Get provider name (e.g., "mock", "ollama", "gemini")
    fn provider_name(&self) -> &str;

    /// Get model identifier
    fn model_name(&self) -> &str;

    /// Get embedding dimensions
    fn dimensions(&self) -> usize;

    /// Generate embeddings for multiple texts, one vector per text, in order.
    async fn embed_batch(&self, texts: &[String]) -> AppResult<Vec<Vec<f32>>>;

    /// Generate embedding for a single text (convenience method).
    async fn embed(&self, text: &str) -> AppResult<Vec<f32>> {
        let mut results = self.embed_batch(&[text.to_string()]).await?;
        results
            .pop()
            .ok_or_else(|| AppError::embedding("No embedding returned"))
    }
}

/// Create an embedding provider based on configuration.
///
/// `api_key` overrides the key resolved from `apiKeyEnv`.
pub fn create_provider(
    config: &EmbeddingConfig,
    api_key: Option<&str>,
) -> AppResult<Arc<dyn EmbeddingProvider>> {
    config.validate()?;

    match config.provider.as_str() {
        "mock" => Ok(Arc::new(MockProvider::new(config.dimensions))),

        "ollama" => Ok(Arc::new(OllamaProvider::new(config)?)),

        "gemini" => {
            let key = api_key
                .map(str::to_string)
                .or_else(|| config.resolve_api_key())
                .ok_or_else(|| {
                    AppError::Config(
                        "Gemini embeddings need an API key (embedding.apiKeyEnv or GEMINI_API_KEY)"
                            .to_string(),
                    )
                })?;
            Ok(Arc::new(GeminiProvider::new(config, &key)?))
        }

        _ => Err(AppError::Config(format!(
            "Unknown embedding provider: '{}'. Supported providers: mock, ollama, gemini",
            config.provider
        ))),
    }
}
