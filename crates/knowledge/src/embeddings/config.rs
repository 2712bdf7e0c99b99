//! Embedding configuration types.

use serde::{Deserialize, Serialize};
use wayfarer_core::{AppError, AppResult};

/// Embedding settings for a knowledge base (the `embedding:` section of its config.yaml).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EmbeddingConfig {
    /// Provider name: "mock", "ollama", "gemini"
    pub provider: String,

    /// Model identifier (provider-specific)
    pub model: String,

    /// Embedding vector dimensions
    pub dimensions: usize,

    /// Maximum texts per embedding request
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Endpoint override
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,

    /// Environment variable holding the API key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,
}

fn default_batch_size() -> usize {
    100
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "mock".to_string(),
            model: "trigram-v1".to_string(),
            dimensions: 384,
            batch_size: default_batch_size(),
            endpoint: None,
            api_key_env: None,
        }
    }
}

impl EmbeddingConfig {
    pub fn validate(&self) -> AppResult<()> {
        if self.dimensions == 0 {
            return Err(AppError::Config(
                "embedding.dimensions must be at least 1".to_string(),
            ));
        }
        if self.batch_size == 0 {
            return Err(AppError::Config(
                "embedding.batchSize must be at least 1".to_string(),
            ));
        }
        if self.model.trim().is_empty() {
            return Err(AppError::Config("embedding.model cannot be empty".to_string()));
        }
        Ok(())
    }

    /// API key from `apiKeyEnv`, falling back to `GEMINI_API_KEY` for gemini.
    pub fn resolve_api_key(&self) -> Option<String> {
        let var = match (&self.api_key_env, self.provider.as_str()) {
            (Some(var), _) => var.as_str(),
            (None, "gemini") => "GEMINI_API_KEY",
            (None, _) => return None,
        };
        std::env::var(var).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_offline() {
        let config = EmbeddingConfig::default();
        assert_eq!(config.provider, "mock");
        assert!(config.validate().is_ok());
        assert!(config.resolve_api_key().is_none());
    }

    #[test]
    fn test_yaml_camel_case() {
        let config: EmbeddingConfig = serde_yaml::from_str(
            "provider: gemini\nmodel: models/embedding-001\ndimensions: 768\nbatchSize: 50\napiKeyEnv: MY_KEY\n",
        )
        .unwrap();
        assert_eq!(config.batch_size, 50);
        assert_eq!(config.api_key_env.as_deref(), Some("MY_KEY"));
    }
}
