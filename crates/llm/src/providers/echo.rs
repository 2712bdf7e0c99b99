//! Deterministic offline client.
//!
//! Returns the prompt it was given. Used for dry runs without a model and as
//! the generation double in tests.

use crate::client::{LlmClient, LlmRequest, LlmResponse, LlmUsage};
use wayfarer_core::AppResult;

/// Client that echoes its prompt back as the answer.
#[derive(Debug, Clone, Default)]
pub struct EchoClient {
    cited_sources: Option<Vec<String>>,
}

impl EchoClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Report a fixed citation list with every response.
    pub fn with_citations(sources: Vec<String>) -> Self {
        Self {
            cited_sources: Some(sources),
        }
    }
}

#[async_trait::async_trait]
impl LlmClient for EchoClient {
    fn provider_name(&self) -> &str {
        "echo"
    }

    async fn complete(&self, request: &LlmRequest) -> AppResult<LlmResponse> {
        let words = request.prompt.split_whitespace().count() as u32;
        Ok(LlmResponse {
            content: request.prompt.clone(),
            model: request.model.clone(),
            usage: LlmUsage::new(words, words),
            done: true,
            cited_sources: self.cited_sources.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_echoes_prompt() {
        let client = EchoClient::new();
        let response = client
            .complete(&LlmRequest::new("[wildlife-guide] Yala", "echo"))
            .await
            .unwrap();

        assert_eq!(response.content, "[wildlife-guide] Yala");
        assert_eq!(response.usage.prompt_tokens, 2);
        assert!(response.cited_sources.is_none());
    }

    #[tokio::test]
    async fn test_fixed_citations() {
        let client = EchoClient::with_citations(vec!["hotels:Galle Fort".to_string()]);
        let response = client.complete(&LlmRequest::new("q", "echo")).await.unwrap();
        assert_eq!(
            response.cited_sources,
            Some(vec!["hotels:Galle Fort".to_string()])
        );
    }
}
