//! Answer generation.

use crate::rag::sources::{extract_citations, reported_citations};
use crate::types::Answer;
use std::fmt;
use std::sync::Arc;
use wayfarer_core::{AppError, AppResult, PipelineSettings, RetryPolicy};
use wayfarer_llm::{ImagePayload, LlmClient, LlmRequest, LlmUsage};
use wayfarer_prompt::ComposedPrompt;

/// Sampling parameters sent with every request.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationParams {
    pub temperature: f32,
    pub top_p: f32,
    pub top_k: u32,
    pub max_output_tokens: u32,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self::from(&PipelineSettings::default())
    }
}

impl From<&PipelineSettings> for GenerationParams {
    fn from(settings: &PipelineSettings) -> Self {
        Self {
            temperature: settings.temperature,
            top_p: settings.top_p,
            top_k: settings.top_k_sampling,
            max_output_tokens: settings.max_output_tokens,
        }
    }
}

/// Sends composed prompts to the generation capability.
#[derive(Clone)]
pub struct AnswerGenerator {
    client: Arc<dyn LlmClient>,
    model: String,
    policy: RetryPolicy,
    params: GenerationParams,
}

impl fmt::Debug for AnswerGenerator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnswerGenerator")
            .field("provider", &self.client.provider_name())
            .field("model", &self.model)
            .field("policy", &self.policy)
            .field("params", &self.params)
            .finish()
    }
}

impl AnswerGenerator {
    pub fn new(
        client: Arc<dyn LlmClient>,
        model: impl Into<String>,
        policy: RetryPolicy,
        params: GenerationParams,
    ) -> Self {
        Self {
            client,
            model: model.into(),
            policy,
            params,
        }
    }

    pub fn from_settings(
        client: Arc<dyn LlmClient>,
        model: impl Into<String>,
        settings: &PipelineSettings,
    ) -> Self {
        Self::new(
            client,
            model,
            RetryPolicy::from_settings(settings),
            GenerationParams::from(settings),
        )
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn build_request(&self, prompt: &ComposedPrompt, images: &[ImagePayload]) -> LlmRequest {
        images.iter().cloned().fold(
            LlmRequest::new(prompt.text.clone(), self.model.clone())
                .with_temperature(self.params.temperature)
                .with_top_p(self.params.top_p)
                .with_top_k(self.params.top_k)
                .with_max_tokens(self.params.max_output_tokens),
            LlmRequest::with_image,
        )
    }

    /// Generate an answer for `prompt`.
    ///
    /// Citations are the labels the provider reports when it reports any,
    /// otherwise the prompt's labels that the answer text mentions.
    pub async fn generate(
        &self,
        prompt: &ComposedPrompt,
        images: &[ImagePayload],
    ) -> AppResult<(Answer, LlmUsage)> {
        let request = self.build_request(prompt, images);
        let client = self.client.as_ref();
        let req = &request;

        tracing::debug!(
            provider = client.provider_name(),
            model = %self.model,
            prompt_chars = prompt.char_len(),
            images = images.len(),
            "Generating answer"
        );

        let response = self
            .policy
            .run("generate", move || client.complete(req))
            .await?;

        let text = response.content.trim().to_string();
        if text.is_empty() {
            return Err(AppError::generation(format!(
                "{} returned an empty answer",
                client.provider_name()
            )));
        }

        let cited_sources = match &response.cited_sources {
            Some(reported) => reported_citations(reported),
            None => extract_citations(&text, &prompt.source_labels),
        };

        tracing::info!(
            chars = text.len(),
            citations = cited_sources.len(),
            tokens = response.usage.total_tokens,
            "Generated answer"
        );

        Ok((
            Answer {
                text,
                cited_sources,
            },
            response.usage,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;
    use wayfarer_llm::{EchoClient, LlmResponse};

    fn prompt(text: &str, labels: &[&str]) -> ComposedPrompt {
        ComposedPrompt {
            text: text.to_string(),
            prompt_id: "travel.answer".to_string(),
            source_labels: labels.iter().map(|s| s.to_string()).collect(),
            document_ids: (1..=labels.len() as u64).collect(),
            history_turns: 0,
            dropped_documents: 0,
            dropped_turns: 0,
        }
    }

    fn policy() -> RetryPolicy {
        RetryPolicy::new(2, Duration::from_millis(1), Duration::from_secs(1))
    }

    #[derive(Debug)]
    struct ScriptedClient {
        calls: AtomicU32,
        content: String,
        failures: u32,
    }

    #[async_trait::async_trait]
    impl LlmClient for ScriptedClient {
        fn provider_name(&self) -> &str {
            "scripted"
        }

        async fn complete(&self, request: &LlmRequest) -> AppResult<LlmResponse> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.failures {
                return Err(AppError::generation_transient("503 Service Unavailable"));
            }
            Ok(LlmResponse {
                content: self.content.clone(),
                model: request.model.clone(),
                usage: LlmUsage::default(),
                done: true,
                cited_sources: None,
            })
        }
    }

    #[tokio::test]
    async fn test_textual_citations_from_echo() {
        let generator = AnswerGenerator::new(
            Arc::new(EchoClient::new()),
            "echo",
            policy(),
            GenerationParams::default(),
        );
        let (answer, _) = generator
            .generate(
                &prompt("[wildlife-guide]\nYala National Park", &["wildlife-guide", "food-guide"]),
                &[],
            )
            .await
            .unwrap();

        assert_eq!(
            answer.cited_sources.into_iter().collect::<Vec<_>>(),
            vec!["wildlife-guide"]
        );
    }

    #[tokio::test]
    async fn test_reported_citations_win() {
        let generator = AnswerGenerator::new(
            Arc::new(EchoClient::with_citations(vec!["food-guide".to_string()])),
            "echo",
            policy(),
            GenerationParams::default(),
        );
        let (answer, _) = generator
            .generate(&prompt("[wildlife-guide] text", &["wildlife-guide"]), &[])
            .await
            .unwrap();

        assert!(answer.cited_sources.contains("food-guide"));
        assert!(!answer.cited_sources.contains("wildlife-guide"));
    }

    #[tokio::test]
    async fn test_empty_output_is_error() {
        let client = Arc::new(ScriptedClient {
            calls: AtomicU32::new(0),
            content: "   ".to_string(),
            failures: 0,
        });
        let generator = AnswerGenerator::new(client.clone(), "m", policy(), GenerationParams::default());

        let result = generator.generate(&prompt("q", &[]), &[]).await;
        assert!(matches!(
            result,
            Err(AppError::Generation { transient: false, .. })
        ));
        // Permanent: not retried
        assert_eq!(client.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_transient_failures_retried() {
        let client = Arc::new(ScriptedClient {
            calls: AtomicU32::new(0),
            content: "Take the train to Ella.".to_string(),
            failures: 2,
        });
        let generator = AnswerGenerator::new(client.clone(), "m", policy(), GenerationParams::default());

        let (answer, _) = generator.generate(&prompt("q", &[]), &[]).await.unwrap();
        assert_eq!(answer.text, "Take the train to Ella.");
        assert_eq!(client.calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_request_carries_sampling_and_images() {
        let generator = AnswerGenerator::new(
            Arc::new(EchoClient::new()),
            "gemini-1.5-flash-latest",
            policy(),
            GenerationParams::default(),
        );
        let image = ImagePayload::new("image/png", vec![1, 2, 3]);
        let request = generator.build_request(&prompt("q", &[]), &[image]);

        assert_eq!(request.temperature, Some(0.7));
        assert_eq!(request.top_p, Some(0.95));
        assert_eq!(request.top_k, Some(40));
        assert_eq!(request.max_tokens, Some(2048));
        assert_eq!(request.images.len(), 1);
    }
}
