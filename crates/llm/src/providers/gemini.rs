//! Gemini provider over the Generative Language REST API.
//!
//! The API key is sent in the `x-goog-api-key` header, never in the URL.

use super::{status_error, transport_error};
use crate::client::{LlmClient, LlmRequest, LlmResponse, LlmUsage};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};
use wayfarer_core::{AppError, AppResult};

pub const DEFAULT_GEMINI_ENDPOINT: &str = "https://generativelanguage.googleapis.com/v1beta";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(untagged)]
enum Part {
    Text {
        text: String,
    },
    InlineData {
        #[serde(rename = "inlineData")]
        inline_data: InlineData,
    },
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Serialize, Default)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_k: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    usage_metadata: Option<UsageMetadata>,
    model_version: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<Content>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    prompt_token_count: Option<u32>,
    candidates_token_count: Option<u32>,
}

/// Gemini generation client.
pub struct GeminiClient {
    base_url: String,
    client: reqwest::Client,
}

impl GeminiClient {
    /// Create a client against the public endpoint.
    pub fn new(api_key: &str) -> AppResult<Self> {
        Self::with_base_url(api_key, DEFAULT_GEMINI_ENDPOINT)
    }

    pub fn with_base_url(api_key: &str, base_url: impl Into<String>) -> AppResult<Self> {
        let mut key = HeaderValue::from_str(api_key)
            .map_err(|_| AppError::Config("Gemini API key is not a valid header value".into()))?;
        key.set_sensitive(true);

        let headers = HeaderMap::from_iter([(HeaderName::from_static("x-goog-api-key"), key)]);
        let client = reqwest::Client::builder()
            .default_headers(headers)
            .build()
            .map_err(|e| AppError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        })
    }

    fn model_path(model: &str) -> String {
        if model.starts_with("models/") {
            model.to_string()
        } else {
            format!("models/{}", model)
        }
    }

    fn to_gemini_request(request: &LlmRequest) -> GenerateContentRequest {
        let mut parts = vec![Part::Text {
            text: request.prompt.clone(),
        }];
        parts.extend(request.images.iter().map(|image| Part::InlineData {
            inline_data: InlineData {
                mime_type: image.mime_type.clone(),
                data: image.to_base64(),
            },
        }));

        GenerateContentRequest {
            contents: vec![Content {
                role: Some("user".to_string()),
                parts,
            }],
            system_instruction: request.system.as_ref().map(|system| Content {
                role: None,
                parts: vec![Part::Text {
                    text: system.clone(),
                }],
            }),
            generation_config: GenerationConfig {
                temperature: request.temperature,
                top_p: request.top_p,
                top_k: request.top_k,
                max_output_tokens: request.max_tokens,
            },
        }
    }

    fn convert_response(request: &LlmRequest, response: GenerateContentResponse) -> AppResult<LlmResponse> {
        let candidate = response
            .candidates
            .into_iter()
            .next()
            .ok_or_else(|| AppError::generation("Gemini returned no candidates"))?;

        let content = candidate
            .content
            .map(|c| {
                c.parts
                    .into_iter()
                    .filter_map(|part| match part {
                        Part::Text { text } => Some(text),
                        Part::InlineData { .. } => None,
                    })
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();

        let usage = response
            .usage_metadata
            .map(|u| {
                LlmUsage::new(
                    u.prompt_token_count.unwrap_or(0),
                    u.candidates_token_count.unwrap_or(0),
                )
            })
            .unwrap_or_default();

        Ok(LlmResponse {
            content,
            model: response.model_version.unwrap_or_else(|| request.model.clone()),
            usage,
            done: candidate.finish_reason.as_deref().map_or(true, |r| r == "STOP"),
            cited_sources: None,
        })
    }
}

#[async_trait::async_trait]
impl LlmClient for GeminiClient {
    fn provider_name(&self) -> &str {
        "gemini"
    }

    #[tracing::instrument(skip(self, request), fields(model = %request.model, images = request.images.len()))]
    async fn complete(&self, request: &LlmRequest) -> AppResult<LlmResponse> {
        let url = format!(
            "{}/{}:generateContent",
            self.base_url,
            Self::model_path(&request.model)
        );
        tracing::debug!(prompt_chars = request.prompt.len(), "Sending generateContent request");

        let response = self
            .client
            .post(&url)
            .json(&Self::to_gemini_request(request))
            .send()
            .await
            .map_err(|e| transport_error("Gemini", e))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(status_error("Gemini", status, &error_text));
        }

        let parsed: GenerateContentResponse = response.json().await.map_err(|e| {
            AppError::generation(format!("Failed to parse Gemini response: {}", e.without_url()))
        })?;

        Self::convert_response(request, parsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ImagePayload;

    #[test]
    fn test_model_path() {
        assert_eq!(
            GeminiClient::model_path("gemini-1.5-flash-latest"),
            "models/gemini-1.5-flash-latest"
        );
        assert_eq!(GeminiClient::model_path("models/x"), "models/x");
    }

    #[test]
    fn test_request_shape() {
        let request = LlmRequest::new("What is this temple?", "gemini-1.5-flash-latest")
            .with_system("You are a Sri Lanka travel assistant")
            .with_temperature(0.7)
            .with_top_k(40)
            .with_max_tokens(2048)
            .with_image(ImagePayload::new("image/jpeg", b"hello".to_vec()));

        let json = serde_json::to_value(GeminiClient::to_gemini_request(&request)).unwrap();

        assert_eq!(json["contents"][0]["role"], "user");
        assert_eq!(json["contents"][0]["parts"][0]["text"], "What is this temple?");
        assert_eq!(
            json["contents"][0]["parts"][1]["inlineData"]["mimeType"],
            "image/jpeg"
        );
        assert_eq!(json["contents"][0]["parts"][1]["inlineData"]["data"], "aGVsbG8=");
        assert_eq!(
            json["systemInstruction"]["parts"][0]["text"],
            "You are a Sri Lanka travel assistant"
        );
        assert_eq!(json["generationConfig"]["topK"], 40);
        assert_eq!(json["generationConfig"]["maxOutputTokens"], 2048);
    }

    #[test]
    fn test_convert_response() {
        let request = LlmRequest::new("q", "gemini-1.5-flash-latest");
        let parsed: GenerateContentResponse = serde_json::from_value(serde_json::json!({
            "candidates": [{
                "content": {"parts": [{"text": "Yala is best "}, {"text": "from February."}], "role": "model"},
                "finishReason": "STOP"
            }],
            "usageMetadata": {"promptTokenCount": 20, "candidatesTokenCount": 6, "totalTokenCount": 26}
        }))
        .unwrap();

        let response = GeminiClient::convert_response(&request, parsed).unwrap();
        assert_eq!(response.content, "Yala is best from February.");
        assert_eq!(response.model, "gemini-1.5-flash-latest");
        assert_eq!(response.usage.total_tokens, 26);
        assert!(response.done);
    }

    #[test]
    fn test_no_candidates_is_permanent_error() {
        let request = LlmRequest::new("q", "gemini-1.5-flash-latest");
        let parsed: GenerateContentResponse =
            serde_json::from_value(serde_json::json!({"candidates": []})).unwrap();

        let err = GeminiClient::convert_response(&request, parsed).unwrap_err();
        assert!(matches!(err, AppError::Generation { transient: false, .. }));
    }

    #[test]
    fn test_invalid_key_rejected() {
        assert!(matches!(
            GeminiClient::new("bad\nkey"),
            Err(AppError::Config(_))
        ));
    }
}
