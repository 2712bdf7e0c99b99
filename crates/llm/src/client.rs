//! LLM client abstraction and request/response types.

use base64::Engine;
use serde::{Deserialize, Serialize};
use std::path::Path;
use wayfarer_core::{AppError, AppResult};

/// An image attached to a question, e.g. a photo of a landmark.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImagePayload {
    /// MIME type ("image/jpeg", "image/png", ...)
    pub mime_type: String,

    /// Raw image bytes
    #[serde(skip)]
    pub data: Vec<u8>,
}

impl ImagePayload {
    pub fn new(mime_type: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            mime_type: mime_type.into(),
            data,
        }
    }

    /// Read an image from disk, inferring the MIME type from its extension.
    pub fn from_file(path: &Path) -> AppResult<Self> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
            .unwrap_or_default();

        let mime_type = match extension.as_str() {
            "jpg" | "jpeg" => "image/jpeg",
            "png" => "image/png",
            "webp" => "image/webp",
            "gif" => "image/gif",
            "heic" => "image/heic",
            other => {
                return Err(AppError::InvalidArgument(format!(
                    "Unsupported image type '{}' for {:?}",
                    other, path
                )))
            }
        };

        let data = std::fs::read(path)?;
        if data.is_empty() {
            return Err(AppError::InvalidArgument(format!(
                "Image file is empty: {:?}",
                path
            )));
        }

        Ok(Self::new(mime_type, data))
    }

    /// Standard base64 encoding of the bytes, as both providers expect.
    pub fn to_base64(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(&self.data)
    }
}

/// LLM completion request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmRequest {
    /// The prompt text to send to the LLM
    pub prompt: String,

    /// Model identifier (e.g., "llama3.2", "gemini-1.5-flash-latest")
    pub model: String,

    /// Maximum tokens to generate
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// Temperature for sampling (0.0 - 2.0)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    /// Top-p nucleus sampling
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,

    /// Top-k sampling
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_k: Option<u32>,

    /// System prompt (optional)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,

    /// Images sent alongside the prompt
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<ImagePayload>,
}

impl LlmRequest {
    /// Create a new LLM request with required fields.
    pub fn new(prompt: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            model: model.into(),
            max_tokens: None,
            temperature: None,
            top_p: None,
            top_k: None,
            system: None,
            images: Vec::new(),
        }
    }

    /// Set the maximum tokens to generate.
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Set the temperature for sampling.
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_top_p(mut self, top_p: f32) -> Self {
        self.top_p = Some(top_p);
        self
    }

    pub fn with_top_k(mut self, top_k: u32) -> Self {
        self.top_k = Some(top_k);
        self
    }

    /// Set the system prompt.
    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    /// Attach an image.
    pub fn with_image(mut self, image: ImagePayload) -> Self {
        self.images.push(image);
        self
    }
}

/// LLM completion response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmResponse {
    /// The generated text
    pub content: String,

    /// Model that generated the response
    pub model: String,

    /// Usage statistics
    pub usage: LlmUsage,

    /// Whether the response was complete
    #[serde(default = "default_true")]
    pub done: bool,

    /// Source labels the provider reports having used, when it reports any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cited_sources: Option<Vec<String>>,
}

fn default_true() -> bool {
    true
}

/// Token usage statistics.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct LlmUsage {
    /// Tokens in the prompt
    #[serde(default)]
    pub prompt_tokens: u32,

    /// Tokens in the completion
    #[serde(default)]
    pub completion_tokens: u32,

    /// Total tokens used
    #[serde(default)]
    pub total_tokens: u32,
}

impl LlmUsage {
    /// Create usage stats from prompt and completion token counts.
    pub fn new(prompt_tokens: u32, completion_tokens: u32) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        }
    }
}

/// Trait for generation providers.
///
/// Implementations classify failures: network errors, timeouts and
/// HTTP 408/429/5xx are returned as transient `AppError::Generation`,
/// everything else as permanent, so callers can decide whether to retry.
#[async_trait::async_trait]
pub trait LlmClient: Send + Sync {
    /// Get the provider name (e.g., "ollama", "gemini").
    fn provider_name(&self) -> &str;

    /// Perform a non-streaming completion.
    async fn complete(&self, request: &LlmRequest) -> AppResult<LlmResponse>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_request_builder() {
        let request = LlmRequest::new("Where is Sigiriya?", "llama3.2")
            .with_system("You are a travel assistant")
            .with_temperature(0.7)
            .with_top_p(0.95)
            .with_top_k(40)
            .with_max_tokens(2048)
            .with_image(ImagePayload::new("image/png", vec![1, 2, 3]));

        assert_eq!(request.system.as_deref(), Some("You are a travel assistant"));
        assert_eq!(request.top_k, Some(40));
        assert_eq!(request.images.len(), 1);
    }

    #[test]
    fn test_image_base64() {
        let image = ImagePayload::new("image/png", b"hello".to_vec());
        assert_eq!(image.to_base64(), "aGVsbG8=");
    }

    #[test]
    fn test_image_from_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("temple.JPG");
        std::fs::write(&path, [0xff, 0xd8, 0xff]).unwrap();

        let image = ImagePayload::from_file(&path).unwrap();
        assert_eq!(image.mime_type, "image/jpeg");
        assert_eq!(image.data.len(), 3);
    }

    #[test]
    fn test_image_unsupported_extension() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("notes.txt");
        std::fs::write(&path, "not an image").unwrap();

        assert!(matches!(
            ImagePayload::from_file(&path),
            Err(AppError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_usage_totals() {
        let usage = LlmUsage::new(12, 30);
        assert_eq!(usage.total_tokens, 42);
    }
}
