//! Generation capability for Wayfarer.
//!
//! A provider-agnostic [`LlmClient`] trait plus the concrete providers the
//! assistant can talk to.
//!
//! # Providers
//! - **Ollama**: Local LLM runtime (default)
//! - **Gemini**: Google Generative Language REST API
//! - **Echo**: Deterministic offline client that returns its prompt
//!
//! # Example
//! ```no_run
//! use wayfarer_llm::{LlmClient, LlmRequest, providers::OllamaClient};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = OllamaClient::new();
//! let request = LlmRequest::new("Best beaches near Galle?", "llama3.2");
//! let response = client.complete(&request).await?;
//! println!("{}", response.content);
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod factory;
pub mod providers;

// Re-export main types
pub use client::{ImagePayload, LlmClient, LlmRequest, LlmResponse, LlmUsage};
pub use factory::{create_client, ProviderType};
pub use providers::{EchoClient, GeminiClient, OllamaClient};
