//! Concrete embedding providers.

pub mod gemini;
pub mod mock;
pub mod ollama;

pub use gemini::GeminiProvider;
pub use mock::MockProvider;
pub use ollama::OllamaProvider;

use reqwest::StatusCode;
use wayfarer_core::AppError;

/// Map a failed HTTP status to an embedding error; 408, 429 and 5xx are retryable.
pub(crate) fn status_error(provider: &str, status: StatusCode, body: &str) -> AppError {
    let message = format!("{} embedding API error ({}): {}", provider, status, body.trim());
    if status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::TOO_MANY_REQUESTS
        || status.is_server_error()
    {
        AppError::embedding_transient(message)
    } else {
        AppError::embedding(message)
    }
}

/// Map a transport failure, stripping the URL from the message.
pub(crate) fn transport_error(provider: &str, err: reqwest::Error) -> AppError {
    let err = err.without_url();
    if err.is_timeout() {
        AppError::Timeout(format!("{} embedding request timed out", provider))
    } else if err.is_decode() {
        AppError::embedding(format!("Failed to parse {} response: {}", provider, err))
    } else {
        AppError::embedding_transient(format!("Failed to reach {}: {}", provider, err))
    }
}
