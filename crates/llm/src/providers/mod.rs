//! Concrete generation providers.

pub mod echo;
pub mod gemini;
pub mod ollama;

pub use echo::EchoClient;
pub use gemini::GeminiClient;
pub use ollama::OllamaClient;

use reqwest::StatusCode;
use wayfarer_core::AppError;

/// Statuses worth retrying: request timeout, rate limiting and server errors.
pub(crate) fn is_transient_status(status: StatusCode) -> bool {
    status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::TOO_MANY_REQUESTS
        || status.is_server_error()
}

/// Map a failed HTTP status to a generation error with the right retry class.
pub(crate) fn status_error(provider: &str, status: StatusCode, body: &str) -> AppError {
    let message = format!("{} API error ({}): {}", provider, status, body.trim());
    if is_transient_status(status) {
        AppError::generation_transient(message)
    } else {
        AppError::generation(message)
    }
}

/// Map a transport failure. The URL is stripped so credentials never reach logs.
pub(crate) fn transport_error(provider: &str, err: reqwest::Error) -> AppError {
    let err = err.without_url();
    if err.is_timeout() {
        AppError::Timeout(format!("{} request timed out", provider))
    } else if err.is_decode() {
        AppError::generation(format!("Failed to parse {} response: {}", provider, err))
    } else {
        AppError::generation_transient(format!("Failed to reach {}: {}", provider, err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        assert!(is_transient_status(StatusCode::TOO_MANY_REQUESTS));
        assert!(is_transient_status(StatusCode::SERVICE_UNAVAILABLE));
        assert!(is_transient_status(StatusCode::REQUEST_TIMEOUT));
        assert!(!is_transient_status(StatusCode::BAD_REQUEST));
        assert!(!is_transient_status(StatusCode::UNAUTHORIZED));
        assert!(!is_transient_status(StatusCode::NOT_FOUND));
    }

    #[test]
    fn test_status_error_keeps_body() {
        let err = status_error("Gemini", StatusCode::FORBIDDEN, "permission denied\n");
        assert!(!err.is_transient());
        assert!(err.to_string().contains("permission denied"));
    }
}
