//! Error types for Wayfarer.
//!
//! A single enum covers every failure category in the pipeline: loading,
//! embedding, retrieval, composition and generation, plus the ambient
//! configuration and I/O errors.

use thiserror::Error;

/// Unified error type for Wayfarer.
///
/// All fallible functions return `Result<T, AppError>`.
/// We never panic: errors must be represented and propagated.
#[derive(Error, Debug)]
pub enum AppError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O and filesystem errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A data source is missing or malformed as a whole
    #[error("Load error: {0}")]
    Load(String),

    /// The embedding capability failed
    #[error("Embedding error: {message}")]
    Embedding { message: String, transient: bool },

    /// The generation capability failed or produced nothing usable
    #[error("Generation error: {message}")]
    Generation { message: String, transient: bool },

    /// Caller supplied an argument outside the accepted domain
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// An internal consistency rule was broken (e.g. vector dimensions)
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    /// An external call exceeded its time budget
    #[error("Timed out: {0}")]
    Timeout(String),

    /// Prompt definition or rendering errors
    #[error("Prompt error: {0}")]
    Prompt(String),

    /// Embedding cache errors
    #[error("Cache error: {0}")]
    Cache(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic errors
    #[error("{0}")]
    Other(String),
}

impl AppError {
    /// Embedding failure that is worth retrying (network, 5xx, rate limit).
    pub fn embedding_transient(message: impl Into<String>) -> Self {
        AppError::Embedding {
            message: message.into(),
            transient: true,
        }
    }

    /// Embedding failure that retrying cannot fix.
    pub fn embedding(message: impl Into<String>) -> Self {
        AppError::Embedding {
            message: message.into(),
            transient: false,
        }
    }

    /// Generation failure that is worth retrying.
    pub fn generation_transient(message: impl Into<String>) -> Self {
        AppError::Generation {
            message: message.into(),
            transient: true,
        }
    }

    /// Generation failure that retrying cannot fix.
    pub fn generation(message: impl Into<String>) -> Self {
        AppError::Generation {
            message: message.into(),
            transient: false,
        }
    }

    /// Whether a retry policy may attempt the operation again.
    pub fn is_transient(&self) -> bool {
        match self {
            AppError::Timeout(_) => true,
            AppError::Embedding { transient, .. } | AppError::Generation { transient, .. } => {
                *transient
            }
            _ => false,
        }
    }

    /// Short category name, used in logs and JSON output.
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::Config(_) => "config",
            AppError::Io(_) => "io",
            AppError::Load(_) => "load",
            AppError::Embedding { .. } => "embedding",
            AppError::Generation { .. } => "generation",
            AppError::InvalidArgument(_) => "invalid_argument",
            AppError::InvariantViolation(_) => "invariant_violation",
            AppError::Timeout(_) => "timeout",
            AppError::Prompt(_) => "prompt",
            AppError::Cache(_) => "cache",
            AppError::Serialization(_) => "serialization",
            AppError::Other(_) => "other",
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for AppError {
    fn from(err: serde_yaml::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

/// Convenience type alias for Results with AppError.
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(AppError::Timeout("embed".into()).is_transient());
        assert!(AppError::embedding_transient("503").is_transient());
        assert!(AppError::generation_transient("429").is_transient());
        assert!(!AppError::embedding("401").is_transient());
        assert!(!AppError::generation("empty output").is_transient());
        assert!(!AppError::Load("missing".into()).is_transient());
        assert!(!AppError::InvariantViolation("dims".into()).is_transient());
    }

    #[test]
    fn test_display_omits_transient_flag() {
        let err = AppError::generation_transient("upstream unavailable");
        assert_eq!(err.to_string(), "Generation error: upstream unavailable");
        assert_eq!(err.kind(), "generation");
    }
}
