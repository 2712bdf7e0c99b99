//! Wayfarer Core Library
//!
//! Foundational utilities shared by every Wayfarer crate:
//! - Error handling (`AppError`, `AppResult`)
//! - Logging infrastructure
//! - Configuration management
//! - Timeout and retry policy for external calls

pub mod config;
pub mod error;
pub mod logging;
pub mod retry;

// Re-export commonly used types
pub use config::{AppConfig, PipelineSettings};
pub use error::{AppError, AppResult};
pub use retry::RetryPolicy;
