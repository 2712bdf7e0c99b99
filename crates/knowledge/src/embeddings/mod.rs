//! Embedding providers for knowledge bases.
//!
//! A base's `embedding:` config picks the provider; [`CachedProvider`] wraps
//! it with the on-disk [`EmbeddingCache`].

pub mod cache;
pub mod config;
pub mod provider;
pub mod providers;

pub use cache::{CachedProvider, EmbeddingCache};
pub use config::EmbeddingConfig;
pub use provider::{create_provider, EmbeddingProvider};
