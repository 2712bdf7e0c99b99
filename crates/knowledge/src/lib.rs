//! Travel knowledge base and retrieval-augmented answering.
//!
//! Data files are loaded into [`Document`]s, embedded (through a SQLite
//! embedding cache) into an in-memory similarity index, and queried by the
//! [`RagPipeline`] to produce grounded answers with citations.

pub mod base;
pub mod chunker;
pub mod config;
pub mod embeddings;
pub mod indexer;
pub mod loader;
pub mod rag;
pub mod retriever;
pub mod types;
pub mod vector_index;

#[cfg(test)]
mod tests;

// Re-export commonly used types
pub use base::{refresh, stats, KnowledgeBase};
pub use chunker::{chunk_documents, ChunkSettings};
pub use embeddings::{create_provider, EmbeddingConfig, EmbeddingProvider};
pub use indexer::{IndexReader, IndexReport, IndexSnapshot, Indexer};
pub use loader::{load_documents, load_files, LoadReport};
pub use rag::{
    AnswerGenerator, QueryFailure, QueryRequest, QueryStage, RagPipeline, RagResponse,
    RagSourceRef, Session, CONFIDENCE_THRESHOLD,
};
pub use retriever::{Retriever, RetrievalMode, SearchFilters, DEFAULT_TOP_K};
pub use types::{Answer, BaseStats, Category, Document, KnowledgeBaseConfig, RetrievalResult};
