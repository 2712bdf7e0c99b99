//! RAG (Retrieval-Augmented Generation) answering.
//!
//! Ties the retriever, the context composer and the answer generator into a
//! per-session query pipeline.

pub mod generator;
pub mod pipeline;
pub mod session;
pub mod sources;
pub mod types;

pub use generator::{AnswerGenerator, GenerationParams};
pub use pipeline::{QueryFailure, RagPipeline};
pub use session::Session;
pub use types::{QueryRequest, QueryStage, RagResponse, RagSourceRef, CONFIDENCE_THRESHOLD};
