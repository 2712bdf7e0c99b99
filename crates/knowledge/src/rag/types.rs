//! RAG request and response types.

use crate::retriever::SearchFilters;
use crate::types::{Answer, RetrievalResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use wayfarer_llm::{ImagePayload, LlmUsage};

/// Minimum score for high-confidence answering.
/// Below it the CLI flags the answer as weakly grounded.
pub const CONFIDENCE_THRESHOLD: f32 = 0.30;

/// Maximum snippet length for source references.
const MAX_SNIPPET_LENGTH: usize = 160;

/// Where a query is in its lifecycle.
///
/// Stages advance linearly; any failure ends in `Failed`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", tag = "stage", content = "reason")]
pub enum QueryStage {
    Received,
    Embedded,
    Retrieved,
    Composed,
    Generated,
    Delivered,
    Failed(String),
}

impl fmt::Display for QueryStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryStage::Received => f.write_str("received"),
            QueryStage::Embedded => f.write_str("embedded"),
            QueryStage::Retrieved => f.write_str("retrieved"),
            QueryStage::Composed => f.write_str("composed"),
            QueryStage::Generated => f.write_str("generated"),
            QueryStage::Delivered => f.write_str("delivered"),
            QueryStage::Failed(reason) => write!(f, "failed: {}", reason),
        }
    }
}

/// A question for the pipeline.
#[derive(Debug, Clone, Default)]
pub struct QueryRequest {
    pub question: String,
    pub image: Option<ImagePayload>,
    pub filters: SearchFilters,
    /// Overrides the pipeline's default `k`
    pub top_k: Option<usize>,
}

impl QueryRequest {
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            ..Default::default()
        }
    }

    pub fn with_image(mut self, image: ImagePayload) -> Self {
        self.image = Some(image);
        self
    }

    pub fn with_filters(mut self, filters: SearchFilters) -> Self {
        self.filters = filters;
        self
    }

    pub fn with_top_k(mut self, k: usize) -> Self {
        self.top_k = Some(k);
        self
    }
}

/// A single source reference used to answer a query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RagSourceRef {
    /// Source label, as cited in the prompt
    pub source: String,

    /// Document category
    pub location: String,

    /// Short snippet of the document text
    pub snippet: String,
}

impl RagSourceRef {
    pub fn from_result(result: &RetrievalResult) -> Self {
        Self {
            source: result.source_label.clone(),
            location: result.category.to_string(),
            snippet: truncate_snippet(&result.text, MAX_SNIPPET_LENGTH),
        }
    }
}

/// Response from a delivered query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RagResponse {
    pub answer: Answer,

    /// Retrieved documents the answer cites, in retrieval order
    pub sources: Vec<RagSourceRef>,

    /// Highest similarity score among retrieved documents
    pub max_score: f32,

    /// Whether the best match scored below [`CONFIDENCE_THRESHOLD`]
    pub low_confidence: bool,

    /// Stages the query passed through
    pub stages: Vec<QueryStage>,

    /// Token usage reported by the generation capability
    #[serde(default)]
    pub usage: LlmUsage,
}

impl RagResponse {
    pub fn new(answer: Answer, sources: Vec<RagSourceRef>, max_score: f32) -> Self {
        Self {
            answer,
            sources,
            max_score,
            low_confidence: max_score < CONFIDENCE_THRESHOLD,
            stages: Vec::new(),
            usage: LlmUsage::default(),
        }
    }
}

/// Truncate to at most `max_chars` characters, preferring a word boundary.
pub fn truncate_snippet(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let truncated: String = text.chars().take(max_chars).collect();
    match truncated.rfind(char::is_whitespace) {
        Some(last_space) if last_space > 0 => format!("{}...", &truncated[..last_space]),
        _ => format!("{}...", truncated),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Category;
    use std::collections::BTreeSet;

    #[test]
    fn test_rag_response_confidence() {
        let answer = Answer {
            text: "Visit Feb–Jun".to_string(),
            cited_sources: BTreeSet::new(),
        };
        assert!(!RagResponse::new(answer.clone(), Vec::new(), 0.85).low_confidence);
        assert!(RagResponse::new(answer, Vec::new(), 0.25).low_confidence);
    }

    #[test]
    fn test_source_ref_from_result() {
        let result = RetrievalResult {
            document_id: 1,
            score: 0.9,
            source_label: "wildlife-guide".to_string(),
            category: Category::Weather,
            text: "Yala National Park is best visited Feb–Jun".to_string(),
        };
        let source = RagSourceRef::from_result(&result);
        assert_eq!(source.source, "wildlife-guide");
        assert_eq!(source.location, "weather");
        assert_eq!(source.snippet, result.text);
    }

    #[test]
    fn test_truncate_snippet() {
        assert_eq!(truncate_snippet("Short text", 100), "Short text");

        let long = "Nine Arches Bridge in Ella is best photographed when the blue train passes";
        let result = truncate_snippet(long, 30);
        assert!(result.chars().count() <= 33);
        assert!(result.ends_with("..."));

        // Multi-byte characters never split
        let result = truncate_snippet("ශ්‍රී ලංකාව ශ්‍රී ලංකාව", 5);
        assert!(result.ends_with("..."));
    }

    #[test]
    fn test_stage_serialization() {
        let json = serde_json::to_string(&QueryStage::Failed("timeout".into())).unwrap();
        assert_eq!(json, r#"{"stage":"failed","reason":"timeout"}"#);
        assert_eq!(QueryStage::Delivered.to_string(), "delivered");
    }
}
