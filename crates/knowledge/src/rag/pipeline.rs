//! Query orchestration: retrieve, compose, generate, deliver.
//!
//! Each query walks `Received → Embedded → Retrieved → Composed → Generated →
//! Delivered`. A failure at any stage ends the query in `Failed` with no
//! partial answer, and the session history is left untouched.

use crate::rag::generator::AnswerGenerator;
use crate::rag::session::Session;
use crate::rag::types::{QueryRequest, QueryStage, RagResponse, RagSourceRef};
use crate::retriever::{Retriever, DEFAULT_TOP_K};
use crate::types::RetrievalResult;
use tracing::Instrument;
use wayfarer_core::{AppError, PipelineSettings};
use wayfarer_prompt::{ContextComposer, ContextDocument};

/// A query that ended in `Failed`.
#[derive(Debug, thiserror::Error)]
#[error("query failed after {last_stage}: {error}")]
pub struct QueryFailure {
    /// Last stage reached before the failure
    pub last_stage: QueryStage,
    /// Every stage visited, ending with `Failed`
    pub stages: Vec<QueryStage>,
    #[source]
    pub error: AppError,
}

impl QueryFailure {
    /// Message safe to show the traveller. Carries no provider details.
    pub fn user_message(&self) -> String {
        let reason = match &self.error {
            AppError::InvalidArgument(msg) => return format!("I can't answer that: {}.", msg),
            AppError::Timeout(_) => "the travel service took too long to respond",
            AppError::Embedding { .. } => "I couldn't search the travel guide right now",
            AppError::Generation { .. } => "I couldn't put an answer together right now",
            AppError::InvariantViolation(_) => "the travel guide index needs a refresh",
            _ => "something went wrong on my side",
        };
        format!(
            "Sorry, I could not complete that request: {}. Please try again.",
            reason
        )
    }

    /// The terminal stage (always `Failed`).
    pub fn final_stage(&self) -> Option<&QueryStage> {
        self.stages.last()
    }
}

/// Tracks stage transitions for one query.
struct StageTracker {
    stages: Vec<QueryStage>,
}

impl StageTracker {
    fn new() -> Self {
        Self {
            stages: vec![QueryStage::Received],
        }
    }

    fn advance(&mut self, stage: QueryStage) {
        tracing::debug!(stage = %stage, "Query stage");
        self.stages.push(stage);
    }

    fn fail(mut self, error: AppError) -> QueryFailure {
        let last_stage = self
            .stages
            .last()
            .cloned()
            .unwrap_or(QueryStage::Received);
        tracing::error!(after = %last_stage, kind = error.kind(), error = %error, "Query failed");
        self.stages.push(QueryStage::Failed(error.kind().to_string()));
        QueryFailure {
            last_stage,
            stages: self.stages,
            error,
        }
    }
}

/// The query-time pipeline over one knowledge base.
#[derive(Debug)]
pub struct RagPipeline {
    retriever: Retriever,
    composer: ContextComposer,
    generator: AnswerGenerator,
    top_k: usize,
    min_score: Option<f32>,
}

impl RagPipeline {
    pub fn new(retriever: Retriever, composer: ContextComposer, generator: AnswerGenerator) -> Self {
        Self {
            retriever,
            composer,
            generator,
            top_k: DEFAULT_TOP_K,
            min_score: None,
        }
    }

    /// Apply `topK` and `minScore` from pipeline settings.
    pub fn with_settings(mut self, settings: &PipelineSettings) -> Self {
        self.top_k = settings.top_k;
        self.min_score = settings.min_score;
        self
    }

    pub fn retriever(&self) -> &Retriever {
        &self.retriever
    }

    /// Answer one question within `session`.
    ///
    /// History is appended only when the query is delivered.
    pub async fn ask(
        &self,
        session: &mut Session,
        request: QueryRequest,
    ) -> Result<RagResponse, QueryFailure> {
        let span = tracing::info_span!("query", session = %session.id());
        self.run(session, request).instrument(span).await
    }

    async fn run(
        &self,
        session: &mut Session,
        request: QueryRequest,
    ) -> Result<RagResponse, QueryFailure> {
        let mut tracker = StageTracker::new();
        let question = request.question.trim().to_string();
        let k = request.top_k.unwrap_or(self.top_k);
        tracing::info!(question = %question, k, "Query received");

        if k == 0 {
            return Err(tracker.fail(AppError::InvalidArgument(
                "k must be at least 1".to_string(),
            )));
        }
        if let Err(e) = request.filters.mode.validate() {
            return Err(tracker.fail(e));
        }

        let vector = match self.retriever.embed_query(&question).await {
            Ok(v) => v,
            Err(e) => return Err(tracker.fail(e)),
        };
        tracker.advance(QueryStage::Embedded);

        let mut filters = request.filters.clone();
        if filters.min_score.is_none() {
            filters.min_score = self.min_score;
        }
        let results = match self.retriever.search(&vector, k, &filters) {
            Ok(r) => r,
            Err(e) => return Err(tracker.fail(e)),
        };
        tracker.advance(QueryStage::Retrieved);

        let context: Vec<ContextDocument> = results.iter().map(RetrievalResult::to_context).collect();
        let prompt = match self.composer.compose(&question, session.history(), &context) {
            Ok(p) => p,
            Err(e) => return Err(tracker.fail(e)),
        };
        tracker.advance(QueryStage::Composed);

        let images: Vec<_> = request.image.into_iter().collect();
        let (answer, usage) = match self.generator.generate(&prompt, &images).await {
            Ok(generated) => generated,
            Err(e) => return Err(tracker.fail(e)),
        };
        tracker.advance(QueryStage::Generated);

        let sources: Vec<RagSourceRef> = results
            .iter()
            .filter(|r| answer.cited_sources.contains(&r.source_label))
            .map(RagSourceRef::from_result)
            .collect();
        let max_score = results.first().map(|r| r.score).unwrap_or(0.0);

        session.record_exchange(&question, &answer.text);
        tracker.advance(QueryStage::Delivered);

        tracing::info!(
            documents = prompt.document_ids.len(),
            citations = answer.cited_sources.len(),
            max_score,
            "Query delivered"
        );

        let mut response = RagResponse::new(answer, sources, max_score);
        response.stages = tracker.stages;
        response.usage = usage;
        Ok(response)
    }
}
