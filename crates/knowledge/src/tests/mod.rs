//! End-to-end query scenarios over an in-memory base.

use crate::embeddings::providers::MockProvider;
use crate::embeddings::EmbeddingProvider;
use crate::indexer::Indexer;
use crate::rag::{AnswerGenerator, GenerationParams, QueryRequest, QueryStage, RagPipeline, Session};
use crate::retriever::Retriever;
use crate::types::{Category, Document};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use wayfarer_core::{AppError, AppResult, RetryPolicy};
use wayfarer_llm::{EchoClient, LlmClient, LlmRequest, LlmResponse};
use wayfarer_prompt::{ComposerSettings, ContextComposer, PromptDefinition};

const DIMS: usize = 128;

/// Mock embedder that can stall or fail on demand and counts its calls.
#[derive(Debug)]
struct FlakyProvider {
    inner: MockProvider,
    calls: AtomicU32,
    stalls: AtomicU32,
    broken: AtomicBool,
}

impl FlakyProvider {
    fn new() -> Self {
        Self {
            inner: MockProvider::new(DIMS),
            calls: AtomicU32::new(0),
            stalls: AtomicU32::new(0),
            broken: AtomicBool::new(false),
        }
    }

    fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl EmbeddingProvider for FlakyProvider {
    fn provider_name(&self) -> &str {
        "flaky"
    }

    fn model_name(&self) -> &str {
        self.inner.model_name()
    }

    fn dimensions(&self) -> usize {
        DIMS
    }

    async fn embed_batch(&self, texts: &[String]) -> AppResult<Vec<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.broken.load(Ordering::SeqCst) {
            return Err(AppError::embedding("model not found"));
        }
        let stalled = self
            .stalls
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if stalled {
            tokio::time::sleep(Duration::from_millis(500)).await;
        }
        self.inner.embed_batch(texts).await
    }
}

struct FailingClient;

#[async_trait::async_trait]
impl LlmClient for FailingClient {
    fn provider_name(&self) -> &str {
        "failing"
    }

    async fn complete(&self, _request: &LlmRequest) -> AppResult<LlmResponse> {
        Err(AppError::generation("API key not valid"))
    }
}

fn policy() -> RetryPolicy {
    RetryPolicy::new(2, Duration::from_millis(1), Duration::from_millis(50))
}

fn guide() -> Vec<Document> {
    vec![
        Document::new(
            1,
            "Yala National Park is best visited Feb–Jun",
            "wildlife-guide",
            Category::Weather,
        ),
        Document::new(
            2,
            "Kandy Esala Perahera procession with decorated elephants",
            "festival-calendar",
            Category::Culture,
        ),
        Document::new(
            3,
            "Kottu roti street stalls in Colombo",
            "food-guide",
            Category::Restaurant,
        ),
    ]
}

async fn indexed(provider: Arc<FlakyProvider>) -> Indexer {
    let indexer = Indexer::new(provider, policy()).unwrap();
    indexer.index(&guide()).await.unwrap();
    indexer
}

fn pipeline(provider: Arc<FlakyProvider>, indexer: &Indexer, client: Arc<dyn LlmClient>) -> RagPipeline {
    let retriever = Retriever::new(provider, indexer.reader(), policy());
    let composer =
        ContextComposer::new(PromptDefinition::travel_default(), ComposerSettings::default())
            .unwrap();
    let generator = AnswerGenerator::new(client, "echo", policy(), GenerationParams::default());
    RagPipeline::new(retriever, composer, generator)
}

#[tokio::test]
async fn test_best_time_to_visit_yala() {
    let provider = Arc::new(FlakyProvider::new());
    let indexer = indexed(provider.clone()).await;

    let retriever = Retriever::new(provider.clone(), indexer.reader(), policy());
    let results = retriever.retrieve("best time to visit Yala", 1).await.unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].document_id, 1);
    assert_eq!(results[0].source_label, "wildlife-guide");

    let pipeline = pipeline(provider, &indexer, Arc::new(EchoClient::new()));
    let mut session = Session::new();
    let response = pipeline
        .ask(&mut session, QueryRequest::new("best time to visit Yala").with_top_k(1))
        .await
        .unwrap();

    assert!(response.answer.text.contains("[wildlife-guide]"));
    assert!(response.answer.text.contains("Yala National Park is best visited Feb–Jun"));
    assert_eq!(
        response.answer.cited_sources.iter().collect::<Vec<_>>(),
        vec!["wildlife-guide"]
    );
    assert_eq!(response.sources.len(), 1);
    assert_eq!(response.sources[0].location, "weather");
    assert_eq!(response.stages.last(), Some(&QueryStage::Delivered));
    assert_eq!(session.len(), 2);
}

#[tokio::test]
async fn test_zero_k_makes_no_external_calls() {
    let provider = Arc::new(FlakyProvider::new());
    let indexer = indexed(provider.clone()).await;
    let before = provider.calls();

    let retriever = Retriever::new(provider.clone(), indexer.reader(), policy());
    let result = retriever.retrieve("best time to visit Yala", 0).await;
    assert!(matches!(result, Err(AppError::InvalidArgument(_))));

    let pipeline = pipeline(provider.clone(), &indexer, Arc::new(EchoClient::new()));
    let mut session = Session::new();
    let failure = pipeline
        .ask(&mut session, QueryRequest::new("best time to visit Yala").with_top_k(0))
        .await
        .unwrap_err();
    assert!(matches!(failure.error, AppError::InvalidArgument(_)));
    assert_eq!(failure.last_stage, QueryStage::Received);

    assert_eq!(provider.calls(), before);
    assert!(session.is_empty());
}

#[tokio::test]
async fn test_two_timeouts_within_retry_budget() {
    let provider = Arc::new(FlakyProvider::new());
    let indexer = indexed(provider.clone()).await;
    let pipeline = pipeline(provider.clone(), &indexer, Arc::new(EchoClient::new()));

    provider.stalls.store(2, Ordering::SeqCst);
    let before = provider.calls();
    let mut session = Session::new();
    let response = pipeline
        .ask(&mut session, QueryRequest::new("best time to visit Yala"))
        .await
        .unwrap();

    assert_eq!(provider.calls() - before, 3);
    assert!(response.answer.cited_sources.contains("wildlife-guide"));
}

#[tokio::test]
async fn test_timeouts_past_retry_budget() {
    let provider = Arc::new(FlakyProvider::new());
    let indexer = indexed(provider.clone()).await;
    let pipeline = pipeline(provider.clone(), &indexer, Arc::new(EchoClient::new()));

    provider.stalls.store(3, Ordering::SeqCst);
    let mut session = Session::new();
    let failure = pipeline
        .ask(&mut session, QueryRequest::new("best time to visit Yala"))
        .await
        .unwrap_err();

    assert!(matches!(failure.error, AppError::Timeout(_)));
    assert_eq!(
        failure.final_stage(),
        Some(&QueryStage::Failed("timeout".to_string()))
    );
    assert!(session.is_empty());
}

#[tokio::test]
async fn test_reindex_is_idempotent() {
    let provider = Arc::new(FlakyProvider::new());
    let indexer = indexed(provider.clone()).await;
    let retriever = Retriever::new(provider, indexer.reader(), policy());

    let first = retriever.retrieve("elephants in Kandy", 3).await.unwrap();
    indexer.index(&guide()).await.unwrap();
    let second = retriever.retrieve("elephants in Kandy", 3).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(indexer.snapshot().len(), 3);
}

#[tokio::test]
async fn test_failed_rebuild_keeps_previous_index() {
    let provider = Arc::new(FlakyProvider::new());
    let indexer = indexed(provider.clone()).await;

    provider.broken.store(true, Ordering::SeqCst);
    let mut bigger = guide();
    bigger.push(Document::new(
        4,
        "Night mail train from Colombo to Badulla",
        "rail-timetable",
        Category::Transport,
    ));
    assert!(indexer.index(&bigger).await.is_err());

    let snapshot = indexer.snapshot();
    assert_eq!(snapshot.len(), 3);
    assert!(snapshot.document(4).is_none());
}

#[tokio::test]
async fn test_reader_keeps_snapshot_across_swap() {
    let provider = Arc::new(FlakyProvider::new());
    let indexer = indexed(provider.clone()).await;

    let held = indexer.reader().load();
    indexer.index(&guide()[..1]).await.unwrap();

    assert_eq!(held.len(), 3);
    assert_eq!(indexer.reader().load().len(), 1);
}

#[tokio::test]
async fn test_generation_failure_leaves_history_untouched() {
    let provider = Arc::new(FlakyProvider::new());
    let indexer = indexed(provider.clone()).await;
    let pipeline = pipeline(provider, &indexer, Arc::new(FailingClient));

    let mut session = Session::new();
    let failure = pipeline
        .ask(&mut session, QueryRequest::new("best time to visit Yala"))
        .await
        .unwrap_err();

    assert_eq!(failure.last_stage, QueryStage::Composed);
    assert!(matches!(failure.final_stage(), Some(QueryStage::Failed(_))));
    assert!(!failure.user_message().contains("API key"));
    assert!(session.is_empty());
}

#[tokio::test]
async fn test_history_grows_per_delivered_query() {
    let provider = Arc::new(FlakyProvider::new());
    let indexer = indexed(provider.clone()).await;
    let pipeline = pipeline(provider, &indexer, Arc::new(EchoClient::new()));

    let mut session = Session::new();
    pipeline
        .ask(&mut session, QueryRequest::new("best time to visit Yala"))
        .await
        .unwrap();
    let response = pipeline
        .ask(&mut session, QueryRequest::new("what about the Perahera?"))
        .await
        .unwrap();

    assert_eq!(session.len(), 4);
    // The echoed prompt carries the first exchange as history
    assert!(response.answer.text.contains("best time to visit Yala"));
}
