//! Query-time retrieval over the published index.

use crate::embeddings::EmbeddingProvider;
use crate::indexer::{IndexReader, IndexSnapshot};
use crate::types::{Category, RetrievalResult};
use crate::vector_index::cosine_similarity;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use wayfarer_core::{AppError, AppResult, RetryPolicy};

/// Default number of results, matching the pipeline's `topK`.
pub const DEFAULT_TOP_K: usize = 5;

/// Candidate pool cap for MMR re-ranking.
const MMR_MAX_FETCH: usize = 20;

/// How the final `k` results are chosen from the ranked candidates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum RetrievalMode {
    /// Plain cosine ranking.
    #[default]
    Similarity,
    /// Maximal marginal relevance over `min(20, 3k)` candidates.
    /// `lambda` 1.0 is pure relevance, 0.0 pure diversity.
    Mmr { lambda: f32 },
}

impl RetrievalMode {
    pub fn validate(&self) -> AppResult<()> {
        match self {
            Self::Mmr { lambda } if !(0.0..=1.0).contains(lambda) => Err(AppError::InvalidArgument(
                format!("MMR lambda must be between 0 and 1, got {}", lambda),
            )),
            _ => Ok(()),
        }
    }
}

/// Post-ranking filters for retrieval.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchFilters {
    /// Only keep documents in these categories
    pub categories: Option<Vec<Category>>,

    /// Minimum cosine similarity
    pub min_score: Option<f32>,

    #[serde(default)]
    pub mode: RetrievalMode,
}

impl SearchFilters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_categories(mut self, categories: Vec<Category>) -> Self {
        self.categories = Some(categories);
        self
    }

    pub fn with_min_score(mut self, min_score: f32) -> Self {
        self.min_score = Some(min_score);
        self
    }

    pub fn with_mmr(mut self, lambda: f32) -> Self {
        self.mode = RetrievalMode::Mmr { lambda };
        self
    }

    pub fn has_filters(&self) -> bool {
        self.categories.is_some() || self.min_score.is_some()
    }

    /// Drop results that fail any filter. Order is preserved.
    pub fn apply(&self, results: Vec<RetrievalResult>) -> Vec<RetrievalResult> {
        let mut filtered = results;

        if let Some(min_score) = self.min_score {
            filtered.retain(|r| r.score >= min_score);
        }

        if let Some(categories) = &self.categories {
            filtered.retain(|r| categories.contains(&r.category));
        }

        filtered
    }
}

/// Embeds queries and searches the current index snapshot.
#[derive(Debug, Clone)]
pub struct Retriever {
    provider: Arc<dyn EmbeddingProvider>,
    reader: IndexReader,
    policy: RetryPolicy,
}

impl Retriever {
    /// `provider` must be the one the index was built with.
    pub fn new(provider: Arc<dyn EmbeddingProvider>, reader: IndexReader, policy: RetryPolicy) -> Self {
        Self {
            provider,
            reader,
            policy,
        }
    }

    /// Top-`k` documents for `query`, best first.
    pub async fn retrieve(&self, query: &str, k: usize) -> AppResult<Vec<RetrievalResult>> {
        self.retrieve_filtered(query, k, &SearchFilters::default())
            .await
    }

    pub async fn retrieve_filtered(
        &self,
        query: &str,
        k: usize,
        filters: &SearchFilters,
    ) -> AppResult<Vec<RetrievalResult>> {
        validate_k(k)?;
        filters.mode.validate()?;
        let vector = self.embed_query(query).await?;
        self.search(&vector, k, filters)
    }

    /// Embed a query through the retry policy.
    pub async fn embed_query(&self, query: &str) -> AppResult<Vec<f32>> {
        if query.trim().is_empty() {
            return Err(AppError::InvalidArgument(
                "Query cannot be empty".to_string(),
            ));
        }
        let provider = self.provider.as_ref();
        let vector = self
            .policy
            .run("embed_query", move || provider.embed(query))
            .await?;
        tracing::debug!(dims = vector.len(), "Embedded query");
        Ok(vector)
    }

    /// Search the current snapshot with an already-embedded query.
    pub fn search(
        &self,
        vector: &[f32],
        k: usize,
        filters: &SearchFilters,
    ) -> AppResult<Vec<RetrievalResult>> {
        validate_k(k)?;
        filters.mode.validate()?;
        let snapshot = self.reader.load();
        if vector.len() != snapshot.dimensions() {
            return Err(AppError::InvariantViolation(format!(
                "Dimension mismatch: query has {} dimensions, index has {}",
                vector.len(),
                snapshot.dimensions()
            )));
        }

        let wanted = match filters.mode {
            RetrievalMode::Similarity => k,
            RetrievalMode::Mmr { .. } => MMR_MAX_FETCH.min(k.saturating_mul(3)).max(k),
        };
        let candidates = if filters.has_filters() {
            let mut all = filters.apply(snapshot.search(vector, snapshot.len())?);
            all.truncate(wanted);
            all
        } else {
            snapshot.search(vector, wanted)?
        };

        let results = match filters.mode {
            RetrievalMode::Similarity => candidates,
            RetrievalMode::Mmr { lambda } => mmr_rerank(&snapshot, vector, candidates, k, lambda)?,
        };

        if let Some(top) = results.first() {
            tracing::info!(
                results = results.len(),
                top_score = top.score,
                top_source = %top.source_label,
                "Retrieved documents"
            );
        } else {
            tracing::info!(indexed = snapshot.len(), "No documents retrieved");
        }
        Ok(results)
    }
}

fn mmr_rerank(
    snapshot: &IndexSnapshot,
    query: &[f32],
    candidates: Vec<RetrievalResult>,
    k: usize,
    lambda: f32,
) -> AppResult<Vec<RetrievalResult>> {
    let vectors = candidates
        .iter()
        .map(|c| {
            snapshot.vector(c.document_id).ok_or_else(|| {
                AppError::InvariantViolation(format!(
                    "Document {} has no stored vector",
                    c.document_id
                ))
            })
        })
        .collect::<AppResult<Vec<&[f32]>>>()?;

    let order = maximal_marginal_relevance(query, &vectors, k, lambda);
    tracing::debug!(candidates = candidates.len(), selected = order.len(), lambda, "MMR re-ranked");

    let mut slots: Vec<Option<RetrievalResult>> = candidates.into_iter().map(Some).collect();
    Ok(order.into_iter().filter_map(|i| slots[i].take()).collect())
}

/// Indices of up to `k` candidates in MMR selection order.
///
/// Each step picks the candidate maximizing
/// `lambda * sim(query, c) - (1 - lambda) * max(sim(c, picked))`;
/// ties go to the earlier candidate.
pub fn maximal_marginal_relevance(
    query: &[f32],
    candidates: &[&[f32]],
    k: usize,
    lambda: f32,
) -> Vec<usize> {
    let relevance: Vec<f32> = candidates
        .iter()
        .map(|c| cosine_similarity(query, c))
        .collect();
    let mut redundancy = vec![f32::NEG_INFINITY; candidates.len()];
    let mut picked: Vec<usize> = Vec::with_capacity(k.min(candidates.len()));

    while picked.len() < k.min(candidates.len()) {
        let mut best: Option<(usize, f32)> = None;
        for i in 0..candidates.len() {
            if picked.contains(&i) {
                continue;
            }
            let penalty = if picked.is_empty() { 0.0 } else { redundancy[i] };
            let score = lambda * relevance[i] - (1.0 - lambda) * penalty;
            if best.map_or(true, |(_, s)| score > s) {
                best = Some((i, score));
            }
        }
        let Some((chosen, _)) = best else {
            break;
        };
        picked.push(chosen);
        for i in 0..candidates.len() {
            let similarity = cosine_similarity(candidates[i], candidates[chosen]);
            redundancy[i] = redundancy[i].max(similarity);
        }
    }
    picked
}

fn validate_k(k: usize) -> AppResult<()> {
    if k == 0 {
        return Err(AppError::InvalidArgument(
            "k must be at least 1".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::providers::MockProvider;
    use crate::indexer::Indexer;
    use crate::types::Document;
    use std::time::Duration;

    async fn setup() -> (Indexer, Retriever) {
        let provider: Arc<dyn EmbeddingProvider> = Arc::new(MockProvider::new(256));
        let policy = RetryPolicy::no_retry(Duration::from_secs(5));
        let indexer = Indexer::new(provider.clone(), policy).unwrap();
        indexer
            .index(&[
                Document::new(
                    1,
                    "Yala National Park is best visited Feb–Jun",
                    "wildlife-guide",
                    Category::Weather,
                ),
                Document::new(
                    2,
                    "Kottu roti is a popular street food in Colombo",
                    "food-guide",
                    Category::Restaurant,
                ),
                Document::new(
                    3,
                    "Yala safari jeeps leave at dawn from Tissamaharama",
                    "safari-operators",
                    Category::Transport,
                ),
            ])
            .await
            .unwrap();
        let retriever = Retriever::new(provider, indexer.reader(), policy);
        (indexer, retriever)
    }

    #[tokio::test]
    async fn test_results_bounded_and_ordered() {
        let (_indexer, retriever) = setup().await;
        let results = retriever.retrieve("Yala national park safari", 2).await.unwrap();

        assert_eq!(results.len(), 2);
        assert!(results[0].score >= results[1].score);
        assert!(results.iter().all(|r| r.document_id != 2));
    }

    #[tokio::test]
    async fn test_k_larger_than_index() {
        let (_indexer, retriever) = setup().await;
        let results = retriever.retrieve("Colombo", 50).await.unwrap();
        assert_eq!(results.len(), 3);
    }

    #[tokio::test]
    async fn test_zero_k_and_empty_query_rejected() {
        let (_indexer, retriever) = setup().await;
        assert!(matches!(
            retriever.retrieve("Yala", 0).await,
            Err(AppError::InvalidArgument(_))
        ));
        assert!(matches!(
            retriever.retrieve("   ", 3).await,
            Err(AppError::InvalidArgument(_))
        ));
    }

    #[tokio::test]
    async fn test_category_filter() {
        let (_indexer, retriever) = setup().await;
        let filters = SearchFilters::new().with_categories(vec![Category::Transport]);
        let results = retriever
            .retrieve_filtered("Yala", 5, &filters)
            .await
            .unwrap();

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].source_label, "safari-operators");
    }

    #[tokio::test]
    async fn test_min_score_filter() {
        let (_indexer, retriever) = setup().await;
        let filters = SearchFilters::new().with_min_score(1.1);
        let results = retriever
            .retrieve_filtered("Yala", 5, &filters)
            .await
            .unwrap();
        assert!(results.is_empty());
    }

    #[test]
    fn test_mmr_prefers_diverse_candidate() {
        let query = [1.0, 0.0];
        let near_duplicate_a = [1.0, 0.0];
        let near_duplicate_b = [0.99, 0.01];
        let different = [0.6, 0.8];
        let candidates: Vec<&[f32]> = vec![&near_duplicate_a[..], &near_duplicate_b[..], &different[..]];

        assert_eq!(maximal_marginal_relevance(&query, &candidates, 2, 0.3), vec![0, 2]);
        assert_eq!(maximal_marginal_relevance(&query, &candidates, 2, 1.0), vec![0, 1]);
        assert_eq!(maximal_marginal_relevance(&query, &candidates, 10, 0.5).len(), 3);
        assert!(maximal_marginal_relevance(&query, &[], 3, 0.5).is_empty());
    }

    #[tokio::test]
    async fn test_mmr_mode_keeps_top_hit_and_k() {
        let (_indexer, retriever) = setup().await;
        let plain = retriever.retrieve("Yala national park safari", 2).await.unwrap();
        let filters = SearchFilters::new().with_mmr(0.5);
        let diverse = retriever
            .retrieve_filtered("Yala national park safari", 2, &filters)
            .await
            .unwrap();

        assert_eq!(diverse.len(), 2);
        assert_eq!(diverse[0].document_id, plain[0].document_id);
        assert_ne!(diverse[0].document_id, diverse[1].document_id);
    }

    #[tokio::test]
    async fn test_mmr_lambda_out_of_range() {
        let (_indexer, retriever) = setup().await;
        let filters = SearchFilters::new().with_mmr(1.5);
        assert!(matches!(
            retriever.retrieve_filtered("Yala", 2, &filters).await,
            Err(AppError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_similarity_is_default_mode() {
        let filters: SearchFilters = serde_json::from_str("{}").unwrap();
        assert_eq!(filters.mode, RetrievalMode::Similarity);
    }

    #[tokio::test]
    async fn test_dimension_mismatch() {
        let (_indexer, retriever) = setup().await;
        let result = retriever.search(&[1.0, 0.0], 3, &SearchFilters::default());
        assert!(matches!(result, Err(AppError::InvariantViolation(_))));
    }
}
