//! Embedding indexer.
//!
//! The indexer is the only writer of the similarity index. Every rebuild is
//! assembled off to the side and published with one atomic pointer swap, so
//! readers see either the old snapshot or the new one, never a mix. A failed
//! rebuild publishes nothing.

use crate::embeddings::EmbeddingProvider;
use crate::types::{Category, Document, RetrievalResult};
use crate::vector_index::{create_index, SimilarityIndex};
use arc_swap::ArcSwap;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use wayfarer_core::{AppError, AppResult, RetryPolicy};

const DEFAULT_BATCH_SIZE: usize = 100;

/// An immutable, published view of the indexed documents.
#[derive(Debug)]
pub struct IndexSnapshot {
    documents: BTreeMap<u64, Document>,
    vectors: Box<dyn SimilarityIndex>,
    provider: String,
    model: String,
    built_at: Option<DateTime<Utc>>,
}

impl IndexSnapshot {
    fn empty(vectors: Box<dyn SimilarityIndex>, provider: &str, model: &str) -> Self {
        Self {
            documents: BTreeMap::new(),
            vectors,
            provider: provider.to_string(),
            model: model.to_string(),
            built_at: None,
        }
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub fn dimensions(&self) -> usize {
        self.vectors.dimensions()
    }

    pub fn backend_name(&self) -> &str {
        self.vectors.backend_name()
    }

    pub fn provider(&self) -> &str {
        &self.provider
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// When this snapshot was published; `None` for the initial empty index.
    pub fn built_at(&self) -> Option<DateTime<Utc>> {
        self.built_at
    }

    pub fn document(&self, id: u64) -> Option<&Document> {
        self.documents.get(&id)
    }

    pub fn vector(&self, id: u64) -> Option<&[f32]> {
        self.vectors.vector(id)
    }

    pub fn documents(&self) -> impl Iterator<Item = &Document> {
        self.documents.values()
    }

    pub fn count_by_category(&self) -> BTreeMap<Category, usize> {
        let mut counts = BTreeMap::new();
        for doc in self.documents.values() {
            *counts.entry(doc.category).or_insert(0) += 1;
        }
        counts
    }

    /// The `k` nearest documents, best first.
    pub fn search(&self, vector: &[f32], k: usize) -> AppResult<Vec<RetrievalResult>> {
        let hits = self.vectors.query(vector, k)?;
        hits.into_iter()
            .map(|hit| -> AppResult<RetrievalResult> {
                let doc = self.documents.get(&hit.id).ok_or_else(|| {
                    AppError::InvariantViolation(format!(
                        "Index entry {} has no document",
                        hit.id
                    ))
                })?;
                Ok(RetrievalResult {
                    document_id: doc.id,
                    score: hit.score,
                    source_label: doc.source_label.clone(),
                    category: doc.category,
                    text: doc.text.clone(),
                })
            })
            .collect()
    }
}

/// Read-only handle on the published index.
#[derive(Debug, Clone)]
pub struct IndexReader {
    current: Arc<ArcSwap<IndexSnapshot>>,
}

impl IndexReader {
    /// The snapshot published right now. Holding it keeps it alive across swaps.
    pub fn load(&self) -> Arc<IndexSnapshot> {
        self.current.load_full()
    }
}

/// Outcome of an `index` call.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexReport {
    pub documents: usize,
    pub duplicates: usize,
    pub batches: usize,
    pub duration_secs: f64,
}

/// Builds and publishes the similarity index.
#[derive(Debug)]
pub struct Indexer {
    provider: Arc<dyn EmbeddingProvider>,
    policy: RetryPolicy,
    backend: String,
    batch_size: usize,
    current: Arc<ArcSwap<IndexSnapshot>>,
    write_lock: Mutex<()>,
}

impl Indexer {
    /// Create an indexer publishing an empty flat index.
    pub fn new(provider: Arc<dyn EmbeddingProvider>, policy: RetryPolicy) -> AppResult<Self> {
        Self::with_backend(provider, policy, "flat")
    }

    pub fn with_backend(
        provider: Arc<dyn EmbeddingProvider>,
        policy: RetryPolicy,
        backend: &str,
    ) -> AppResult<Self> {
        let vectors = create_index(backend, provider.dimensions())?;
        let empty = IndexSnapshot::empty(vectors, provider.provider_name(), provider.model_name());
        Ok(Self {
            provider,
            policy,
            backend: backend.to_string(),
            batch_size: DEFAULT_BATCH_SIZE,
            current: Arc::new(ArcSwap::from_pointee(empty)),
            write_lock: Mutex::new(()),
        })
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn reader(&self) -> IndexReader {
        IndexReader {
            current: Arc::clone(&self.current),
        }
    }

    pub fn snapshot(&self) -> Arc<IndexSnapshot> {
        self.current.load_full()
    }

    pub fn provider(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.provider
    }

    /// Embed `documents` and publish them as the whole index.
    ///
    /// Documents are keyed by id; a repeated id keeps its first occurrence.
    #[tracing::instrument(skip(self, documents), fields(documents = documents.len()))]
    pub async fn index(&self, documents: &[Document]) -> AppResult<IndexReport> {
        let _guard = self.write_lock.lock().await;
        let start = Instant::now();

        let mut seen = BTreeSet::new();
        let unique: Vec<&Document> = documents
            .iter()
            .filter(|doc| {
                let fresh = seen.insert(doc.id);
                if !fresh {
                    tracing::warn!(id = doc.id, label = %doc.source_label, "Duplicate document id ignored");
                }
                fresh
            })
            .collect();
        let duplicates = documents.len() - unique.len();

        let dims = self.provider.dimensions();
        let mut vectors = create_index(&self.backend, dims)?;
        let mut batches = 0;

        for chunk in unique.chunks(self.batch_size) {
            let texts: Vec<String> = chunk.iter().map(|doc| doc.text.clone()).collect();
            let provider = self.provider.as_ref();
            let batch = texts.as_slice();
            let embeddings = self
                .policy
                .run("embed_documents", move || provider.embed_batch(batch))
                .await?;

            if embeddings.len() != chunk.len() {
                return Err(AppError::embedding(format!(
                    "{} returned {} embeddings for {} documents",
                    self.provider.provider_name(),
                    embeddings.len(),
                    chunk.len()
                )));
            }

            for (doc, embedding) in chunk.iter().zip(embeddings) {
                if embedding.len() != dims {
                    return Err(AppError::InvariantViolation(format!(
                        "Dimension mismatch: document {} embedded to {} dimensions, expected {}",
                        doc.id,
                        embedding.len(),
                        dims
                    )));
                }
                vectors.insert(doc.id, embedding)?;
            }
            batches += 1;
            tracing::debug!(batch = batches, size = chunk.len(), "Embedded batch");
        }

        let snapshot = IndexSnapshot {
            documents: unique.iter().map(|doc| (doc.id, (*doc).clone())).collect(),
            vectors,
            provider: self.provider.provider_name().to_string(),
            model: self.provider.model_name().to_string(),
            built_at: Some(Utc::now()),
        };
        let count = snapshot.len();
        self.current.store(Arc::new(snapshot));

        let duration = start.elapsed();
        tracing::info!(
            documents = count,
            duplicates,
            batches,
            "Published index in {:.2}s",
            duration.as_secs_f64()
        );

        Ok(IndexReport {
            documents: count,
            duplicates,
            batches,
            duration_secs: duration.as_secs_f64(),
        })
    }

    /// Remove documents and their vectors, publishing a new snapshot.
    /// Returns how many ids were present.
    pub async fn remove(&self, ids: &[u64]) -> AppResult<usize> {
        let _guard = self.write_lock.lock().await;
        let current = self.current.load_full();

        let mut documents = current.documents.clone();
        let mut vectors = current.vectors.boxed_clone();
        let mut removed = 0;
        for id in ids {
            if documents.remove(id).is_some() {
                vectors.delete(*id);
                removed += 1;
            }
        }

        if removed > 0 {
            self.current.store(Arc::new(IndexSnapshot {
                documents,
                vectors,
                provider: current.provider.clone(),
                model: current.model.clone(),
                built_at: Some(Utc::now()),
            }));
            tracing::info!(removed, "Removed documents from index");
        }
        Ok(removed)
    }
}
