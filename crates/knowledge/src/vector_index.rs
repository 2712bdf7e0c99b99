//! Similarity index abstraction.
//!
//! The indexer writes vectors into a [`SimilarityIndex`]; the retriever only
//! ever queries a published snapshot of one.

use std::collections::BTreeMap;
use wayfarer_core::{AppError, AppResult};

/// A document id with its similarity to the query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoredId {
    pub id: u64,
    pub score: f32,
}

/// Trait for similarity index backends.
///
/// Query results are ordered by descending score, ties by ascending id.
pub trait SimilarityIndex: Send + Sync + std::fmt::Debug {
    fn backend_name(&self) -> &str;

    /// Vector length every entry must have.
    fn dimensions(&self) -> usize;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Insert or replace the vector for `id`.
    fn insert(&mut self, id: u64, vector: Vec<f32>) -> AppResult<()>;

    /// The stored vector for `id`.
    fn vector(&self, id: u64) -> Option<&[f32]>;

    /// Remove `id`, returning whether it was present.
    fn delete(&mut self, id: u64) -> bool;

    /// The `k` nearest entries to `vector`.
    fn query(&self, vector: &[f32], k: usize) -> AppResult<Vec<ScoredId>>;

    /// Copy the index, for copy-on-write updates.
    fn boxed_clone(&self) -> Box<dyn SimilarityIndex>;
}

/// Exact cosine search over every stored vector.
#[derive(Debug, Clone)]
pub struct FlatIndex {
    dimensions: usize,
    entries: BTreeMap<u64, (Vec<f32>, f32)>,
}

impl FlatIndex {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions,
            entries: BTreeMap::new(),
        }
    }

    fn check(&self, len: usize) -> AppResult<()> {
        if len != self.dimensions {
            return Err(AppError::InvariantViolation(format!(
                "Dimension mismatch: vector has {} dimensions, index expects {}",
                len, self.dimensions
            )));
        }
        Ok(())
    }
}

impl SimilarityIndex for FlatIndex {
    fn backend_name(&self) -> &str {
        "flat"
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn insert(&mut self, id: u64, vector: Vec<f32>) -> AppResult<()> {
        self.check(vector.len())?;
        let norm = norm(&vector);
        self.entries.insert(id, (vector, norm));
        Ok(())
    }

    fn vector(&self, id: u64) -> Option<&[f32]> {
        self.entries.get(&id).map(|(vector, _)| vector.as_slice())
    }

    fn delete(&mut self, id: u64) -> bool {
        self.entries.remove(&id).is_some()
    }

    fn query(&self, vector: &[f32], k: usize) -> AppResult<Vec<ScoredId>> {
        self.check(vector.len())?;
        let query_norm = norm(vector);

        let mut results: Vec<ScoredId> = self
            .entries
            .iter()
            .map(|(&id, (stored, stored_norm))| ScoredId {
                id,
                score: if query_norm == 0.0 || *stored_norm == 0.0 {
                    0.0
                } else {
                    dot(vector, stored) / (query_norm * stored_norm)
                },
            })
            .collect();

        rank(&mut results);
        results.truncate(k);
        Ok(results)
    }

    fn boxed_clone(&self) -> Box<dyn SimilarityIndex> {
        Box::new(self.clone())
    }
}

/// Sort by descending score, then ascending id.
pub fn rank(results: &mut [ScoredId]) {
    results.sort_by(|a, b| b.score.total_cmp(&a.score).then(a.id.cmp(&b.id)));
}

/// Create an empty index for the named backend.
pub fn create_index(backend: &str, dimensions: usize) -> AppResult<Box<dyn SimilarityIndex>> {
    match backend {
        "flat" => Ok(Box::new(FlatIndex::new(dimensions))),
        other => Err(AppError::Config(format!(
            "Unknown index backend: '{}'. Supported backends: flat",
            other
        ))),
    }
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

fn norm(v: &[f32]) -> f32 {
    dot(v, v).sqrt()
}

/// Cosine similarity; 0.0 when either vector is zero or lengths differ.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }
    let (na, nb) = (norm(a), norm(b));
    if na == 0.0 || nb == 0.0 {
        return 0.0;
    }
    dot(a, b) / (na * nb)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_similarity() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert!((cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]) + 1.0).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
    }

    #[test]
    fn test_query_orders_by_score_then_id() {
        let mut index = FlatIndex::new(2);
        index.insert(3, vec![1.0, 0.0]).unwrap();
        index.insert(1, vec![0.0, 1.0]).unwrap();
        index.insert(2, vec![2.0, 0.0]).unwrap();

        let hits = index.query(&[1.0, 0.0], 10).unwrap();
        let ids: Vec<u64> = hits.iter().map(|h| h.id).collect();
        // 2 and 3 tie on cosine, lower id first
        assert_eq!(ids, vec![2, 3, 1]);
    }

    #[test]
    fn test_query_truncates_to_k() {
        let mut index = FlatIndex::new(1);
        for id in 1..=5 {
            index.insert(id, vec![id as f32]).unwrap();
        }
        assert_eq!(index.query(&[1.0], 2).unwrap().len(), 2);
        assert!(index.query(&[1.0], 0).unwrap().is_empty());
    }

    #[test]
    fn test_dimension_mismatch() {
        let mut index = FlatIndex::new(3);
        assert!(matches!(
            index.insert(1, vec![1.0]),
            Err(AppError::InvariantViolation(_))
        ));
        assert!(matches!(
            index.query(&[1.0, 2.0], 1),
            Err(AppError::InvariantViolation(_))
        ));
    }

    #[test]
    fn test_insert_replaces_and_delete() {
        let mut index = FlatIndex::new(2);
        index.insert(7, vec![1.0, 0.0]).unwrap();
        index.insert(7, vec![0.0, 1.0]).unwrap();
        assert_eq!(index.len(), 1);
        assert_eq!(index.vector(7), Some(&[0.0, 1.0][..]));

        let copy = index.boxed_clone();
        assert!(index.delete(7));
        assert!(!index.delete(7));
        assert!(index.is_empty());
        assert_eq!(copy.len(), 1);
    }

    #[test]
    fn test_create_index() {
        assert_eq!(create_index("flat", 4).unwrap().backend_name(), "flat");
        assert!(matches!(create_index("hnsw", 4), Err(AppError::Config(_))));
    }
}
