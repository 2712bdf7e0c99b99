//! Splits long documents into overlapping chunks before indexing.
//!
//! A document that fits in `chunk_size` characters passes through untouched.
//! A longer one is cut on semantic boundaries by `text-splitter`; its first
//! chunk keeps the parent's id and the rest are numbered after the highest id
//! in the load, in document order. Every chunk inherits the parent's source
//! label and category, so citations still point at the original record.

use crate::types::Document;
use serde::{Deserialize, Serialize};
use text_splitter::{ChunkConfig, TextSplitter};
use wayfarer_core::{AppError, AppResult};

/// Chunk size and overlap, in characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkSettings {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
}

fn default_chunk_size() -> usize {
    1000
}

fn default_chunk_overlap() -> usize {
    200
}

impl Default for ChunkSettings {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
        }
    }
}

impl ChunkSettings {
    pub fn validate(&self) -> AppResult<()> {
        if self.chunk_size == 0 {
            return Err(AppError::Config("chunk_size must be at least 1".to_string()));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(AppError::Config(format!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                self.chunk_overlap, self.chunk_size
            )));
        }
        Ok(())
    }

    fn splitter(&self) -> AppResult<TextSplitter<text_splitter::Characters>> {
        self.validate()?;
        let config = ChunkConfig::new(self.chunk_size)
            .with_overlap(self.chunk_overlap)
            .map_err(|e| AppError::Config(format!("Invalid chunk settings: {}", e)))?;
        Ok(TextSplitter::new(config))
    }
}

/// Split every over-long document. Output order follows input order.
pub fn chunk_documents(documents: Vec<Document>, settings: &ChunkSettings) -> AppResult<Vec<Document>> {
    let splitter = settings.splitter()?;
    let mut next_id = documents.iter().map(|d| d.id).max().unwrap_or(0) + 1;
    let mut out = Vec::with_capacity(documents.len());
    let mut split = 0usize;

    for document in documents {
        if document.text.chars().count() <= settings.chunk_size {
            out.push(document);
            continue;
        }

        let pieces: Vec<&str> = splitter
            .chunks(&document.text)
            .filter(|piece| !piece.trim().is_empty())
            .collect();
        tracing::trace!(
            document_id = document.id,
            source = %document.source_label,
            chunks = pieces.len(),
            "Splitting document"
        );
        split += 1;

        for (position, piece) in pieces.into_iter().enumerate() {
            let id = if position == 0 {
                document.id
            } else {
                let id = next_id;
                next_id += 1;
                id
            };
            out.push(Document::new(
                id,
                piece,
                document.source_label.clone(),
                document.category,
            ));
        }
    }

    if split > 0 {
        tracing::debug!(split, chunks = out.len(), "Chunked long documents");
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Category;

    fn settings(chunk_size: usize, chunk_overlap: usize) -> ChunkSettings {
        ChunkSettings {
            chunk_size,
            chunk_overlap,
        }
    }

    fn long_guide() -> String {
        (1..=120)
            .map(|i| format!("stop-{}", i))
            .collect::<Vec<_>>()
            .join(" ")
    }

    #[test]
    fn test_short_documents_untouched() {
        let docs = vec![
            Document::new(1, "Ella is a hill town", "destinations:1", Category::Destination),
            Document::new(4, "Kottu roti", "food", Category::Restaurant),
        ];
        let chunks = chunk_documents(docs.clone(), &ChunkSettings::default()).unwrap();
        assert_eq!(chunks, docs);
    }

    #[test]
    fn test_long_document_split_within_size() {
        let text = long_guide();
        let docs = vec![
            Document::new(2, text.clone(), "restaurants#Ministry of Crab", Category::Restaurant),
            Document::new(7, "Galle Fort", "destinations:3", Category::Destination),
        ];
        let chunks = chunk_documents(docs, &settings(200, 40)).unwrap();

        let pieces: Vec<&Document> = chunks
            .iter()
            .filter(|c| c.source_label == "restaurants#Ministry of Crab")
            .collect();
        assert!(pieces.len() > 1);
        for piece in &pieces {
            assert!(piece.text.chars().count() <= 200);
            assert!(text.contains(&piece.text));
            assert_eq!(piece.category, Category::Restaurant);
        }

        // First chunk keeps the parent id; the rest follow the highest id
        assert_eq!(pieces[0].id, 2);
        assert_eq!(pieces[1].id, 8);
        assert_eq!(chunks.last().map(|d| d.id), Some(7));
    }

    #[test]
    fn test_neighbouring_chunks_overlap() {
        let docs = vec![Document::new(1, long_guide(), "guide", Category::Destination)];
        let chunks = chunk_documents(docs, &settings(200, 60)).unwrap();
        assert!(chunks.len() > 1);

        let first: Vec<&str> = chunks[0].text.split_whitespace().collect();
        let second: Vec<&str> = chunks[1].text.split_whitespace().collect();
        assert!(second.iter().any(|word| first.contains(word)));
    }

    #[test]
    fn test_chunking_is_deterministic() {
        let docs = vec![Document::new(1, long_guide(), "guide", Category::Destination)];
        let first = chunk_documents(docs.clone(), &settings(150, 30)).unwrap();
        let second = chunk_documents(docs, &settings(150, 30)).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_invalid_settings() {
        assert!(matches!(settings(100, 100).validate(), Err(AppError::Config(_))));
        assert!(matches!(settings(0, 0).validate(), Err(AppError::Config(_))));
        assert!(ChunkSettings::default().validate().is_ok());
    }
}
