//! Knowledge system type definitions.

use crate::chunker::ChunkSettings;
use crate::embeddings::EmbeddingConfig;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::PathBuf;
use wayfarer_prompt::ContextDocument;

/// Topic a travel document belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Destination,
    Hotel,
    Restaurant,
    Culture,
    Transport,
    Weather,
}

impl Category {
    pub const ALL: [Category; 6] = [
        Category::Destination,
        Category::Hotel,
        Category::Restaurant,
        Category::Culture,
        Category::Transport,
        Category::Weather,
    ];

    /// Parse a category name, accepting common plural and variant spellings.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "destination" | "destinations" | "attraction" | "attractions" | "place" | "places"
            | "activity" | "activities" | "package" | "packages" | "tour" | "tours" => {
                Some(Self::Destination)
            }
            "hotel" | "hotels" | "accommodation" | "accommodations" | "stay" => Some(Self::Hotel),
            "restaurant" | "restaurants" | "food" | "dining" => Some(Self::Restaurant),
            "culture" | "cultural" | "festival" | "festivals" | "heritage" => Some(Self::Culture),
            "transport" | "transportation" | "trains" | "buses" => Some(Self::Transport),
            "weather" | "climate" | "season" | "seasons" => Some(Self::Weather),
            _ => None,
        }
    }

    /// Infer a category from a data file stem such as `srilanka_hotels`
    /// or `cultural-info`: the first token that names a category wins.
    pub fn from_file_stem(stem: &str) -> Option<Self> {
        stem.split(|c: char| !c.is_alphanumeric())
            .filter(|token| !token.is_empty())
            .find_map(Self::parse)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Destination => "destination",
            Self::Hotel => "hotel",
            Self::Restaurant => "restaurant",
            Self::Culture => "culture",
            Self::Transport => "transport",
            Self::Weather => "weather",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A normalized travel document. Immutable once indexed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub id: u64,
    pub text: String,
    pub source_label: String,
    pub category: Category,
}

impl Document {
    pub fn new(
        id: u64,
        text: impl Into<String>,
        source_label: impl Into<String>,
        category: Category,
    ) -> Self {
        Self {
            id,
            text: text.into(),
            source_label: source_label.into(),
            category,
        }
    }
}

/// One ranked hit from the retriever.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalResult {
    pub document_id: u64,
    pub score: f32,
    pub source_label: String,
    pub category: Category,
    pub text: String,
}

impl RetrievalResult {
    pub fn to_context(&self) -> ContextDocument {
        ContextDocument {
            document_id: self.document_id,
            source_label: self.source_label.clone(),
            text: self.text.clone(),
            score: self.score,
        }
    }
}

/// A generated answer and the source labels it drew on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Answer {
    pub text: String,
    pub cited_sources: BTreeSet<String>,
}

/// Configuration for a knowledge base.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeBaseConfig {
    /// Name of the knowledge base
    pub name: String,

    /// Directory scanned for data files, relative to the workspace
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Explicit data files; when set, only these are loaded and each must exist
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<PathBuf>,

    /// Embedding provider settings
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    /// Splitting of long documents before embedding
    #[serde(default)]
    pub chunking: ChunkSettings,

    /// Days a cached embedding stays valid
    #[serde(default = "default_cache_expiry_days")]
    pub cache_expiry_days: u32,

    /// Similarity index backend
    #[serde(default = "default_index_backend")]
    pub index_backend: String,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

fn default_cache_expiry_days() -> u32 {
    7
}

fn default_index_backend() -> String {
    "flat".to_string()
}

impl Default for KnowledgeBaseConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            data_dir: default_data_dir(),
            sources: Vec::new(),
            embedding: EmbeddingConfig::default(),
            chunking: ChunkSettings::default(),
            cache_expiry_days: default_cache_expiry_days(),
            index_backend: default_index_backend(),
        }
    }
}

/// Statistics written after each refresh.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BaseStats {
    pub name: String,
    pub documents: usize,
    pub by_category: BTreeMap<Category, usize>,
    pub skipped_records: usize,
    pub embedding_provider: String,
    pub embedding_model: String,
    pub dimensions: usize,
    pub cache_entries: usize,
    pub refreshed_at: Option<DateTime<Utc>>,
    pub duration_secs: f64,
}
