//! SQLite-backed embedding cache.
//!
//! Vectors are keyed by a SHA-256 of provider, model, dimensions and text, so
//! switching models never serves a stale vector. Entries older than the
//! configured expiry are treated as misses and purged on refresh.

use crate::embeddings::EmbeddingProvider;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use sha2::{Digest, Sha256};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use wayfarer_core::{AppError, AppResult};

const SECONDS_PER_DAY: i64 = 86_400;

fn cache_error(context: &str, e: rusqlite::Error) -> AppError {
    AppError::Cache(format!("{}: {}", context, e))
}

/// Persistent map from (provider, model, dimensions, text) to vector.
#[derive(Debug)]
pub struct EmbeddingCache {
    conn: Mutex<Connection>,
    expiry_secs: i64,
}

impl EmbeddingCache {
    /// Open (or create) the cache database at `path`.
    pub fn open(path: &Path, expiry_days: u32) -> AppResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path).map_err(|e| cache_error("Failed to open cache", e))?;
        tracing::debug!("Opened embedding cache at {:?}", path);
        Self::init(conn, expiry_days)
    }

    pub fn open_in_memory(expiry_days: u32) -> AppResult<Self> {
        let conn =
            Connection::open_in_memory().map_err(|e| cache_error("Failed to open cache", e))?;
        Self::init(conn, expiry_days)
    }

    fn init(conn: Connection, expiry_days: u32) -> AppResult<Self> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS embeddings (
                key TEXT PRIMARY KEY,
                provider TEXT NOT NULL,
                model TEXT NOT NULL,
                dims INTEGER NOT NULL,
                vector BLOB NOT NULL,
                created_at INTEGER NOT NULL
            );
            "#,
        )
        .map_err(|e| cache_error("Failed to create cache table", e))?;

        Ok(Self {
            conn: Mutex::new(conn),
            expiry_secs: i64::from(expiry_days) * SECONDS_PER_DAY,
        })
    }

    fn lock(&self) -> AppResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| AppError::Cache("Cache connection lock poisoned".to_string()))
    }

    /// Cache key for a text under a given provider and model.
    pub fn key(provider: &str, model: &str, dims: usize, text: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(provider.as_bytes());
        hasher.update([0u8]);
        hasher.update(model.as_bytes());
        hasher.update([0u8]);
        hasher.update(dims.to_le_bytes());
        hasher.update([0u8]);
        hasher.update(text.as_bytes());
        hasher
            .finalize()
            .iter()
            .map(|b| format!("{:02x}", b))
            .collect()
    }

    /// Look up a vector; expired entries and wrong-length blobs are misses.
    pub fn get(&self, key: &str, dims: usize) -> AppResult<Option<Vec<f32>>> {
        let cutoff = Utc::now().timestamp() - self.expiry_secs;
        let conn = self.lock()?;
        let blob: Option<Vec<u8>> = conn
            .query_row(
                "SELECT vector FROM embeddings WHERE key = ?1 AND created_at >= ?2",
                params![key, cutoff],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| cache_error("Failed to read cache", e))?;

        Ok(blob
            .map(|bytes| bytes_to_vector(&bytes))
            .filter(|v| v.len() == dims))
    }

    pub fn put(&self, key: &str, provider: &str, model: &str, vector: &[f32]) -> AppResult<()> {
        self.put_at(key, provider, model, vector, Utc::now().timestamp())
    }

    fn put_at(
        &self,
        key: &str,
        provider: &str,
        model: &str,
        vector: &[f32],
        created_at: i64,
    ) -> AppResult<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT OR REPLACE INTO embeddings (key, provider, model, dims, vector, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                key,
                provider,
                model,
                vector.len() as i64,
                vector_to_bytes(vector),
                created_at,
            ],
        )
        .map_err(|e| cache_error("Failed to write cache", e))?;
        Ok(())
    }

    /// Delete expired entries, returning how many were removed.
    pub fn purge_expired(&self) -> AppResult<usize> {
        let cutoff = Utc::now().timestamp() - self.expiry_secs;
        let conn = self.lock()?;
        let removed = conn
            .execute(
                "DELETE FROM embeddings WHERE created_at < ?1",
                params![cutoff],
            )
            .map_err(|e| cache_error("Failed to purge cache", e))?;
        if removed > 0 {
            tracing::info!(removed, "Purged expired embeddings");
        }
        Ok(removed)
    }

    pub fn len(&self) -> AppResult<usize> {
        let conn = self.lock()?;
        conn.query_row("SELECT COUNT(*) FROM embeddings", [], |row| {
            row.get::<_, i64>(0).map(|v| v as usize)
        })
        .map_err(|e| cache_error("Failed to count cache entries", e))
    }

    pub fn is_empty(&self) -> AppResult<bool> {
        Ok(self.len()? == 0)
    }
}

fn vector_to_bytes(vector: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vector.len() * 4);
    for &value in vector {
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    bytes
}

fn bytes_to_vector(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

/// Provider wrapper that serves repeated texts from an [`EmbeddingCache`].
///
/// Cache failures are logged and treated as misses; they never fail an embed.
#[derive(Debug)]
pub struct CachedProvider {
    inner: Arc<dyn EmbeddingProvider>,
    cache: Arc<EmbeddingCache>,
}

impl CachedProvider {
    pub fn new(inner: Arc<dyn EmbeddingProvider>, cache: Arc<EmbeddingCache>) -> Self {
        Self { inner, cache }
    }

    pub fn cache(&self) -> &Arc<EmbeddingCache> {
        &self.cache
    }

    fn key_for(&self, text: &str) -> String {
        EmbeddingCache::key(
            self.inner.provider_name(),
            self.inner.model_name(),
            self.inner.dimensions(),
            text,
        )
    }
}

#[async_trait::async_trait]
impl EmbeddingProvider for CachedProvider {
    fn provider_name(&self) -> &str {
        self.inner.provider_name()
    }

    fn model_name(&self) -> &str {
        self.inner.model_name()
    }

    fn dimensions(&self) -> usize {
        self.inner.dimensions()
    }

    async fn embed_batch(&self, texts: &[String]) -> AppResult<Vec<Vec<f32>>> {
        let dims = self.inner.dimensions();
        let keys: Vec<String> = texts.iter().map(|t| self.key_for(t)).collect();

        let mut results: Vec<Option<Vec<f32>>> = Vec::with_capacity(texts.len());
        let mut misses: Vec<usize> = Vec::new();
        for (i, key) in keys.iter().enumerate() {
            let hit = match self.cache.get(key, dims) {
                Ok(hit) => hit,
                Err(e) => {
                    tracing::warn!(error = %e, "Embedding cache read failed");
                    None
                }
            };
            if hit.is_none() {
                misses.push(i);
            }
            results.push(hit);
        }

        tracing::debug!(
            hits = texts.len() - misses.len(),
            misses = misses.len(),
            "Embedding cache lookup"
        );

        if !misses.is_empty() {
            let pending: Vec<String> = misses.iter().map(|&i| texts[i].clone()).collect();
            let fresh = self.inner.embed_batch(&pending).await?;
            if fresh.len() != pending.len() {
                return Err(AppError::embedding(format!(
                    "{} returned {} embeddings for {} texts",
                    self.inner.provider_name(),
                    fresh.len(),
                    pending.len()
                )));
            }

            for (&i, vector) in misses.iter().zip(fresh) {
                if let Err(e) = self.cache.put(
                    &keys[i],
                    self.inner.provider_name(),
                    self.inner.model_name(),
                    &vector,
                ) {
                    tracing::warn!(error = %e, "Embedding cache write failed");
                }
                results[i] = Some(vector);
            }
        }

        results
            .into_iter()
            .map(|v| v.ok_or_else(|| AppError::embedding("Missing embedding for cached batch")))
            .collect()
    }
}
