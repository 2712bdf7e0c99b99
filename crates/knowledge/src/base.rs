//! A knowledge base opened from its on-disk configuration.

use crate::chunker;
use crate::config;
use crate::embeddings::{create_provider, CachedProvider, EmbeddingCache, EmbeddingProvider};
use crate::indexer::{IndexReader, IndexReport, Indexer};
use crate::loader::{self, LoadReport};
use crate::rag::{AnswerGenerator, RagPipeline};
use crate::retriever::Retriever;
use crate::types::{BaseStats, KnowledgeBaseConfig};
use chrono::Utc;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use wayfarer_core::{AppConfig, AppError, AppResult, RetryPolicy};
use wayfarer_llm::LlmClient;
use wayfarer_prompt::{load_prompt_or_default, ComposerSettings, ContextComposer};

/// Loader, cached embedding provider and indexer for one base.
#[derive(Debug)]
pub struct KnowledgeBase {
    workspace: PathBuf,
    config: KnowledgeBaseConfig,
    cache: Arc<EmbeddingCache>,
    provider: Arc<dyn EmbeddingProvider>,
    indexer: Indexer,
    policy: RetryPolicy,
}

impl KnowledgeBase {
    /// Open `base_name` in the configured workspace. The index starts empty
    /// until [`KnowledgeBase::refresh`] runs.
    pub fn open(app: &AppConfig, base_name: &str) -> AppResult<Self> {
        let workspace = app.workspace.clone();
        let config = config::load_config(&workspace, base_name)?;

        // Fall back to the workspace's provider settings for endpoint and key
        let mut embedding = config.embedding.clone();
        if embedding.endpoint.is_none() {
            embedding.endpoint = app.resolve_endpoint(&embedding.provider);
        }
        let api_key = if embedding.api_key_env.is_some() {
            None
        } else {
            app.resolve_api_key(&embedding.provider)
        };

        let inner = create_provider(&embedding, api_key.as_deref())?;
        let cache = Arc::new(EmbeddingCache::open(
            &config::get_cache_path(&workspace, base_name),
            config.cache_expiry_days,
        )?);
        let provider: Arc<dyn EmbeddingProvider> =
            Arc::new(CachedProvider::new(inner, Arc::clone(&cache)));

        let policy = RetryPolicy::from_settings(&app.pipeline);
        let indexer = Indexer::with_backend(Arc::clone(&provider), policy, &config.index_backend)?
            .with_batch_size(config.embedding.batch_size);

        tracing::debug!(
            base = base_name,
            provider = provider.provider_name(),
            model = provider.model_name(),
            dimensions = provider.dimensions(),
            "Opened knowledge base"
        );

        Ok(Self {
            workspace,
            config,
            cache,
            provider,
            indexer,
            policy,
        })
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn config(&self) -> &KnowledgeBaseConfig {
        &self.config
    }

    pub fn workspace(&self) -> &Path {
        &self.workspace
    }

    pub fn indexer(&self) -> &Indexer {
        &self.indexer
    }

    pub fn reader(&self) -> IndexReader {
        self.indexer.reader()
    }

    /// Load documents from the configured sources.
    pub fn load(&self) -> AppResult<LoadReport> {
        if self.config.sources.is_empty() {
            loader::load_documents(&config::resolve_data_dir(&self.workspace, &self.config))
        } else {
            let paths: Vec<PathBuf> = self
                .config
                .sources
                .iter()
                .map(|p| {
                    if p.is_absolute() {
                        p.clone()
                    } else {
                        self.workspace.join(p)
                    }
                })
                .collect();
            loader::load_files(&paths)
        }
    }

    /// Load documents, split the long ones, and publish them as the index.
    ///
    /// Unchanged documents are served from the embedding cache.
    pub async fn build_index(&self) -> AppResult<(LoadReport, IndexReport)> {
        let mut report = self.load()?;
        report.documents =
            chunker::chunk_documents(std::mem::take(&mut report.documents), &self.config.chunking)?;
        if report.documents.is_empty() {
            tracing::warn!(base = %self.config.name, "No documents found to index");
        }
        let index_report = self.indexer.index(&report.documents).await?;
        Ok((report, index_report))
    }

    /// Purge expired embeddings, rebuild the index, and write config and stats.
    pub async fn refresh(&self) -> AppResult<BaseStats> {
        let start = Instant::now();
        tracing::info!(base = %self.config.name, "Refreshing knowledge base");

        if let Err(e) = self.cache.purge_expired() {
            tracing::warn!(error = %e, "Could not purge expired embeddings");
        }

        let (report, index_report) = self.build_index().await?;
        let stats = self.build_stats(
            report.skipped_records + index_report.duplicates,
            start.elapsed().as_secs_f64(),
        )?;

        config::save_config(&self.workspace, &self.config)?;
        config::save_stats(&self.workspace, &stats)?;

        tracing::info!(
            base = %self.config.name,
            documents = stats.documents,
            skipped = stats.skipped_records,
            "Refresh completed in {:.2}s",
            stats.duration_secs
        );
        Ok(stats)
    }

    fn build_stats(&self, skipped_records: usize, duration_secs: f64) -> AppResult<BaseStats> {
        let snapshot = self.indexer.snapshot();
        Ok(BaseStats {
            name: self.config.name.clone(),
            documents: snapshot.len(),
            by_category: snapshot.count_by_category(),
            skipped_records,
            embedding_provider: self.provider.provider_name().to_string(),
            embedding_model: self.provider.model_name().to_string(),
            dimensions: snapshot.dimensions(),
            cache_entries: self.cache.len()?,
            refreshed_at: snapshot.built_at().or_else(|| Some(Utc::now())),
            duration_secs,
        })
    }

    pub fn retriever(&self) -> Retriever {
        Retriever::new(Arc::clone(&self.provider), self.reader(), self.policy)
    }

    /// Build the query pipeline, reading the prompt definition from the workspace.
    pub fn pipeline(&self, app: &AppConfig, client: Arc<dyn LlmClient>) -> AppResult<RagPipeline> {
        let definition = load_prompt_or_default(&self.workspace, &app.pipeline.prompt_id)?;
        let composer = ContextComposer::new(definition, ComposerSettings::from(&app.pipeline))?;
        let generator = AnswerGenerator::from_settings(client, app.model.clone(), &app.pipeline);
        Ok(RagPipeline::new(self.retriever(), composer, generator).with_settings(&app.pipeline))
    }
}

/// Open a base, rebuild its index and return the resulting stats.
pub async fn refresh(app: &AppConfig, base_name: &str) -> AppResult<BaseStats> {
    KnowledgeBase::open(app, base_name)?.refresh().await
}

/// Stats written by the last refresh of a base.
pub fn stats(workspace: &Path, base_name: &str) -> AppResult<BaseStats> {
    config::load_stats(workspace, base_name)?.ok_or_else(|| {
        AppError::Load(format!(
            "Knowledge base '{}' has not been refreshed yet. Run 'wayfarer refresh' first.",
            base_name
        ))
    })
}
