//! Ask command handler.
//!
//! Answers one question against the knowledge base.

use super::{open_pipeline, parse_categories, print_answer};
use clap::Args;
use std::path::PathBuf;
use wayfarer_core::{config::AppConfig, AppError, AppResult};
use wayfarer_knowledge::{QueryRequest, SearchFilters, Session};
use wayfarer_llm::ImagePayload;

/// Ask a single travel question
#[derive(Args, Debug)]
pub struct AskCommand {
    /// The question to ask
    pub question: Option<String>,

    /// Read the question from a file
    #[arg(short, long, conflicts_with = "question")]
    pub file: Option<PathBuf>,

    /// Attach a photo (jpg, png, webp, gif, heic)
    #[arg(long)]
    pub image: Option<PathBuf>,

    /// Number of documents to retrieve
    #[arg(short = 'k', long)]
    pub top_k: Option<usize>,

    /// Only search these categories (repeatable)
    #[arg(long = "category")]
    pub categories: Vec<String>,

    /// Drop documents scoring below this similarity
    #[arg(long)]
    pub min_score: Option<f32>,

    /// Re-rank for diversity with maximal marginal relevance (lambda 0..1, default 0.5)
    #[arg(long, value_name = "LAMBDA", num_args = 0..=1, default_missing_value = "0.5")]
    pub mmr: Option<f32>,

    /// Continue the conversation stored in this session file
    #[arg(long)]
    pub session: Option<PathBuf>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl AskCommand {
    /// Execute the ask command.
    pub async fn execute(&self, config: &AppConfig, base: &str) -> AppResult<()> {
        tracing::info!("Executing ask command");
        tracing::debug!("Ask command options: {:?}", self);

        let question = self.get_question()?;
        let request = self.build_request(question)?;

        let pipeline = open_pipeline(config, base).await?;
        let mut session = match &self.session {
            Some(path) => Session::load_or_new(path)?,
            None => Session::new(),
        };

        let response = match pipeline.ask(&mut session, request).await {
            Ok(response) => response,
            Err(failure) => {
                eprintln!("{}", failure.user_message());
                return Err(failure.error);
            }
        };

        if let Some(path) = &self.session {
            session.save(path)?;
        }

        if self.json {
            let output = serde_json::json!({
                "answer": response.answer.text,
                "citedSources": response.answer.cited_sources,
                "sources": response.sources,
                "maxScore": response.max_score,
                "lowConfidence": response.low_confidence,
                "stages": response.stages,
                "provider": config.provider,
                "model": config.model,
                "session": session.id(),
                "usage": {
                    "promptTokens": response.usage.prompt_tokens,
                    "completionTokens": response.usage.completion_tokens,
                    "totalTokens": response.usage.total_tokens
                }
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        } else {
            print_answer(&response);

            if tracing::enabled!(tracing::Level::DEBUG) {
                tracing::debug!(
                    "Token usage - Prompt: {}, Completion: {}, Total: {}",
                    response.usage.prompt_tokens,
                    response.usage.completion_tokens,
                    response.usage.total_tokens
                );
            }
        }

        Ok(())
    }

    fn build_request(&self, question: String) -> AppResult<QueryRequest> {
        let mut filters = SearchFilters::new();
        if !self.categories.is_empty() {
            filters = filters.with_categories(parse_categories(&self.categories)?);
        }
        filters.min_score = self.min_score;
        if let Some(lambda) = self.mmr {
            filters = filters.with_mmr(lambda);
        }

        let mut request = QueryRequest::new(question).with_filters(filters);
        if let Some(k) = self.top_k {
            request = request.with_top_k(k);
        }
        if let Some(path) = &self.image {
            request = request.with_image(ImagePayload::from_file(path)?);
        }
        Ok(request)
    }

    /// Get the question text from the argument or a file.
    fn get_question(&self) -> AppResult<String> {
        let question = match (&self.question, &self.file) {
            (Some(q), _) => q.clone(),
            (None, Some(path)) => std::fs::read_to_string(path)?,
            (None, None) => {
                return Err(AppError::InvalidArgument("No question provided".to_string()))
            }
        };
        if question.trim().is_empty() {
            return Err(AppError::InvalidArgument("Question is empty".to_string()));
        }
        Ok(question)
    }
}
