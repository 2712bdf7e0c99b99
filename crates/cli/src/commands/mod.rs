//! Command handlers for the wayfarer CLI.
//!
//! This module organizes all CLI commands into separate submodules.

pub mod ask;
pub mod chat;
pub mod refresh;
pub mod stats;

// Re-export command types for convenience
pub use ask::AskCommand;
pub use chat::ChatCommand;
pub use refresh::RefreshCommand;
pub use stats::StatsCommand;

use wayfarer_core::{config::AppConfig, AppError, AppResult};
use wayfarer_knowledge::{Category, KnowledgeBase, RagPipeline, RagResponse, CONFIDENCE_THRESHOLD};
use wayfarer_llm::create_client;

/// Open `base`, index its data files and wire up the query pipeline.
pub(crate) async fn open_pipeline(config: &AppConfig, base: &str) -> AppResult<RagPipeline> {
    config.validate()?;

    let kb = KnowledgeBase::open(config, base)?;
    let (report, index_report) = kb.build_index().await?;
    tracing::info!(
        base,
        documents = index_report.documents,
        files = report.files,
        skipped = report.skipped_records,
        "Knowledge base ready"
    );

    let client = create_client(
        &config.provider,
        config.resolve_endpoint(&config.provider).as_deref(),
        config.resolve_api_key(&config.provider).as_deref(),
    )?;
    kb.pipeline(config, client)
}

/// Parse `--category` values.
pub(crate) fn parse_categories(values: &[String]) -> AppResult<Vec<Category>> {
    values
        .iter()
        .map(|value| {
            Category::parse(value).ok_or_else(|| {
                AppError::InvalidArgument(format!(
                    "Unknown category '{}'. Expected one of: {}",
                    value,
                    Category::ALL.map(|c| c.as_str()).join(", ")
                ))
            })
        })
        .collect()
}

/// Print an answer and its cited sources to stdout.
pub(crate) fn print_answer(response: &RagResponse) {
    println!("{}", response.answer.text.trim());

    if response.low_confidence {
        println!(
            "\n(Note: the travel guide had little on this; best match scored {:.2}, below {:.2})",
            response.max_score, CONFIDENCE_THRESHOLD
        );
    }

    if !response.sources.is_empty() {
        println!("\nSources:");
        for source in &response.sources {
            println!("  - [{}] ({}) {}", source.source, source.location, source.snippet);
        }
    }
}
