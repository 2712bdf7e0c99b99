//! Stats command handler.
//!
//! Shows what the last refresh of a knowledge base recorded.

use clap::Args;
use wayfarer_core::{config::AppConfig, AppResult};

/// Show knowledge base statistics
#[derive(Args, Debug)]
pub struct StatsCommand {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl StatsCommand {
    pub fn execute(&self, config: &AppConfig, base: &str) -> AppResult<()> {
        tracing::info!("Executing stats command");

        let stats = wayfarer_knowledge::stats(&config.workspace, base)?;

        if self.json {
            println!("{}", serde_json::to_string_pretty(&stats)?);
            return Ok(());
        }

        println!("Knowledge base: {}", stats.name);
        println!("Documents:      {}", stats.documents);
        println!("Skipped:        {}", stats.skipped_records);
        println!(
            "Embeddings:     {} / {} ({} dims, {} cached)",
            stats.embedding_provider, stats.embedding_model, stats.dimensions, stats.cache_entries
        );
        if let Some(refreshed_at) = stats.refreshed_at {
            println!(
                "Refreshed:      {} ({:.2}s)",
                refreshed_at.format("%Y-%m-%d %H:%M:%S UTC"),
                stats.duration_secs
            );
        }
        if !stats.by_category.is_empty() {
            println!("By category:");
            for (category, count) in &stats.by_category {
                println!("  {:<12} {}", category.as_str(), count);
            }
        }

        Ok(())
    }
}
