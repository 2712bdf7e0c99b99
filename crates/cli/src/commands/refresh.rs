//! Refresh command handler.
//!
//! Reloads the data files, rebuilds the index and records stats.

use clap::Args;
use wayfarer_core::{config::AppConfig, AppResult};

/// Reload data files and rebuild the index
#[derive(Args, Debug)]
pub struct RefreshCommand {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl RefreshCommand {
    pub async fn execute(&self, config: &AppConfig, base: &str) -> AppResult<()> {
        tracing::info!("Executing refresh command for base '{}'", base);

        let stats = wayfarer_knowledge::refresh(config, base).await?;

        if self.json {
            println!("{}", serde_json::to_string_pretty(&stats)?);
        } else {
            println!(
                "Indexed {} documents ({} skipped) in {:.2}s",
                stats.documents, stats.skipped_records, stats.duration_secs
            );
            for (category, count) in &stats.by_category {
                println!("  {:<12} {}", category.as_str(), count);
            }
        }

        Ok(())
    }
}
