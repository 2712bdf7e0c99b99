//! Chat command handler.
//!
//! Reads questions from stdin, one per line, and answers each within a
//! single session so follow-up questions see the conversation so far.

use super::{open_pipeline, print_answer};
use clap::Args;
use std::io::Write;
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, BufReader};
use wayfarer_core::{config::AppConfig, AppResult};
use wayfarer_knowledge::{QueryRequest, Session};

/// Interactive conversation with history
#[derive(Args, Debug)]
pub struct ChatCommand {
    /// Load the session from this file and save it after every answer
    #[arg(long)]
    pub session: Option<PathBuf>,

    /// Number of documents to retrieve per question
    #[arg(short = 'k', long)]
    pub top_k: Option<usize>,
}

impl ChatCommand {
    pub async fn execute(&self, config: &AppConfig, base: &str) -> AppResult<()> {
        tracing::info!("Executing chat command");

        let pipeline = open_pipeline(config, base).await?;
        let mut session = match &self.session {
            Some(path) => Session::load_or_new(path)?,
            None => Session::new(),
        };
        tracing::info!(session = %session.id(), turns = session.len(), "Chat session started");

        println!("Ask about travelling in Sri Lanka. Type 'exit' or press Ctrl-D to leave.");
        let mut lines = BufReader::new(tokio::io::stdin()).lines();

        loop {
            print!("\n> ");
            std::io::stdout().flush().ok();

            let Some(line) = lines.next_line().await? else {
                break;
            };
            let question = line.trim();
            if question.is_empty() {
                continue;
            }
            if matches!(question, "exit" | "quit") {
                break;
            }

            let mut request = QueryRequest::new(question);
            if let Some(k) = self.top_k {
                request = request.with_top_k(k);
            }

            match pipeline.ask(&mut session, request).await {
                Ok(response) => {
                    println!();
                    print_answer(&response);
                    if let Some(path) = &self.session {
                        session.save(path)?;
                    }
                }
                // A failed query leaves the session as it was; keep chatting
                Err(failure) => eprintln!("{}", failure.user_message()),
            }
        }

        tracing::info!(session = %session.id(), turns = session.len(), "Chat session ended");
        Ok(())
    }
}
