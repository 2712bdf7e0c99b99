//! Per-conversation state.
//!
//! A session owns its history and is never shared; the pipeline borrows it
//! mutably for the length of one query.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use uuid::Uuid;
use wayfarer_core::{AppError, AppResult};
use wayfarer_prompt::ConversationTurn;

/// One conversation: an id and its append-only history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    id: Uuid,
    created_at: DateTime<Utc>,
    #[serde(default)]
    turns: Vec<ConversationTurn>,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            turns: Vec::new(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Full history, oldest first.
    pub fn history(&self) -> &[ConversationTurn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Append a delivered question and its answer.
    pub(crate) fn record_exchange(&mut self, question: &str, answer: &str) {
        self.turns.push(ConversationTurn::user(question));
        self.turns.push(ConversationTurn::assistant(answer));
    }

    /// Write the session as JSON.
    pub fn save(&self, path: &Path) -> AppResult<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        tracing::debug!(session = %self.id, turns = self.turns.len(), "Saved session to {:?}", path);
        Ok(())
    }

    /// Read a session written by [`Session::save`].
    pub fn load(path: &Path) -> AppResult<Self> {
        let content = fs::read_to_string(path)?;
        let session: Session = serde_json::from_str(&content).map_err(|e| {
            AppError::Serialization(format!("Invalid session file {:?}: {}", path, e))
        })?;
        tracing::debug!(session = %session.id, turns = session.turns.len(), "Loaded session from {:?}", path);
        Ok(session)
    }

    /// Load `path` if it exists, otherwise start fresh.
    pub fn load_or_new(path: &Path) -> AppResult<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::new())
        }
    }
}
