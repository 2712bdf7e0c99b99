//! Context Composer: merges retrieved documents, recent history and the
//! question into one grounded prompt that never exceeds a character budget.
//!
//! Over budget, documents go first (lowest score first, higher id first among
//! equal scores), then history turns (oldest first). The question is never
//! touched; if the preamble and question alone do not fit, composition fails.

use crate::types::{ComposedPrompt, ContextDocument, ConversationTurn, PromptDefinition};
use handlebars::Handlebars;
use serde::Serialize;
use std::cmp::Ordering;
use wayfarer_core::{AppError, AppResult, PipelineSettings};

const TEMPLATE_NAME: &str = "prompt";
const QUESTION_SENTINEL: &str = "wayfarer-question-sentinel";

/// Limits applied while composing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ComposerSettings {
    /// Hard cap on the rendered prompt, in characters
    pub max_prompt_chars: usize,
    /// History turns offered before budget trimming
    pub max_history_turns: usize,
}

impl Default for ComposerSettings {
    fn default() -> Self {
        Self {
            max_prompt_chars: 16_000,
            max_history_turns: 10,
        }
    }
}

impl From<&PipelineSettings> for ComposerSettings {
    fn from(settings: &PipelineSettings) -> Self {
        Self {
            max_prompt_chars: settings.max_prompt_chars,
            max_history_turns: settings.max_history_turns,
        }
    }
}

#[derive(Serialize)]
struct TurnView<'a> {
    role: &'static str,
    text: &'a str,
}

#[derive(Serialize)]
struct DocumentView<'a> {
    label: &'a str,
    text: &'a str,
}

#[derive(Serialize)]
struct PromptView<'a> {
    preamble: &'a str,
    tone: &'a str,
    style: &'a str,
    question: &'a str,
    history: Vec<TurnView<'a>>,
    documents: Vec<DocumentView<'a>>,
}

/// Ranking used both for prompt order and for trimming: best first.
fn by_relevance(a: &ContextDocument, b: &ContextDocument) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| a.document_id.cmp(&b.document_id))
}

/// Renders prompt definitions under a length budget.
pub struct ContextComposer {
    definition: PromptDefinition,
    settings: ComposerSettings,
    handlebars: Handlebars<'static>,
}

impl std::fmt::Debug for ContextComposer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextComposer")
            .field("prompt_id", &self.definition.id)
            .field("settings", &self.settings)
            .finish()
    }
}

impl ContextComposer {
    /// Register the definition's template. Fails with `AppError::Prompt` on bad
    /// syntax or when the template does not render the question.
    pub fn new(definition: PromptDefinition, settings: ComposerSettings) -> AppResult<Self> {
        if settings.max_prompt_chars == 0 {
            return Err(AppError::InvalidArgument(
                "max_prompt_chars must be at least 1".to_string(),
            ));
        }

        let mut handlebars = Handlebars::new();
        // Plain text prompt, not HTML
        handlebars.register_escape_fn(handlebars::no_escape);
        handlebars.set_strict_mode(true);
        handlebars
            .register_template_string(TEMPLATE_NAME, &definition.template)
            .map_err(|e| AppError::Prompt(format!("Failed to register template: {}", e)))?;

        let composer = Self {
            definition,
            settings,
            handlebars,
        };
        let rendered = composer.render(QUESTION_SENTINEL, &[], &[])?;
        if !rendered.contains(QUESTION_SENTINEL) {
            return Err(AppError::Prompt(format!(
                "Template for prompt '{}' does not render {{{{question}}}}",
                composer.definition.id
            )));
        }

        Ok(composer)
    }

    pub fn settings(&self) -> ComposerSettings {
        self.settings
    }

    pub fn prompt_id(&self) -> &str {
        &self.definition.id
    }

    fn render(
        &self,
        question: &str,
        history: &[ConversationTurn],
        documents: &[ContextDocument],
    ) -> AppResult<String> {
        let view = PromptView {
            preamble: &self.definition.preamble,
            tone: &self.definition.behavior.tone,
            style: &self.definition.behavior.style,
            question,
            history: history
                .iter()
                .map(|t| TurnView {
                    role: t.role.label(),
                    text: &t.text,
                })
                .collect(),
            documents: documents
                .iter()
                .map(|d| DocumentView {
                    label: &d.source_label,
                    text: &d.text,
                })
                .collect(),
        };

        self.handlebars
            .render(TEMPLATE_NAME, &view)
            .map_err(|e| AppError::Prompt(format!("Failed to render template: {}", e)))
    }

    /// Compose the prompt for `question`.
    ///
    /// `history` is the session's full history in chronological order;
    /// `retrieved` may arrive in any order. Output is deterministic for equal inputs.
    pub fn compose(
        &self,
        question: &str,
        history: &[ConversationTurn],
        retrieved: &[ContextDocument],
    ) -> AppResult<ComposedPrompt> {
        let question = question.trim();
        if question.is_empty() {
            return Err(AppError::InvalidArgument("question is empty".to_string()));
        }

        let window_start = history.len().saturating_sub(self.settings.max_history_turns);
        let mut turns: Vec<ConversationTurn> = history[window_start..].to_vec();

        let mut documents: Vec<ContextDocument> = retrieved.to_vec();
        documents.sort_by(by_relevance);

        let budget = self.settings.max_prompt_chars;

        loop {
            let text = self.render(question, &turns, &documents)?;
            let length = text.chars().count();

            if !text.contains(question) {
                return Err(AppError::Prompt(format!(
                    "Prompt '{}' rendered without the question",
                    self.definition.id
                )));
            }

            if length <= budget {
                let composed = ComposedPrompt {
                    prompt_id: self.definition.id.clone(),
                    source_labels: documents.iter().map(|d| d.source_label.clone()).collect(),
                    document_ids: documents.iter().map(|d| d.document_id).collect(),
                    history_turns: turns.len(),
                    dropped_documents: retrieved.len() - documents.len(),
                    dropped_turns: history.len() - turns.len(),
                    text,
                };
                tracing::debug!(
                    chars = length,
                    budget,
                    documents = composed.document_ids.len(),
                    dropped_documents = composed.dropped_documents,
                    history_turns = composed.history_turns,
                    dropped_turns = composed.dropped_turns,
                    "Composed prompt"
                );
                return Ok(composed);
            }

            // Sorted best-first, so the last entry is the lowest score
            // (and the higher id among equal scores).
            if let Some(dropped) = documents.pop() {
                tracing::trace!(document_id = dropped.document_id, length, budget, "Dropping document");
            } else if !turns.is_empty() {
                turns.remove(0);
            } else {
                return Err(AppError::InvalidArgument(format!(
                    "prompt preamble and question need {} characters, budget is {}",
                    length, budget
                )));
            }
        }
    }
}
