//! Prompt system for Wayfarer.
//!
//! - YAML prompt definitions under `.wayfarer/prompts/`
//! - Handlebars template rendering
//! - The Context Composer, which fits documents, history and the question
//!   into a single prompt under a character budget

pub mod composer;
pub mod loader;
pub mod types;

// Re-export main types
pub use composer::{ComposerSettings, ContextComposer};
pub use loader::{list_prompts, load_prompt, load_prompt_or_default};
pub use types::{
    ComposedPrompt, ContextDocument, ConversationTurn, PromptBehavior, PromptDefinition, Role,
    DEFAULT_PROMPT_ID,
};
