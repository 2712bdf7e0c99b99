//! Prompt and conversation types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Id of the built-in answer prompt.
pub const DEFAULT_PROMPT_ID: &str = "travel.answer";

const DEFAULT_PREAMBLE: &str = "You are a knowledgeable and friendly Sri Lanka travel assistant. \
Provide accurate, helpful information about destinations, culture, history, accommodation, \
food, transport and weather.\n\
When responding:\n\
1. Be informative but concise\n\
2. Include relevant cultural context\n\
3. Provide practical tips when appropriate\n\
4. Ground your answer in the context below and mention the [source] tags you rely on\n\
5. If the context does not cover the question, say so and offer related help";

const DEFAULT_TEMPLATE: &str = "{{preamble}}

Respond in a {{tone}}, {{style}} manner.

{{#if history}}Conversation so far:
{{#each history}}{{role}}: {{text}}
{{/each}}
{{/if}}{{#if documents}}Context:
{{#each documents}}[{{label}}]
{{text}}

{{/each}}{{/if}}Question: {{question}}
Answer:";

/// Who spoke a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn label(&self) -> &'static str {
        match self {
            Role::User => "User",
            Role::Assistant => "Assistant",
        }
    }
}

/// One message in a session's history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: Role,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

impl ConversationTurn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            text: text.into(),
            timestamp: Utc::now(),
        }
    }
}

/// A retrieved document as the composer sees it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextDocument {
    pub document_id: u64,
    pub source_label: String,
    pub text: String,
    pub score: f32,
}

/// A prompt definition loaded from YAML.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptDefinition {
    /// Unique prompt identifier
    pub id: String,

    /// Human-readable title
    pub title: String,

    /// API version for schema evolution
    #[serde(rename = "apiVersion")]
    pub api_version: String,

    /// Creator identifier
    #[serde(rename = "createdBy", default)]
    pub created_by: String,

    /// Behavioral settings
    #[serde(default)]
    pub behavior: PromptBehavior,

    /// Fixed instructions placed before everything else
    pub preamble: String,

    /// Template string with Handlebars syntax
    ///
    /// Variables: `preamble`, `tone`, `style`, `question`,
    /// `history` (list of `{role, text}`) and `documents` (list of `{label, text}`).
    pub template: String,
}

/// Behavioral settings for prompt execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptBehavior {
    /// Tone (e.g., "warm", "professional")
    pub tone: String,

    /// Style (e.g., "concise", "detailed")
    pub style: String,
}

impl Default for PromptBehavior {
    fn default() -> Self {
        Self {
            tone: "warm".to_string(),
            style: "concise".to_string(),
        }
    }
}

impl PromptDefinition {
    /// The built-in travel answer prompt.
    pub fn travel_default() -> Self {
        Self {
            id: DEFAULT_PROMPT_ID.to_string(),
            title: "Grounded travel answer".to_string(),
            api_version: "1.0".to_string(),
            created_by: "wayfarer".to_string(),
            behavior: PromptBehavior::default(),
            preamble: DEFAULT_PREAMBLE.to_string(),
            template: DEFAULT_TEMPLATE.to_string(),
        }
    }
}

/// The composer's output: a single prompt plus what went into it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComposedPrompt {
    /// Rendered prompt text
    pub text: String,

    /// Source prompt ID
    pub prompt_id: String,

    /// Labels of the included documents, in prompt order
    pub source_labels: Vec<String>,

    /// Ids of the included documents, in prompt order
    pub document_ids: Vec<u64>,

    /// History turns included
    pub history_turns: usize,

    /// Documents left out to stay within the budget
    pub dropped_documents: usize,

    /// History turns left out, by window or budget
    pub dropped_turns: usize,
}

impl ComposedPrompt {
    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_definition_deserialization() {
        let yaml = r#"
id: travel.brief
title: Brief answers
apiVersion: "1.0"
createdBy: test
behavior:
  tone: professional
  style: terse
preamble: "You answer travel questions."
template: "{{preamble}} {{question}}"
"#;

        let def: PromptDefinition = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(def.id, "travel.brief");
        assert_eq!(def.behavior.tone, "professional");
        assert_eq!(def.preamble, "You answer travel questions.");
    }

    #[test]
    fn test_behavior_defaults_when_omitted() {
        let yaml = r#"
id: travel.min
title: Minimal
apiVersion: "1.0"
preamble: p
template: "{{question}}"
"#;
        let def: PromptDefinition = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(def.behavior.tone, "warm");
    }

    #[test]
    fn test_turn_roundtrip_json() {
        let turn = ConversationTurn::user("Is Ella worth visiting?");
        let json = serde_json::to_string(&turn).unwrap();
        assert!(json.contains("\"role\":\"user\""));
        let back: ConversationTurn = serde_json::from_str(&json).unwrap();
        assert_eq!(back, turn);
    }
}
