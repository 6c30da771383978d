//! Conversation message types.
//!
//! A conversation is an ordered `Vec<ChatMessage>` owned by one run. Content
//! is either plain text, a batch of tool results answering the previous
//! assistant turn, or a raw provider-native block sequence that must be
//! replayed verbatim on the next turn (structured-continuation families
//! reject a turn whose tool-use blocks were rewritten).

use serde::{Deserialize, Serialize};

/// The role of a message sender in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The end user
    User,
    /// The model
    Assistant,
    /// Tool execution results
    Tool,
}

/// One tool result answering one tool invocation, paired by identifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResultPart {
    /// The provider-assigned identifier of the invocation this answers.
    pub call_id: String,

    /// The textual result fed back to the model.
    pub content: String,
}

/// Message payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    /// Plain text.
    Text(String),

    /// Ordered tool results for the invocations of the previous turn.
    ToolResults(Vec<ToolResultPart>),

    /// Provider-native content echoed verbatim (assistant turn replay).
    Raw(serde_json::Value),
}

/// A single message in a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: MessageContent,
}

impl ChatMessage {
    /// Create a user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: MessageContent::Text(content.into()),
        }
    }

    /// Create an assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: MessageContent::Text(content.into()),
        }
    }

    /// Create a tool-result message carrying one round's ordered results.
    pub fn tool_results(parts: Vec<ToolResultPart>) -> Self {
        Self {
            role: Role::Tool,
            content: MessageContent::ToolResults(parts),
        }
    }

    /// Create an assistant message replaying raw provider-native content.
    pub fn raw_assistant(content: serde_json::Value) -> Self {
        Self {
            role: Role::Assistant,
            content: MessageContent::Raw(content),
        }
    }

    /// Text content, if this is a plain-text message.
    pub fn as_text(&self) -> Option<&str> {
        match &self.content {
            MessageContent::Text(t) => Some(t),
            _ => None,
        }
    }
}
