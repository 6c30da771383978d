//! Provider trait, the abstraction over LLM backends.
//!
//! A Provider exchanges a conversation plus tool catalog for one normalized
//! response, hiding its family's wire shape. It also owns the family's
//! conversation-continuation convention via `fold_tool_results`: structured
//! families replay the raw assistant turn and append native tool-result
//! blocks, flattened families summarize the calls as text and require one
//! extra untooled call to force a final answer.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ProviderError;
use crate::message::{ChatMessage, ToolResultPart};

/// A tool declaration sent to the LLM so it knows what it can call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,

    /// Human-readable description of what the tool does.
    pub description: String,

    /// JSON Schema describing the tool's parameters.
    pub parameters: serde_json::Value,
}

/// Token usage tally, additive across rounds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input: u64,
    pub output: u64,
}

impl std::ops::AddAssign for TokenUsage {
    fn add_assign(&mut self, rhs: Self) {
        self.input += rhs.input;
        self.output += rhs.output;
    }
}

/// A model-issued request to invoke one named tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInvocation {
    /// Provider-assigned identifier, unique within a round. Must round-trip
    /// unchanged into the next turn's result message.
    pub id: String,

    pub name: String,

    /// Decoded structured input. Defaults to an empty object when the
    /// provider's argument encoding is absent or malformed.
    pub input: serde_json::Value,
}

/// Why the model stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// Final answer, no tool invocations requested.
    End,
    /// The reply is a batch of tool invocations awaiting execution.
    ToolUse,
}

/// One normalized response from a provider, regardless of family.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    /// Answer text so far.
    pub text: String,

    /// Requested tool invocations, in provider order.
    pub tool_calls: Vec<ToolInvocation>,

    pub usage: TokenUsage,

    pub stop: StopReason,

    /// Raw provider-native content for families that must echo the
    /// assistant turn verbatim on continuation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_content: Option<serde_json::Value>,
}

impl ChatResponse {
    /// Build a response upholding the termination invariant: `ToolUse` if
    /// and only if the invocation list is non-empty. A non-empty list is the
    /// authoritative signal; family finish-reason fields lie under some
    /// proxies.
    pub fn new(
        text: String,
        tool_calls: Vec<ToolInvocation>,
        usage: TokenUsage,
        raw_content: Option<serde_json::Value>,
    ) -> Self {
        let stop = if tool_calls.is_empty() {
            StopReason::End
        } else {
            StopReason::ToolUse
        };
        Self {
            text,
            tool_calls,
            usage,
            stop,
            raw_content,
        }
    }
}

/// A single chunk in a streaming response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamChunk {
    /// Partial text delta.
    #[serde(default)]
    pub content: Option<String>,

    /// Fully assembled tool calls (only on the final chunk).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolInvocation>,

    /// Whether this is the final chunk.
    #[serde(default)]
    pub done: bool,

    /// Usage info (typically only near the end of the stream).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<TokenUsage>,
}

/// What the loop should do after folding a round's tool results back in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FoldOutcome {
    /// Continuation is in place; run the next round.
    NextRound,
    /// Flattened continuation: issue one extra call with an empty tool
    /// catalog and return its text as the answer. Does not consume a round.
    FinalAnswerCall,
}

/// The core Provider trait.
///
/// The agent loop calls `chat` / `fold_tool_results` without knowing which
/// family is active.
#[async_trait]
pub trait Provider: Send + Sync {
    /// A human-readable name for this provider (e.g., "anthropic", "openai").
    fn name(&self) -> &str;

    /// Exchange the conversation plus tool catalog for one normalized
    /// response.
    async fn chat(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolDefinition],
    ) -> std::result::Result<ChatResponse, ProviderError>;

    /// Streaming variant of `chat`.
    ///
    /// Default implementation calls `chat` and wraps the result as a single
    /// terminal chunk, so the loop can always stream the forced final answer
    /// even against providers without a streaming path.
    async fn stream_chat(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolDefinition],
    ) -> std::result::Result<
        tokio::sync::mpsc::Receiver<std::result::Result<StreamChunk, ProviderError>>,
        ProviderError,
    > {
        let response = self.chat(messages, tools).await?;
        let (tx, rx) = tokio::sync::mpsc::channel(1);
        let _ = tx
            .send(Ok(StreamChunk {
                content: Some(response.text),
                tool_calls: response.tool_calls,
                done: true,
                usage: Some(response.usage),
            }))
            .await;
        Ok(rx)
    }

    /// Fold one round's ordered tool results back into the conversation
    /// using this family's continuation convention.
    fn fold_tool_results(
        &self,
        messages: &mut Vec<ChatMessage>,
        response: &ChatResponse,
        results: &[ToolResultPart],
    ) -> FoldOutcome;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stop_reason_follows_tool_calls() {
        let final_resp = ChatResponse::new("done".into(), vec![], TokenUsage::default(), None);
        assert_eq!(final_resp.stop, StopReason::End);

        let tooled = ChatResponse::new(
            String::new(),
            vec![ToolInvocation {
                id: "call_1".into(),
                name: "web_search".into(),
                input: serde_json::json!({"query": "rust"}),
            }],
            TokenUsage::default(),
            None,
        );
        assert_eq!(tooled.stop, StopReason::ToolUse);
    }

    #[test]
    fn usage_accumulates() {
        let mut total = TokenUsage::default();
        total += TokenUsage {
            input: 10,
            output: 5,
        };
        total += TokenUsage {
            input: 7,
            output: 3,
        };
        assert_eq!(
            total,
            TokenUsage {
                input: 17,
                output: 8
            }
        );
    }

    #[test]
    fn tool_definition_serialization() {
        let tool = ToolDefinition {
            name: "web_search".into(),
            description: "Search the web".into(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "query": { "type": "string", "description": "Search query" }
                },
                "required": ["query"]
            }),
        };
        let json = serde_json::to_string(&tool).unwrap();
        assert!(json.contains("web_search"));
        assert!(json.contains("query"));
    }
}
