//! Anthropic Messages API adapter (structured-continuation family).
//!
//! - `x-api-key` header authentication (not Bearer)
//! - `anthropic-version` header
//! - Native tool use with `tool_use` / `tool_result` content blocks
//! - Continuation replays the assistant turn's raw content blocks verbatim,
//!   then appends the round's tool results as one user message

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use agentic_core::error::ProviderError;
use agentic_core::message::{ChatMessage, MessageContent, Role, ToolResultPart};
use agentic_core::provider::{
    ChatResponse, FoldOutcome, Provider, TokenUsage, ToolDefinition, ToolInvocation,
};

const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";
const MAX_TOKENS: u32 = 4096;

/// Anthropic native Messages API provider.
pub struct AnthropicProvider {
    base_url: String,
    api_key: String,
    model: String,
    client: reqwest::Client,
}

impl AnthropicProvider {
    /// Create a new Anthropic provider with default base URL and model.
    pub fn new(api_key: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(300))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            base_url: DEFAULT_BASE_URL.into(),
            api_key: api_key.into(),
            model: DEFAULT_MODEL.into(),
            client,
        }
    }

    /// Set a custom base URL (proxies, test servers).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Messages endpoint. Base URLs already ending in `/v1` must not get a
    /// second version segment.
    fn endpoint(&self) -> String {
        if self.base_url.ends_with("/v1") {
            format!("{}/messages", self.base_url)
        } else {
            format!("{}/v1/messages", self.base_url)
        }
    }

    /// Convert conversation messages to the Messages API shape.
    fn to_api_messages(messages: &[ChatMessage]) -> Vec<ApiMessage> {
        messages
            .iter()
            .map(|m| match &m.content {
                MessageContent::Text(text) => ApiMessage {
                    role: role_str(m.role),
                    content: serde_json::Value::String(text.clone()),
                },
                MessageContent::ToolResults(parts) => {
                    // Tool results travel as user-role tool_result blocks.
                    let blocks: Vec<serde_json::Value> = parts
                        .iter()
                        .map(|p| {
                            serde_json::json!({
                                "type": "tool_result",
                                "tool_use_id": p.call_id,
                                "content": p.content,
                            })
                        })
                        .collect();
                    ApiMessage {
                        role: "user",
                        content: serde_json::Value::Array(blocks),
                    }
                }
                MessageContent::Raw(value) => ApiMessage {
                    role: role_str(m.role),
                    content: value.clone(),
                },
            })
            .collect()
    }

    /// Convert tool definitions to Anthropic's declaration shape.
    fn to_api_tools(tools: &[ToolDefinition]) -> Vec<AnthropicTool> {
        tools
            .iter()
            .map(|t| AnthropicTool {
                name: t.name.clone(),
                description: t.description.clone(),
                input_schema: t.parameters.clone(),
            })
            .collect()
    }

    /// Normalize a decoded reply: concatenate text blocks, collect tool_use
    /// blocks preserving provider-assigned ids, keep the raw content array
    /// for next-turn replay.
    fn normalize(value: serde_json::Value) -> Result<ChatResponse, ProviderError> {
        let parsed: AnthropicResponse =
            serde_json::from_value(value.clone()).map_err(|e| ProviderError::Api {
                status_code: 200,
                message: format!("Failed to parse Anthropic response: {e}"),
            })?;

        let mut text = String::new();
        let mut tool_calls = Vec::new();

        for block in parsed.content {
            match block {
                ContentBlock::Text { text: t } => text.push_str(&t),
                ContentBlock::ToolUse { id, name, input } => {
                    tool_calls.push(ToolInvocation {
                        id,
                        name,
                        input: input.unwrap_or_else(|| serde_json::json!({})),
                    });
                }
                ContentBlock::Other => {}
            }
        }

        let usage = TokenUsage {
            input: parsed.usage.input_tokens,
            output: parsed.usage.output_tokens,
        };

        let raw_content = value.get("content").cloned();
        Ok(ChatResponse::new(text, tool_calls, usage, raw_content))
    }
}

fn role_str(role: Role) -> &'static str {
    match role {
        Role::User => "user",
        Role::Assistant => "assistant",
        // Tool results are carried on a user turn in this family.
        Role::Tool => "user",
    }
}

#[async_trait]
impl Provider for AnthropicProvider {
    fn name(&self) -> &str {
        "anthropic"
    }

    async fn chat(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolDefinition],
    ) -> Result<ChatResponse, ProviderError> {
        let url = self.endpoint();

        let mut body = serde_json::json!({
            "model": self.model,
            "max_tokens": MAX_TOKENS,
            "messages": Self::to_api_messages(messages),
        });

        if !tools.is_empty() {
            body["tools"] = serde_json::json!(Self::to_api_tools(tools));
        }

        debug!(provider = "anthropic", model = %self.model, "Sending chat request");

        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        let status = response.status().as_u16();
        if !response.status().is_success() {
            let error_body = response.text().await.unwrap_or_default();
            warn!(status, body = %error_body, "Anthropic API error");
            return Err(ProviderError::Api {
                status_code: status,
                message: error_body,
            });
        }

        let value: serde_json::Value = response
            .json()
            .await
            .map_err(|e| ProviderError::Api {
                status_code: 200,
                message: format!("Failed to parse Anthropic response: {e}"),
            })?;

        Self::normalize(value)
    }

    fn fold_tool_results(
        &self,
        messages: &mut Vec<ChatMessage>,
        response: &ChatResponse,
        results: &[ToolResultPart],
    ) -> FoldOutcome {
        // Replay the assistant turn verbatim so tool_use ids line up with
        // the tool_result blocks that follow.
        match &response.raw_content {
            Some(raw) => messages.push(ChatMessage::raw_assistant(raw.clone())),
            None => messages.push(ChatMessage::assistant(&response.text)),
        }
        messages.push(ChatMessage::tool_results(results.to_vec()));
        FoldOutcome::NextRound
    }
}

// --- Anthropic API types ---

#[derive(Debug, Serialize)]
struct ApiMessage {
    role: &'static str,
    content: serde_json::Value,
}

#[derive(Debug, Serialize)]
struct AnthropicTool {
    name: String,
    description: String,
    input_schema: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<ContentBlock>,
    #[serde(default)]
    usage: AnthropicUsage,
    #[serde(default)]
    #[allow(dead_code)]
    stop_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum ContentBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "tool_use")]
    ToolUse {
        id: String,
        name: String,
        #[serde(default)]
        input: Option<serde_json::Value>,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Default, Deserialize)]
struct AnthropicUsage {
    #[serde(default)]
    input_tokens: u64,
    #[serde(default)]
    output_tokens: u64,
}
