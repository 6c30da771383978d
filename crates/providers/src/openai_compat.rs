//! OpenAI-compatible chat-completions adapter (flattened-continuation
//! family).
//!
//! Works with OpenAI, Groq, Together, OpenRouter, and any compatible
//! endpoint, including proxies with two known transport quirks:
//!
//! - A non-streaming request may be answered with an SSE body anyway; the
//!   body is detected by its `data: ` prefix and handed to `reassemble`.
//! - Tool-call arguments may be absent or malformed JSON; they decode to an
//!   empty input object rather than failing the round.
//!
//! Continuation is flattened: tool results become plain text and the loop
//! issues one extra untooled call to force a final answer, because many
//! proxies in this family reject the native `tool` role outright.

use async_trait::async_trait;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use agentic_core::error::ProviderError;
use agentic_core::message::{ChatMessage, MessageContent, Role, ToolResultPart};
use agentic_core::provider::{
    ChatResponse, FoldOutcome, Provider, StreamChunk, TokenUsage, ToolDefinition, ToolInvocation,
};

use crate::reassemble::{SseAccumulator, SseChunk, reassemble};

const DEFAULT_BASE_URL: &str = "https://api.openai.com";
const DEFAULT_MODEL: &str = "gpt-4o";

/// An OpenAI-compatible chat-completions provider.
pub struct OpenAiCompatProvider {
    base_url: String,
    api_key: String,
    model: String,
    client: reqwest::Client,
}

impl OpenAiCompatProvider {
    /// Create a new provider with default base URL and model.
    pub fn new(api_key: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            base_url: DEFAULT_BASE_URL.into(),
            api_key: api_key.into(),
            model: DEFAULT_MODEL.into(),
            client,
        }
    }

    /// Set a custom base URL (proxies, self-hosted endpoints).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    fn endpoint(&self) -> String {
        if self.base_url.ends_with("/v1") {
            format!("{}/chat/completions", self.base_url)
        } else {
            format!("{}/v1/chat/completions", self.base_url)
        }
    }

    /// Flatten conversation messages to this family's role+text shape.
    fn to_api_messages(messages: &[ChatMessage]) -> Vec<ApiMessage> {
        messages
            .iter()
            .map(|m| {
                let role = match m.role {
                    Role::User => "user",
                    Role::Assistant => "assistant",
                    // Sent as an ordinary user message; strict proxies
                    // reject the native tool role.
                    Role::Tool => "user",
                };
                let content = match &m.content {
                    MessageContent::Text(text) => text.clone(),
                    MessageContent::ToolResults(parts) => parts
                        .iter()
                        .map(|p| format!("[tool result for {}]\n{}", p.call_id, p.content))
                        .collect::<Vec<_>>()
                        .join("\n"),
                    MessageContent::Raw(value) => value.to_string(),
                };
                ApiMessage {
                    role: role.into(),
                    content,
                }
            })
            .collect()
    }

    /// Convert tool definitions to the nested function-declaration shape.
    fn to_api_tools(tools: &[ToolDefinition]) -> Vec<ApiToolDefinition> {
        tools
            .iter()
            .map(|t| ApiToolDefinition {
                r#type: "function".into(),
                function: ApiToolFunction {
                    name: t.name.clone(),
                    description: t.description.clone(),
                    parameters: t.parameters.clone(),
                },
            })
            .collect()
    }

    /// Decode a response body that may be plain JSON or, from some proxies,
    /// an SSE stream despite `stream: false`.
    fn decode_body(raw: &str) -> Result<WireResponse, ProviderError> {
        if raw.trim_start().starts_with("data: ") {
            Ok(reassemble(raw))
        } else {
            serde_json::from_str(raw).map_err(|e| ProviderError::Api {
                status_code: 200,
                message: format!("Failed to parse response: {e}"),
            })
        }
    }

    /// Normalize the wire response. Missing choices or message content are
    /// an empty answer, not an error; some proxies legitimately return an
    /// empty assistant message. Missing usage defaults to zero.
    fn normalize(wire: WireResponse) -> ChatResponse {
        let usage = wire
            .usage
            .map(|u| TokenUsage {
                input: u.prompt_tokens,
                output: u.completion_tokens,
            })
            .unwrap_or_default();

        let Some(choice) = wire.choices.into_iter().next() else {
            return ChatResponse::new(String::new(), Vec::new(), usage, None);
        };

        let tool_calls = choice
            .message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(|tc| ToolInvocation {
                id: tc.id,
                name: tc.function.name,
                input: serde_json::from_str(&tc.function.arguments)
                    .unwrap_or_else(|_| serde_json::json!({})),
            })
            .collect();

        ChatResponse::new(
            choice.message.content.unwrap_or_default(),
            tool_calls,
            usage,
            None,
        )
    }
}

#[async_trait]
impl Provider for OpenAiCompatProvider {
    fn name(&self) -> &str {
        "openai"
    }

    async fn chat(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolDefinition],
    ) -> Result<ChatResponse, ProviderError> {
        let url = self.endpoint();

        let mut body = serde_json::json!({
            "model": self.model,
            "stream": false,
            "messages": Self::to_api_messages(messages),
        });

        if !tools.is_empty() {
            body["tools"] = serde_json::json!(Self::to_api_tools(tools));
        }

        debug!(provider = "openai", model = %self.model, "Sending chat request");

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        let status = response.status().as_u16();
        if !response.status().is_success() {
            let error_body = response.text().await.unwrap_or_default();
            warn!(status, body = %error_body, "Provider returned error");
            return Err(ProviderError::Api {
                status_code: status,
                message: error_body,
            });
        }

        let raw = response
            .text()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        Ok(Self::normalize(Self::decode_body(&raw)?))
    }

    async fn stream_chat(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolDefinition],
    ) -> Result<
        tokio::sync::mpsc::Receiver<Result<StreamChunk, ProviderError>>,
        ProviderError,
    > {
        let url = self.endpoint();

        let mut body = serde_json::json!({
            "model": self.model,
            "stream": true,
            "stream_options": { "include_usage": true },
            "messages": Self::to_api_messages(messages),
        });

        if !tools.is_empty() {
            body["tools"] = serde_json::json!(Self::to_api_tools(tools));
        }

        debug!(provider = "openai", model = %self.model, "Sending streaming request");

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .header("Accept", "text/event-stream")
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        let status = response.status().as_u16();
        if !response.status().is_success() {
            let error_body = response.text().await.unwrap_or_default();
            warn!(status, body = %error_body, "Provider streaming error");
            return Err(ProviderError::Api {
                status_code: status,
                message: error_body,
            });
        }

        let (tx, rx) = tokio::sync::mpsc::channel(64);

        tokio::spawn(async move {
            let mut byte_stream = response.bytes_stream();
            let mut buffer = String::new();
            let mut acc = SseAccumulator::new();

            while let Some(chunk_result) = byte_stream.next().await {
                let bytes = match chunk_result {
                    Ok(b) => b,
                    Err(e) => {
                        let _ = tx
                            .send(Err(ProviderError::StreamInterrupted(e.to_string())))
                            .await;
                        return;
                    }
                };

                buffer.push_str(&String::from_utf8_lossy(&bytes));

                while let Some(line_end) = buffer.find('\n') {
                    let line = buffer[..line_end].trim_end_matches('\r').to_string();
                    buffer = buffer[line_end + 1..].to_string();

                    if line.is_empty() || line.starts_with(':') {
                        continue;
                    }
                    let Some(data) = line.strip_prefix("data: ") else {
                        continue;
                    };
                    let data = data.trim();

                    if data == "[DONE]" {
                        let _ = tx.send(Ok(final_chunk(acc))).await;
                        return;
                    }

                    match serde_json::from_str::<SseChunk>(data) {
                        Ok(chunk) => {
                            if let Some(text) = acc.feed_chunk(chunk) {
                                let delta = StreamChunk {
                                    content: Some(text),
                                    tool_calls: Vec::new(),
                                    done: false,
                                    usage: None,
                                };
                                if tx.send(Ok(delta)).await.is_err() {
                                    return; // receiver dropped
                                }
                            }
                        }
                        Err(e) => {
                            trace!(error = %e, data = %data, "Dropping unparseable SSE chunk");
                        }
                    }
                }
            }

            // Stream ended without [DONE]
            let _ = tx.send(Ok(final_chunk(acc))).await;
        });

        Ok(rx)
    }

    fn fold_tool_results(
        &self,
        messages: &mut Vec<ChatMessage>,
        response: &ChatResponse,
        results: &[ToolResultPart],
    ) -> FoldOutcome {
        let summary = response
            .tool_calls
            .iter()
            .map(|tc| format!("[tool: {}]", tc.name))
            .collect::<Vec<_>>()
            .join(", ");
        let assistant_text = [response.text.as_str(), summary.as_str()]
            .iter()
            .filter(|s| !s.is_empty())
            .copied()
            .collect::<Vec<_>>()
            .join("\n");
        messages.push(ChatMessage::assistant(assistant_text));

        let joined = results
            .iter()
            .map(|r| r.content.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        messages.push(ChatMessage::user(format!(
            "Tool results:\n{joined}\n\nBased on the tool results above, provide the final \
             answer directly. Do NOT mention or repeat the tool calls, do NOT say \"I \
             called...\" or show function signatures. Just answer the question."
        )));

        FoldOutcome::FinalAnswerCall
    }
}

fn final_chunk(acc: SseAccumulator) -> StreamChunk {
    let usage = acc.token_usage();
    StreamChunk {
        content: None,
        tool_calls: acc.invocations(),
        done: true,
        usage,
    }
}

// --- Wire types (shared with the reassembler) ---

#[derive(Debug, Serialize)]
struct ApiMessage {
    role: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct ApiToolDefinition {
    r#type: String,
    function: ApiToolFunction,
}

#[derive(Debug, Serialize)]
struct ApiToolFunction {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct WireResponse {
    #[serde(default)]
    pub choices: Vec<WireChoice>,
    #[serde(default)]
    pub usage: Option<WireUsage>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WireChoice {
    #[serde(default)]
    pub message: WireMessage,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct WireMessage {
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub tool_calls: Option<Vec<WireToolCall>>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WireToolCall {
    #[serde(default)]
    pub id: String,
    pub function: WireFunction,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct WireFunction {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub arguments: String,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub(crate) struct WireUsage {
    #[serde(default)]
    pub prompt_tokens: u64,
    #[serde(default)]
    pub completion_tokens: u64,
}
