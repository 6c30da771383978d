//! SSE response reassembly.
//!
//! Some OpenAI-compatible proxies answer a `stream: false` request with a
//! `text/event-stream` body anyway. This module folds such a body back into
//! the single response object the caller asked for, and the accumulator is
//! reused by the real streaming path to collect tool calls across deltas.
//!
//! Rules the wire forces on us:
//!
//! - Tool calls arrive fragmented and slot-indexed; argument fragments are
//!   appended in arrival order and only parsed once the stream ends. A
//!   fragment must never overwrite what came before it.
//! - Some proxies use an alternate `item` encoding carrying a whole call
//!   per chunk, keyed by `call_id` instead of slot index.
//! - `finish_reason` and `usage` may appear on any chunk; the last value
//!   seen wins. Accumulated tool calls override the finish reason.

use std::collections::BTreeMap;

use serde::Deserialize;
use tracing::trace;

use agentic_core::provider::{TokenUsage, ToolInvocation};

use crate::openai_compat::{
    WireChoice, WireFunction, WireMessage, WireResponse, WireToolCall, WireUsage,
};

/// One SSE data payload, covering both the standard delta encoding and the
/// alternate `item` encoding. Fields outside these are ignored.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct SseChunk {
    #[serde(default)]
    choices: Vec<SseChoice>,
    #[serde(default)]
    usage: Option<WireUsage>,
    #[serde(default)]
    item: Option<SseItem>,
}

#[derive(Debug, Default, Deserialize)]
struct SseChoice {
    #[serde(default)]
    delta: SseDelta,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct SseDelta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<SseToolCallDelta>>,
}

#[derive(Debug, Deserialize)]
struct SseToolCallDelta {
    #[serde(default)]
    index: u32,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    function: Option<SseFunctionDelta>,
}

#[derive(Debug, Default, Deserialize)]
struct SseFunctionDelta {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    arguments: Option<String>,
}

/// Alternate per-chunk encoding: a complete (or repeated) call keyed by
/// `call_id` rather than slot index.
#[derive(Debug, Default, Deserialize)]
struct SseItem {
    #[serde(default)]
    call_id: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    arguments: Option<String>,
}

#[derive(Debug, Default)]
struct ToolCallSlot {
    id: String,
    name: String,
    arguments: String,
}

/// Accumulates SSE chunks into one logical response.
#[derive(Debug, Default)]
pub(crate) struct SseAccumulator {
    text: String,
    slots: BTreeMap<u32, ToolCallSlot>,
    finish_reason: Option<String>,
    usage: Option<WireUsage>,
}

impl SseAccumulator {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Fold one chunk in. Returns the text delta, if the chunk carried one,
    /// so the streaming path can forward it immediately.
    pub(crate) fn feed_chunk(&mut self, chunk: SseChunk) -> Option<String> {
        if let Some(usage) = chunk.usage {
            self.usage = Some(usage);
        }

        if let Some(item) = chunk.item {
            self.feed_item(item);
        }

        let mut text_delta: Option<String> = None;
        for choice in chunk.choices {
            if let Some(reason) = choice.finish_reason {
                self.finish_reason = Some(reason);
            }
            if let Some(content) = choice.delta.content {
                self.text.push_str(&content);
                text_delta = Some(match text_delta {
                    None => content,
                    Some(mut prev) => {
                        prev.push_str(&content);
                        prev
                    }
                });
            }
            for delta in choice.delta.tool_calls.unwrap_or_default() {
                let slot = self.slots.entry(delta.index).or_default();
                if let Some(id) = delta.id {
                    slot.id = id;
                }
                if let Some(function) = delta.function {
                    if let Some(name) = function.name {
                        slot.name = name;
                    }
                    if let Some(arguments) = function.arguments {
                        // Appended, never replaced: arguments stream in
                        // fragments of a single JSON string.
                        slot.arguments.push_str(&arguments);
                    }
                }
            }
        }
        text_delta
    }

    fn feed_item(&mut self, item: SseItem) {
        let Some(call_id) = item.call_id else {
            return;
        };
        let index = match self.slots.iter().find(|(_, slot)| slot.id == call_id) {
            Some((&index, _)) => index,
            None => {
                let index = self
                    .slots
                    .last_key_value()
                    .map(|(k, _)| k + 1)
                    .unwrap_or(0);
                self.slots.insert(
                    index,
                    ToolCallSlot {
                        id: call_id,
                        ..Default::default()
                    },
                );
                index
            }
        };
        let Some(slot) = self.slots.get_mut(&index) else {
            return;
        };
        if let Some(name) = item.name {
            slot.name = name;
        }
        if let Some(arguments) = item.arguments {
            // Each item chunk carries the full argument string so far.
            slot.arguments = arguments;
        }
    }

    /// Parsed tool invocations in slot order. Unparseable argument strings
    /// degrade to an empty input object.
    pub(crate) fn invocations(&self) -> Vec<ToolInvocation> {
        self.slots
            .values()
            .map(|slot| ToolInvocation {
                id: slot.id.clone(),
                name: slot.name.clone(),
                input: serde_json::from_str(&slot.arguments)
                    .unwrap_or_else(|_| serde_json::json!({})),
            })
            .collect()
    }

    pub(crate) fn token_usage(&self) -> Option<TokenUsage> {
        self.usage.map(|u| TokenUsage {
            input: u.prompt_tokens,
            output: u.completion_tokens,
        })
    }

    pub(crate) fn into_wire_response(self) -> WireResponse {
        let tool_calls: Vec<WireToolCall> = self
            .slots
            .into_values()
            .map(|slot| WireToolCall {
                id: slot.id,
                function: WireFunction {
                    name: slot.name,
                    arguments: slot.arguments,
                },
            })
            .collect();

        let finish_reason = if !tool_calls.is_empty() {
            // Calls accumulated in the slots are authoritative even when no
            // chunk ever said "tool_calls".
            "tool_calls".to_string()
        } else {
            self.finish_reason.unwrap_or_else(|| "stop".to_string())
        };

        WireResponse {
            choices: vec![WireChoice {
                message: WireMessage {
                    content: Some(self.text),
                    tool_calls: if tool_calls.is_empty() {
                        None
                    } else {
                        Some(tool_calls)
                    },
                },
                finish_reason: Some(finish_reason),
            }],
            usage: Some(self.usage.unwrap_or_default()),
        }
    }
}

/// Reassemble an SSE body into the response object a non-streaming request
/// should have produced. Unparseable lines are dropped.
pub(crate) fn reassemble(raw: &str) -> WireResponse {
    let mut acc = SseAccumulator::new();

    for line in raw.lines() {
        let line = line.trim();
        let Some(data) = line.strip_prefix("data: ") else {
            continue;
        };
        let data = data.trim();
        if data == "[DONE]" {
            // The sentinel is not necessarily last; keep reading.
            continue;
        }
        match serde_json::from_str::<SseChunk>(data) {
            Ok(chunk) => {
                acc.feed_chunk(chunk);
            }
            Err(e) => {
                trace!(error = %e, data = %data, "Dropping unparseable SSE chunk");
            }
        }
    }

    acc.into_wire_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn choice(wire: &WireResponse) -> &WireChoice {
        &wire.choices[0]
    }

    #[test]
    fn text_only_stream() {
        let raw = concat!(
            "data: {\"choices\":[{\"delta\":{\"content\":\"The answer \"}}]}\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"is 12.\"},\"finish_reason\":\"stop\"}]}\n",
            "data: [DONE]\n",
        );
        let wire = reassemble(raw);
        assert_eq!(choice(&wire).message.content.as_deref(), Some("The answer is 12."));
        assert_eq!(choice(&wire).finish_reason.as_deref(), Some("stop"));
        assert!(choice(&wire).message.tool_calls.is_none());
    }

    #[test]
    fn arguments_fragmented_across_chunks() {
        let raw = concat!(
            "data: {\"choices\":[{\"delta\":{\"tool_calls\":[{\"index\":0,\"id\":\"call_1\",\"function\":{\"name\":\"code_exec\",\"arguments\":\"\"}}]}}]}\n",
            "data: {\"choices\":[{\"delta\":{\"tool_calls\":[{\"index\":0,\"function\":{\"arguments\":\"{\\\"code\\\": \\\"sqr\"}}]}}]}\n",
            "data: {\"choices\":[{\"delta\":{\"tool_calls\":[{\"index\":0,\"function\":{\"arguments\":\"t(144)\\\"}\"}}]}}]}\n",
            "data: {\"choices\":[{\"delta\":{},\"finish_reason\":\"tool_calls\"}]}\n",
            "data: [DONE]\n",
        );
        let wire = reassemble(raw);
        let calls = choice(&wire).message.tool_calls.as_ref().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].id, "call_1");
        assert_eq!(calls[0].function.name, "code_exec");
        assert_eq!(calls[0].function.arguments, "{\"code\": \"sqrt(144)\"}");
        assert_eq!(choice(&wire).finish_reason.as_deref(), Some("tool_calls"));
    }

    #[test]
    fn parallel_calls_keep_slot_order() {
        let raw = concat!(
            "data: {\"choices\":[{\"delta\":{\"tool_calls\":[",
            "{\"index\":0,\"id\":\"call_a\",\"function\":{\"name\":\"web_search\",\"arguments\":\"{\\\"query\\\":\\\"a\\\"}\"}},",
            "{\"index\":1,\"id\":\"call_b\",\"function\":{\"name\":\"web_search\",\"arguments\":\"{\\\"query\\\":\\\"b\\\"}\"}}",
            "]}}]}\n",
            "data: [DONE]\n",
        );
        let wire = reassemble(raw);
        let calls = choice(&wire).message.tool_calls.as_ref().unwrap();
        assert_eq!(calls[0].id, "call_a");
        assert_eq!(calls[1].id, "call_b");
    }

    #[test]
    fn item_encoding_creates_then_merges() {
        let raw = concat!(
            "data: {\"item\":{\"call_id\":\"call_x\",\"name\":\"web_search\",\"arguments\":\"{\\\"query\\\":\"}}\n",
            "data: {\"item\":{\"call_id\":\"call_x\",\"arguments\":\"{\\\"query\\\":\\\"rust\\\"}\"}}\n",
            "data: {\"item\":{\"call_id\":\"call_y\",\"name\":\"code_exec\",\"arguments\":\"{}\"}}\n",
            "data: [DONE]\n",
        );
        let wire = reassemble(raw);
        let calls = choice(&wire).message.tool_calls.as_ref().unwrap();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].id, "call_x");
        assert_eq!(calls[0].function.name, "web_search");
        // Item chunks carry the full string so far, so the last one wins.
        assert_eq!(calls[0].function.arguments, "{\"query\":\"rust\"}");
        assert_eq!(calls[1].id, "call_y");
    }

    #[test]
    fn tool_calls_override_finish_reason() {
        let raw = concat!(
            "data: {\"choices\":[{\"delta\":{\"tool_calls\":[{\"index\":0,\"id\":\"call_1\",\"function\":{\"name\":\"web_search\",\"arguments\":\"{}\"}}]}}]}\n",
            "data: {\"choices\":[{\"delta\":{},\"finish_reason\":\"stop\"}]}\n",
            "data: [DONE]\n",
        );
        let wire = reassemble(raw);
        assert_eq!(choice(&wire).finish_reason.as_deref(), Some("tool_calls"));
    }

    #[test]
    fn garbage_lines_dropped() {
        let raw = concat!(
            ": keep-alive comment\n",
            "event: message\n",
            "data: not json at all\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"ok\"}}]}\n",
            "data: [DONE]\n",
        );
        let wire = reassemble(raw);
        assert_eq!(choice(&wire).message.content.as_deref(), Some("ok"));
    }

    #[test]
    fn last_usage_wins() {
        let raw = concat!(
            "data: {\"choices\":[{\"delta\":{\"content\":\"hi\"}}],\"usage\":{\"prompt_tokens\":1,\"completion_tokens\":1}}\n",
            "data: {\"choices\":[],\"usage\":{\"prompt_tokens\":40,\"completion_tokens\":9}}\n",
            "data: [DONE]\n",
        );
        let wire = reassemble(raw);
        let usage = wire.usage.unwrap();
        assert_eq!(usage.prompt_tokens, 40);
        assert_eq!(usage.completion_tokens, 9);
    }

    #[test]
    fn data_after_done_sentinel_still_counts() {
        let raw = concat!(
            "data: {\"choices\":[{\"delta\":{\"content\":\"partial\"}}]}\n",
            "data: [DONE]\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\" and the rest\"},\"finish_reason\":\"stop\"}]}\n",
        );
        let wire = reassemble(raw);
        assert_eq!(
            choice(&wire).message.content.as_deref(),
            Some("partial and the rest")
        );
        assert_eq!(choice(&wire).finish_reason.as_deref(), Some("stop"));
    }

    #[test]
    fn empty_stream_is_default_stop() {
        let wire = reassemble("data: [DONE]\n");
        assert_eq!(choice(&wire).finish_reason.as_deref(), Some("stop"));
        assert_eq!(choice(&wire).message.content.as_deref(), Some(""));
        assert_eq!(wire.usage.unwrap().prompt_tokens, 0);
    }

    #[test]
    fn accumulator_reports_text_deltas() {
        let mut acc = SseAccumulator::new();
        let chunk: SseChunk =
            serde_json::from_str(r#"{"choices":[{"delta":{"content":"hel"}}]}"#).unwrap();
        assert_eq!(acc.feed_chunk(chunk), Some("hel".to_string()));
        let chunk: SseChunk =
            serde_json::from_str(r#"{"choices":[{"delta":{}}]}"#).unwrap();
        assert_eq!(acc.feed_chunk(chunk), None);
    }

    #[test]
    fn accumulator_joins_deltas_across_choices_in_one_chunk() {
        let mut acc = SseAccumulator::new();
        let chunk: SseChunk = serde_json::from_str(
            r#"{"choices":[{"delta":{"content":"ab"}},{"delta":{"content":"cd"}}]}"#,
        )
        .unwrap();
        assert_eq!(acc.feed_chunk(chunk), Some("abcd".to_string()));
        let wire = acc.into_wire_response();
        assert_eq!(wire.choices[0].message.content.as_deref(), Some("abcd"));
    }

    #[test]
    fn accumulator_parses_invocations_with_fallback_input() {
        let mut acc = SseAccumulator::new();
        let chunk: SseChunk = serde_json::from_str(
            r#"{"choices":[{"delta":{"tool_calls":[{"index":0,"id":"call_1","function":{"name":"web_search","arguments":"{broken"}}]}}]}"#,
        )
        .unwrap();
        acc.feed_chunk(chunk);
        let invocations = acc.invocations();
        assert_eq!(invocations[0].name, "web_search");
        assert_eq!(invocations[0].input, serde_json::json!({}));
    }
}
