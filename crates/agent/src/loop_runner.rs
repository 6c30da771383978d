//! The bounded tool-calling loop.
//!
//! One run is a sequence of rounds. Each round sends the conversation plus
//! the tool catalog to the provider; if the model answers with text the run
//! is done, if it requests tools they are executed in order and the results
//! are folded back in using the provider family's continuation convention.
//! A model that requests tools on every round in the budget exhausts the
//! run with a distinct error, without a further provider call.

use std::sync::Arc;

use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, warn};

use agentic_core::config::Exchange;
use agentic_core::error::{Error, Result, ToolError};
use agentic_core::message::{ChatMessage, ToolResultPart};
use agentic_core::provider::{FoldOutcome, Provider, TokenUsage, ToolInvocation};
use agentic_core::tool::{
    CodeResult, FileResult, Source, ToolCallRecord, ToolRegistry,
};
use serde::{Deserialize, Serialize};

use crate::event::AgentEvent;

const DEFAULT_MAX_ROUNDS: u32 = 10;

/// The final product of one run. Artifact lists are omitted from the
/// serialized form when no tool produced them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AskResult {
    pub answer: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sources: Option<Vec<Source>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub images: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code_results: Option<Vec<CodeResult>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub files: Option<Vec<FileResult>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCallRecord>>,

    pub usage: TokenUsage,
}

/// Artifacts gathered across rounds.
#[derive(Debug, Default)]
struct RunAccumulator {
    sources: Vec<Source>,
    images: Vec<String>,
    code_results: Vec<CodeResult>,
    files: Vec<FileResult>,
    tool_calls: Vec<ToolCallRecord>,
    usage: TokenUsage,
}

impl RunAccumulator {
    fn into_result(self, answer: String) -> AskResult {
        fn some_if_any<T>(v: Vec<T>) -> Option<Vec<T>> {
            if v.is_empty() { None } else { Some(v) }
        }
        AskResult {
            answer,
            sources: some_if_any(self.sources),
            images: some_if_any(self.images),
            code_results: some_if_any(self.code_results),
            files: some_if_any(self.files),
            tool_calls: some_if_any(self.tool_calls),
            usage: self.usage,
        }
    }
}

/// The loop itself. Holds one provider and one tool registry for the run.
pub struct AgentLoop {
    provider: Arc<dyn Provider>,
    tools: Arc<ToolRegistry>,
    max_rounds: u32,
    progress: Option<UnboundedSender<AgentEvent>>,
}

impl AgentLoop {
    pub fn new(provider: Arc<dyn Provider>, tools: Arc<ToolRegistry>) -> Self {
        Self {
            provider,
            tools,
            max_rounds: DEFAULT_MAX_ROUNDS,
            progress: None,
        }
    }

    pub fn with_max_rounds(mut self, max_rounds: u32) -> Self {
        self.max_rounds = max_rounds;
        self
    }

    /// Attach a progress channel. Send failures are ignored; a dropped
    /// receiver never affects the run.
    pub fn with_progress(mut self, sender: UnboundedSender<AgentEvent>) -> Self {
        self.progress = Some(sender);
        self
    }

    fn emit(&self, event: AgentEvent) {
        if let Some(sender) = &self.progress {
            let _ = sender.send(event);
        }
    }

    /// Run the loop for one prompt, seeding the conversation with prior
    /// exchanges, oldest first.
    pub async fn run(&self, prompt: &str, history: &[Exchange]) -> Result<AskResult> {
        match self.run_inner(prompt, history).await {
            Ok(result) => {
                self.emit(AgentEvent::Done);
                Ok(result)
            }
            Err(e) => {
                self.emit(AgentEvent::Error {
                    message: e.to_string(),
                });
                Err(e)
            }
        }
    }

    async fn run_inner(&self, prompt: &str, history: &[Exchange]) -> Result<AskResult> {
        info!(
            provider = self.provider.name(),
            tools = ?self.tools.names(),
            history = history.len(),
            "Starting run"
        );

        let mut messages = Vec::with_capacity(history.len() * 2 + 1);
        for exchange in history {
            messages.push(ChatMessage::user(&exchange.prompt));
            messages.push(ChatMessage::assistant(&exchange.answer));
        }
        messages.push(ChatMessage::user(prompt));

        let definitions = self.tools.definitions();
        let mut acc = RunAccumulator::default();

        for round in 1..=self.max_rounds {
            debug!(round, provider = self.provider.name(), "Agent loop round");
            self.emit(AgentEvent::Status {
                message: format!("Calling {} (round {round})", self.provider.name()),
            });

            let response = self.provider.chat(&messages, &definitions).await?;
            // Usage counts even when the round ends in tool calls.
            acc.usage += response.usage;

            if response.tool_calls.is_empty() {
                return Ok(acc.into_result(response.text));
            }

            debug!(count = response.tool_calls.len(), "Executing tool calls");
            let mut results = Vec::with_capacity(response.tool_calls.len());
            for call in &response.tool_calls {
                let text = self.execute_tool(call, &mut acc).await;
                self.emit(AgentEvent::tool(&call.name, &text));
                results.push(ToolResultPart {
                    call_id: call.id.clone(),
                    content: text,
                });
            }

            match self
                .provider
                .fold_tool_results(&mut messages, &response, &results)
            {
                FoldOutcome::NextRound => continue,
                FoldOutcome::FinalAnswerCall => {
                    // Flattened continuation: one extra untooled call, not
                    // counted against the round budget.
                    let answer = self.final_answer(&messages, &mut acc).await?;
                    return Ok(acc.into_result(answer));
                }
            }
        }

        warn!(rounds = self.max_rounds, "Round budget exhausted");
        Err(Error::RoundsExhausted {
            rounds: self.max_rounds,
        })
    }

    /// Execute one tool call, fold its artifacts into the accumulator, and
    /// return the result text for the model. Failures become result text,
    /// never a run error.
    async fn execute_tool(&self, call: &ToolInvocation, acc: &mut RunAccumulator) -> String {
        let text = match self.tools.execute(call).await {
            Ok(outcome) => {
                acc.sources.extend(outcome.sources);
                acc.images.extend(outcome.images);
                if let Some(code) = outcome.code {
                    acc.code_results.push(code);
                }
                if let Some(file) = outcome.file {
                    acc.files.push(file);
                }
                outcome.text
            }
            Err(ToolError::NotFound(name)) => {
                warn!(tool = %name, "Model requested unknown tool");
                format!("Unknown tool: {name}")
            }
            Err(e) => {
                warn!(tool = %call.name, error = %e, "Tool execution failed");
                format!("Error: {e}")
            }
        };

        acc.tool_calls.push(ToolCallRecord {
            tool: call.name.clone(),
            input: call.input.clone(),
            output: text.clone(),
        });
        text
    }

    /// The forced final call for flattened families: no tool catalog, text
    /// streamed out as token events.
    async fn final_answer(
        &self,
        messages: &[ChatMessage],
        acc: &mut RunAccumulator,
    ) -> Result<String> {
        self.emit(AgentEvent::Status {
            message: "Composing final answer".into(),
        });

        let mut rx = self.provider.stream_chat(messages, &[]).await?;
        let mut answer = String::new();

        while let Some(chunk) = rx.recv().await {
            let chunk = chunk.map_err(Error::Provider)?;
            if let Some(text) = chunk.content {
                answer.push_str(&text);
                self.emit(AgentEvent::Token { text });
            }
            if let Some(usage) = chunk.usage {
                acc.usage += usage;
            }
            if chunk.done {
                break;
            }
        }

        // An empty answer is legitimate; the artifacts gathered so far still
        // reach the caller.
        Ok(answer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    use agentic_core::error::ProviderError;
    use agentic_core::message::MessageContent;
    use agentic_core::provider::{ChatResponse, StreamChunk, ToolDefinition};
    use agentic_core::tool::{Tool, ToolOutcome};
    use async_trait::async_trait;

    /// Serves a scripted sequence of responses and records what it saw.
    struct ScriptedProvider {
        responses: Mutex<Vec<ChatResponse>>,
        calls: AtomicU32,
        seen: Mutex<Vec<Vec<ChatMessage>>>,
        flattened: bool,
    }

    impl ScriptedProvider {
        fn new(mut responses: Vec<ChatResponse>) -> Self {
            responses.reverse();
            Self {
                responses: Mutex::new(responses),
                calls: AtomicU32::new(0),
                seen: Mutex::new(Vec::new()),
                flattened: false,
            }
        }

        fn flattened(mut self) -> Self {
            self.flattened = true;
            self
        }

        fn call_count(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Provider for ScriptedProvider {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn chat(
            &self,
            messages: &[ChatMessage],
            _tools: &[ToolDefinition],
        ) -> std::result::Result<ChatResponse, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.seen.lock().unwrap().push(messages.to_vec());
            self.responses
                .lock()
                .unwrap()
                .pop()
                .ok_or_else(|| ProviderError::Network("script exhausted".into()))
        }

        fn fold_tool_results(
            &self,
            messages: &mut Vec<ChatMessage>,
            response: &ChatResponse,
            results: &[ToolResultPart],
        ) -> FoldOutcome {
            if self.flattened {
                messages.push(ChatMessage::assistant(&response.text));
                let joined = results
                    .iter()
                    .map(|r| r.content.as_str())
                    .collect::<Vec<_>>()
                    .join("\n");
                messages.push(ChatMessage::user(format!("Tool results:\n{joined}")));
                FoldOutcome::FinalAnswerCall
            } else {
                messages.push(ChatMessage::assistant(&response.text));
                messages.push(ChatMessage::tool_results(results.to_vec()));
                FoldOutcome::NextRound
            }
        }
    }

    struct StubTool {
        name: &'static str,
        outcome: fn(&serde_json::Value) -> std::result::Result<ToolOutcome, ToolError>,
    }

    #[async_trait]
    impl Tool for StubTool {
        fn name(&self) -> &str {
            self.name
        }
        fn description(&self) -> &str {
            "stub"
        }
        fn parameters_schema(&self) -> serde_json::Value {
            serde_json::json!({"type": "object"})
        }
        async fn execute(
            &self,
            input: &serde_json::Value,
        ) -> std::result::Result<ToolOutcome, ToolError> {
            (self.outcome)(input)
        }
    }

    fn echo_registry() -> Arc<ToolRegistry> {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(StubTool {
            name: "echo",
            outcome: |input| {
                Ok(ToolOutcome::text(
                    input["text"].as_str().unwrap_or("").to_string(),
                ))
            },
        }));
        Arc::new(registry)
    }

    fn text_response(text: &str, input: u64, output: u64) -> ChatResponse {
        ChatResponse::new(
            text.into(),
            vec![],
            TokenUsage { input, output },
            None,
        )
    }

    fn tool_response(calls: Vec<(&str, &str, serde_json::Value)>) -> ChatResponse {
        ChatResponse::new(
            String::new(),
            calls
                .into_iter()
                .map(|(id, name, input)| ToolInvocation {
                    id: id.into(),
                    name: name.into(),
                    input,
                })
                .collect(),
            TokenUsage {
                input: 10,
                output: 5,
            },
            None,
        )
    }

    #[tokio::test]
    async fn untooled_answer_finishes_in_one_round() {
        let provider = Arc::new(ScriptedProvider::new(vec![text_response("Paris", 12, 3)]));
        let agent = AgentLoop::new(provider.clone(), echo_registry());

        let result = agent.run("capital of France?", &[]).await.unwrap();
        assert_eq!(result.answer, "Paris");
        assert_eq!(result.usage, TokenUsage { input: 12, output: 3 });
        assert!(result.tool_calls.is_none());
        assert!(result.sources.is_none());
        assert_eq!(provider.call_count(), 1);
    }

    #[tokio::test]
    async fn tool_round_then_answer() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            tool_response(vec![("call_1", "echo", serde_json::json!({"text": "hi"}))]),
            text_response("done", 20, 8),
        ]));
        let agent = AgentLoop::new(provider.clone(), echo_registry());

        let result = agent.run("say hi", &[]).await.unwrap();
        assert_eq!(result.answer, "done");
        // Usage sums across both calls.
        assert_eq!(result.usage, TokenUsage { input: 30, output: 13 });
        let records = result.tool_calls.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].tool, "echo");
        assert_eq!(records[0].output, "hi");

        // The second call saw assistant turn + tool results appended.
        let seen = provider.seen.lock().unwrap();
        assert_eq!(seen[1].len(), 3);
        assert!(matches!(
            seen[1][2].content,
            MessageContent::ToolResults(_)
        ));
    }

    #[tokio::test]
    async fn parallel_results_keep_provider_order() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            tool_response(vec![
                ("call_a", "echo", serde_json::json!({"text": "first"})),
                ("call_b", "echo", serde_json::json!({"text": "second"})),
            ]),
            text_response("ok", 1, 1),
        ]));
        let agent = AgentLoop::new(provider.clone(), echo_registry());

        agent.run("go", &[]).await.unwrap();

        let seen = provider.seen.lock().unwrap();
        let MessageContent::ToolResults(parts) = &seen[1][2].content else {
            panic!("expected tool results message");
        };
        assert_eq!(parts[0].call_id, "call_a");
        assert_eq!(parts[0].content, "first");
        assert_eq!(parts[1].call_id, "call_b");
        assert_eq!(parts[1].content, "second");
    }

    #[tokio::test]
    async fn usage_accumulates_across_three_rounds() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            tool_response(vec![("c1", "echo", serde_json::json!({"text": "a"}))]),
            tool_response(vec![("c2", "echo", serde_json::json!({"text": "b"}))]),
            text_response("final", 100, 50),
        ]));
        let agent = AgentLoop::new(provider.clone(), echo_registry());

        let result = agent.run("go", &[]).await.unwrap();
        assert_eq!(
            result.usage,
            TokenUsage {
                input: 120,
                output: 60
            }
        );
        assert_eq!(provider.call_count(), 3);
    }

    #[tokio::test]
    async fn round_budget_is_exact() {
        // Ten tooled responses; the eleventh would be a final answer but the
        // loop must never ask for it.
        let mut responses: Vec<ChatResponse> = (0..10)
            .map(|i| {
                tool_response(vec![(
                    &format!("c{i}")[..],
                    "echo",
                    serde_json::json!({"text": "x"}),
                )])
            })
            .collect();
        responses.push(text_response("never seen", 1, 1));

        let provider = Arc::new(ScriptedProvider::new(responses));
        let agent = AgentLoop::new(provider.clone(), echo_registry());

        let err = agent.run("go", &[]).await.unwrap_err();
        assert!(matches!(err, Error::RoundsExhausted { rounds: 10 }));
        assert_eq!(provider.call_count(), 10);
    }

    #[tokio::test]
    async fn unknown_tool_becomes_result_text() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            tool_response(vec![("c1", "teleport", serde_json::json!({}))]),
            text_response("recovered", 1, 1),
        ]));
        let agent = AgentLoop::new(provider.clone(), echo_registry());

        let result = agent.run("go", &[]).await.unwrap();
        assert_eq!(result.answer, "recovered");
        let records = result.tool_calls.unwrap();
        assert_eq!(records[0].output, "Unknown tool: teleport");

        let seen = provider.seen.lock().unwrap();
        let MessageContent::ToolResults(parts) = &seen[1][2].content else {
            panic!("expected tool results message");
        };
        assert_eq!(parts[0].content, "Unknown tool: teleport");
    }

    #[tokio::test]
    async fn tool_failure_does_not_end_the_run() {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(StubTool {
            name: "flaky",
            outcome: |_| {
                Err(ToolError::ExecutionFailed {
                    tool_name: "flaky".into(),
                    reason: "backend down".into(),
                })
            },
        }));

        let provider = Arc::new(ScriptedProvider::new(vec![
            tool_response(vec![("c1", "flaky", serde_json::json!({}))]),
            text_response("answered anyway", 1, 1),
        ]));
        let agent = AgentLoop::new(provider.clone(), Arc::new(registry));

        let result = agent.run("go", &[]).await.unwrap();
        assert_eq!(result.answer, "answered anyway");
        let records = result.tool_calls.unwrap();
        assert!(records[0].output.starts_with("Error:"));
        assert!(records[0].output.contains("backend down"));
    }

    #[tokio::test]
    async fn provider_transport_error_is_fatal() {
        let provider = Arc::new(ScriptedProvider::new(vec![]));
        let agent = AgentLoop::new(provider, echo_registry());

        let err = agent.run("go", &[]).await.unwrap_err();
        assert!(matches!(err, Error::Provider(_)));
    }

    #[tokio::test]
    async fn history_seeds_the_conversation() {
        let provider = Arc::new(ScriptedProvider::new(vec![text_response("blue", 1, 1)]));
        let agent = AgentLoop::new(provider.clone(), echo_registry());

        let history = vec![Exchange {
            prompt: "pick a color".into(),
            answer: "I pick blue".into(),
        }];
        agent.run("which did you pick?", &history).await.unwrap();

        let seen = provider.seen.lock().unwrap();
        assert_eq!(seen[0].len(), 3);
        assert_eq!(seen[0][0].as_text(), Some("pick a color"));
        assert_eq!(seen[0][1].as_text(), Some("I pick blue"));
        assert_eq!(seen[0][2].as_text(), Some("which did you pick?"));
    }

    #[tokio::test]
    async fn artifacts_are_collected_and_optional() {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(StubTool {
            name: "searchish",
            outcome: |_| {
                Ok(ToolOutcome {
                    text: "found things".into(),
                    sources: vec![
                        Source {
                            title: "One".into(),
                            url: "https://one.example".into(),
                            snippet: None,
                        },
                        Source {
                            title: "Two".into(),
                            url: "https://two.example".into(),
                            snippet: Some("second".into()),
                        },
                    ],
                    images: vec!["https://img.example/a.png".into()],
                    code: None,
                    file: None,
                })
            },
        }));

        let provider = Arc::new(ScriptedProvider::new(vec![
            tool_response(vec![("c1", "searchish", serde_json::json!({"query": "x"}))]),
            text_response("summary", 1, 1),
        ]));
        let agent = AgentLoop::new(provider, Arc::new(registry));

        let result = agent.run("go", &[]).await.unwrap();
        assert_eq!(result.sources.as_ref().unwrap().len(), 2);
        assert_eq!(result.images.as_ref().unwrap().len(), 1);
        assert!(result.code_results.is_none());
        assert!(result.files.is_none());
    }

    #[tokio::test]
    async fn flattened_family_forces_final_answer() {
        // One tooled round, then the forced untooled call (served through
        // the default stream_chat wrapper around chat).
        let provider = Arc::new(
            ScriptedProvider::new(vec![
                tool_response(vec![("c1", "echo", serde_json::json!({"text": "data"}))]),
                text_response("the final answer", 30, 12),
            ])
            .flattened(),
        );
        let agent = AgentLoop::new(provider.clone(), echo_registry());

        let result = agent.run("go", &[]).await.unwrap();
        assert_eq!(result.answer, "the final answer");
        // 10+5 from the tooled call plus 30+12 from the forced call.
        assert_eq!(result.usage, TokenUsage { input: 40, output: 17 });
        assert_eq!(provider.call_count(), 2);

        // The forced call saw the flattened continuation.
        let seen = provider.seen.lock().unwrap();
        let last = &seen[1];
        assert!(last[2].as_text().unwrap().starts_with("Tool results:\ndata"));
    }

    #[tokio::test]
    async fn empty_final_answer_keeps_artifacts() {
        // The forced untooled call may legitimately stream no text; the run
        // still succeeds and the tool artifacts are not lost.
        let provider = Arc::new(
            ScriptedProvider::new(vec![
                tool_response(vec![("c1", "echo", serde_json::json!({"text": "data"}))]),
                text_response("", 8, 0),
            ])
            .flattened(),
        );
        let agent = AgentLoop::new(provider.clone(), echo_registry());

        let result = agent.run("go", &[]).await.unwrap();
        assert_eq!(result.answer, "");
        let records = result.tool_calls.unwrap();
        assert_eq!(records[0].output, "data");
        assert_eq!(result.usage, TokenUsage { input: 18, output: 5 });
        assert_eq!(provider.call_count(), 2);
    }

    #[tokio::test]
    async fn progress_events_cover_the_run() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            tool_response(vec![("c1", "echo", serde_json::json!({"text": "hi"}))]),
            text_response("done", 1, 1),
        ]));
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let agent = AgentLoop::new(provider, echo_registry()).with_progress(tx);

        agent.run("go", &[]).await.unwrap();

        let mut types = Vec::new();
        while let Ok(event) = rx.try_recv() {
            types.push(event.event_type());
        }
        assert_eq!(types, vec!["status", "tool", "status", "done"]);
    }

    #[tokio::test]
    async fn error_event_on_exhaustion() {
        let responses = (0..2)
            .map(|i| {
                tool_response(vec![(
                    &format!("c{i}")[..],
                    "echo",
                    serde_json::json!({"text": "x"}),
                )])
            })
            .collect();
        let provider = Arc::new(ScriptedProvider::new(responses));
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let agent = AgentLoop::new(provider, echo_registry())
            .with_max_rounds(2)
            .with_progress(tx);

        agent.run("go", &[]).await.unwrap_err();

        let mut saw_error = false;
        while let Ok(event) = rx.try_recv() {
            if let AgentEvent::Error { message } = event {
                assert!(message.contains("2 rounds"));
                saw_error = true;
            }
        }
        assert!(saw_error);
    }

    #[tokio::test]
    async fn dropped_progress_receiver_is_harmless() {
        let provider = Arc::new(ScriptedProvider::new(vec![text_response("ok", 1, 1)]));
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        drop(rx);
        let agent = AgentLoop::new(provider, echo_registry()).with_progress(tx);

        let result = agent.run("go", &[]).await.unwrap();
        assert_eq!(result.answer, "ok");
    }

    #[test]
    fn serialized_result_omits_empty_artifacts() {
        let result = RunAccumulator::default().into_result("hi".into());
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["answer"], "hi");
        assert!(json.get("sources").is_none());
        assert!(json.get("tool_calls").is_none());
        assert!(json.get("usage").is_some());
    }

    #[tokio::test]
    async fn final_answer_streams_token_events() {
        struct StreamingFinal;

        #[async_trait]
        impl Provider for StreamingFinal {
            fn name(&self) -> &str {
                "streaming"
            }

            async fn chat(
                &self,
                _messages: &[ChatMessage],
                _tools: &[ToolDefinition],
            ) -> std::result::Result<ChatResponse, ProviderError> {
                Ok(tool_response(vec![(
                    "c1",
                    "echo",
                    serde_json::json!({"text": "hi"}),
                )]))
            }

            async fn stream_chat(
                &self,
                _messages: &[ChatMessage],
                _tools: &[ToolDefinition],
            ) -> std::result::Result<
                tokio::sync::mpsc::Receiver<std::result::Result<StreamChunk, ProviderError>>,
                ProviderError,
            > {
                let (tx, rx) = tokio::sync::mpsc::channel(4);
                for text in ["Hel", "lo"] {
                    tx.send(Ok(StreamChunk {
                        content: Some(text.into()),
                        tool_calls: vec![],
                        done: false,
                        usage: None,
                    }))
                    .await
                    .unwrap();
                }
                tx.send(Ok(StreamChunk {
                    content: None,
                    tool_calls: vec![],
                    done: true,
                    usage: Some(TokenUsage { input: 5, output: 2 }),
                }))
                .await
                .unwrap();
                Ok(rx)
            }

            fn fold_tool_results(
                &self,
                messages: &mut Vec<ChatMessage>,
                _response: &ChatResponse,
                _results: &[ToolResultPart],
            ) -> FoldOutcome {
                messages.push(ChatMessage::assistant("[tool: echo]"));
                FoldOutcome::FinalAnswerCall
            }
        }

        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let agent = AgentLoop::new(Arc::new(StreamingFinal), echo_registry()).with_progress(tx);

        let result = agent.run("go", &[]).await.unwrap();
        assert_eq!(result.answer, "Hello");
        assert_eq!(result.usage, TokenUsage { input: 15, output: 7 });

        let mut tokens = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let AgentEvent::Token { text } = event {
                tokens.push(text);
            }
        }
        assert_eq!(tokens, vec!["Hel", "lo"]);
    }
}
