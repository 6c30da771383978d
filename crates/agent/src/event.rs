//! Progress events emitted while a run is in flight.
//!
//! Events are advisory. They go out over an unbounded channel when the
//! caller attached one, and a dropped receiver never affects the run.

use serde::{Deserialize, Serialize};

/// How much tool output an event carries before truncation.
const TOOL_PREVIEW_CHARS: usize = 200;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentEvent {
    /// A coarse phase change (round started, tool running).
    Status { message: String },

    /// A text delta of the answer as it streams.
    Token { text: String },

    /// A tool finished; carries a preview of its output.
    Tool { name: String, output: String },

    /// The run produced its answer.
    Done,

    /// The run failed.
    Error { message: String },
}

impl AgentEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            AgentEvent::Status { .. } => "status",
            AgentEvent::Token { .. } => "token",
            AgentEvent::Tool { .. } => "tool",
            AgentEvent::Done => "done",
            AgentEvent::Error { .. } => "error",
        }
    }

    /// A tool event with the output truncated to a preview.
    pub fn tool(name: impl Into<String>, output: &str) -> Self {
        let output = if output.chars().count() > TOOL_PREVIEW_CHARS {
            let truncated: String = output.chars().take(TOOL_PREVIEW_CHARS).collect();
            format!("{truncated}...")
        } else {
            output.to_string()
        };
        AgentEvent::Tool {
            name: name.into(),
            output,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_with_type_tag() {
        let event = AgentEvent::Status {
            message: "round 1".into(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "status");
        assert_eq!(json["message"], "round 1");

        let done = serde_json::to_value(AgentEvent::Done).unwrap();
        assert_eq!(done["type"], "done");
    }

    #[test]
    fn tool_event_truncates_long_output() {
        let long = "x".repeat(500);
        let event = AgentEvent::tool("web_search", &long);
        let AgentEvent::Tool { output, .. } = event else {
            panic!("expected tool event");
        };
        assert_eq!(output.len(), 203); // 200 chars + "..."
        assert!(output.ends_with("..."));
    }

    #[test]
    fn tool_event_keeps_short_output() {
        let event = AgentEvent::tool("code_exec", "42");
        let AgentEvent::Tool { output, .. } = event else {
            panic!("expected tool event");
        };
        assert_eq!(output, "42");
    }

    #[test]
    fn event_type_names() {
        assert_eq!(AgentEvent::Done.event_type(), "done");
        assert_eq!(
            AgentEvent::Token { text: "a".into() }.event_type(),
            "token"
        );
    }
}
