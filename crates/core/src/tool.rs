//! Tool trait, artifact types, and the registry.
//!
//! Tools are the loop's external capabilities: web search, sandboxed code
//! evaluation, file I/O. Each execution produces a textual result for the
//! model plus optional structured side artifacts (sources, images, a code
//! record, a file record) that the loop accumulates for the caller.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ToolError;
use crate::provider::{ToolDefinition, ToolInvocation};

/// A source citation from a search result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Source {
    pub title: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snippet: Option<String>,
}

/// One code-execution record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodeResult {
    pub code: String,
    pub output: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileAction {
    Read,
    Write,
}

/// One file-operation record. Errors are embedded in `content`, not thrown.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileResult {
    pub path: String,
    pub action: FileAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

/// One entry in the run's raw tool-call log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallRecord {
    pub tool: String,
    pub input: serde_json::Value,
    pub output: String,
}

/// What a tool execution hands back to the loop.
#[derive(Debug, Clone, Default)]
pub struct ToolOutcome {
    /// The textual result fed back to the model.
    pub text: String,

    pub sources: Vec<Source>,
    pub images: Vec<String>,
    pub code: Option<CodeResult>,
    pub file: Option<FileResult>,
}

impl ToolOutcome {
    /// An outcome carrying only result text.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }
}

/// The core Tool trait.
///
/// Tool failures are data: implementations either embed the error in the
/// outcome or return a `ToolError` that the loop renders as result text for
/// the model; a tool failure is never fatal to the run.
#[async_trait]
pub trait Tool: Send + Sync {
    /// The wire name of this tool (e.g., "web_search", "code_exec").
    fn name(&self) -> &str;

    /// A description of what this tool does (sent to the LLM).
    fn description(&self) -> &str;

    /// JSON Schema describing this tool's parameters.
    fn parameters_schema(&self) -> serde_json::Value;

    /// Execute the tool with the given structured input.
    async fn execute(
        &self,
        input: &serde_json::Value,
    ) -> std::result::Result<ToolOutcome, ToolError>;

    /// Convert this tool into a ToolDefinition for the catalog.
    fn to_definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters_schema(),
        }
    }
}

/// A registry of enabled tools, preserving registration order so the
/// catalog sent to the model is deterministic.
pub struct ToolRegistry {
    tools: Vec<Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self { tools: Vec::new() }
    }

    /// Register a tool.
    pub fn register(&mut self, tool: Box<dyn Tool>) {
        self.tools.push(tool);
    }

    /// Get a tool by name.
    pub fn get(&self, name: &str) -> Option<&dyn Tool> {
        self.tools
            .iter()
            .find(|t| t.name() == name)
            .map(|t| t.as_ref())
    }

    /// All tool definitions, in registration order.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.iter().map(|t| t.to_definition()).collect()
    }

    /// Execute a tool invocation.
    pub async fn execute(
        &self,
        call: &ToolInvocation,
    ) -> std::result::Result<ToolOutcome, ToolError> {
        let tool = self
            .get(&call.name)
            .ok_or_else(|| ToolError::NotFound(call.name.clone()))?;
        tool.execute(&call.input).await
    }

    /// List all registered tool names.
    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}
