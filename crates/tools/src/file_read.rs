//! File read tool.
//!
//! I/O failures are embedded in the result text and record so the model can
//! see what went wrong and try a different path.

use async_trait::async_trait;

use agentic_core::error::ToolError;
use agentic_core::tool::{FileAction, FileResult, Tool, ToolOutcome};

pub struct FileReadTool;

#[async_trait]
impl Tool for FileReadTool {
    fn name(&self) -> &str {
        "file_read"
    }

    fn description(&self) -> &str {
        "Read the contents of a file at the given path."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "The file path to read"
                }
            },
            "required": ["path"]
        })
    }

    async fn execute(&self, input: &serde_json::Value) -> Result<ToolOutcome, ToolError> {
        let path = input["path"].as_str().map(str::trim).unwrap_or("");
        if path.is_empty() {
            return Ok(ToolOutcome::text("Error: No path provided"));
        }

        let text = match tokio::fs::read_to_string(path).await {
            Ok(content) => content,
            Err(e) => format!("Error: {e}"),
        };

        Ok(ToolOutcome {
            text: text.clone(),
            file: Some(FileResult {
                path: path.to_string(),
                action: FileAction::Read,
                content: Some(text),
            }),
            ..Default::default()
        })
    }
}
