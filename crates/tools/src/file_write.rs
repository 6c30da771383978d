//! File write tool.

use async_trait::async_trait;

use agentic_core::error::ToolError;
use agentic_core::tool::{FileAction, FileResult, Tool, ToolOutcome};

pub struct FileWriteTool;

#[async_trait]
impl Tool for FileWriteTool {
    fn name(&self) -> &str {
        "file_write"
    }

    fn description(&self) -> &str {
        "Write content to a file at the given path, replacing any existing content."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "The file path to write"
                },
                "content": {
                    "type": "string",
                    "description": "The content to write"
                }
            },
            "required": ["path", "content"]
        })
    }

    async fn execute(&self, input: &serde_json::Value) -> Result<ToolOutcome, ToolError> {
        let path = input["path"].as_str().map(str::trim).unwrap_or("");
        if path.is_empty() {
            return Ok(ToolOutcome::text("Error: No path provided"));
        }
        let content = input["content"].as_str().unwrap_or("");

        let text = match tokio::fs::write(path, content).await {
            Ok(()) => format!("Wrote {} bytes to {}", content.len(), path),
            Err(e) => format!("Error: {e}"),
        };

        Ok(ToolOutcome {
            text: text.clone(),
            file: Some(FileResult {
                path: path.to_string(),
                action: FileAction::Write,
                content: if text.starts_with("Error:") {
                    Some(text)
                } else {
                    None
                },
            }),
            ..Default::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn write_creates_file() {
        let dir = tempfile::tempdir().unwrap();
        let file_path = dir.path().join("out.txt");

        let tool = FileWriteTool;
        let outcome = tool
            .execute(&serde_json::json!({
                "path": file_path.to_str().unwrap(),
                "content": "saved"
            }))
            .await
            .unwrap();

        assert_eq!(
            outcome.text,
            format!("Wrote 5 bytes to {}", file_path.display())
        );
        let record = outcome.file.unwrap();
        assert_eq!(record.action, FileAction::Write);
        assert!(record.content.is_none());
        assert_eq!(std::fs::read_to_string(&file_path).unwrap(), "saved");
    }

    #[tokio::test]
    async fn write_to_bad_path_embeds_error() {
        let tool = FileWriteTool;
        let outcome = tool
            .execute(&serde_json::json!({
                "path": "/nonexistent_dir_13579/out.txt",
                "content": "x"
            }))
            .await
            .unwrap();

        assert!(outcome.text.starts_with("Error:"));
        assert!(outcome.file.unwrap().content.unwrap().starts_with("Error:"));
    }

    #[tokio::test]
    async fn missing_path_argument() {
        let tool = FileWriteTool;
        let outcome = tool
            .execute(&serde_json::json!({"content": "x"}))
            .await
            .unwrap();
        assert_eq!(outcome.text, "Error: No path provided");
        assert!(outcome.file.is_none());
    }
}
