//! Built-in tool implementations for agentic-lite.
//!
//! Tools give the loop its external capabilities: web search against a real
//! search backend, a sandboxed expression evaluator for arithmetic the model
//! is bad at, and plain file read/write.

pub mod code;
pub mod file_read;
pub mod file_write;
pub mod search;

use agentic_core::config::{AskConfig, ToolChoice};
use agentic_core::tool::ToolRegistry;

pub use code::CodeExecTool;
pub use file_read::FileReadTool;
pub use file_write::FileWriteTool;
pub use search::WebSearchTool;

/// Build the registry of enabled tools for one run.
///
/// Registration order follows `config.tools`, so the catalog the model sees
/// is deterministic. The `file` choice contributes both the read and the
/// write tool.
pub fn build_registry(config: &AskConfig) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    for choice in &config.tools {
        match choice {
            ToolChoice::Search => {
                registry.register(Box::new(WebSearchTool::new(config.search.clone())));
            }
            ToolChoice::Code => {
                registry.register(Box::new(CodeExecTool::new(config.code.clone())));
            }
            ToolChoice::File => {
                registry.register(Box::new(FileReadTool));
                registry.register(Box::new(FileWriteTool));
            }
        }
    }
    registry
}
