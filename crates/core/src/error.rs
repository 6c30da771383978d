//! Error types for the agentic-lite domain.
//!
//! Uses `thiserror` for ergonomic error definitions. Fatal conditions
//! (provider transport failures, round-budget exhaustion) get distinct
//! variants so callers can tell "the model never converged" apart from
//! "a dependency failed". Tool failures are NOT here; they are captured
//! as result text and fed back to the model.

use thiserror::Error;

/// The top-level error type for a run.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    /// The model kept requesting tools for every round in the budget.
    #[error("Agent loop exceeded {rounds} rounds")]
    RoundsExhausted { rounds: u32 },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    Api { status_code: u16, message: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Stream interrupted: {0}")]
    StreamInterrupted(String),
}

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Tool not found: {0}")]
    NotFound(String),

    #[error("Invalid tool arguments: {0}")]
    InvalidArguments(String),

    #[error("Tool not configured: {0}")]
    NotConfigured(String),

    #[error("Tool execution failed: {tool_name}: {reason}")]
    ExecutionFailed { tool_name: String, reason: String },
}
