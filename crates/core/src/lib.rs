//! # Agentic Core
//!
//! Domain types, traits, and error definitions for the agentic-lite
//! tool-calling loop. This crate has **zero framework dependencies**; it
//! defines the domain model that all other crates implement against.
//!
//! ## Design Philosophy
//!
//! The two seams of the system are traits defined here: `Provider` (one
//! normalized chat exchange against an LLM backend, plus the continuation
//! strategy for folding tool results back into the conversation) and `Tool`
//! (one named capability with a JSON-schema input contract). Implementations
//! live in their respective crates; all crates depend inward on core.

pub mod config;
pub mod error;
pub mod message;
pub mod provider;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use config::{AskConfig, CodeConfig, Exchange, ProviderKind, SearchBackend, SearchConfig, ToolChoice};
pub use error::{Error, ProviderError, Result, ToolError};
pub use message::{ChatMessage, MessageContent, Role, ToolResultPart};
pub use provider::{
    ChatResponse, FoldOutcome, Provider, StopReason, StreamChunk, TokenUsage, ToolDefinition,
    ToolInvocation,
};
pub use tool::{
    CodeResult, FileAction, FileResult, Source, Tool, ToolCallRecord, ToolOutcome, ToolRegistry,
};
