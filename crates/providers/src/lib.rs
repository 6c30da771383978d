//! Provider adapters for agentic-lite.
//!
//! Two families are modeled, each implementing `agentic_core::Provider`:
//!
//! - `AnthropicProvider`: structured continuation; tool results travel as
//!   native `tool_result` content blocks after a verbatim replay of the
//!   assistant turn.
//! - `OpenAiCompatProvider`: flattened continuation; tool results are
//!   rendered as plain text and a final untooled call forces the answer.
//!   Also defends against proxies that answer a non-streaming request with
//!   an SSE body (see `reassemble`).
//!
//! The router selects the family explicitly or infers it from the base URL
//! / API key prefix.

pub mod anthropic;
pub mod openai_compat;
pub mod reassemble;
pub mod router;

pub use anthropic::AnthropicProvider;
pub use openai_compat::OpenAiCompatProvider;
pub use router::{create_provider, detect_family};
