//! The agentic-lite entry point: one prompt in, one answer out, with a
//! bounded tool-calling loop in between.
//!
//! ```no_run
//! use agentic_agent::{ask, AskConfig};
//!
//! # async fn demo() -> Result<(), agentic_core::Error> {
//! let config = AskConfig::new("sk-ant-api03-...");
//! let result = ask("What shipped in the latest Rust release?", &config).await?;
//! println!("{}", result.answer);
//! # Ok(())
//! # }
//! ```

pub mod event;
pub mod loop_runner;

use std::sync::Arc;

use tokio::sync::mpsc::UnboundedSender;

use agentic_core::error::Result;

pub use agentic_core::config::{
    AskConfig, CodeConfig, Exchange, ProviderKind, SearchBackend, SearchConfig, ToolChoice,
};
pub use agentic_core::provider::TokenUsage;
pub use event::AgentEvent;
pub use loop_runner::{AgentLoop, AskResult};

/// Run one prompt through the tool-calling loop.
pub async fn ask(prompt: &str, config: &AskConfig) -> Result<AskResult> {
    let provider = agentic_providers::create_provider(config);
    let tools = Arc::new(agentic_tools::build_registry(config));
    AgentLoop::new(provider, tools).run(prompt, &config.history).await
}

/// Like [`ask`], but emits progress events on the given channel while the
/// run is in flight.
pub async fn ask_with_progress(
    prompt: &str,
    config: &AskConfig,
    progress: UnboundedSender<AgentEvent>,
) -> Result<AskResult> {
    let provider = agentic_providers::create_provider(config);
    let tools = Arc::new(agentic_tools::build_registry(config));
    AgentLoop::new(provider, tools)
        .with_progress(progress)
        .run(prompt, &config.history)
        .await
}
