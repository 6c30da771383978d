//! Provider selection.

use std::sync::Arc;

use tracing::debug;

use agentic_core::config::{AskConfig, ProviderKind};
use agentic_core::provider::Provider;

use crate::anthropic::AnthropicProvider;
use crate::openai_compat::OpenAiCompatProvider;

/// Infer the provider family when the config does not name one. A base URL
/// mentioning anthropic, or an `sk-ant-` key, means Anthropic; everything
/// else is treated as OpenAI-compatible.
pub fn detect_family(config: &AskConfig) -> ProviderKind {
    if let Some(base_url) = &config.base_url {
        if base_url.contains("anthropic") {
            return ProviderKind::Anthropic;
        }
    }
    if config.api_key.starts_with("sk-ant-") {
        return ProviderKind::Anthropic;
    }
    ProviderKind::OpenAi
}

/// Build the provider for one run.
pub fn create_provider(config: &AskConfig) -> Arc<dyn Provider> {
    let kind = config.provider.unwrap_or_else(|| detect_family(config));
    debug!(?kind, "Selected provider family");

    match kind {
        ProviderKind::Anthropic => {
            let mut provider = AnthropicProvider::new(&config.api_key);
            if let Some(base_url) = &config.base_url {
                provider = provider.with_base_url(base_url);
            }
            if let Some(model) = &config.model {
                provider = provider.with_model(model);
            }
            Arc::new(provider)
        }
        ProviderKind::OpenAi => {
            let mut provider = OpenAiCompatProvider::new(&config.api_key);
            if let Some(base_url) = &config.base_url {
                provider = provider.with_base_url(base_url);
            }
            if let Some(model) = &config.model {
                provider = provider.with_model(model);
            }
            Arc::new(provider)
        }
    }
}
