//! Run configuration.
//!
//! A plain immutable value passed into each run, with no process-wide state.
//! Loading it (env vars, request bodies, files) is the hosting surface's
//! problem.

use serde::{Deserialize, Serialize};

/// Which provider family to talk to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// Structured-continuation family (native tool-result content blocks).
    Anthropic,
    /// Flattened-continuation family (OpenAI-compatible endpoints and the
    /// proxies that imitate them).
    OpenAi,
}

/// A tool the caller wants enabled. `File` contributes two schemas
/// (read and write).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolChoice {
    Search,
    Code,
    File,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchBackend {
    #[default]
    Tavily,
    Serper,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchConfig {
    /// API key for the search backend. Search fails without one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default)]
    pub backend: SearchBackend,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodeConfig {
    /// Wall-clock budget for one code execution, in milliseconds.
    #[serde(default = "default_code_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_code_timeout_ms() -> u64 {
    5_000
}

impl Default for CodeConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_code_timeout_ms(),
        }
    }
}

/// One prior (prompt, answer) turn used to seed the conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Exchange {
    pub prompt: String,
    pub answer: String,
}

/// Configuration for one run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AskConfig {
    /// Explicit provider family. When absent, inferred from the base URL or
    /// the API key prefix.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<ProviderKind>,

    pub api_key: String,

    /// Base URL override (custom endpoints, proxies).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    /// Model name; each family has its own default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    /// Enabled tools, defaults to search only.
    #[serde(default = "default_tools")]
    pub tools: Vec<ToolChoice>,

    #[serde(default)]
    pub search: SearchConfig,

    #[serde(default)]
    pub code: CodeConfig,

    /// Prior turns, oldest first.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub history: Vec<Exchange>,
}

fn default_tools() -> Vec<ToolChoice> {
    vec![ToolChoice::Search]
}

impl AskConfig {
    /// Config with the given API key and all other fields at their defaults.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            provider: None,
            api_key: api_key.into(),
            base_url: None,
            model: None,
            tools: default_tools(),
            search: SearchConfig::default(),
            code: CodeConfig::default(),
            history: Vec::new(),
        }
    }

    pub fn with_provider(mut self, kind: ProviderKind) -> Self {
        self.provider = Some(kind);
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_tools(mut self, tools: Vec<ToolChoice>) -> Self {
        self.tools = tools;
        self
    }
}
