//! Web search tool backed by Tavily (default) or Serper.
//!
//! Needs an API key for the chosen backend; without one the tool fails at
//! execution time, which the loop renders as result text for the model.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

use agentic_core::config::{SearchBackend, SearchConfig};
use agentic_core::error::ToolError;
use agentic_core::tool::{Source, Tool, ToolOutcome};

const TAVILY_URL: &str = "https://api.tavily.com/search";
const SERPER_URL: &str = "https://google.serper.dev/search";
const MAX_RESULTS: usize = 5;

pub struct WebSearchTool {
    config: SearchConfig,
    client: reqwest::Client,
}

impl WebSearchTool {
    pub fn new(config: SearchConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .expect("Failed to create HTTP client");
        Self { config, client }
    }

    async fn search_tavily(&self, api_key: &str, query: &str) -> Result<ToolOutcome, ToolError> {
        let body = serde_json::json!({
            "api_key": api_key,
            "query": query,
            "max_results": MAX_RESULTS,
            "include_answer": true,
            "include_images": true,
        });

        let response: TavilyResponse = self
            .send(self.client.post(TAVILY_URL).json(&body))
            .await?;

        let sources: Vec<Source> = response
            .results
            .iter()
            .map(|r| Source {
                title: r.title.clone(),
                url: r.url.clone(),
                snippet: if r.content.is_empty() {
                    None
                } else {
                    Some(r.content.clone())
                },
            })
            .collect();

        // Tavily can synthesize an answer; fall back to joined snippets.
        let text = match response.answer {
            Some(answer) if !answer.is_empty() => answer,
            _ if response.results.is_empty() => "No results found".to_string(),
            _ => response
                .results
                .iter()
                .map(|r| format!("{}: {}", r.title, r.content))
                .collect::<Vec<_>>()
                .join("\n"),
        };

        let images = response
            .images
            .into_iter()
            .filter_map(|img| match img {
                serde_json::Value::String(url) => Some(url),
                serde_json::Value::Object(obj) => {
                    obj.get("url").and_then(|u| u.as_str()).map(String::from)
                }
                _ => None,
            })
            .collect();

        Ok(ToolOutcome {
            text,
            sources,
            images,
            code: None,
            file: None,
        })
    }

    async fn search_serper(&self, api_key: &str, query: &str) -> Result<ToolOutcome, ToolError> {
        let response: SerperResponse = self
            .send(
                self.client
                    .post(SERPER_URL)
                    .header("X-API-KEY", api_key)
                    .json(&serper_body(query)),
            )
            .await?;

        let results: Vec<_> = response.organic.into_iter().take(MAX_RESULTS).collect();

        let sources: Vec<Source> = results
            .iter()
            .map(|r| Source {
                title: r.title.clone(),
                url: r.link.clone(),
                snippet: r.snippet.clone(),
            })
            .collect();

        let text = if results.is_empty() {
            "No results found".to_string()
        } else {
            results
                .iter()
                .map(|r| format!("{}: {}", r.title, r.snippet.as_deref().unwrap_or("")))
                .collect::<Vec<_>>()
                .join("\n")
        };

        Ok(ToolOutcome {
            text,
            sources,
            images: Vec::new(),
            code: None,
            file: None,
        })
    }

    async fn send<T: serde::de::DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<T, ToolError> {
        let response = request.send().await.map_err(|e| ToolError::ExecutionFailed {
            tool_name: "web_search".into(),
            reason: e.to_string(),
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), body = %body, "Search backend error");
            return Err(ToolError::ExecutionFailed {
                tool_name: "web_search".into(),
                reason: format!("search backend returned {status}"),
            });
        }

        response.json().await.map_err(|e| ToolError::ExecutionFailed {
            tool_name: "web_search".into(),
            reason: format!("bad search response: {e}"),
        })
    }
}

/// Serper limits server-side via `num`; the `take` on the response is a
/// guard against backends that ignore it.
fn serper_body(query: &str) -> serde_json::Value {
    serde_json::json!({ "q": query, "num": MAX_RESULTS })
}

#[async_trait]
impl Tool for WebSearchTool {
    fn name(&self) -> &str {
        "web_search"
    }

    fn description(&self) -> &str {
        "Search the web for current information. Returns an answer summary and a list of sources."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "The search query"
                }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, input: &serde_json::Value) -> Result<ToolOutcome, ToolError> {
        let query = input["query"].as_str().map(str::trim).unwrap_or("");
        if query.is_empty() {
            return Ok(ToolOutcome::text("No query provided"));
        }

        let Some(api_key) = self.config.api_key.as_deref() else {
            return Err(ToolError::NotConfigured(
                "web_search requires a search API key".into(),
            ));
        };

        debug!(backend = ?self.config.backend, query, "Running web search");

        match self.config.backend {
            SearchBackend::Tavily => self.search_tavily(api_key, query).await,
            SearchBackend::Serper => self.search_serper(api_key, query).await,
        }
    }
}

#[derive(Debug, Deserialize)]
struct TavilyResponse {
    #[serde(default)]
    answer: Option<String>,
    #[serde(default)]
    results: Vec<TavilyResult>,
    #[serde(default)]
    images: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct TavilyResult {
    #[serde(default)]
    title: String,
    #[serde(default)]
    url: String,
    #[serde(default)]
    content: String,
}

#[derive(Debug, Deserialize)]
struct SerperResponse {
    #[serde(default)]
    organic: Vec<SerperResult>,
}

#[derive(Debug, Deserialize)]
struct SerperResult {
    #[serde(default)]
    title: String,
    #[serde(default)]
    link: String,
    #[serde(default)]
    snippet: Option<String>,
}
