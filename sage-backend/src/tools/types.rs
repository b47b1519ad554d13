use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use strum::{AsRefStr, Display, EnumIter, EnumString, IntoStaticStr};

/// Every tool the backend knows about.
///
/// Plan steps and DAG tasks name tools by string; anything that does not
/// parse into this enum is rejected as an unknown tool.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
    IntoStaticStr,
    EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ToolName {
    SerperWebSearch,
    SerperNewsSearch,
    Coingecko,
    /// Weather lookup
    Wheat,
    WikipediaContent,
    WebScrape,
    /// Search results served by the companion scraping worker
    WorkerWebSearch,
}

impl ToolName {
    pub fn kind(&self) -> ToolKind {
        match self {
            ToolName::SerperWebSearch | ToolName::SerperNewsSearch | ToolName::WorkerWebSearch => {
                ToolKind::WebSearch
            }
            ToolName::Coingecko | ToolName::Wheat => ToolKind::Data,
            ToolName::WikipediaContent => ToolKind::Encyclopedia,
            ToolName::WebScrape => ToolKind::Scrape,
        }
    }
}

/// Capability class of a tool, used to partition batch results
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolKind {
    /// Returns a list of `{title, link, snippet}` results
    WebSearch,
    /// Structured lookups such as prices and weather
    Data,
    /// Full article content
    Encyclopedia,
    /// Readable text of a single page
    Scrape,
}

/// Tool definition exposed to planners and the HTTP API
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: ToolName,
    pub description: String,
    pub kind: ToolKind,
}

impl ToolDefinition {
    pub fn new(name: ToolName, description: impl Into<String>) -> Self {
        Self {
            name,
            description: description.into(),
            kind: name.kind(),
        }
    }
}

/// Normalized output of every tool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolOutput {
    pub data: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
}

impl ToolOutput {
    pub fn new(data: Value) -> Self {
        Self {
            data,
            source_url: None,
        }
    }

    pub fn with_source(mut self, url: impl Into<String>) -> Self {
        self.source_url = Some(url.into());
        self
    }
}

/// One entry of a normalized web search result list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchHit {
    pub title: String,
    pub link: String,
    #[serde(default)]
    pub snippet: String,
}

impl SearchHit {
    /// Read the hits out of a web search tool's `data`
    pub fn from_data(data: &Value) -> Vec<SearchHit> {
        data.get("results")
            .and_then(|v| v.as_array())
            .map(|items| {
                items
                    .iter()
                    .filter_map(|item| serde_json::from_value::<SearchHit>(item.clone()).ok())
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Context shared by all tools: HTTP client, API keys and endpoint overrides
#[derive(Clone)]
pub struct ToolContext {
    pub http: reqwest::Client,
    /// Additional context data
    pub extra: HashMap<String, Value>,
    /// Allow scraping of loopback/private hosts (tests and local workers only)
    pub allow_private_hosts: bool,
}

impl std::fmt::Debug for ToolContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let keys: Vec<&String> = self.extra.keys().collect();
        f.debug_struct("ToolContext")
            .field("extra_keys", &keys)
            .field("allow_private_hosts", &self.allow_private_hosts)
            .finish()
    }
}

impl Default for ToolContext {
    fn default() -> Self {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .user_agent("SageBot/1.0")
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        ToolContext {
            http,
            extra: HashMap::new(),
            allow_private_hosts: false,
        }
    }
}

impl ToolContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an API key to the context
    /// Keys are stored by their exact name (e.g., "SERPER_API_KEY")
    pub fn with_api_key(mut self, key_name: &str, key_value: String) -> Self {
        self.extra.insert(
            format!("api_key_{}", key_name),
            serde_json::json!(key_value),
        );
        self
    }

    /// Get an API key from the context by its exact name
    pub fn get_api_key(&self, key_name: &str) -> Option<String> {
        self.extra
            .get(&format!("api_key_{}", key_name))
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
            .map(|s| s.to_string())
    }

    /// Override the base URL a tool talks to
    pub fn with_endpoint(mut self, tool: ToolName, base_url: impl Into<String>) -> Self {
        self.extra.insert(
            format!("endpoint_{}", tool),
            Value::String(base_url.into()),
        );
        self
    }

    /// Base URL for a tool, falling back to its public default
    pub fn endpoint(&self, tool: ToolName, default: &str) -> String {
        self.extra
            .get(&format!("endpoint_{}", tool))
            .and_then(|v| v.as_str())
            .unwrap_or(default)
            .trim_end_matches('/')
            .to_string()
    }

    pub fn with_private_hosts_allowed(mut self, allowed: bool) -> Self {
        self.allow_private_hosts = allowed;
        self
    }
}
