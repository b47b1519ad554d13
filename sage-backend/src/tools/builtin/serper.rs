//! Serper (Google search API) adapters for web and news search

use super::http::{param_str, param_u64, require_api_key, send_json};
use super::SERPER_API_KEY;
use crate::error::ToolError;
use crate::tools::registry::Tool;
use crate::tools::types::{ToolContext, ToolDefinition, ToolName, ToolOutput};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

const DEFAULT_BASE_URL: &str = "https://google.serper.dev";
const DEFAULT_RESULTS: u64 = 8;
const MAX_RESULTS: u64 = 20;

#[derive(Debug, Deserialize)]
struct SerperItem {
    #[serde(default)]
    title: String,
    #[serde(default)]
    link: String,
    #[serde(default)]
    snippet: String,
    #[serde(default)]
    date: Option<String>,
    #[serde(default)]
    source: Option<String>,
}

/// One adapter serves both endpoints; `name` picks which
pub struct SerperSearchTool {
    name: ToolName,
    path: &'static str,
    /// Key of the result array in the response body
    results_key: &'static str,
}

impl SerperSearchTool {
    pub fn web() -> Self {
        SerperSearchTool {
            name: ToolName::SerperWebSearch,
            path: "search",
            results_key: "organic",
        }
    }

    pub fn news() -> Self {
        SerperSearchTool {
            name: ToolName::SerperNewsSearch,
            path: "news",
            results_key: "news",
        }
    }
}

#[async_trait]
impl Tool for SerperSearchTool {
    fn definition(&self) -> ToolDefinition {
        let description = match self.name {
            ToolName::SerperNewsSearch => {
                "Search recent news articles. Params: num (max results), gl (country code)."
            }
            _ => "Search the web with Google. Params: num (max results), gl (country code).",
        };
        ToolDefinition::new(self.name, description)
    }

    async fn execute(
        &self,
        query: &str,
        params: &Value,
        context: &ToolContext,
    ) -> Result<ToolOutput, ToolError> {
        let api_key = require_api_key(context, self.name, SERPER_API_KEY)?;
        let num = param_u64(params, "num")
            .unwrap_or(DEFAULT_RESULTS)
            .clamp(1, MAX_RESULTS);

        let mut body = json!({ "q": query, "num": num });
        if let Some(gl) = param_str(params, "gl") {
            body["gl"] = json!(gl);
        }

        let base = context.endpoint(self.name, DEFAULT_BASE_URL);
        let response = send_json(
            self.name,
            context
                .http
                .post(format!("{}/{}", base, self.path))
                .header("X-API-KEY", api_key)
                .json(&body),
        )
        .await?;

        let items: Vec<SerperItem> = match response.get(self.results_key) {
            Some(list) => serde_json::from_value(list.clone()).map_err(|e| {
                ToolError::InvalidResponse {
                    tool: self.name.to_string(),
                    message: format!("unexpected '{}' shape: {}", self.results_key, e),
                }
            })?,
            None => Vec::new(),
        };

        let results: Vec<Value> = items
            .into_iter()
            .filter(|item| !item.link.is_empty())
            .map(|item| {
                let mut entry = json!({
                    "title": item.title,
                    "link": item.link,
                    "snippet": item.snippet,
                });
                if let Some(date) = item.date {
                    entry["date"] = json!(date);
                }
                if let Some(source) = item.source {
                    entry["source"] = json!(source);
                }
                entry
            })
            .collect();

        log::info!(
            "[TOOLS] {} returned {} results for '{}'",
            self.name,
            results.len(),
            query
        );

        let mut data = json!({ "query": query, "results": results });
        if let Some(answer) = response.pointer("/answerBox/answer").and_then(|v| v.as_str()) {
            data["answer"] = json!(answer);
        }
        Ok(ToolOutput::new(data))
    }
}
