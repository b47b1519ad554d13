//! Search results from the companion scraping worker.
//!
//! The worker answers `GET {base}/search?q=...` with either
//! `{"results": [...]}` or a bare array; entries may name their link `link`
//! or `url`.

use super::http::{param_u64, send_json};
use crate::error::ToolError;
use crate::tools::registry::Tool;
use crate::tools::types::{ToolContext, ToolDefinition, ToolName, ToolOutput};
use async_trait::async_trait;
use serde_json::{json, Value};

pub const SCRAPER_WORKER_URL: &str = "SCRAPER_WORKER_URL";

pub struct WorkerSearchTool;

impl WorkerSearchTool {
    pub fn new() -> Self {
        WorkerSearchTool
    }
}

impl Default for WorkerSearchTool {
    fn default() -> Self {
        Self::new()
    }
}

fn normalize_entry(entry: &Value) -> Option<Value> {
    let link = entry
        .get("link")
        .or_else(|| entry.get("url"))
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())?;
    let text = |key: &str| entry.get(key).and_then(|v| v.as_str()).unwrap_or("");
    let snippet = if text("snippet").is_empty() {
        text("description")
    } else {
        text("snippet")
    };
    Some(json!({
        "title": text("title"),
        "link": link,
        "snippet": snippet,
    }))
}

#[async_trait]
impl Tool for WorkerSearchTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new(
            ToolName::WorkerWebSearch,
            "Web search served by the scraping worker. Params: limit (max results).",
        )
    }

    async fn execute(
        &self,
        query: &str,
        params: &Value,
        context: &ToolContext,
    ) -> Result<ToolOutput, ToolError> {
        let name = ToolName::WorkerWebSearch;
        let base = context.endpoint(name, "");
        if base.is_empty() {
            return Err(ToolError::NotConfigured {
                tool: name.to_string(),
                setting: SCRAPER_WORKER_URL.to_string(),
            });
        }

        let url = format!("{}/search?q={}", base, urlencoding::encode(query));
        let response = send_json(name, context.http.get(&url)).await?;

        let entries = match &response {
            Value::Array(items) => items.as_slice(),
            other => other
                .get("results")
                .and_then(|v| v.as_array())
                .map(|v| v.as_slice())
                .ok_or_else(|| ToolError::InvalidResponse {
                    tool: name.to_string(),
                    message: "expected a 'results' array".to_string(),
                })?,
        };

        let limit = param_u64(params, "limit").unwrap_or(10) as usize;
        let results: Vec<Value> = entries
            .iter()
            .filter_map(normalize_entry)
            .take(limit)
            .collect();

        log::info!(
            "[TOOLS] worker search returned {} results for '{}'",
            results.len(),
            query
        );
        Ok(ToolOutput::new(json!({ "query": query, "results": results })))
    }
}
