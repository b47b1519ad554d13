//! Wikipedia article content: rendered HTML plus the article's media list.
//!
//! The query is an article title, with spaces or underscores. The media list
//! is optional; a failure there only empties `images`.

use super::http::{send_json, send_text, truncate_chars};
use crate::error::ToolError;
use crate::tools::registry::Tool;
use crate::tools::types::{ToolContext, ToolDefinition, ToolName, ToolOutput};
use async_trait::async_trait;
use serde_json::{json, Value};

const DEFAULT_BASE_URL: &str = "https://en.wikipedia.org";
/// Articles are cut to this many characters of HTML before extraction
const MAX_HTML_CHARS: usize = 60_000;
const MAX_IMAGES: usize = 12;

pub struct WikipediaContentTool;

impl WikipediaContentTool {
    pub fn new() -> Self {
        WikipediaContentTool
    }
}

impl Default for WikipediaContentTool {
    fn default() -> Self {
        Self::new()
    }
}

/// Canonical path segment for an article title
pub fn title_segment(title: &str) -> String {
    urlencoding::encode(&title.trim().replace(' ', "_")).into_owned()
}

fn image_list(media: &Value) -> Vec<Value> {
    media
        .get("items")
        .and_then(|v| v.as_array())
        .map(|items| {
            items
                .iter()
                .filter(|item| item.get("type").and_then(|t| t.as_str()) == Some("image"))
                .filter_map(|item| {
                    let src = item
                        .pointer("/srcset/0/src")
                        .and_then(|v| v.as_str())?;
                    let src = if src.starts_with("//") {
                        format!("https:{}", src)
                    } else {
                        src.to_string()
                    };
                    Some(json!({
                        "title": item.get("title").and_then(|v| v.as_str()).unwrap_or(""),
                        "src": src,
                        "caption": item.pointer("/caption/text").and_then(|v| v.as_str()),
                    }))
                })
                .take(MAX_IMAGES)
                .collect()
        })
        .unwrap_or_default()
}

#[async_trait]
impl Tool for WikipediaContentTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new(
            ToolName::WikipediaContent,
            "Fetch a Wikipedia article's HTML and image list. Query: article title.",
        )
    }

    async fn execute(
        &self,
        query: &str,
        _params: &Value,
        context: &ToolContext,
    ) -> Result<ToolOutput, ToolError> {
        let name = ToolName::WikipediaContent;
        let segment = title_segment(query);
        if segment.is_empty() {
            return Err(ToolError::InvalidResponse {
                tool: name.to_string(),
                message: "empty article title".to_string(),
            });
        }

        let base = context.endpoint(name, DEFAULT_BASE_URL);
        let html_url = format!("{}/api/rest_v1/page/html/{}", base, segment);
        let media_url = format!("{}/api/rest_v1/page/media-list/{}", base, segment);

        let (html, media) = tokio::join!(
            send_text(name, context.http.get(&html_url)),
            send_json(name, context.http.get(&media_url))
        );
        let html = html?;
        let images = match media {
            Ok(media) => image_list(&media),
            Err(e) => {
                log::warn!("[TOOLS] No media list for '{}': {}", query, e);
                Vec::new()
            }
        };

        let truncated = html.body.chars().count() > MAX_HTML_CHARS;
        let data = json!({
            "title": query.trim().replace('_', " "),
            "html": truncate_chars(&html.body, MAX_HTML_CHARS),
            "truncated": truncated,
            "images": images,
        });
        Ok(ToolOutput::new(data).with_source(format!("https://en.wikipedia.org/wiki/{}", segment)))
    }
}
