//! Wikipedia enrichment: every encyclopedia link found in search results is
//! fetched and run through the extraction agent. Best effort; a failing
//! article is logged and dropped.

use crate::ai::prompts::EXTRACTOR;
use crate::ai::{invoke_structured, AgentRole, ModelChannel, ModelRequest, RetryPolicy, Structured};
use crate::orchestration::validation::extract_json;
use crate::tools::{SearchHit, ToolName, ToolRegistry};
use futures_util::future::join_all;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashSet;

static WIKI_LINK_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^https?://(?:[a-z]{2,3}(?:-[a-z]+)?\.)?(?:m\.)?wikipedia\.org/wiki/([^?#\s]+)")
        .expect("valid regex")
});

/// Namespaces that are not articles
const SKIPPED_NAMESPACES: &[&str] = &[
    "File:", "Special:", "Category:", "Help:", "Talk:", "Wikipedia:", "Template:", "Portal:",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WikiLink {
    pub url: String,
    /// Decoded article title, spaces instead of underscores
    pub title: String,
}

/// Output contract of the extraction agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WikiExtraction {
    pub text_snippets: Vec<Value>,
    pub image_results: Vec<Value>,
    pub relevant_links: Vec<Value>,
    pub source_article_url: String,
}

/// Parse an encyclopedia article link
pub fn parse_wiki_link(url: &str) -> Option<WikiLink> {
    let caps = WIKI_LINK_RE.captures(url.trim())?;
    let raw = caps.get(1)?.as_str();
    let decoded = urlencoding::decode(raw)
        .map(|t| t.into_owned())
        .unwrap_or_else(|_| raw.to_string());
    let title = decoded.replace('_', " ").trim().to_string();
    if title.is_empty() || SKIPPED_NAMESPACES.iter().any(|ns| title.starts_with(ns)) {
        return None;
    }
    Some(WikiLink {
        url: url.trim().to_string(),
        title,
    })
}

/// Unique article links among search hits, in hit order
pub fn find_wikipedia_links(hits: &[SearchHit]) -> Vec<WikiLink> {
    let mut seen = HashSet::new();
    hits.iter()
        .filter_map(|hit| parse_wiki_link(&hit.link))
        .filter(|link| seen.insert(link.title.clone()))
        .collect()
}

fn parse_extraction(text: &str) -> Result<WikiExtraction, String> {
    let value = extract_json(text)?;
    serde_json::from_value(value).map_err(|e| format!("extraction does not match schema: {}", e))
}

/// Runs the fetch + extraction pipeline for a batch of links
pub struct Enricher<'a> {
    pub channel: &'a dyn ModelChannel,
    pub tools: &'a ToolRegistry,
    pub model: &'a str,
    pub retry: &'a RetryPolicy,
}

impl Enricher<'_> {
    /// Process all links concurrently. Successful extractions are returned in
    /// link order.
    pub async fn enrich(&self, query: &str, links: &[WikiLink]) -> Vec<WikiExtraction> {
        if links.is_empty() {
            return Vec::new();
        }
        log::info!("[ENRICH] Processing {} encyclopedia links", links.len());

        let results = join_all(links.iter().map(|link| self.enrich_one(query, link))).await;
        let extractions: Vec<WikiExtraction> = results.into_iter().flatten().collect();

        log::info!(
            "[ENRICH] {} of {} articles enriched",
            extractions.len(),
            links.len()
        );
        extractions
    }

    async fn enrich_one(&self, query: &str, link: &WikiLink) -> Option<WikiExtraction> {
        let article = match self
            .tools
            .execute_tool(ToolName::WikipediaContent, &link.title, &Value::Null)
            .await
        {
            Ok(article) => article,
            Err(e) => {
                log::warn!("[ENRICH] Dropping '{}': fetch failed: {}", link.title, e);
                return None;
            }
        };

        let input = json!({
            "query": query,
            "article_title": link.title,
            "article_url": link.url,
            "html": article.data.get("html").cloned().unwrap_or(Value::Null),
            "images": article.data.get("images").cloned().unwrap_or_else(|| json!([])),
        });
        let request = ModelRequest::new(AgentRole::Extractor, self.model, EXTRACTOR, input);

        match invoke_structured(self.channel, request, self.retry, parse_extraction).await {
            Ok(Structured::Parsed(mut extraction)) => {
                if extraction.source_article_url.trim().is_empty() {
                    extraction.source_article_url = link.url.clone();
                }
                Some(extraction)
            }
            Ok(Structured::RateLimited(signal)) => {
                log::warn!(
                    "[ENRICH] Dropping '{}': extractor rate limited ({})",
                    link.title,
                    signal.message
                );
                None
            }
            Err(e) => {
                log::warn!("[ENRICH] Dropping '{}': {}", link.title, e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::testing::ScriptedChannel;
    use crate::error::ToolError;
    use crate::tools::testing::StubTool;
    use crate::tools::{ToolContext, ToolOutput};
    use std::sync::Arc;

    fn hit(link: &str) -> SearchHit {
        SearchHit {
            title: String::new(),
            link: link.to_string(),
            snippet: String::new(),
        }
    }

    #[test]
    fn test_link_detection() {
        let hits = vec![
            hit("https://en.wikipedia.org/wiki/Ada_Lovelace"),
            hit("https://en.m.wikipedia.org/wiki/Ada_Lovelace#Life"),
            hit("https://de.wikipedia.org/wiki/Z%C3%BCrich?oldid=1"),
            hit("https://en.wikipedia.org/wiki/File:Ada.jpg"),
            hit("https://example.com/wiki/Ada_Lovelace"),
        ];
        let links = find_wikipedia_links(&hits);
        let titles: Vec<&str> = links.iter().map(|l| l.title.as_str()).collect();
        assert_eq!(titles, vec!["Ada Lovelace", "Zürich"]);
    }

    fn extraction_json(url: &str) -> String {
        json!({
            "text_snippets": ["snippet"],
            "image_results": [],
            "relevant_links": [],
            "source_article_url": url,
        })
        .to_string()
    }

    #[tokio::test]
    async fn test_failed_articles_are_dropped() {
        let registry = ToolRegistry::new(ToolContext::new());
        registry.register(Arc::new(StubTool::with(ToolName::WikipediaContent, |title, _| {
            if title == "Missing" {
                Err(ToolError::Http {
                    tool: "wikipedia_content".to_string(),
                    status: 404,
                    message: "not found".to_string(),
                })
            } else {
                Ok(ToolOutput::new(json!({"html": format!("<p>{}</p>", title), "images": []})))
            }
        })));

        let channel = ScriptedChannel::new();
        channel.push_text(AgentRole::Extractor, &extraction_json("https://en.wikipedia.org/wiki/Ada"));

        let retry = RetryPolicy::new(2).without_delay();
        let enricher = Enricher {
            channel: &channel,
            tools: &registry,
            model: "extractor-model",
            retry: &retry,
        };

        let links = vec![
            parse_wiki_link("https://en.wikipedia.org/wiki/Ada").unwrap(),
            parse_wiki_link("https://en.wikipedia.org/wiki/Missing").unwrap(),
        ];
        let extractions = enricher.enrich("who was ada", &links).await;

        assert_eq!(extractions.len(), 1);
        assert_eq!(extractions[0].source_article_url, "https://en.wikipedia.org/wiki/Ada");
        // the missing article never reached the extractor
        assert_eq!(channel.requests_for(AgentRole::Extractor).len(), 1);
    }

    #[tokio::test]
    async fn test_malformed_extraction_is_dropped_after_retries() {
        let registry = ToolRegistry::new(ToolContext::new());
        registry.register(Arc::new(StubTool::ok(
            ToolName::WikipediaContent,
            json!({"html": "<p>Rust</p>", "images": []}),
        )));

        let channel = ScriptedChannel::new();
        for _ in 0..3 {
            channel.push_text(AgentRole::Extractor, r#"{"text_snippets": "not a list"}"#);
        }

        let retry = RetryPolicy::new(2).without_delay();
        let enricher = Enricher {
            channel: &channel,
            tools: &registry,
            model: "extractor-model",
            retry: &retry,
        };
        let links = vec![parse_wiki_link("https://en.wikipedia.org/wiki/Rust").unwrap()];

        assert!(enricher.enrich("rust", &links).await.is_empty());
        let calls = channel.requests_for(AgentRole::Extractor);
        assert_eq!(calls.len(), 3);
        assert_eq!(calls[2].retry_count, 2);
    }
}
