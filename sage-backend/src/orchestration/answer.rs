//! Source records and post-processing of buffered writer answers

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;

static SOURCES_BLOCK_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<sources_json>(.*?)</sources_json>").expect("valid regex"));

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRecord {
    pub number: usize,
    pub title: String,
    pub url: String,
    #[serde(default)]
    pub snippet: String,
}

/// Collects sources in discovery order, deduplicated by URL
#[derive(Debug, Default)]
pub struct SourceCollector {
    seen: HashSet<String>,
    sources: Vec<SourceRecord>,
}

impl SourceCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, title: &str, url: &str, snippet: &str) {
        let url = url.trim();
        if url.is_empty() || !self.seen.insert(url.to_string()) {
            return;
        }
        self.sources.push(SourceRecord {
            number: self.sources.len() + 1,
            title: if title.trim().is_empty() {
                url.to_string()
            } else {
                title.trim().to_string()
            },
            url: url.to_string(),
            snippet: snippet.trim().to_string(),
        });
    }

    pub fn urls(&self) -> Vec<String> {
        self.sources.iter().map(|s| s.url.clone()).collect()
    }

    pub fn into_sources(self) -> Vec<SourceRecord> {
        self.sources
    }
}

/// Final answer text with the sources the writer cited
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalAnswer {
    pub body: String,
    pub sources: Vec<SourceRecord>,
}

/// Split the writer's `<sources_json>` block off the body. Cited sources
/// that were never supplied are dropped and the rest renumbered.
pub fn process_answer(text: &str, supplied: &[SourceRecord]) -> FinalAnswer {
    let Some(caps) = SOURCES_BLOCK_RE.captures(text) else {
        return FinalAnswer {
            body: text.trim().to_string(),
            sources: Vec::new(),
        };
    };

    let body = SOURCES_BLOCK_RE.replace_all(text, "").trim().to_string();
    let cited: Vec<Value> = match serde_json::from_str::<Value>(caps[1].trim()) {
        Ok(Value::Array(items)) => items,
        Ok(_) | Err(_) => {
            log::warn!("[ORCHESTRATOR] Writer emitted an unreadable sources block, dropping it");
            Vec::new()
        }
    };

    let mut collector = SourceCollector::new();
    for item in &cited {
        let Some(url) = item.get("url").and_then(|v| v.as_str()) else {
            continue;
        };
        let Some(known) = supplied.iter().find(|s| s.url == url.trim()) else {
            log::debug!("[ORCHESTRATOR] Dropping uncited source {}", url);
            continue;
        };
        let title = item
            .get("title")
            .and_then(|v| v.as_str())
            .unwrap_or(known.title.as_str());
        collector.add(title, &known.url, &known.snippet);
    }

    FinalAnswer {
        body,
        sources: collector.into_sources(),
    }
}
