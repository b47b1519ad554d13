use super::http::{param_u64, send_text, truncate_chars};
use crate::error::ToolError;
use crate::tools::registry::Tool;
use crate::tools::types::{ToolContext, ToolDefinition, ToolName, ToolOutput};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use regex::Regex;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::net::{IpAddr, ToSocketAddrs};
use std::time::{Duration, Instant};

const DEFAULT_MAX_CHARS: usize = 20_000;
const CACHE_TTL_SECS: u64 = 900;

static SCRIPT_STYLE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)<(script|style|noscript|svg|head|title)\b[^>]*>.*?</(script|style|noscript|svg|head|title)\s*>")
        .expect("valid regex")
});
static COMMENT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<!--.*?-->").expect("valid regex"));
static BLOCK_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)<(br|/p|/div|/h[1-6]|/li|/tr|/section|/article|/blockquote|hr)\b[^>]*>")
        .expect("valid regex")
});
static TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<[^>]*>").expect("valid regex"));
static TITLE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<title[^>]*>(.*?)</title>").expect("valid regex"));
static NUMERIC_ENTITY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"&#(x[0-9a-fA-F]+|[0-9]+);").expect("valid regex"));

/// Cache entry for scrape results
struct CacheEntry {
    output: ToolOutput,
    expires_at: Instant,
}

/// Simple in-memory cache with TTL
struct ScrapeCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
    ttl: Duration,
}

impl ScrapeCache {
    fn new(ttl_secs: u64) -> Self {
        ScrapeCache {
            entries: RwLock::new(HashMap::new()),
            ttl: Duration::from_secs(ttl_secs),
        }
    }

    fn get(&self, key: &str) -> Option<ToolOutput> {
        let entries = self.entries.read();
        entries
            .get(key)
            .filter(|entry| entry.expires_at > Instant::now())
            .map(|entry| entry.output.clone())
    }

    fn set(&self, key: String, output: ToolOutput) {
        let mut entries = self.entries.write();
        // Clean expired entries occasionally
        if entries.len() > 50 {
            let now = Instant::now();
            entries.retain(|_, v| v.expires_at > now);
        }
        entries.insert(
            key,
            CacheEntry {
                output,
                expires_at: Instant::now() + self.ttl,
            },
        );
    }
}

/// Fetches a public page and returns its readable text.
/// The query is the URL; private and internal hosts are refused.
pub struct WebScrapeTool {
    cache: ScrapeCache,
}

impl WebScrapeTool {
    pub fn new() -> Self {
        WebScrapeTool {
            cache: ScrapeCache::new(CACHE_TTL_SECS), // 15 minute cache
        }
    }
}

impl Default for WebScrapeTool {
    fn default() -> Self {
        Self::new()
    }
}

fn blocked(message: String) -> ToolError {
    ToolError::Blocked {
        tool: ToolName::WebScrape.to_string(),
        message,
    }
}

#[async_trait]
impl Tool for WebScrapeTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new(
            ToolName::WebScrape,
            "Fetch a public web page and return its readable text. Query: the URL. Params: max_chars.",
        )
    }

    async fn execute(
        &self,
        query: &str,
        params: &Value,
        context: &ToolContext,
    ) -> Result<ToolOutput, ToolError> {
        let target = query.trim();
        let max_chars = param_u64(params, "max_chars")
            .map(|n| n as usize)
            .unwrap_or(DEFAULT_MAX_CHARS);

        if !target.starts_with("http://") && !target.starts_with("https://") {
            return Err(blocked("URL must start with http:// or https://".to_string()));
        }
        let url = url::Url::parse(target).map_err(|e| blocked(format!("Invalid URL: {}", e)))?;
        if !context.allow_private_hosts {
            validate_public_url(&url).map_err(blocked)?;
        }

        let cache_key = format!("{}:{}", target, max_chars);
        if let Some(cached) = self.cache.get(&cache_key) {
            log::debug!("[TOOLS] web_scrape: returning cached result for '{}'", target);
            return Ok(cached);
        }

        let response = send_text(ToolName::WebScrape, context.http.get(url.as_str())).await?;

        let is_html = response.content_type.is_empty() || response.content_type.contains("html");
        let (title, text) = if is_html {
            (extract_title(&response.body), extract_text_from_html(&response.body))
        } else {
            (None, response.body.trim().to_string())
        };

        let original_length = text.chars().count();
        let truncated = original_length > max_chars;
        let content = if truncated {
            truncate_chars(&text, max_chars)
        } else {
            text
        };

        let output = ToolOutput::new(json!({
            "url": target,
            "title": title,
            "content": content,
            "truncated": truncated,
            "original_length": original_length,
        }))
        .with_source(response.final_url);

        self.cache.set(cache_key, output.clone());
        Ok(output)
    }
}

/// Validate that a URL points to a public host (not private/internal)
fn validate_public_url(url: &url::Url) -> Result<(), String> {
    let host = url.host_str().ok_or("URL has no host")?;

    // Block localhost and common internal hostnames
    let blocked_hosts = [
        "localhost",
        "127.0.0.1",
        "0.0.0.0",
        "::1",
        "[::1]",
        "metadata.google.internal",
        "169.254.169.254", // cloud metadata
    ];

    let host_lower = host.to_lowercase();
    if blocked_hosts.contains(&host_lower.as_str()) {
        return Err(format!("Access to internal host '{}' is blocked", host));
    }

    if host_lower.ends_with(".local")
        || host_lower.ends_with(".internal")
        || host_lower.ends_with(".localhost")
        || host_lower.ends_with(".lan")
    {
        return Err(format!("Access to internal domain '{}' is blocked", host));
    }

    let port = url.port_or_known_default().unwrap_or(80);
    if let Ok(addrs) = (host, port).to_socket_addrs() {
        for addr in addrs {
            if is_private_ip(addr.ip()) {
                return Err(format!(
                    "URL resolves to private IP address '{}', access blocked",
                    addr.ip()
                ));
            }
        }
    }

    Ok(())
}

/// Check if an IP address is private/internal
fn is_private_ip(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(ipv4) => {
            ipv4.is_private()
                || ipv4.is_loopback()
                || ipv4.is_link_local()
                || ipv4.is_broadcast()
                || ipv4.is_documentation()
                || ipv4.is_unspecified()
        }
        IpAddr::V6(ipv6) => ipv6.is_loopback() || ipv6.is_unspecified(),
    }
}

fn extract_title(html: &str) -> Option<String> {
    TITLE_RE
        .captures(html)
        .map(|c| decode_entities(c[1].trim()))
        .filter(|t| !t.is_empty())
}

/// Strip markup, keeping block boundaries as line breaks
fn extract_text_from_html(html: &str) -> String {
    let without_code = SCRIPT_STYLE_RE.replace_all(html, " ");
    let without_comments = COMMENT_RE.replace_all(&without_code, " ");
    let with_breaks = BLOCK_RE.replace_all(&without_comments, "\n");
    let text = TAG_RE.replace_all(&with_breaks, " ");
    clean_text(&decode_entities(&text))
}

fn decode_entities(text: &str) -> String {
    let named = text
        .replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'");
    let numeric = NUMERIC_ENTITY_RE.replace_all(&named, |caps: &regex::Captures| {
        let code = &caps[1];
        let parsed = match code.strip_prefix('x') {
            Some(hex) => u32::from_str_radix(hex, 16).ok(),
            None => code.parse::<u32>().ok(),
        };
        parsed
            .and_then(char::from_u32)
            .map(|c| c.to_string())
            .unwrap_or_default()
    });
    // last, so "&amp;lt;" stays literal
    numeric.replace("&amp;", "&")
}

/// Collapse whitespace within lines and drop empty lines
fn clean_text(text: &str) -> String {
    text.lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_extract_text_from_html() {
        let html = r#"
        <html>
        <head><title>Test</title></head>
        <body>
            <h1>Hello World</h1>
            <p>This is a <b>test</b> paragraph.</p>
            <script>var x = 1;</script>
            <p>Second paragraph with &amp; entity &#169;.</p>
        </body>
        </html>
        "#;

        let text = extract_text_from_html(html);
        assert!(text.contains("Hello World"));
        assert!(text.contains("This is a test paragraph."));
        assert!(text.contains("with & entity ©."));
        assert!(!text.contains("var x = 1"));
        assert!(!text.contains("Test"));
        assert_eq!(extract_title(html).as_deref(), Some("Test"));
    }

    #[test]
    fn test_private_ip_detection() {
        assert!(is_private_ip("127.0.0.1".parse().unwrap()));
        assert!(is_private_ip("192.168.1.1".parse().unwrap()));
        assert!(is_private_ip("10.0.0.1".parse().unwrap()));
        assert!(is_private_ip("172.16.0.1".parse().unwrap()));
        assert!(!is_private_ip("8.8.8.8".parse().unwrap()));
        assert!(!is_private_ip("1.1.1.1".parse().unwrap()));
    }

    #[tokio::test]
    async fn test_internal_hosts_are_blocked() {
        let tool = WebScrapeTool::new();
        let ctx = ToolContext::new();
        for target in ["http://localhost:8080/", "http://printer.local/", "ftp://example.com"] {
            let err = tool.execute(target, &Value::Null, &ctx).await.unwrap_err();
            assert!(matches!(err, ToolError::Blocked { .. }), "{} was not blocked", target);
        }
    }

    #[tokio::test]
    async fn test_scrapes_and_truncates() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/article"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(
                "<html><title>Story</title><body><p>abcdefghij</p></body></html>",
                "text/html; charset=utf-8",
            ))
            .expect(1)
            .mount(&server)
            .await;

        let ctx = ToolContext::new().with_private_hosts_allowed(true);
        let tool = WebScrapeTool::new();
        let url = format!("{}/article", server.uri());

        let output = tool.execute(&url, &json!({"max_chars": 4}), &ctx).await.unwrap();
        assert_eq!(output.data["title"], "Story");
        assert_eq!(output.data["content"], "abcd");
        assert_eq!(output.data["truncated"], true);
        assert_eq!(output.source_url.as_deref(), Some(url.as_str()));

        // second call is served from the cache
        let cached = tool.execute(&url, &json!({"max_chars": 4}), &ctx).await.unwrap();
        assert_eq!(cached, output);
    }
}
