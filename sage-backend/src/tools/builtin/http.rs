//! Request helpers shared by the tool adapters

use crate::error::ToolError;
use crate::tools::types::{ToolContext, ToolName};
use reqwest::RequestBuilder;
use serde_json::Value;

/// Longest slice of an error body kept in a `ToolError::Http`
const MAX_ERROR_BODY: usize = 300;

/// A successfully fetched text body
pub(super) struct TextResponse {
    pub body: String,
    pub final_url: String,
    pub content_type: String,
}

pub(super) fn require_api_key(
    context: &ToolContext,
    tool: ToolName,
    key: &str,
) -> Result<String, ToolError> {
    context.get_api_key(key).ok_or_else(|| ToolError::MissingApiKey {
        tool: tool.to_string(),
        key: key.to_string(),
    })
}

/// Send a request and decode its JSON body
pub(super) async fn send_json(tool: ToolName, request: RequestBuilder) -> Result<Value, ToolError> {
    let response = send_text(tool, request).await?;
    serde_json::from_str(&response.body).map_err(|e| ToolError::InvalidResponse {
        tool: tool.to_string(),
        message: format!("body is not JSON: {}", e),
    })
}

/// Send a request and return its body as text
pub(super) async fn send_text(
    tool: ToolName,
    request: RequestBuilder,
) -> Result<TextResponse, ToolError> {
    let response = request.send().await.map_err(|e| ToolError::Network {
        tool: tool.to_string(),
        message: e.to_string(),
    })?;

    let status = response.status();
    let final_url = response.url().to_string();
    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();

    let body = response.text().await.map_err(|e| ToolError::Network {
        tool: tool.to_string(),
        message: format!("failed to read response body: {}", e),
    })?;

    if !status.is_success() {
        return Err(ToolError::Http {
            tool: tool.to_string(),
            status: status.as_u16(),
            message: truncate_chars(body.trim(), MAX_ERROR_BODY),
        });
    }

    Ok(TextResponse {
        body,
        final_url,
        content_type,
    })
}

/// Truncate on a char boundary
pub(super) fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}

/// Read a string parameter, ignoring blanks
pub(super) fn param_str<'a>(params: &'a Value, key: &str) -> Option<&'a str> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

/// Read a numeric parameter from either a number or a string
pub(super) fn param_u64(params: &Value, key: &str) -> Option<u64> {
    match params.get(key)? {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
