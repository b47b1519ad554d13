//! Classifier output contract: tolerant JSON extraction, rule validation and
//! the typed classification result.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::str::FromStr;
use strum::{AsRefStr, Display, EnumIter, EnumString, IntoEnumIterator};

static FENCE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```[A-Za-z]*[ \t]*\r?\n?(.*?)```").expect("valid regex"));

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr, EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Classification {
    Direct,
    ToolWebSearch,
    Hybrid,
    Unclear,
    Conversational,
    Math,
    Code,
}

impl Classification {
    /// Answered by the writer without running tools
    pub fn is_direct_answer(&self) -> bool {
        matches!(
            self,
            Classification::Direct
                | Classification::Unclear
                | Classification::Conversational
                | Classification::Math
                | Classification::Code
        )
    }

    pub fn requires_tools(&self) -> bool {
        matches!(self, Classification::ToolWebSearch | Classification::Hybrid)
    }

    /// The `action` a correct classifier reply pairs with this classification
    pub fn expected_action(&self) -> &'static str {
        if self.requires_tools() {
            "search"
        } else {
            "direct"
        }
    }
}

/// One proposed tool invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchPlanStep {
    pub tool: String,
    pub query: String,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub params: Value,
}

/// Validated output of the classifier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub classification: Classification,
    pub action: String,
    #[serde(default)]
    pub response: Option<String>,
    #[serde(default)]
    pub search_plan: Option<Vec<SearchPlanStep>>,
    #[serde(default)]
    pub direct_component: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
}

impl ClassificationResult {
    /// Validate and convert a parsed classifier reply
    pub fn from_value(value: Value) -> Result<Self, Vec<String>> {
        let errors = validate(&value);
        if !errors.is_empty() {
            return Err(errors);
        }
        serde_json::from_value(value)
            .map_err(|e| vec![format!("Malformed classification result: {}", e)])
    }
}

fn allowed_classifications() -> String {
    Classification::iter()
        .map(|c| c.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

fn non_empty_str<'a>(value: &'a Value, key: &str) -> Option<&'a str> {
    value
        .get(key)
        .and_then(|v| v.as_str())
        .filter(|s| !s.trim().is_empty())
}

/// Check a parsed classifier reply against the contract.
///
/// Every violated rule is reported, in rule order. An empty list means the
/// reply is valid.
pub fn validate(parsed: &Value) -> Vec<String> {
    let mut errors = Vec::new();
    if !parsed.is_object() {
        errors.push("Classification result must be a JSON object".to_string());
        return errors;
    }

    let classification = match parsed.get("classification") {
        None | Some(Value::Null) => {
            errors.push("Missing required field 'classification'".to_string());
            None
        }
        Some(Value::String(s)) => match Classification::from_str(s) {
            Ok(c) => Some(c),
            Err(_) => {
                errors.push(format!(
                    "Invalid classification '{}': expected one of {}",
                    s,
                    allowed_classifications()
                ));
                None
            }
        },
        Some(other) => {
            errors.push(format!(
                "Invalid classification {}: expected one of {}",
                other,
                allowed_classifications()
            ));
            None
        }
    };

    match (parsed.get("action").and_then(|v| v.as_str()), classification) {
        (None, _) => errors.push("Missing required field 'action'".to_string()),
        (Some(action), Some(c)) if action != c.expected_action() => errors.push(format!(
            "Action must be '{}' for classification '{}' (got '{}')",
            c.expected_action(),
            c,
            action
        )),
        _ => {}
    }

    let has_plan = parsed.get("search_plan").is_some_and(|v| v.is_array());
    match classification {
        Some(Classification::ToolWebSearch) if !has_plan => {
            errors.push("Classification 'tool_web_search' requires a 'search_plan' array".to_string())
        }
        Some(Classification::Hybrid)
            if !has_plan && non_empty_str(parsed, "direct_component").is_none() =>
        {
            errors.push(
                "Classification 'hybrid' requires a 'search_plan' array or a 'direct_component'"
                    .to_string(),
            )
        }
        Some(c) if c.is_direct_answer() && non_empty_str(parsed, "response").is_none() => errors
            .push(format!(
                "Classification '{}' requires a non-empty 'response' string",
                c
            )),
        _ => {}
    }

    errors
}

fn parse_object(text: &str) -> Result<Value, String> {
    match serde_json::from_str::<Value>(text) {
        Ok(value @ Value::Object(_)) => Ok(value),
        Ok(other) => Err(format!("expected a JSON object, found {}", json_kind(&other))),
        Err(e) => Err(e.to_string()),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Parse a JSON object out of imperfect model output.
///
/// Stages, first success wins:
/// 1. the trimmed text as is
/// 2. fenced content, or the text from its first `{`
/// 2.5. one layer of string quoting removed
/// 3. the substring from the first `{` to the last `}`
pub fn extract_json(raw: &str) -> Result<Value, String> {
    let trimmed = raw.trim();
    if let Ok(value) = parse_object(trimmed) {
        return Ok(value);
    }

    let fenced = FENCE_RE
        .captures(trimmed)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim())
        .unwrap_or(trimmed);
    let cleaned = if fenced.starts_with('"') {
        fenced
    } else {
        fenced.find('{').map(|idx| &fenced[idx..]).unwrap_or(fenced)
    };
    if let Ok(value) = parse_object(cleaned) {
        return Ok(value);
    }

    if cleaned.len() >= 2 && cleaned.starts_with('"') && cleaned.ends_with('"') {
        if let Ok(Value::String(inner)) = serde_json::from_str::<Value>(cleaned) {
            if let Ok(value) = parse_object(inner.trim()) {
                return Ok(value);
            }
        }
    }

    let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}')) else {
        return Err("stage 3 (brace extraction) failed: no JSON object delimiters found".to_string());
    };
    if end < start {
        return Err("stage 3 (brace extraction) failed: braces out of order".to_string());
    }
    parse_object(&trimmed[start..=end])
        .map_err(|e| format!("stage 3 (brace extraction) failed: {}", e))
}
