//! `{{taskId.field}}` substitution in task queries

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde_json::Value;

static PLACEHOLDER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\{\{\s*([A-Za-z0-9_\-]+)\.([A-Za-z0-9_\-]+(?:\.[A-Za-z0-9_\-]+)*)\s*\}\}")
        .expect("valid regex")
});

/// Query text after substitution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved {
    pub text: String,
    /// Placeholders left verbatim because nothing matched them
    pub unresolved: Vec<String>,
}

/// Walk a dotted path into a result. A leading `result` segment is accepted
/// as an alias for the result itself.
pub fn lookup_path<'a>(data: &'a Value, path: &str) -> Option<&'a Value> {
    let mut segments: Vec<&str> = path.split('.').collect();
    if segments.first() == Some(&"result") && data.get("result").is_none() {
        segments.remove(0);
    }

    segments.into_iter().try_fold(data, |current, segment| match current {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Replace every placeholder whose task id `results` knows and whose path
/// exists in that result. Everything else stays as written.
pub fn resolve_placeholders<F>(template: &str, results: F) -> Resolved
where
    F: Fn(&str) -> Option<Value>,
{
    let mut unresolved = Vec::new();
    let text = PLACEHOLDER_RE
        .replace_all(template, |caps: &Captures| {
            let whole = caps[0].to_string();
            let found = results(&caps[1])
                .and_then(|data| lookup_path(&data, &caps[2]).map(render));
            match found {
                Some(text) => text,
                None => {
                    unresolved.push(whole.clone());
                    whole
                }
            }
        })
        .into_owned();

    Resolved { text, unresolved }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;

    fn results() -> HashMap<String, Value> {
        let mut map = HashMap::new();
        map.insert(
            "t1".to_string(),
            json!({"symbol": "BTC", "price": 64000.5, "coins": [{"id": "bitcoin"}]}),
        );
        map
    }

    #[test]
    fn test_resolves_known_fields() {
        let map = results();
        let resolved = resolve_placeholders("price of {{t1.symbol}}", |id| map.get(id).cloned());
        assert_eq!(resolved.text, "price of BTC");
        assert!(resolved.unresolved.is_empty());

        let resolved = resolve_placeholders(
            "{{ t1.price }} / {{t1.coins.0.id}} / {{t1.result.symbol}}",
            |id| map.get(id).cloned(),
        );
        assert_eq!(resolved.text, "64000.5 / bitcoin / BTC");
    }

    #[test]
    fn test_unknown_references_stay_verbatim() {
        let map = results();
        let resolved = resolve_placeholders(
            "news about {{ghost.symbol}} and {{t1.missing}}",
            |id| map.get(id).cloned(),
        );
        assert_eq!(resolved.text, "news about {{ghost.symbol}} and {{t1.missing}}");
        assert_eq!(resolved.unresolved, vec!["{{ghost.symbol}}", "{{t1.missing}}"]);
    }

    #[test]
    fn test_text_without_placeholders_is_untouched() {
        let resolved = resolve_placeholders("plain {braces} {{no_dot}}", |_| None);
        assert_eq!(resolved.text, "plain {braces} {{no_dot}}");
        assert!(resolved.unresolved.is_empty());
    }
}
