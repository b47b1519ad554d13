//! Structured (JSON) model calls with bounded self-correction

use super::{ModelChannel, ModelReply, ModelRequest, RateLimitSignal, RetryPolicy};
use crate::error::ModelError;

/// Result of a structured call that did not fail outright
#[derive(Debug, Clone, PartialEq)]
pub enum Structured<T> {
    Parsed(T),
    RateLimited(RateLimitSignal),
}

/// Invoke the model until `parse` accepts its output or the policy runs out.
///
/// Attempt `n` is sent with `retry_count = n`, which switches the request into
/// strict JSON mode. Network, HTTP and timeout errors abort immediately.
pub async fn invoke_structured<T, F>(
    channel: &dyn ModelChannel,
    request: ModelRequest,
    policy: &RetryPolicy,
    parse: F,
) -> Result<Structured<T>, ModelError>
where
    F: Fn(&str) -> Result<T, String>,
{
    let request = request.buffered();
    let operation = request.role.operation();
    let mut last_reason = String::from("no attempt made");

    for attempt in 0..policy.total_attempts() {
        if attempt > 0 {
            let delay = policy.delay_for(attempt);
            log::warn!(
                "[STRUCTURED] {} attempt {}/{} after {:?}: {}",
                operation,
                attempt + 1,
                policy.total_attempts(),
                delay,
                last_reason
            );
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
        }

        let reply = channel
            .invoke(request.clone().with_retry_count(attempt))
            .await?;

        match reply {
            ModelReply::RateLimited(signal) => return Ok(Structured::RateLimited(signal)),
            ModelReply::Buffered(text) => match parse(&text) {
                Ok(value) => return Ok(Structured::Parsed(value)),
                Err(reason) => {
                    log::debug!("[STRUCTURED] Unparseable {} output: {}", operation, text);
                    last_reason = reason;
                }
            },
            ModelReply::Streamed(_) => {
                last_reason = "reply was streamed instead of buffered".to_string();
            }
        }
    }

    Err(ModelError::MalformedOutput {
        operation,
        attempts: policy.total_attempts(),
        reason: last_reason,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::testing::ScriptedChannel;
    use crate::ai::{AgentRole, RETRY_TEMPERATURE};
    use serde_json::{json, Value};

    fn parse_json(text: &str) -> Result<Value, String> {
        serde_json::from_str(text).map_err(|e| e.to_string())
    }

    fn request() -> ModelRequest {
        ModelRequest::new(AgentRole::Classifier, "m", "classify", json!({"query": "q"}))
    }

    #[tokio::test]
    async fn test_retries_with_strict_mode_until_parsed() {
        let channel = ScriptedChannel::new();
        channel.push_text(AgentRole::Classifier, "not json");
        channel.push_text(AgentRole::Classifier, r#"{"ok":true}"#);

        let policy = RetryPolicy::new(2).without_delay();
        let result = invoke_structured(&channel, request(), &policy, parse_json)
            .await
            .unwrap();

        assert_eq!(result, Structured::Parsed(json!({"ok": true})));
        let calls = channel.requests();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].retry_count, 0);
        assert_eq!(calls[1].retry_count, 1);
        assert_eq!(calls[1].temperature(), RETRY_TEMPERATURE);
    }

    #[tokio::test]
    async fn test_exhausted_attempts_report_malformed_output() {
        let channel = ScriptedChannel::new();
        for _ in 0..3 {
            channel.push_text(AgentRole::Classifier, "still not json");
        }

        let policy = RetryPolicy::new(2).without_delay();
        let err = invoke_structured(&channel, request(), &policy, parse_json)
            .await
            .unwrap_err();

        match err {
            ModelError::MalformedOutput { attempts, .. } => assert_eq!(attempts, 3),
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(channel.requests().len(), 3);
    }

    #[tokio::test]
    async fn test_network_errors_are_not_retried() {
        let channel = ScriptedChannel::new();
        channel.push_error(
            AgentRole::Classifier,
            ModelError::Network {
                operation: "classifier call".to_string(),
                message: "connection refused".to_string(),
            },
        );

        let policy = RetryPolicy::new(2).without_delay();
        let err = invoke_structured(&channel, request(), &policy, parse_json)
            .await
            .unwrap_err();

        assert!(matches!(err, ModelError::Network { .. }));
        assert_eq!(channel.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_rate_limit_short_circuits() {
        let channel = ScriptedChannel::new();
        channel.push_reply(
            AgentRole::Classifier,
            ModelReply::RateLimited(RateLimitSignal {
                retry_after_secs: Some(30),
                message: "quota".to_string(),
            }),
        );

        let policy = RetryPolicy::new(2).without_delay();
        let result = invoke_structured(&channel, request(), &policy, parse_json)
            .await
            .unwrap();

        assert!(matches!(result, Structured::RateLimited(s) if s.retry_after_secs == Some(30)));
    }
}
